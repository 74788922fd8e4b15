#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use taskhub::{
    app::build_app,
    auth::{
        repo::{UniqueField, UserRepoError, UserRepoResult, UserRepository},
        repo_types::{NewUser, User},
    },
    config::{AppConfig, DatabaseConfig, JwtConfig, LogFormat, RateLimitConfig, RedisConfig},
    kv::{KeyValueStore, MemoryStore},
    state::AppState,
    tasks::{
        repo::{TaskRepoError, TaskRepoResult, TaskRepository},
        repo_types::{NewTask, Task, TaskChanges, TaskStatus},
    },
};

#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<Vec<User>>,
}

#[async_trait]
impl UserRepository for MemoryUsers {
    async fn create(&self, user: NewUser) -> UserRepoResult<User> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == user.email) {
            return Err(UserRepoError::Duplicate(UniqueField::Email));
        }
        if rows.iter().any(|u| u.username == user.username) {
            return Err(UserRepoError::Duplicate(UniqueField::Username));
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: user.id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn get_by_email(&self, email: &str) -> UserRepoResult<Option<User>> {
        Ok(self.rows.lock().unwrap().iter().find(|u| u.email == email).cloned())
    }

    async fn get_by_username(&self, username: &str) -> UserRepoResult<Option<User>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> UserRepoResult<Option<User>> {
        Ok(self.rows.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }
}

/// Listing orders newest first, ties by id.
#[derive(Default)]
pub struct MemoryTasks {
    rows: Mutex<Vec<Task>>,
}

#[async_trait]
impl TaskRepository for MemoryTasks {
    async fn create(&self, task: NewTask) -> TaskRepoResult<Task> {
        let now = OffsetDateTime::now_utc();
        let row = Task {
            id: task.id,
            title: task.title,
            description: task.description,
            status: task.status,
            user_id: task.user_id,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid, user_id: Uuid) -> TaskRepoResult<Option<Task>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id && t.user_id == user_id)
            .cloned())
    }

    async fn list(
        &self,
        user_id: Uuid,
        status: Option<TaskStatus>,
        page: u32,
        limit: u32,
    ) -> TaskRepoResult<(Vec<Task>, i64)> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<Task> = rows
            .iter()
            .filter(|t| t.user_id == user_id && status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = matching.len() as i64;
        let offset = (page.max(1) - 1) as usize * limit as usize;
        let page = matching.into_iter().skip(offset).take(limit as usize).collect();
        Ok((page, total))
    }

    async fn update(&self, id: Uuid, user_id: Uuid, changes: TaskChanges) -> TaskRepoResult<Task> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|t| t.id == id && t.user_id == user_id)
            .ok_or(TaskRepoError::NotFound)?;
        changes.apply_to(row);
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> TaskRepoResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|t| !(t.id == id && t.user_id == user_id));
        if rows.len() == before {
            return Err(TaskRepoError::NotFound);
        }
        Ok(())
    }
}

pub fn config(requests: u32) -> AppConfig {
    AppConfig {
        env: "test".into(),
        host: "127.0.0.1".into(),
        port: 0,
        log_level: "warn".into(),
        log_format: LogFormat::Text,
        database: DatabaseConfig {
            host: "localhost".into(),
            port: 5432,
            user: "taskhub".into(),
            password: "taskhub".into(),
            name: "taskhub".into(),
            ssl_mode: "disable".into(),
        },
        redis: RedisConfig {
            host: "localhost".into(),
            port: 6379,
            password: None,
            db: 0,
        },
        jwt: JwtConfig {
            secret: "integration-secret".into(),
            ttl_minutes: 5,
        },
        bcrypt_cost: 4,
        rate_limit: RateLimitConfig {
            requests,
            window_secs: 60,
            trust_proxy: false,
        },
        invalidation_worker: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub fn test_app() -> TestApp {
    test_app_with_limit(1_000)
}

pub fn test_app_with_limit(requests: u32) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let state = AppState::from_parts(
        config(requests),
        Arc::new(MemoryUsers::default()),
        Arc::new(MemoryTasks::default()),
        Some(kv),
    );
    TestApp {
        router: build_app(state),
        store,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let body = body.map(|v| v.to_string()).unwrap_or_default();
        self.raw(method, uri, token, body).await
    }

    pub async fn raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: String,
    ) -> TestResponse {
        let mut req = Request::builder().method(method).uri(uri);
        if !body.is_empty() {
            req = req.header(header::CONTENT_TYPE, "application/json");
        }
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let resp = self
            .router
            .clone()
            .oneshot(req.body(Body::from(body)).unwrap())
            .await
            .unwrap();

        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Register a user and return their bearer token.
    pub async fn register(&self, username: &str, email: &str) -> String {
        let resp = self
            .call(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(serde_json::json!({
                    "username": username,
                    "email": email,
                    "password": "secret123",
                })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
        resp.body["data"]["token"].as_str().unwrap().to_string()
    }

    pub async fn create_task(&self, token: &str, title: &str) -> Value {
        let resp = self
            .call(
                Method::POST,
                "/api/v1/tasks",
                Some(token),
                Some(serde_json::json!({ "title": title })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
        resp.body["data"].clone()
    }
}
