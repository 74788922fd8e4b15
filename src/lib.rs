pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod kv;
pub mod middleware;
pub mod rate_limit;
pub mod response;
pub mod state;
pub mod tasks;
pub mod telemetry;
pub mod worker;
