use thiserror::Error;
use tokio::task;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt failed: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("password worker failed: {0}")]
    Join(#[from] task::JoinError),
}

/// bcrypt at a fixed cost. Hashing runs on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        let plain = plain.to_owned();
        let cost = self.cost;
        let hash = task::spawn_blocking(move || bcrypt::hash(plain, cost)).await??;
        Ok(hash)
    }

    /// Constant-time comparison against a stored hash.
    pub async fn verify(&self, plain: &str, hash: &str) -> Result<bool, PasswordError> {
        let plain = plain.to_owned();
        let hash = hash.to_owned();
        let ok = task::spawn_blocking(move || bcrypt::verify(plain, &hash)).await??;
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    #[tokio::test]
    async fn hash_and_verify_roundtrip() {
        let hasher = PasswordHasher::new(COST);
        let hash = hasher.hash("Secur3P@ssw0rd!").await.expect("hashing should succeed");
        assert_ne!(hash, "Secur3P@ssw0rd!");
        assert!(hash.starts_with("$2"));
        assert!(hasher.verify("Secur3P@ssw0rd!", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn verify_rejects_wrong_password() {
        let hasher = PasswordHasher::new(COST);
        let hash = hasher.hash("correct-horse-battery-staple").await.unwrap();
        assert!(!hasher.verify("wrong-password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn verify_errors_on_malformed_hash() {
        let err = PasswordHasher::new(COST)
            .verify("anything", "not-a-valid-hash")
            .await
            .unwrap_err();
        assert!(matches!(err, PasswordError::Bcrypt(_)));
    }
}
