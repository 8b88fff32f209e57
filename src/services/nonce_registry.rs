use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::{constants::NONCE_KEY_PREFIX, error::Result};

/// Single-use record of signed-action nonces.
#[async_trait]
pub trait NonceRegistry: Send + Sync {
    /// Marks `(address, tag, nonce)` as used. Returns `false` if it was
    /// already consumed within `ttl_secs`.
    async fn consume(&self, address: &str, tag: &str, nonce: u64, ttl_secs: u64) -> Result<bool>;
}

fn nonce_key(address: &str, tag: &str, nonce: u64) -> String {
    format!(
        "{}:{}:{}:{}",
        NONCE_KEY_PREFIX,
        address.trim().to_ascii_lowercase(),
        tag,
        nonce
    )
}

#[derive(Clone)]
pub struct RedisNonceRegistry {
    conn: ConnectionManager,
}

impl RedisNonceRegistry {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NonceRegistry for RedisNonceRegistry {
    async fn consume(&self, address: &str, tag: &str, nonce: u64, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = nonce_key(address, tag, nonce);
        // SET NX answers OK on first use and nil on replay
        let stored: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1_i32)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;
        if stored.is_none() {
            tracing::warn!("Replayed nonce rejected key={}", key);
        }
        Ok(stored.is_some())
    }
}
