use serde::Deserialize;
use std::env;

use crate::constants::{
    DEFAULT_CLAIM_LEASE_SECS, DEFAULT_CLAIM_RECONCILE_INTERVAL_SECS,
    DEFAULT_RELAYER_CONFIRM_TIMEOUT_SECS, DEFAULT_RELAYER_GAS_LIMIT,
    DEFAULT_SIGNATURE_MAX_AGE_SECS,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis (consumed nonces)
    pub redis_url: String,

    // Chain
    pub rpc_url: String,
    pub chain_id: u64,
    pub game_contract_address: String,

    // Relayer
    pub relayer_private_key: String,
    pub relayer_gas_limit: u64,
    pub relayer_confirm_timeout_secs: u64,

    // Signed actions
    pub signature_max_age_secs: u64,

    // Mission claims
    pub claim_lease_secs: u64,
    pub claim_reconcile_interval_secs: u64,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            rpc_url: env::var("RPC_URL")?,
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "80002".to_string())
                .parse()?,
            game_contract_address: env::var("GAME_CONTRACT_ADDRESS")?,

            relayer_private_key: env::var("RELAYER_PRIVATE_KEY")?,
            relayer_gas_limit: env::var("RELAYER_GAS_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RELAYER_GAS_LIMIT),
            relayer_confirm_timeout_secs: env::var("RELAYER_CONFIRM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RELAYER_CONFIRM_TIMEOUT_SECS),

            signature_max_age_secs: env::var("SIGNATURE_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SIGNATURE_MAX_AGE_SECS),

            claim_lease_secs: env::var("CLAIM_LEASE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CLAIM_LEASE_SECS),
            claim_reconcile_interval_secs: env::var("CLAIM_RECONCILE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CLAIM_RECONCILE_INTERVAL_SECS),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.rpc_url.trim().is_empty() {
            anyhow::bail!("RPC_URL is empty");
        }
        url::Url::parse(&self.rpc_url)
            .map_err(|e| anyhow::anyhow!("RPC_URL is not a valid URL: {}", e))?;
        if self.relayer_private_key.trim().is_empty() {
            anyhow::bail!("RELAYER_PRIVATE_KEY is empty");
        }
        if self.game_contract_address.trim().is_empty() {
            anyhow::bail!("GAME_CONTRACT_ADDRESS is empty");
        }
        if self.relayer_gas_limit == 0 {
            anyhow::bail!("RELAYER_GAS_LIMIT must be > 0");
        }
        if self.signature_max_age_secs == 0 {
            anyhow::bail!("SIGNATURE_MAX_AGE_SECS must be > 0");
        }

        if self.game_contract_address.starts_with("0x0000") {
            tracing::warn!("Using placeholder game contract address");
        }
        if self.claim_lease_secs <= self.relayer_confirm_timeout_secs {
            tracing::warn!(
                "CLAIM_LEASE_SECS ({}) should exceed RELAYER_CONFIRM_TIMEOUT_SECS ({})",
                self.claim_lease_secs,
                self.relayer_confirm_timeout_secs
            );
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_testnet(&self) -> bool {
        // Polygon Amoy, Sepolia, local anvil/hardhat
        self.environment == "development"
            || matches!(self.chain_id, 80002 | 11155111 | 31337)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "0.0.0.0".to_string(),
        port: 3000,
        environment: "development".to_string(),
        database_url: "postgres://localhost/cyberrng".to_string(),
        database_max_connections: 1,
        redis_url: "redis://localhost:6379".to_string(),
        rpc_url: "http://localhost:8545".to_string(),
        chain_id: 31337,
        game_contract_address: "0x0000000000000000000000000000000000000001".to_string(),
        relayer_private_key: "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .to_string(),
        relayer_gas_limit: DEFAULT_RELAYER_GAS_LIMIT,
        relayer_confirm_timeout_secs: 5,
        signature_max_age_secs: DEFAULT_SIGNATURE_MAX_AGE_SECS,
        claim_lease_secs: 600,
        claim_reconcile_interval_secs: 60,
        cors_allowed_origins: "*".to_string(),
    }
}
