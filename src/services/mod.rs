// All service modules
pub mod claim_processor;
pub mod leaderboard_cache;
pub mod mission_ledger;
pub mod nonce_registry;
pub mod onchain;
pub mod relayer;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export for convenience
pub use claim_processor::ClaimProcessor;
pub use leaderboard_cache::LeaderboardCache;
pub use mission_ledger::MissionLedger;
pub use nonce_registry::{NonceRegistry, RedisNonceRegistry};
pub use onchain::EvmGameChain;
pub use relayer::TransactionRelay;

use crate::config::Config;
use std::sync::Arc;

/// Start all background services
pub async fn start_background_services(claims: Arc<ClaimProcessor>, config: &Config) {
    tracing::info!("Starting background services...");

    claims
        .start_reconciler(
            config.claim_reconcile_interval_secs,
            config.claim_lease_secs,
        )
        .await;

    tracing::info!("All background services started successfully");
}
