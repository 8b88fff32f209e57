// src/api/mod.rs

pub mod actions;
pub mod contracts;
pub mod health;
pub mod leaderboard;
pub mod profile;
pub mod rig;

use chrono::Utc;
use ethers::types::{Address, U256};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::signature::{SignatureVerifier, SignedAction};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::services::onchain::{parse_address, EvmGameChain, GameCall};
use crate::services::relayer::{GameEvent, TransactionOutcome, TransactionRelay};
use crate::services::{ClaimProcessor, LeaderboardCache, MissionLedger, NonceRegistry};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub redis: ConnectionManager,
    pub chain: Arc<EvmGameChain>,
    pub relay: Arc<TransactionRelay>,
    pub ledger: Arc<MissionLedger>,
    pub claims: Arc<ClaimProcessor>,
    pub leaderboard: Arc<LeaderboardCache>,
    pub nonces: Arc<dyn NonceRegistry>,
    pub config: Config,
}

/// Fields every mutating request carries.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    pub user_address: String,
    pub signature: String,
    pub nonce: u64,
}

/// Common body for a relayed action.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

impl From<&TransactionOutcome> for ActionReceipt {
    fn from(outcome: &TransactionOutcome) -> Self {
        Self {
            tx_hash: outcome.tx_hash_hex(),
            block_number: outcome.block_number,
        }
    }
}

/// Signature, freshness and replay checks, then marks the player as seen.
/// Returns the normalized actor address.
pub async fn authorize_with(
    nonces: &dyn NonceRegistry,
    leaderboard: &LeaderboardCache,
    max_age_secs: u64,
    action_tag: &'static str,
    envelope: &SignedEnvelope,
    now_ms: i64,
) -> Result<String> {
    let action = SignedAction {
        actor_address: &envelope.user_address,
        action_tag,
        nonce: envelope.nonce,
        signature: &envelope.signature,
    };
    let actor = SignatureVerifier::verify_action(&action, max_age_secs, now_ms)?;

    let retention = max_age_secs.saturating_mul(2);
    if !nonces
        .consume(&actor, action_tag, envelope.nonce, retention)
        .await?
    {
        return Err(AppError::AuthError("Nonce already used".to_string()));
    }

    if let Err(err) = leaderboard.touch(&actor).await {
        tracing::warn!("Failed to mark {} as seen: {}", actor, err);
    }
    Ok(actor)
}

impl AppState {
    pub async fn authorize(
        &self,
        action_tag: &'static str,
        envelope: &SignedEnvelope,
    ) -> Result<(String, Address)> {
        let actor = authorize_with(
            self.nonces.as_ref(),
            &self.leaderboard,
            self.config.signature_max_age_secs,
            action_tag,
            envelope,
            Utc::now().timestamp_millis(),
        )
        .await?;
        let user = parse_address(&actor)?;
        Ok((actor, user))
    }

    /// Submits through the relayer and queues mission progress for the actor.
    ///
    /// Progress is only tracked from a confirmed receipt. An action that ends
    /// in `OutcomeUnknown` earns no mission progress even if it is mined later;
    /// action receipts are not reconciled the way reward claims are.
    pub async fn relay_action(&self, actor: String, call: GameCall) -> Result<TransactionOutcome> {
        let outcome = self.relay.submit(call.clone()).await?;
        self.ledger
            .spawn_tracking(actor, call, outcome.clone())
            .await;
        Ok(outcome)
    }
}

/// Whole-token HASH amount credited to `user` by the transaction, one decimal.
pub fn hash_received(outcome: &TransactionOutcome, user: Address) -> String {
    let wei = outcome
        .events
        .iter()
        .filter_map(|e| match e {
            GameEvent::HashTransfer { to, value, .. } if *to == user => Some(*value),
            _ => None,
        })
        .fold(U256::zero(), |acc, v| acc.saturating_add(v));
    format!(
        "{:.1}",
        crate::services::leaderboard_cache::wei_to_decimal(wei)
    )
}

/// Path address to its lower-case `0x` form.
pub fn path_address(raw: &str) -> Result<(String, Address)> {
    let user = parse_address(raw)?;
    Ok((format!("{:#x}", user), user))
}
