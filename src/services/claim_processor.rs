use chrono::Utc;
use ethers::types::{H256, U256};
use futures_util::future::join_all;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration};

use crate::{
    constants::{CLAIM_TX_RECORD_ATTEMPTS, CLAIM_TX_RECORD_BACKOFF_MS, HASH_DECIMALS},
    db::MissionStore,
    error::{AppError, Result},
    models::MissionInstance,
};

use super::mission_ledger::MissionLedger;
use super::onchain::{parse_address, GameCall};
use super::relayer::{RelayError, TransactionRelay};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub mission_id: i64,
    pub reward: i64,
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// Pays mission rewards through the relayer, at most once per mission.
pub struct ClaimProcessor {
    ledger: Arc<MissionLedger>,
    relay: Arc<TransactionRelay>,
}

impl ClaimProcessor {
    pub fn new(ledger: Arc<MissionLedger>, relay: Arc<TransactionRelay>) -> Self {
        Self { ledger, relay }
    }

    fn store(&self) -> &Arc<dyn MissionStore> {
        self.ledger.store()
    }

    pub async fn claim(&self, address: &str, mission_id: i64) -> Result<ClaimReceipt> {
        let user = parse_address(address)?;

        // Progress from this player's confirmed actions must land first
        self.ledger.wait_for_progress(address).await;

        let mission = self
            .store()
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Mission {}", mission_id)))?;
        if mission.address != address {
            return Err(AppError::Forbidden);
        }
        if !mission.is_complete() {
            return Err(AppError::NotEligible);
        }
        if mission.claimed || mission.claim_locked_at.is_some() {
            return Err(AppError::AlreadyClaimed);
        }
        let key = mission.key()?;

        if !self.store().reserve_claim(mission_id, address).await? {
            return Err(AppError::AlreadyClaimed);
        }

        let amount = U256::from(key.reward.max(0) as u64) * U256::exp10(HASH_DECIMALS as usize);
        let call = GameCall::AdminReward { user, amount };

        // Nothing is sent if the marker cannot be written
        if let Err(err) = self.store().mark_claim_dispatched(mission_id).await {
            self.store().release_claim(mission_id).await?;
            return Err(err);
        }

        let pending = match self.relay.dispatch(&call).await {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!("Reward for mission {} not sent: {}", mission_id, err);
                self.store().release_claim(mission_id).await?;
                return Err(err.into());
            }
        };

        // A dispatched reservation without a hash is never auto-released
        self.record_claim_tx(mission_id, &pending.tx_hash_hex()).await;

        match self.relay.confirm(&pending).await {
            Ok(outcome) => {
                self.store().finalize_claim(mission_id).await?;
                tracing::info!(
                    "Mission {} claimed by {}: {} HASH in {}",
                    mission_id,
                    address,
                    key.reward,
                    outcome.tx_hash_hex()
                );
                Ok(ClaimReceipt {
                    mission_id,
                    reward: key.reward,
                    tx_hash: outcome.tx_hash_hex(),
                    block_number: outcome.block_number,
                })
            }
            Err(RelayError::OutcomeUnknown { tx_hash }) => {
                // Reservation stays until the reconciler sees the receipt
                tracing::warn!(
                    "Reward for mission {} pending as {}, leaving reservation",
                    mission_id,
                    tx_hash
                );
                Err(AppError::OutcomeUnknown { tx_hash })
            }
            Err(err) => {
                tracing::warn!("Reward for mission {} failed: {}", mission_id, err);
                self.store().release_claim(mission_id).await?;
                Err(err.into())
            }
        }
    }

    async fn record_claim_tx(&self, mission_id: i64, tx_hash: &str) {
        for attempt in 1..=CLAIM_TX_RECORD_ATTEMPTS {
            match self.store().record_claim_tx(mission_id, tx_hash).await {
                Ok(()) => return,
                Err(err) if attempt < CLAIM_TX_RECORD_ATTEMPTS => {
                    tracing::warn!(
                        "Recording {} for mission {} failed (attempt {}): {}",
                        tx_hash,
                        mission_id,
                        attempt,
                        err
                    );
                    sleep(Duration::from_millis(CLAIM_TX_RECORD_BACKOFF_MS)).await;
                }
                Err(err) => {
                    tracing::error!(
                        "Failed to record {} for mission {}: {}",
                        tx_hash,
                        mission_id,
                        err
                    );
                }
            }
        }
    }

    /// Settles reservations older than `lease_secs`. Returns how many were
    /// finalized or released.
    pub async fn reconcile_stale(&self, lease_secs: u64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::seconds(lease_secs as i64);
        let stale = self.store().stale_claims(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let results = join_all(stale.iter().map(|m| self.reconcile_one(m))).await;
        let mut settled = 0;
        for (mission, result) in stale.iter().zip(results) {
            match result {
                Ok(true) => settled += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!("Reconciling mission {} failed: {}", mission.id, err);
                }
            }
        }
        Ok(settled)
    }

    async fn reconcile_one(&self, mission: &MissionInstance) -> Result<bool> {
        let Some(recorded) = mission.claim_tx_hash.as_deref() else {
            if mission.claim_dispatched {
                tracing::error!(
                    "Mission {} reward was dispatched without a recorded tx hash, holding for manual review",
                    mission.id
                );
                return Ok(false);
            }
            tracing::info!("Releasing unsent claim on mission {}", mission.id);
            self.store().release_claim(mission.id).await?;
            return Ok(true);
        };
        let tx_hash = H256::from_str(recorded)
            .map_err(|_| AppError::Internal(format!("Bad claim tx hash {}", recorded)))?;

        match self.relay.receipt_status(tx_hash).await {
            Ok(Some(_)) => {
                self.store().finalize_claim(mission.id).await?;
                tracing::info!("Mission {} settled as claimed via {}", mission.id, recorded);
                Ok(true)
            }
            Ok(None) => {
                tracing::warn!("Claim tx {} for mission {} still unmined", recorded, mission.id);
                Ok(false)
            }
            Err(RelayError::Unknown(reason)) => {
                tracing::info!("Claim tx {} reverted ({}), releasing", recorded, reason);
                self.store().release_claim(mission.id).await?;
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Background sweep over stale claim reservations.
    pub async fn start_reconciler(self: Arc<Self>, interval_secs: u64, lease_secs: u64) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

            loop {
                ticker.tick().await;

                match self.reconcile_stale(lease_secs).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Claim reconciler settled {} missions", n),
                    Err(e) => tracing::error!("Claim reconciler error: {}", e),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::{MissionDraft, MissionKey};
    use crate::services::mission_ledger::{utc_today, TAG_MINE_RUNS};
    use crate::services::onchain::ChainFailure;
    use crate::services::test_support::MockChain;

    const PLAYER: &str = "0x4242424242424242424242424242424242424242";
    const STRANGER: &str = "0x1111111111111111111111111111111111111111";

    struct Harness {
        claims: Arc<ClaimProcessor>,
        store: Arc<MemoryStore>,
        chain: Arc<MockChain>,
    }

    fn harness(chain: MockChain) -> Harness {
        let chain = Arc::new(chain);
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MissionLedger::new(store.clone()));
        let relay = Arc::new(
            TransactionRelay::new(chain.clone(), 500_000, Duration::from_millis(150))
                .with_poll_interval(Duration::from_millis(10)),
        );
        Harness {
            claims: Arc::new(ClaimProcessor::new(ledger, relay)),
            store,
            chain,
        }
    }

    async fn seed_mission(store: &MemoryStore, progress: i32) -> MissionInstance {
        let draft = MissionDraft {
            key: MissionKey {
                type_tag: TAG_MINE_RUNS.to_string(),
                target: 5,
                reward: 50,
            },
        };
        store
            .insert_daily_missions(PLAYER, utc_today(), &[draft])
            .await
            .unwrap();
        let mission = store.all_missions().await.remove(0);
        store.set_progress(mission.id, progress).await;
        store.get_mission(mission.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn pays_reward_once() {
        let h = harness(MockChain::new());
        let mission = seed_mission(&h.store, 5).await;

        let receipt = h.claims.claim(PLAYER, mission.id).await.unwrap();
        assert_eq!(receipt.reward, 50);

        let sent = h.chain.sent_calls();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            GameCall::AdminReward {
                user: parse_address(PLAYER).unwrap(),
                amount: U256::from(50) * U256::exp10(18),
            }
        );

        let stored = h.store.get_mission(mission.id).await.unwrap().unwrap();
        assert!(stored.claimed);
        assert!(stored.claim_locked_at.is_none());

        let again = h.claims.claim(PLAYER, mission.id).await;
        assert!(matches!(again, Err(AppError::AlreadyClaimed)));
        assert_eq!(h.chain.sent_calls().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_claims_pay_once() {
        let h = harness(MockChain::new().with_send_delay(Duration::from_millis(40)));
        let mission = seed_mission(&h.store, 5).await;

        let (a, b) = tokio::join!(
            h.claims.claim(PLAYER, mission.id),
            h.claims.claim(PLAYER, mission.id)
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::AlreadyClaimed))));
        assert_eq!(h.chain.sent_calls().len(), 1);
    }

    #[tokio::test]
    async fn eligibility_checks_run_in_order() {
        let h = harness(MockChain::new());
        let mission = seed_mission(&h.store, 2).await;

        assert!(matches!(
            h.claims.claim(PLAYER, 999).await,
            Err(AppError::NotFound(_))
        ));
        // Ownership is checked before completion
        assert!(matches!(
            h.claims.claim(STRANGER, mission.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            h.claims.claim(PLAYER, mission.id).await,
            Err(AppError::NotEligible)
        ));
        assert!(h.chain.sent_calls().is_empty());
    }

    #[tokio::test]
    async fn failed_send_releases_reservation() {
        let h = harness(MockChain::new());
        let mission = seed_mission(&h.store, 5).await;

        h.chain
            .fail_send(ChainFailure::Transport("connection refused".into()));
        let err = h.claims.claim(PLAYER, mission.id).await.unwrap_err();
        assert!(matches!(err, AppError::Chain(_)));

        let stored = h.store.get_mission(mission.id).await.unwrap().unwrap();
        assert!(!stored.claimed);
        assert!(stored.claim_locked_at.is_none());

        h.chain.clear_failures();
        assert!(h.claims.claim(PLAYER, mission.id).await.is_ok());
    }

    #[tokio::test]
    async fn onchain_revert_releases_reservation() {
        let h = harness(MockChain::new());
        let mission = seed_mission(&h.store, 5).await;

        h.chain.revert_on_chain(true);
        let err = h.claims.claim(PLAYER, mission.id).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownFailure(_)));

        let stored = h.store.get_mission(mission.id).await.unwrap().unwrap();
        assert!(!stored.claimed);
        assert!(stored.claim_locked_at.is_none());
    }

    #[tokio::test]
    async fn unknown_outcome_is_settled_by_reconciler() {
        let h = harness(MockChain::new());
        let mission = seed_mission(&h.store, 5).await;

        h.chain.withhold_receipts(true);
        let err = h.claims.claim(PLAYER, mission.id).await.unwrap_err();
        let tx_hash = match err {
            AppError::OutcomeUnknown { tx_hash } => tx_hash,
            other => panic!("expected OutcomeUnknown, got {:?}", other),
        };

        let stored = h.store.get_mission(mission.id).await.unwrap().unwrap();
        assert!(!stored.claimed);
        assert!(stored.claim_locked_at.is_some());
        assert_eq!(stored.claim_tx_hash.as_deref(), Some(tx_hash.as_str()));

        // Still reserved, so a retry cannot pay twice
        assert!(matches!(
            h.claims.claim(PLAYER, mission.id).await,
            Err(AppError::AlreadyClaimed)
        ));

        // Fresh reservations are left alone
        assert_eq!(h.claims.reconcile_stale(600).await.unwrap(), 0);

        h.store
            .backdate_claim_lock(mission.id, Utc::now() - chrono::Duration::hours(1))
            .await;
        // Lease expired but the tx is still unmined
        assert_eq!(h.claims.reconcile_stale(600).await.unwrap(), 0);

        h.chain.release_receipt(H256::from_low_u64_be(1), true);
        assert_eq!(h.claims.reconcile_stale(600).await.unwrap(), 1);

        let stored = h.store.get_mission(mission.id).await.unwrap().unwrap();
        assert!(stored.claimed);
        assert_eq!(h.chain.sent_calls().len(), 1);
    }

    #[tokio::test]
    async fn reconciler_releases_reverted_and_unsent_claims() {
        let h = harness(MockChain::new());
        let reverted = seed_mission(&h.store, 5).await;

        h.chain.withhold_receipts(true);
        let _ = h.claims.claim(PLAYER, reverted.id).await;
        h.chain.release_receipt(H256::from_low_u64_be(1), false);

        let unsent = {
            let draft = MissionDraft {
                key: MissionKey {
                    type_tag: "SALVAGE".to_string(),
                    target: 3,
                    reward: 36,
                },
            };
            // Second mission on a different day so insert is not skipped
            let date = utc_today() - chrono::Duration::days(1);
            h.store
                .insert_daily_missions(PLAYER, date, &[draft])
                .await
                .unwrap();
            let m = h
                .store
                .all_missions()
                .await
                .into_iter()
                .find(|m| m.date == date)
                .unwrap();
            h.store.set_progress(m.id, 3).await;
            assert!(h.store.reserve_claim(m.id, PLAYER).await.unwrap());
            m
        };

        let long_ago = Utc::now() - chrono::Duration::hours(1);
        h.store.backdate_claim_lock(reverted.id, long_ago).await;
        h.store.backdate_claim_lock(unsent.id, long_ago).await;

        assert_eq!(h.claims.reconcile_stale(600).await.unwrap(), 2);
        for id in [reverted.id, unsent.id] {
            let m = h.store.get_mission(id).await.unwrap().unwrap();
            assert!(!m.claimed);
            assert!(m.claim_locked_at.is_none());
            assert!(m.claim_tx_hash.is_none());
        }
    }

    #[tokio::test]
    async fn dispatched_claim_without_hash_is_never_released() {
        let h = harness(MockChain::new());
        let mission = seed_mission(&h.store, 5).await;

        h.store.fail_claim_tx_writes(true);
        h.chain.withhold_receipts(true);
        let err = h.claims.claim(PLAYER, mission.id).await.unwrap_err();
        assert!(matches!(err, AppError::OutcomeUnknown { .. }));

        let stored = h.store.get_mission(mission.id).await.unwrap().unwrap();
        assert!(stored.claim_dispatched);
        assert!(stored.claim_tx_hash.is_none());
        assert!(stored.claim_locked_at.is_some());

        h.store
            .backdate_claim_lock(mission.id, Utc::now() - chrono::Duration::hours(1))
            .await;
        assert_eq!(h.claims.reconcile_stale(600).await.unwrap(), 0);

        let stored = h.store.get_mission(mission.id).await.unwrap().unwrap();
        assert!(stored.claim_locked_at.is_some());
        assert!(matches!(
            h.claims.claim(PLAYER, mission.id).await,
            Err(AppError::AlreadyClaimed)
        ));
        assert_eq!(h.chain.sent_calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_hash_write_still_finalizes_confirmed_claim() {
        let h = harness(MockChain::new());
        let mission = seed_mission(&h.store, 5).await;

        h.store.fail_claim_tx_writes(true);
        let receipt = h.claims.claim(PLAYER, mission.id).await.unwrap();
        assert_eq!(receipt.reward, 50);

        let stored = h.store.get_mission(mission.id).await.unwrap().unwrap();
        assert!(stored.claimed);
        assert_eq!(h.chain.sent_calls().len(), 1);
    }
}
