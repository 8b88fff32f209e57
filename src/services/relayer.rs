use axum::http::StatusCode;
use ethers::{
    abi::RawLog,
    contract::EthLogDecode,
    types::{Address, Log, TransactionReceipt, H256, U256},
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};

use crate::config::Config;

use super::onchain::{ChainFailure, CyberSystemEvents, GameCall, GameChain, TransferFilter};

const DEFAULT_RELAYER_POLL_INTERVAL_MS: u64 = 1_500;

/// Contract rejections the relay recognizes as game rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertCode {
    SystemOverheat,
    InsufficientBalance,
    InsufficientMaterial,
    NotOwner,
    NothingStaked,
    NoPendingReward,
    MaxLevel,
}

impl RevertCode {
    pub const ALL: [RevertCode; 7] = [
        RevertCode::SystemOverheat,
        RevertCode::InsufficientBalance,
        RevertCode::InsufficientMaterial,
        RevertCode::NotOwner,
        RevertCode::NothingStaked,
        RevertCode::NoPendingReward,
        RevertCode::MaxLevel,
    ];

    /// Stable client-facing code.
    pub fn as_str(&self) -> &'static str {
        match self {
            RevertCode::SystemOverheat => "OVERHEAT",
            RevertCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            RevertCode::InsufficientMaterial => "INSUFFICIENT_MATERIAL",
            RevertCode::NotOwner => "NOT_OWNER",
            RevertCode::NothingStaked => "NOTHING_STAKED",
            RevertCode::NoPendingReward => "NO_PENDING_REWARD",
            RevertCode::MaxLevel => "MAX_LEVEL",
        }
    }

    // Lower-case fragments of the contract's revert strings.
    fn patterns(&self) -> &'static [&'static str] {
        match self {
            RevertCode::SystemOverheat => &["system overheat", "cooldown"],
            RevertCode::InsufficientBalance => {
                &["insufficient balance", "insufficient hash", "erc20: transfer amount exceeds"]
            }
            RevertCode::InsufficientMaterial => &["no material", "insufficient material"],
            RevertCode::NotOwner => &["not owned", "not owner", "you don't own"],
            RevertCode::NothingStaked => &["nothing staked", "not staked"],
            RevertCode::NoPendingReward => &["no reward", "nothing to claim"],
            RevertCode::MaxLevel => &["max level"],
        }
    }

    pub fn from_reason(reason: &str) -> Option<Self> {
        let lowered = reason.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|code| code.patterns().iter().any(|p| lowered.contains(p)))
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            RevertCode::SystemOverheat => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::CONFLICT,
        }
    }
}

impl fmt::Display for RevertCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("business revert: {0}")]
    BusinessRevert(RevertCode),

    #[error("chain error: {0}")]
    Chain(String),

    #[error("transaction {tx_hash} outcome unknown")]
    OutcomeUnknown { tx_hash: String },

    #[error("unknown failure: {0}")]
    Unknown(String),
}

/// Domain events decoded from a confirmed receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    MiningResult {
        user: Address,
        token_id: U256,
        rng: U256,
        is_equipment: bool,
    },
    EnchantResult {
        user: Address,
        item_id: U256,
        new_level: U256,
        success: bool,
    },
    HashTransfer {
        from: Address,
        to: Address,
        value: U256,
    },
}

#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub tx_hash: H256,
    pub confirmed: bool,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub events: Vec<GameEvent>,
}

impl TransactionOutcome {
    pub fn tx_hash_hex(&self) -> String {
        format!("{:#x}", self.tx_hash)
    }
}

/// A transaction accepted by the node but not yet confirmed.
#[derive(Debug, Clone)]
pub struct PendingTx {
    pub tx_hash: H256,
    pub label: &'static str,
}

impl PendingTx {
    pub fn tx_hash_hex(&self) -> String {
        format!("{:#x}", self.tx_hash)
    }
}

/// Maps a raw chain failure onto the relay's error classes.
pub fn classify(failure: ChainFailure) -> RelayError {
    match failure {
        ChainFailure::Reverted { reason, message } => {
            let code = reason
                .as_deref()
                .and_then(RevertCode::from_reason)
                .or_else(|| RevertCode::from_reason(&message));
            match code {
                Some(code) => RelayError::BusinessRevert(code),
                None => RelayError::Unknown(reason.unwrap_or(message)),
            }
        }
        ChainFailure::Transport(message) => RelayError::Chain(message),
    }
}

/// Single relayer account: every outbound transaction goes through here.
pub struct TransactionRelay {
    chain: Arc<dyn GameChain>,
    sequencer: Mutex<()>,
    gas_limit: u64,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl TransactionRelay {
    pub fn new(chain: Arc<dyn GameChain>, gas_limit: u64, confirm_timeout: Duration) -> Self {
        Self {
            chain,
            sequencer: Mutex::new(()),
            gas_limit,
            confirm_timeout,
            poll_interval: Duration::from_millis(DEFAULT_RELAYER_POLL_INTERVAL_MS),
        }
    }

    pub fn from_config(config: &Config, chain: Arc<dyn GameChain>) -> Self {
        Self::new(
            chain,
            config.relayer_gas_limit,
            Duration::from_secs(config.relayer_confirm_timeout_secs),
        )
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Dry run. Only a recognized business revert is returned as an error;
    /// anything else is logged and treated as "go ahead".
    pub async fn simulate(&self, call: &GameCall) -> Result<(), RelayError> {
        let Err(failure) = self.chain.simulate(call).await else {
            return Ok(());
        };
        match classify(failure) {
            RelayError::BusinessRevert(code) => {
                tracing::info!(
                    "Simulation rejected {} for {:#x}: {}",
                    call.label(),
                    call.user(),
                    code
                );
                Err(RelayError::BusinessRevert(code))
            }
            other => {
                tracing::warn!(
                    "Simulation of {} inconclusive, submitting anyway: {}",
                    call.label(),
                    other
                );
                Ok(())
            }
        }
    }

    /// Simulates, then signs and broadcasts under the sequencing lock.
    pub async fn dispatch(&self, call: &GameCall) -> Result<PendingTx, RelayError> {
        self.simulate(call).await?;

        let tx_hash = {
            let _turn = self.sequencer.lock().await;
            self.chain
                .send(call, self.gas_limit)
                .await
                .map_err(classify)?
        };

        tracing::info!(
            "Sent {} for {:#x}: {:#x}",
            call.label(),
            call.user(),
            tx_hash
        );
        Ok(PendingTx {
            tx_hash,
            label: call.label(),
        })
    }

    /// Waits for one confirmation. A timeout is reported as
    /// [`RelayError::OutcomeUnknown`]; the transaction may still land.
    pub async fn confirm(&self, pending: &PendingTx) -> Result<TransactionOutcome, RelayError> {
        let receipt = match timeout(self.confirm_timeout, self.wait_for_receipt(pending.tx_hash)).await {
            Ok(receipt) => receipt,
            Err(_) => {
                tracing::warn!(
                    "{} {:#x} not confirmed within {:?}",
                    pending.label,
                    pending.tx_hash,
                    self.confirm_timeout
                );
                return Err(RelayError::OutcomeUnknown {
                    tx_hash: pending.tx_hash_hex(),
                });
            }
        };
        self.outcome_from_receipt(receipt).await
    }

    /// simulate → send → confirm → decode.
    pub async fn submit(&self, call: GameCall) -> Result<TransactionOutcome, RelayError> {
        let pending = self.dispatch(&call).await?;
        self.confirm(&pending).await
    }

    /// One-shot receipt lookup for a transaction sent earlier.
    /// `Ok(None)` means the chain has no receipt for it yet.
    pub async fn receipt_status(&self, tx_hash: H256) -> Result<Option<TransactionOutcome>, RelayError> {
        match self.chain.receipt(tx_hash).await.map_err(classify)? {
            Some(receipt) => self.outcome_from_receipt(receipt).await.map(Some),
            None => Ok(None),
        }
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> TransactionReceipt {
        loop {
            match self.chain.receipt(tx_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!("Receipt poll for {:#x} failed: {}", tx_hash, err);
                }
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn outcome_from_receipt(
        &self,
        receipt: TransactionReceipt,
    ) -> Result<TransactionOutcome, RelayError> {
        if receipt.status.map(|s| s.as_u64()) == Some(0) {
            return Err(RelayError::Unknown(format!(
                "transaction {:#x} reverted on-chain",
                receipt.transaction_hash
            )));
        }

        let hash_token = match self.chain.hash_token().await {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::warn!("HASH token unresolved, skipping transfer decode: {}", err);
                None
            }
        };

        Ok(TransactionOutcome {
            tx_hash: receipt.transaction_hash,
            confirmed: true,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
            events: decode_events(&receipt.logs, hash_token),
        })
    }
}

/// Decodes the logs this relay understands; everything else is skipped.
pub fn decode_events(logs: &[Log], hash_token: Option<Address>) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for log in logs {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };

        if Some(log.address) == hash_token {
            if let Ok(transfer) = <TransferFilter as EthLogDecode>::decode_log(&raw) {
                events.push(GameEvent::HashTransfer {
                    from: transfer.from,
                    to: transfer.to,
                    value: transfer.value,
                });
            }
            continue;
        }

        match <CyberSystemEvents as EthLogDecode>::decode_log(&raw) {
            Ok(CyberSystemEvents::MiningResultFilter(ev)) => events.push(GameEvent::MiningResult {
                user: ev.user,
                token_id: ev.token_id,
                rng: ev.rng,
                is_equipment: ev.is_equipment,
            }),
            Ok(CyberSystemEvents::EnchantResultFilter(ev)) => {
                events.push(GameEvent::EnchantResult {
                    user: ev.user,
                    item_id: ev.item_id,
                    new_level: ev.new_level,
                    success: ev.success,
                })
            }
            Err(_) => {}
        }
    }
    events
}
