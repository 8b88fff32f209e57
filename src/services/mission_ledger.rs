use chrono::{NaiveDate, Utc};
use ethers::types::U256;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    constants::{
        HASH_DECIMALS, MAX_DAILY_MISSIONS, MIN_DAILY_MISSIONS, PROGRESS_GATE_PRUNE_THRESHOLD,
        RARE_ARTIFACT_ID,
    },
    db::MissionStore,
    error::Result,
    models::{MissionDraft, MissionInstance, MissionKey},
};

use super::onchain::GameCall;
use super::relayer::{GameEvent, TransactionOutcome};

pub const TAG_MINE_RUNS: &str = "MINE_RUNS";
pub const TAG_FIND_RARE: &str = "FIND_RARE";
pub const TAG_FIND_GEAR: &str = "FIND_GEAR";
pub const TAG_ENCHANT_TRY: &str = "ENCHANT_TRY";
pub const TAG_ENCHANT_WIN: &str = "ENCHANT_WIN";
pub const TAG_SALVAGE: &str = "SALVAGE";
pub const TAG_BUY_SOFTWARE: &str = "BUY_SOFTWARE";
pub const TAG_SPEND_HASH: &str = "SPEND_HASH";
pub const TAG_USE_ITEM: &str = "USE_ITEM";
pub const TAG_STAKE_GEAR: &str = "STAKE_GEAR";
pub const TAG_CLAIM_YIELD: &str = "CLAIM_YIELD";

#[derive(Debug, Clone, Copy)]
pub enum TargetRule {
    Fixed(i32),
    /// Uniform in `[min, max]`.
    Range(i32, i32),
}

#[derive(Debug, Clone, Copy)]
pub enum RewardRule {
    Fixed(i64),
    /// `floor(target × multiplier)`
    PerTarget(f64),
}

#[derive(Debug, Clone, Copy)]
pub struct MissionTemplate {
    pub type_tag: &'static str,
    /// `{target}` is substituted when rendered.
    pub description: &'static str,
    pub target: TargetRule,
    pub reward: RewardRule,
}

pub const TEMPLATES: &[MissionTemplate] = &[
    MissionTemplate {
        type_tag: TAG_MINE_RUNS,
        description: "Run the miner {target} times",
        target: TargetRule::Range(5, 15),
        reward: RewardRule::PerTarget(10.0),
    },
    MissionTemplate {
        type_tag: TAG_FIND_RARE,
        description: "Recover a Genesis Block",
        target: TargetRule::Fixed(1),
        reward: RewardRule::Fixed(500),
    },
    MissionTemplate {
        type_tag: TAG_FIND_GEAR,
        description: "Pull {target} pieces of hardware out of the mine",
        target: TargetRule::Range(1, 3),
        reward: RewardRule::PerTarget(75.0),
    },
    MissionTemplate {
        type_tag: TAG_ENCHANT_TRY,
        description: "Attempt {target} enchantments in the workshop",
        target: TargetRule::Range(1, 3),
        reward: RewardRule::PerTarget(40.0),
    },
    MissionTemplate {
        type_tag: TAG_ENCHANT_WIN,
        description: "Land a successful enchantment",
        target: TargetRule::Fixed(1),
        reward: RewardRule::Fixed(120),
    },
    MissionTemplate {
        type_tag: TAG_SALVAGE,
        description: "Salvage {target} artifacts",
        target: TargetRule::Range(3, 10),
        reward: RewardRule::PerTarget(12.5),
    },
    MissionTemplate {
        type_tag: TAG_BUY_SOFTWARE,
        description: "Install a software package",
        target: TargetRule::Fixed(1),
        reward: RewardRule::Fixed(60),
    },
    MissionTemplate {
        type_tag: TAG_SPEND_HASH,
        description: "Spend {target} $HASH in the shop",
        target: TargetRule::Range(100, 500),
        reward: RewardRule::PerTarget(0.2),
    },
    MissionTemplate {
        type_tag: TAG_USE_ITEM,
        description: "Use {target} consumables",
        target: TargetRule::Range(1, 2),
        reward: RewardRule::PerTarget(50.0),
    },
    MissionTemplate {
        type_tag: TAG_STAKE_GEAR,
        description: "Stake hardware on your rig",
        target: TargetRule::Fixed(1),
        reward: RewardRule::Fixed(80),
    },
    MissionTemplate {
        type_tag: TAG_CLAIM_YIELD,
        description: "Collect your rig yield",
        target: TargetRule::Fixed(1),
        reward: RewardRule::Fixed(50),
    },
];

impl MissionTemplate {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> MissionDraft {
        let target = match self.target {
            TargetRule::Fixed(n) => n,
            TargetRule::Range(min, max) => rng.random_range(min..=max),
        };
        let reward = match self.reward {
            RewardRule::Fixed(amount) => amount,
            RewardRule::PerTarget(multiplier) => (target as f64 * multiplier).floor() as i64,
        };
        MissionDraft {
            key: MissionKey {
                type_tag: self.type_tag.to_string(),
                target,
                reward,
            },
        }
    }
}

pub fn template_for(type_tag: &str) -> Option<&'static MissionTemplate> {
    TEMPLATES.iter().find(|t| t.type_tag == type_tag)
}

pub fn describe(type_tag: &str, target: i32) -> String {
    template_for(type_tag)
        .map(|t| t.description.replace("{target}", &target.to_string()))
        .unwrap_or_else(|| type_tag.to_string())
}

/// 3–5 distinct templates, each resolved to a concrete target and reward.
pub fn draw_missions<R: Rng + ?Sized>(rng: &mut R) -> Vec<MissionDraft> {
    let count = rng.random_range(MIN_DAILY_MISSIONS..=MAX_DAILY_MISSIONS);
    let picked: Vec<&MissionTemplate> = TEMPLATES.choose_multiple(rng, count).collect();
    picked.into_iter().map(|t| t.resolve(rng)).collect()
}

/// Missions reset at 00:00 UTC.
pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

fn whole_tokens(wei: U256) -> u32 {
    let whole = wei / U256::exp10(HASH_DECIMALS as usize);
    if whole > U256::from(u32::MAX) {
        u32::MAX
    } else {
        whole.as_u32()
    }
}

fn saturating_u32(value: U256) -> u32 {
    if value > U256::from(u32::MAX) {
        u32::MAX
    } else {
        value.as_u32()
    }
}

/// Mission progress earned by one confirmed action.
pub fn progress_deltas(call: &GameCall, outcome: &TransactionOutcome) -> Vec<(&'static str, u32)> {
    let mut deltas = Vec::new();
    match call {
        GameCall::Mine { .. } => {
            deltas.push((TAG_MINE_RUNS, 1));
            for event in &outcome.events {
                if let GameEvent::MiningResult {
                    token_id,
                    is_equipment,
                    ..
                } = event
                {
                    if *token_id == U256::from(RARE_ARTIFACT_ID) {
                        deltas.push((TAG_FIND_RARE, 1));
                    }
                    if *is_equipment {
                        deltas.push((TAG_FIND_GEAR, 1));
                    }
                }
            }
        }
        GameCall::Enchant { .. } => {
            deltas.push((TAG_ENCHANT_TRY, 1));
            let won = outcome
                .events
                .iter()
                .any(|e| matches!(e, GameEvent::EnchantResult { success: true, .. }));
            if won {
                deltas.push((TAG_ENCHANT_WIN, 1));
            }
        }
        GameCall::Salvage { amount, .. } => deltas.push((TAG_SALVAGE, saturating_u32(*amount))),
        GameCall::BuySoftware { user, .. } => {
            deltas.push((TAG_BUY_SOFTWARE, 1));
            let spent = outcome
                .events
                .iter()
                .filter_map(|e| match e {
                    GameEvent::HashTransfer { from, value, .. } if from == user => Some(*value),
                    _ => None,
                })
                .fold(U256::zero(), |acc, v| acc.saturating_add(v));
            let spent = whole_tokens(spent);
            if spent > 0 {
                deltas.push((TAG_SPEND_HASH, spent));
            }
        }
        GameCall::UseItem { .. } => deltas.push((TAG_USE_ITEM, 1)),
        GameCall::Stake { .. } => deltas.push((TAG_STAKE_GEAR, 1)),
        GameCall::ClaimYield { .. } => deltas.push((TAG_CLAIM_YIELD, 1)),
        GameCall::Equip { .. } | GameCall::Unstake { .. } | GameCall::AdminReward { .. } => {}
    }
    deltas
}

/// Daily missions per player.
pub struct MissionLedger {
    store: Arc<dyn MissionStore>,
    gates: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl MissionLedger {
    pub fn new(store: Arc<dyn MissionStore>) -> Self {
        Self {
            store,
            gates: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MissionStore> {
        &self.store
    }

    async fn gate(&self, address: &str) -> Arc<Mutex<()>> {
        if let Some(gate) = self.gates.read().await.get(address) {
            return gate.clone();
        }
        let mut gates = self.gates.write().await;
        if gates.len() >= PROGRESS_GATE_PRUNE_THRESHOLD {
            gates.retain(|_, gate| Arc::strong_count(gate) > 1);
        }
        gates
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Resolves once every progress update spawned for `address` so far has
    /// been written.
    pub async fn wait_for_progress(&self, address: &str) {
        let gate = self.gate(address).await;
        let _settled = gate.lock().await;
    }

    pub async fn ensure_daily_missions(&self, address: &str, today: NaiveDate) -> Result<()> {
        if !self.store.missions_for_day(address, today).await?.is_empty() {
            return Ok(());
        }

        let drafts = {
            let mut rng = rand::rng();
            draw_missions(&mut rng)
        };

        if self.store.insert_daily_missions(address, today, &drafts).await? {
            tracing::info!(
                "Generated {} missions for {} on {}",
                drafts.len(),
                address,
                today
            );
        }
        Ok(())
    }

    /// Adds `delta` to today's unfinished missions of `type_tag`, clamped at
    /// target. Returns how many missions moved.
    pub async fn track_progress(&self, address: &str, type_tag: &str, delta: u32) -> Result<u64> {
        if delta == 0 {
            return Ok(0);
        }
        let delta = i32::try_from(delta).unwrap_or(i32::MAX);
        self.store
            .add_progress(address, utc_today(), type_tag, delta)
            .await
    }

    pub async fn track_events(
        &self,
        address: &str,
        call: &GameCall,
        outcome: &TransactionOutcome,
    ) -> Result<()> {
        let deltas = progress_deltas(call, outcome);
        if deltas.is_empty() {
            return Ok(());
        }
        // Actions taken before the board was first opened still count
        self.ensure_daily_missions(address, utc_today()).await?;
        for (type_tag, delta) in deltas {
            let moved = self.track_progress(address, type_tag, delta).await?;
            if moved > 0 {
                tracing::debug!("{} +{} for {} ({} missions)", type_tag, delta, address, moved);
            }
        }
        Ok(())
    }

    /// Fire-and-forget progress update. The address's gate is taken before
    /// this returns, so a later `list`/`claim` for the same player waits for it.
    pub async fn spawn_tracking(
        self: &Arc<Self>,
        address: String,
        call: GameCall,
        outcome: TransactionOutcome,
    ) {
        let guard: OwnedMutexGuard<()> = self.gate(&address).await.lock_owned().await;
        let ledger = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = ledger.track_events(&address, &call, &outcome).await {
                tracing::error!(
                    "Mission progress for {} after {} failed: {}",
                    address,
                    outcome.tx_hash_hex(),
                    err
                );
            }
        });
    }

    /// Today's missions, generated on first access.
    pub async fn list(&self, address: &str, today: NaiveDate) -> Result<Vec<MissionInstance>> {
        self.wait_for_progress(address).await;
        self.ensure_daily_missions(address, today).await?;
        self.store.missions_for_day(address, today).await
    }
}
