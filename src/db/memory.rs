//! In-memory stores with the same atomicity as the Postgres queries.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{MissionStore, PlayerStore};
use crate::error::{AppError, Result};
use crate::models::{MissionDraft, MissionInstance, PlayerAccount};

#[derive(Default)]
struct State {
    missions: Vec<MissionInstance>,
    players: HashMap<String, PlayerAccount>,
    next_mission_id: i64,
    next_seq: i64,
    progress_writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_claim_tx_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mission rows touched by `add_progress`.
    pub async fn progress_writes(&self) -> usize {
        self.state.lock().await.progress_writes
    }

    pub async fn all_missions(&self) -> Vec<MissionInstance> {
        self.state.lock().await.missions.clone()
    }

    pub async fn set_progress(&self, id: i64, progress: i32) {
        let mut state = self.state.lock().await;
        if let Some(m) = state.missions.iter_mut().find(|m| m.id == id) {
            m.progress = progress.min(m.target);
        }
    }

    /// Makes `record_claim_tx` fail as if the database dropped the write.
    pub fn fail_claim_tx_writes(&self, fail: bool) {
        self.fail_claim_tx_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn backdate_claim_lock(&self, id: i64, locked_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(m) = state.missions.iter_mut().find(|m| m.id == id) {
            m.claim_locked_at = Some(locked_at);
        }
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn missions_for_day(&self, address: &str, date: NaiveDate) -> Result<Vec<MissionInstance>> {
        let state = self.state.lock().await;
        Ok(state
            .missions
            .iter()
            .filter(|m| m.address == address && m.date == date)
            .cloned()
            .collect())
    }

    async fn insert_daily_missions(
        &self,
        address: &str,
        date: NaiveDate,
        drafts: &[MissionDraft],
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state
            .missions
            .iter()
            .any(|m| m.address == address && m.date == date)
        {
            return Ok(false);
        }
        for draft in drafts {
            let key = draft.key.to_string();
            if state
                .missions
                .iter()
                .any(|m| m.address == address && m.date == date && m.mission_key == key)
            {
                continue;
            }
            state.next_mission_id += 1;
            let id = state.next_mission_id;
            state.missions.push(MissionInstance {
                id,
                address: address.to_string(),
                mission_key: key,
                target: draft.target(),
                progress: 0,
                claimed: false,
                claim_locked_at: None,
                claim_tx_hash: None,
                claim_dispatched: false,
                date,
            });
        }
        Ok(true)
    }

    async fn add_progress(
        &self,
        address: &str,
        date: NaiveDate,
        type_tag: &str,
        delta: i32,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for m in state.missions.iter_mut() {
            if m.address == address
                && m.date == date
                && m.type_tag() == type_tag
                && !m.claimed
                && m.progress < m.target
            {
                m.progress = m.progress.saturating_add(delta).min(m.target);
                changed += 1;
            }
        }
        state.progress_writes += changed as usize;
        Ok(changed)
    }

    async fn get_mission(&self, id: i64) -> Result<Option<MissionInstance>> {
        let state = self.state.lock().await;
        Ok(state.missions.iter().find(|m| m.id == id).cloned())
    }

    async fn reserve_claim(&self, id: i64, address: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(m) = state.missions.iter_mut().find(|m| m.id == id) else {
            return Ok(false);
        };
        if m.address != address || m.claimed || m.claim_locked_at.is_some() || m.progress < m.target
        {
            return Ok(false);
        }
        m.claim_locked_at = Some(Utc::now());
        m.claim_tx_hash = None;
        m.claim_dispatched = false;
        Ok(true)
    }

    async fn mark_claim_dispatched(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        match state
            .missions
            .iter_mut()
            .find(|m| m.id == id && !m.claimed && m.claim_locked_at.is_some())
        {
            Some(m) => {
                m.claim_dispatched = true;
                Ok(())
            }
            None => Err(AppError::Internal(format!(
                "Mission {} lost its claim reservation",
                id
            ))),
        }
    }

    async fn record_claim_tx(&self, id: i64, tx_hash: &str) -> Result<()> {
        if self.fail_claim_tx_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("claim tx write failed".into()));
        }
        let mut state = self.state.lock().await;
        if let Some(m) = state
            .missions
            .iter_mut()
            .find(|m| m.id == id && !m.claimed && m.claim_locked_at.is_some())
        {
            m.claim_tx_hash = Some(tx_hash.to_string());
        }
        Ok(())
    }

    async fn finalize_claim(&self, id: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.missions.iter_mut().find(|m| m.id == id && !m.claimed) {
            Some(m) => {
                m.claimed = true;
                m.claim_locked_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_claim(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(m) = state.missions.iter_mut().find(|m| m.id == id && !m.claimed) {
            m.claim_locked_at = None;
            m.claim_tx_hash = None;
            m.claim_dispatched = false;
        }
        Ok(())
    }

    async fn stale_claims(&self, older_than: DateTime<Utc>) -> Result<Vec<MissionInstance>> {
        let state = self.state.lock().await;
        Ok(state
            .missions
            .iter()
            .filter(|m| !m.claimed && m.claim_locked_at.is_some_and(|at| at < older_than))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn touch_player(&self, address: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(player) = state.players.get_mut(address) {
            player.last_seen = Some(now);
            return Ok(());
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.players.insert(
            address.to_string(),
            PlayerAccount {
                address: address.to_string(),
                hash_balance: Decimal::ZERO,
                last_seen: Some(now),
                joined_seq: seq,
            },
        );
        Ok(())
    }

    async fn upsert_balance(&self, address: &str, balance: Decimal) -> Result<()> {
        self.touch_player(address).await?;
        let mut state = self.state.lock().await;
        if let Some(player) = state.players.get_mut(address) {
            player.hash_balance = balance;
        }
        Ok(())
    }

    async fn get_player(&self, address: &str) -> Result<Option<PlayerAccount>> {
        Ok(self.state.lock().await.players.get(address).cloned())
    }

    async fn top_players(&self, limit: i64) -> Result<Vec<PlayerAccount>> {
        let state = self.state.lock().await;
        let mut players: Vec<PlayerAccount> = state.players.values().cloned().collect();
        players.sort_by(|a, b| {
            b.hash_balance
                .cmp(&a.hash_balance)
                .then(a.joined_seq.cmp(&b.joined_seq))
        });
        players.truncate(limit.max(0) as usize);
        Ok(players)
    }
}
