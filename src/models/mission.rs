use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Semantic identity of a mission for one day: `TYPE:target:reward`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MissionKey {
    pub type_tag: String,
    pub target: i32,
    pub reward: i64,
}

impl fmt::Display for MissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.type_tag, self.target, self.reward)
    }
}

impl FromStr for MissionKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(type_tag), Some(target), Some(reward)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::Internal(format!("Malformed mission key: {}", s)));
        };
        let target = target
            .parse()
            .map_err(|_| AppError::Internal(format!("Malformed mission target: {}", s)))?;
        let reward = reward
            .parse()
            .map_err(|_| AppError::Internal(format!("Malformed mission reward: {}", s)))?;
        Ok(Self {
            type_tag: type_tag.to_string(),
            target,
            reward,
        })
    }
}

/// A mission resolved from a template, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionDraft {
    pub key: MissionKey,
}

impl MissionDraft {
    pub fn target(&self) -> i32 {
        self.key.target
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    Open,
    Completed,
    ClaimInFlight,
    Claimed,
}

// ==================== MISSION ROW ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MissionInstance {
    pub id: i64,
    pub address: String,
    pub mission_key: String,
    pub target: i32,
    pub progress: i32,
    pub claimed: bool,
    pub claim_locked_at: Option<DateTime<Utc>>,
    pub claim_tx_hash: Option<String>,
    /// Reward handed to the relayer; may be on chain even without a hash.
    pub claim_dispatched: bool,
    pub date: NaiveDate,
}

impl MissionInstance {
    pub fn key(&self) -> Result<MissionKey, AppError> {
        self.mission_key.parse()
    }

    pub fn type_tag(&self) -> &str {
        self.mission_key.split(':').next().unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= self.target
    }

    pub fn status(&self) -> MissionStatus {
        if self.claimed {
            MissionStatus::Claimed
        } else if self.claim_locked_at.is_some() {
            MissionStatus::ClaimInFlight
        } else if self.is_complete() {
            MissionStatus::Completed
        } else {
            MissionStatus::Open
        }
    }
}
