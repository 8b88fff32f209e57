use ethers::types::U256;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    constants::{HASH_DECIMALS, LEADERBOARD_DEFAULT_SIZE, LEADERBOARD_MAX_SIZE},
    db::PlayerStore,
    error::Result,
};

/// Stored balances keep six decimal places.
const STORED_SCALE: u32 = 6;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub address: String,
    pub hash_balance: Decimal,
}

/// HASH wei → whole-token decimal, truncated to the stored scale.
pub fn wei_to_decimal(wei: U256) -> Decimal {
    let divisor = U256::exp10((HASH_DECIMALS - STORED_SCALE) as usize);
    // NUMERIC(28,6) ceiling
    let cap = U256::exp10(28) - U256::one();
    let scaled = (wei / divisor).min(cap);
    Decimal::try_from_i128_with_scale(scaled.as_u128() as i128, STORED_SCALE).unwrap_or(Decimal::MAX)
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(LEADERBOARD_DEFAULT_SIZE)
        .clamp(1, LEADERBOARD_MAX_SIZE)
}

/// Last-known HASH balances, ranked.
pub struct LeaderboardCache {
    players: Arc<dyn PlayerStore>,
}

impl LeaderboardCache {
    pub fn new(players: Arc<dyn PlayerStore>) -> Self {
        Self { players }
    }

    pub async fn touch(&self, address: &str) -> Result<()> {
        self.players.touch_player(address).await
    }

    pub async fn upsert(&self, address: &str, balance_wei: U256) -> Result<Decimal> {
        let balance = wei_to_decimal(balance_wei);
        self.players.upsert_balance(address, balance).await?;
        tracing::debug!("Leaderboard balance {} = {}", address, balance);
        Ok(balance)
    }

    pub async fn top(&self, limit: Option<i64>) -> Result<Vec<LeaderboardEntry>> {
        let players = self.players.top_players(clamp_limit(limit)).await?;
        Ok(players
            .into_iter()
            .enumerate()
            .map(|(i, p)| LeaderboardEntry {
                rank: i + 1,
                address: p.address,
                hash_balance: p.hash_balance,
            })
            .collect())
    }
}
