use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{MissionDraft, MissionInstance, PlayerAccount},
};

#[cfg(test)]
pub mod memory;

/// Row access for daily missions. Every method is a single atomic step.
#[async_trait]
pub trait MissionStore: Send + Sync {
    async fn missions_for_day(&self, address: &str, date: NaiveDate) -> Result<Vec<MissionInstance>>;

    /// Inserts `drafts` only when the player has no missions on `date`.
    /// Returns `true` when this call did the generation.
    async fn insert_daily_missions(
        &self,
        address: &str,
        date: NaiveDate,
        drafts: &[MissionDraft],
    ) -> Result<bool>;

    /// `progress = min(progress + delta, target)` on unclaimed, unfinished
    /// missions with this type tag. Returns the number of rows changed.
    async fn add_progress(
        &self,
        address: &str,
        date: NaiveDate,
        type_tag: &str,
        delta: i32,
    ) -> Result<u64>;

    async fn get_mission(&self, id: i64) -> Result<Option<MissionInstance>>;

    /// Compare-and-set: takes the claim reservation iff the mission is owned
    /// by `address`, complete, unclaimed and not already reserved.
    async fn reserve_claim(&self, id: i64, address: &str) -> Result<bool>;

    /// Flags a reserved claim as handed to the relayer. From here on the
    /// reservation is only released on proof that nothing was mined.
    async fn mark_claim_dispatched(&self, id: i64) -> Result<()>;

    async fn record_claim_tx(&self, id: i64, tx_hash: &str) -> Result<()>;

    /// Reserved → claimed. Returns `false` if the mission was already claimed.
    async fn finalize_claim(&self, id: i64) -> Result<bool>;

    /// Drops the reservation so the claim can be retried.
    async fn release_claim(&self, id: i64) -> Result<()>;

    /// Reservations taken before `older_than` that never settled.
    async fn stale_claims(&self, older_than: DateTime<Utc>) -> Result<Vec<MissionInstance>>;
}

#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn touch_player(&self, address: &str) -> Result<()>;
    async fn upsert_balance(&self, address: &str, balance: Decimal) -> Result<()>;
    async fn get_player(&self, address: &str) -> Result<Option<PlayerAccount>>;
    /// Highest balances first, earliest joiners first on ties.
    async fn top_players(&self, limit: i64) -> Result<Vec<PlayerAccount>>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== MISSION QUERIES ====================
#[async_trait]
impl MissionStore for Database {
    async fn missions_for_day(&self, address: &str, date: NaiveDate) -> Result<Vec<MissionInstance>> {
        let rows = sqlx::query_as::<_, MissionInstance>(
            "SELECT * FROM missions WHERE address = $1 AND date = $2 ORDER BY id ASC",
        )
        .bind(address)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_daily_missions(
        &self,
        address: &str,
        date: NaiveDate,
        drafts: &[MissionDraft],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Serializes generators for the same player/day until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("missions:{}:{}", address, date))
            .execute(&mut *tx)
            .await?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM missions WHERE address = $1 AND date = $2")
                .bind(address)
                .bind(date)
                .fetch_one(&mut *tx)
                .await?;
        if existing > 0 {
            tx.commit().await?;
            return Ok(false);
        }

        for draft in drafts {
            sqlx::query(
                r#"
                INSERT INTO missions (address, mission_key, target, progress, claimed, date)
                VALUES ($1, $2, $3, 0, FALSE, $4)
                ON CONFLICT (address, mission_key, date) DO NOTHING
                "#,
            )
            .bind(address)
            .bind(draft.key.to_string())
            .bind(draft.target())
            .bind(date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn add_progress(
        &self,
        address: &str,
        date: NaiveDate,
        type_tag: &str,
        delta: i32,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE missions
            SET progress = LEAST(progress::BIGINT + $1, target)
            WHERE address = $2
              AND date = $3
              AND split_part(mission_key, ':', 1) = $4
              AND claimed = FALSE
              AND progress < target
            "#,
        )
        .bind(delta)
        .bind(address)
        .bind(date)
        .bind(type_tag)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_mission(&self, id: i64) -> Result<Option<MissionInstance>> {
        let row = sqlx::query_as::<_, MissionInstance>("SELECT * FROM missions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn reserve_claim(&self, id: i64, address: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE missions
            SET claim_locked_at = NOW(), claim_tx_hash = NULL, claim_dispatched = FALSE
            WHERE id = $1
              AND address = $2
              AND claimed = FALSE
              AND claim_locked_at IS NULL
              AND progress >= target
            "#,
        )
        .bind(id)
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_claim_dispatched(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE missions SET claim_dispatched = TRUE
             WHERE id = $1 AND claimed = FALSE AND claim_locked_at IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() != 1 {
            return Err(AppError::Internal(format!(
                "Mission {} lost its claim reservation",
                id
            )));
        }
        Ok(())
    }

    async fn record_claim_tx(&self, id: i64, tx_hash: &str) -> Result<()> {
        sqlx::query(
            "UPDATE missions SET claim_tx_hash = $1
             WHERE id = $2 AND claimed = FALSE AND claim_locked_at IS NOT NULL",
        )
        .bind(tx_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_claim(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE missions SET claimed = TRUE, claim_locked_at = NULL
             WHERE id = $1 AND claimed = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE missions SET claim_locked_at = NULL, claim_tx_hash = NULL, claim_dispatched = FALSE
             WHERE id = $1 AND claimed = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stale_claims(&self, older_than: DateTime<Utc>) -> Result<Vec<MissionInstance>> {
        let rows = sqlx::query_as::<_, MissionInstance>(
            r#"
            SELECT * FROM missions
            WHERE claimed = FALSE
              AND claim_locked_at IS NOT NULL
              AND claim_locked_at < $1
            ORDER BY id ASC
            LIMIT 100
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ==================== PLAYER QUERIES ====================
#[async_trait]
impl PlayerStore for Database {
    async fn touch_player(&self, address: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (address, last_seen) VALUES ($1, NOW())
             ON CONFLICT (address) DO UPDATE SET last_seen = NOW()",
        )
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_balance(&self, address: &str, balance: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (address, hash_balance, last_seen)
            VALUES ($1, $2, NOW())
            ON CONFLICT (address) DO UPDATE
            SET hash_balance = EXCLUDED.hash_balance,
                last_seen    = NOW()
            "#,
        )
        .bind(address)
        .bind(balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_player(&self, address: &str) -> Result<Option<PlayerAccount>> {
        let row = sqlx::query_as::<_, PlayerAccount>(
            "SELECT address, hash_balance, last_seen, joined_seq FROM users WHERE address = $1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn top_players(&self, limit: i64) -> Result<Vec<PlayerAccount>> {
        let rows = sqlx::query_as::<_, PlayerAccount>(
            "SELECT address, hash_balance, last_seen, joined_seq FROM users
             ORDER BY hash_balance DESC, joined_seq ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
