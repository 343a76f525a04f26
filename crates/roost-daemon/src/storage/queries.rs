//! Database queries for the roost daemon.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use roost_core::db::{start_of_day, unix_timestamp};
use uuid::Uuid;

use super::db::{Database, DatabaseError};
use super::models::*;

/// Platforms the scheduler actually warms.
pub const WARMABLE_PLATFORMS: [&str; 2] = ["tiktok", "instagram"];

/// Fallback task target: the (platform, niche) pair that needs accounts most.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreationTarget {
    pub niche_id: String,
    pub niche_slug: String,
    pub platform: String,
    pub live_accounts: i64,
}

/// Inputs for recording a finished warming cycle.
#[derive(Debug, Clone)]
pub struct WarmingOutcome {
    pub account_id: String,
    pub device_id: String,
    pub platform: String,
    pub warming_phase: i64,
    pub new_day_count: i64,
    pub new_state: AccountState,
    pub session_data: String,
    pub started_at: i64,
    pub completed_at: i64,
}

/// Retry a transient store operation up to 3 times with jittered backoff.
pub async fn with_retries<T, F, Fut>(mut op: F) -> Result<T, DatabaseError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DatabaseError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= 3 {
                    return Err(err);
                }
                let jitter = rand::thread_rng().gen_range(0..100u64);
                tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 100 + jitter)).await;
            }
        }
    }
}

impl Database {
    // =========================================================================
    // Niche queries
    // =========================================================================

    /// Insert a niche (seeding and tests; production niches come from
    /// external tooling).
    pub async fn insert_niche(
        &self,
        slug: &str,
        name: &str,
        tier: i64,
    ) -> Result<Niche, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = unix_timestamp();
        let niche = sqlx::query_as::<_, Niche>(
            r#"
            INSERT INTO niches (id, slug, name, tier, status, created_at)
            VALUES (?, ?, ?, ?, 'active', ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(slug)
        .bind(name)
        .bind(tier)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(niche)
    }

    /// List active niches ordered by slug.
    pub async fn list_active_niches(&self) -> Result<Vec<Niche>, DatabaseError> {
        let niches = sqlx::query_as::<_, Niche>(
            "SELECT * FROM niches WHERE status = 'active' ORDER BY slug",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(niches)
    }

    /// Get a niche by id.
    pub async fn get_niche(&self, id: &str) -> Result<Niche, DatabaseError> {
        sqlx::query_as::<_, Niche>("SELECT * FROM niches WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Niche {id}")))
    }

    // =========================================================================
    // Device queries
    // =========================================================================

    /// Register a new device or update an existing one (by UDID).
    pub async fn register_device(
        &self,
        name: &str,
        udid: &str,
        automation_host: &str,
        automation_port: i64,
    ) -> Result<Device, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = unix_timestamp();
        let device = sqlx::query_as::<_, Device>(
            r#"
            INSERT INTO devices
                (id, name, udid, automation_host, automation_port, status,
                 connected_since, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'active', ?, ?, ?)
            ON CONFLICT (udid) DO UPDATE SET
                name = excluded.name,
                automation_host = excluded.automation_host,
                automation_port = excluded.automation_port,
                status = 'active',
                connected_since = excluded.connected_since,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(udid)
        .bind(automation_host)
        .bind(automation_port)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(device)
    }

    /// All devices with status='active', ordered by name.
    pub async fn active_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE status = 'active' ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(devices)
    }

    /// All devices, ordered by name.
    pub async fn list_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>("SELECT * FROM devices ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(devices)
    }

    /// Update device heartbeat: status back to active, updated_at to now.
    pub async fn touch_heartbeat(&self, device_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET status = 'active', updated_at = ? WHERE id = ?")
            .bind(unix_timestamp())
            .bind(device_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Set device status (active, maintenance, failed, disconnected).
    pub async fn set_device_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(unix_timestamp())
            .bind(device_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // =========================================================================
    // Warming claim
    // =========================================================================

    /// Claim the next warming task for a device, or None when nothing is
    /// eligible.
    ///
    /// Single atomic statement: the subquery picks the highest-priority
    /// eligible account (earliest ramp state first, then least-recently
    /// warmed, ties by id) and the enclosing UPDATE stamps the claim
    /// (`last_warmed_at`, `device_id`) in the same write. SQLite serializes
    /// writers, so no two workers can ever receive the same row, and the
    /// stamp removes the account from the day's eligibility window.
    pub async fn claim_warming_task(
        &self,
        device_id: &str,
        now: i64,
    ) -> Result<Option<Account>, DatabaseError> {
        let day_start = start_of_day(now);
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts SET
                last_warmed_at = ?1,
                device_id = ?2,
                updated_at = ?1
            WHERE id = (
                SELECT id FROM accounts
                WHERE current_state IN
                        ('created', 'warming_p1', 'warming_p2', 'warming_p3', 'active')
                  AND platform IN ('tiktok', 'instagram')
                  AND deleted_at IS NULL
                  AND (last_warmed_at IS NULL OR last_warmed_at < ?3)
                ORDER BY
                    CASE current_state
                        WHEN 'created' THEN 0
                        WHEN 'warming_p1' THEN 1
                        WHEN 'warming_p2' THEN 2
                        WHEN 'warming_p3' THEN 3
                        ELSE 4
                    END,
                    last_warmed_at ASC NULLS FIRST,
                    id
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(device_id)
        .bind(day_start)
        .fetch_optional(self.pool())
        .await?;
        Ok(account)
    }

    /// Fallback task: the (platform, niche) pair among active niches with the
    /// fewest live accounts. Ties break by niche slug, then platform.
    pub async fn creation_target(&self) -> Result<Option<CreationTarget>, DatabaseError> {
        let target = sqlx::query_as::<_, CreationTarget>(
            r#"
            SELECT
                n.id AS niche_id,
                n.slug AS niche_slug,
                p.platform AS platform,
                (SELECT COUNT(*) FROM accounts a
                 WHERE a.niche_id = n.id
                   AND a.platform = p.platform
                   AND a.deleted_at IS NULL) AS live_accounts
            FROM niches n
            CROSS JOIN (SELECT 'instagram' AS platform UNION ALL SELECT 'tiktok') p
            WHERE n.status = 'active'
            ORDER BY live_accounts ASC, n.slug ASC, p.platform ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await?;
        Ok(target)
    }

    // =========================================================================
    // Account queries
    // =========================================================================

    /// Insert a freshly created account (state `created`, day count 0).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_account(
        &self,
        platform: &str,
        username: &str,
        email_enc: &str,
        password_enc: &str,
        totp_secret_enc: &str,
        niche_id: &str,
        device_id: Option<&str>,
    ) -> Result<Account, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = unix_timestamp();
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts
                (id, platform, username, email_enc, password_enc, totp_secret_enc,
                 niche_id, device_id, current_state, warming_day_count,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'created', 0, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(platform)
        .bind(username)
        .bind(email_enc)
        .bind(password_enc)
        .bind(totp_secret_enc)
        .bind(niche_id)
        .bind(device_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(account)
    }

    /// Get an account by id.
    pub async fn get_account(&self, id: &str) -> Result<Account, DatabaseError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Account {id}")))
    }

    /// True when a username is already taken on a platform (live rows only).
    pub async fn username_taken(
        &self,
        platform: &str,
        username: &str,
    ) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM accounts WHERE platform = ? AND username = ? LIMIT 1",
        )
        .bind(platform)
        .bind(username)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.is_some())
    }

    /// List live accounts with optional filters, newest first.
    pub async fn list_accounts(
        &self,
        platform: Option<&str>,
        state: Option<&str>,
        niche_slug: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Account>, DatabaseError> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT a.* FROM accounts a \
             LEFT JOIN niches n ON a.niche_id = n.id \
             WHERE a.deleted_at IS NULL",
        );
        if let Some(platform) = platform {
            qb.push(" AND a.platform = ").push_bind(platform);
        }
        if let Some(state) = state {
            qb.push(" AND a.current_state = ").push_bind(state);
        }
        if let Some(slug) = niche_slug {
            qb.push(" AND n.slug = ").push_bind(slug);
        }
        qb.push(" ORDER BY a.created_at DESC LIMIT ").push_bind(limit);

        let accounts = qb.build_query_as::<Account>().fetch_all(self.pool()).await?;
        Ok(accounts)
    }

    /// Live account counts grouped by (platform, state), for the overview.
    pub async fn account_counts(&self) -> Result<Vec<(String, String, i64)>, DatabaseError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT platform, current_state, COUNT(*)
            FROM accounts WHERE deleted_at IS NULL
            GROUP BY platform, current_state
            ORDER BY platform, current_state
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Total live accounts.
    pub async fn total_accounts(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE deleted_at IS NULL")
                .fetch_one(self.pool())
                .await?;
        Ok(row.0)
    }

    /// Apply a validated state transition.
    ///
    /// Rejects transitions outside the legal DAG with
    /// [`DatabaseError::IllegalTransition`].
    pub async fn transition_account_state(
        &self,
        account_id: &str,
        to: AccountState,
    ) -> Result<Account, DatabaseError> {
        let account = self.get_account(account_id).await?;
        let from = account.state().ok_or_else(|| {
            DatabaseError::Query(format!("unknown state '{}'", account.current_state))
        })?;
        if !from.allows(to) {
            return Err(DatabaseError::IllegalTransition(format!("{from} -> {to}")));
        }

        let updated = sqlx::query_as::<_, Account>(
            "UPDATE accounts SET current_state = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(to.as_str())
        .bind(unix_timestamp())
        .bind(account_id)
        .fetch_one(self.pool())
        .await?;
        Ok(updated)
    }

    // =========================================================================
    // Warming outcome
    // =========================================================================

    /// Record a successful warming cycle: the account update (new day count,
    /// recomputed state, last_warmed_at) and the progress row land in one
    /// transaction.
    pub async fn record_warming_success(
        &self,
        outcome: &WarmingOutcome,
    ) -> Result<WarmingProgress, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            UPDATE accounts SET
                last_warmed_at = ?,
                warming_day_count = ?,
                current_state = ?,
                last_activity_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(outcome.completed_at)
        .bind(outcome.new_day_count)
        .bind(outcome.new_state.as_str())
        .bind(outcome.completed_at)
        .bind(outcome.completed_at)
        .bind(&outcome.account_id)
        .execute(&mut *tx)
        .await?;

        let progress = sqlx::query_as::<_, WarmingProgress>(
            r#"
            INSERT INTO warming_progress
                (id, account_id, device_id, platform, warming_phase, warming_day,
                 session_data, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&outcome.account_id)
        .bind(&outcome.device_id)
        .bind(&outcome.platform)
        .bind(outcome.warming_phase)
        .bind(outcome.new_day_count)
        .bind(&outcome.session_data)
        .bind(outcome.started_at)
        .bind(outcome.completed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(progress)
    }

    /// Record a partial (failed mid-run) warming cycle. The account is left
    /// untouched; the progress row has no completed_at.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_warming_partial(
        &self,
        account_id: &str,
        device_id: &str,
        platform: &str,
        warming_phase: i64,
        warming_day: i64,
        session_data: &str,
        started_at: i64,
    ) -> Result<WarmingProgress, DatabaseError> {
        let progress = sqlx::query_as::<_, WarmingProgress>(
            r#"
            INSERT INTO warming_progress
                (id, account_id, device_id, platform, warming_phase, warming_day,
                 session_data, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(device_id)
        .bind(platform)
        .bind(warming_phase)
        .bind(warming_day)
        .bind(session_data)
        .bind(started_at)
        .fetch_one(self.pool())
        .await?;
        Ok(progress)
    }

    /// Warming history for an account, newest first.
    pub async fn warming_history(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<WarmingProgress>, DatabaseError> {
        let rows = sqlx::query_as::<_, WarmingProgress>(
            "SELECT * FROM warming_progress WHERE account_id = ? \
             ORDER BY started_at DESC LIMIT ?",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
