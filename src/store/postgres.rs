//! PostgreSQL Storage for Aura Impact
//!
//! Production backend. Connects with DATABASE_URL through a deadpool pool
//! and applies the embedded migrations on startup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{LedgerStore, MissionRegistry, ProfileStore};
use crate::models::{
    AppendOutcome, CreditOutcome, LeaderboardEntry, LedgerEntry, Mission, NewLedgerEntry,
    NewMission, NewProfile, Profile, ProfileUpdate, ProofStatus, RewardUpdate,
};

/// Database pool configuration
const DB_POOL_MAX_SIZE: usize = 20;
const DB_QUERY_TIMEOUT_SECS: u64 = 30;

const PROFILE_COLUMNS: &str =
    "id, username, bio, avatar_url, aura_points, level, created_at, updated_at";
const MISSION_COLUMNS: &str =
    "id, title, description, mission_type, image_url, host_user_id, reward_ap, created_at";
const LEDGER_COLUMNS: &str =
    "id, user_id, mission_id, evidence_reference, status, reward_ap, reason, verified_at";

/// Ordered (version, name, sql) migrations
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (1, "001_schema", include_str!("../../migrations/001_schema.sql")),
    (
        2,
        "002_reward_settlements",
        include_str!("../../migrations/002_reward_settlements.sql"),
    ),
];

fn profile_from_row(r: &Row) -> Result<Profile> {
    Ok(Profile {
        id: r.try_get(0)?,
        username: r.try_get(1)?,
        bio: r.try_get(2)?,
        avatar_url: r.try_get(3)?,
        aura_points: r.try_get(4)?,
        level: r.try_get(5)?,
        created_at: r.try_get(6)?,
        updated_at: r.try_get(7)?,
    })
}

fn mission_from_row(r: &Row) -> Result<Mission> {
    Ok(Mission {
        id: r.try_get(0)?,
        title: r.try_get(1)?,
        description: r.try_get(2)?,
        mission_type: r.try_get(3)?,
        image_url: r.try_get(4)?,
        host_user_id: r.try_get(5)?,
        reward_ap: r.try_get(6)?,
        created_at: r.try_get(7)?,
    })
}

fn entry_from_row(r: &Row) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: r.try_get(0)?,
        user_id: r.try_get(1)?,
        mission_id: r.try_get(2)?,
        evidence_reference: r.try_get(3)?,
        status: r.try_get(4)?,
        reward_ap: r.try_get(5)?,
        reason: r.try_get(6)?,
        verified_at: r.try_get(7)?,
    })
}

// ============================================================================
// PG STORAGE
// ============================================================================

#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    /// Create storage from DATABASE_URL
    pub async fn new(database_url: &str) -> Result<Self> {
        use deadpool_postgres::{ManagerConfig, PoolConfig, RecyclingMethod};
        use std::time::Duration;

        let mut config = Config::new();
        config.url = Some(database_url.to_string());
        config.options = Some(format!("-c statement_timeout={}s", DB_QUERY_TIMEOUT_SECS));

        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        config.pool = Some(PoolConfig {
            max_size: DB_POOL_MAX_SIZE,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(Duration::from_secs(DB_QUERY_TIMEOUT_SECS)),
                create: Some(Duration::from_secs(10)),
                recycle: Some(Duration::from_secs(30)),
            },
            ..Default::default()
        });

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL pool")?;

        // Test connection
        let client = pool.get().await.context("Failed to connect to PostgreSQL")?;
        client.execute("SELECT 1", &[]).await?;

        info!(
            "Connected to PostgreSQL (pool_size: {}, query_timeout: {}s)",
            DB_POOL_MAX_SIZE, DB_QUERY_TIMEOUT_SECS
        );

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run embedded migrations
    async fn run_migrations(&self) -> Result<()> {
        let client = self.pool.get().await?;

        let tracked: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = 'schema_migrations')",
                &[],
            )
            .await?
            .get(0);

        for (version, name, sql) in MIGRATIONS {
            let applied: bool = if tracked || *version > 1 {
                client
                    .query_one(
                        "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = $1)",
                        &[version],
                    )
                    .await?
                    .get(0)
            } else {
                false
            };

            if !applied {
                client
                    .batch_execute(sql)
                    .await
                    .with_context(|| format!("Failed to apply migration {}", name))?;
                info!("Applied migration {}", name);
            }
        }

        Ok(())
    }
}

// ============================================================================
// MISSIONS
// ============================================================================

#[async_trait]
impl MissionRegistry for PgStorage {
    async fn get_mission(&self, mission_id: &str) -> Result<Option<Mission>> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                &format!("SELECT {} FROM missions WHERE id = $1", MISSION_COLUMNS),
                &[&mission_id],
            )
            .await?;

        row.as_ref().map(mission_from_row).transpose()
    }

    async fn list_missions(&self, host_user_id: Option<&str>) -> Result<Vec<Mission>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM missions
                     WHERE $1::TEXT IS NULL OR host_user_id = $1
                     ORDER BY created_at DESC",
                    MISSION_COLUMNS
                ),
                &[&host_user_id],
            )
            .await?;

        rows.iter().map(mission_from_row).collect()
    }

    async fn create_mission(&self, mission: NewMission) -> Result<Option<Mission>> {
        let client = self.pool.get().await?;
        let id = mission
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let row = client
            .query_opt(
                &format!(
                    "INSERT INTO missions (id, title, description, mission_type, image_url, host_user_id, reward_ap)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     ON CONFLICT (id) DO NOTHING
                     RETURNING {}",
                    MISSION_COLUMNS
                ),
                &[
                    &id,
                    &mission.title,
                    &mission.description,
                    &mission.mission_type,
                    &mission.image_url,
                    &mission.host_user_id,
                    &mission.reward_ap,
                ],
            )
            .await?;

        match row {
            Some(r) => {
                info!("Created mission {} ({} AP)", id, mission.reward_ap);
                Ok(Some(mission_from_row(&r)?))
            }
            None => {
                debug!("Mission {} already exists", id);
                Ok(None)
            }
        }
    }

    async fn update_mission_reward(
        &self,
        mission_id: &str,
        reward_ap: i64,
    ) -> Result<RewardUpdate> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // Lock the mission row so a concurrent verification cannot slip in
        let exists = tx
            .query_opt("SELECT 1 FROM missions WHERE id = $1 FOR UPDATE", &[&mission_id])
            .await?
            .is_some();
        if !exists {
            return Ok(RewardUpdate::NotFound);
        }

        let settled: bool = tx
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM proof_ledger WHERE mission_id = $1 AND status = 'verified')",
                &[&mission_id],
            )
            .await?
            .get(0);
        if settled {
            return Ok(RewardUpdate::Locked);
        }

        let row = tx
            .query_one(
                &format!(
                    "UPDATE missions SET reward_ap = $2 WHERE id = $1 RETURNING {}",
                    MISSION_COLUMNS
                ),
                &[&mission_id, &reward_ap],
            )
            .await?;
        let mission = mission_from_row(&row)?;
        tx.commit().await?;

        Ok(RewardUpdate::Updated(mission))
    }
}

// ============================================================================
// PROFILES
// ============================================================================

#[async_trait]
impl ProfileStore for PgStorage {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                &format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS),
                &[&user_id],
            )
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn create_profile(&self, profile: NewProfile) -> Result<Option<Profile>> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                &format!(
                    "INSERT INTO profiles (id, username, bio, avatar_url)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (id) DO NOTHING
                     RETURNING {}",
                    PROFILE_COLUMNS
                ),
                &[
                    &profile.id,
                    &profile.username,
                    &profile.bio,
                    &profile.avatar_url,
                ],
            )
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<Option<Profile>> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                &format!(
                    "UPDATE profiles SET
                        username = COALESCE($2, username),
                        bio = COALESCE($3, bio),
                        avatar_url = COALESCE($4, avatar_url),
                        updated_at = NOW()
                     WHERE id = $1
                     RETURNING {}",
                    PROFILE_COLUMNS
                ),
                &[&user_id, &update.username, &update.bio, &update.avatar_url],
            )
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn apply_credit(&self, entry: &LedgerEntry) -> Result<CreditOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let settled = tx
            .execute(
                "INSERT INTO reward_settlements (ledger_entry_id, user_id, amount)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (ledger_entry_id) DO NOTHING",
                &[&entry.id, &entry.user_id, &entry.reward_ap],
            )
            .await?;

        if settled == 0 {
            let row = tx
                .query_opt(
                    &format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS),
                    &[&entry.user_id],
                )
                .await?;
            return Ok(match row {
                Some(r) => CreditOutcome::AlreadySettled(profile_from_row(&r)?),
                None => CreditOutcome::ProfileMissing,
            });
        }

        // Atomic increment; level follows the new balance in the same statement
        let row = tx
            .query_opt(
                &format!(
                    "UPDATE profiles SET
                        aura_points = aura_points + $2,
                        level = (aura_points + $2) / 1000 + 1,
                        updated_at = NOW()
                     WHERE id = $1
                     RETURNING {}",
                    PROFILE_COLUMNS
                ),
                &[&entry.user_id, &entry.reward_ap],
            )
            .await?;

        match row {
            Some(r) => {
                let profile = profile_from_row(&r)?;
                tx.commit().await?;
                debug!(
                    "Credited {} AP to {} (balance {}, level {})",
                    entry.reward_ap, entry.user_id, profile.aura_points, profile.level
                );
                Ok(CreditOutcome::Applied(profile))
            }
            None => {
                tx.rollback().await?;
                Ok(CreditOutcome::ProfileMissing)
            }
        }
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                "SELECT id, username, avatar_url, aura_points, level
                 FROM profiles
                 ORDER BY aura_points DESC, created_at ASC
                 LIMIT $1",
                &[&(limit as i64)],
            )
            .await?;

        rows.iter()
            .enumerate()
            .map(|(i, r)| {
                Ok(LeaderboardEntry {
                    rank: (i + 1) as u32,
                    user_id: r.try_get(0)?,
                    username: r.try_get(1)?,
                    avatar_url: r.try_get(2)?,
                    aura_points: r.try_get(3)?,
                    level: r.try_get(4)?,
                })
            })
            .collect()
    }
}

// ============================================================================
// PROOF LEDGER
// ============================================================================

#[async_trait]
impl LedgerStore for PgStorage {
    async fn append(&self, entry: NewLedgerEntry, once_per_mission: bool) -> Result<AppendOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        if once_per_mission && entry.status == ProofStatus::Verified {
            // Serialize verified appends per (user, mission) until commit
            let lock_key = format!("{}:{}", entry.user_id, entry.mission_id);
            tx.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&lock_key])
                .await?;

            let prior = tx
                .query_opt(
                    "SELECT id FROM proof_ledger
                     WHERE user_id = $1 AND mission_id = $2 AND status = 'verified'
                     LIMIT 1",
                    &[&entry.user_id, &entry.mission_id],
                )
                .await?;
            if let Some(r) = prior {
                return Ok(AppendOutcome::AlreadyCompleted {
                    prior_entry_id: r.try_get(0)?,
                });
            }
        }

        let entry = entry.into_entry();
        tx.execute(
            "INSERT INTO proof_ledger (id, user_id, mission_id, evidence_reference, status, reward_ap, reason, verified_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &entry.id,
                &entry.user_id,
                &entry.mission_id,
                &entry.evidence_reference,
                &entry.status,
                &entry.reward_ap,
                &entry.reason,
                &entry.verified_at,
            ],
        )
        .await?;
        tx.commit().await?;

        debug!(
            "Recorded {} proof {} for {} on {}",
            entry.status, entry.id, entry.user_id, entry.mission_id
        );
        Ok(AppendOutcome::Recorded(entry))
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                &format!("SELECT {} FROM proof_ledger WHERE id = $1", LEDGER_COLUMNS),
                &[&entry_id],
            )
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn entries_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM proof_ledger
                     WHERE user_id = $1
                     ORDER BY verified_at DESC
                     LIMIT $2",
                    LEDGER_COLUMNS
                ),
                &[&user_id, &(limit as i64)],
            )
            .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn has_verified(&self, user_id: &str, mission_id: &str) -> Result<bool> {
        let client = self.pool.get().await?;

        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM proof_ledger WHERE user_id = $1 AND mission_id = $2 AND status = 'verified')",
                &[&user_id, &mission_id],
            )
            .await?;

        Ok(row.try_get(0)?)
    }

    async fn unsettled_entries(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM unsettled_proofs ORDER BY verified_at ASC LIMIT $1",
                    LEDGER_COLUMNS
                ),
                &[&(limit as i64)],
            )
            .await?;

        rows.iter().map(entry_from_row).collect()
    }
}
