//! Embedded SQLite storage
//!
//! Single-node backend for local runs and tests. All access goes through
//! one connection behind a mutex, so every transaction below is also
//! serialized in-process.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use super::{LedgerStore, MissionRegistry, ProfileStore};
use crate::models::{
    level_for_points, AppendOutcome, CreditOutcome, LeaderboardEntry, LedgerEntry, Mission,
    NewLedgerEntry, NewMission, NewProfile, Profile, ProfileUpdate, ProofStatus, RewardUpdate,
};

const SCHEMA: &str = include_str!("../../migrations/sqlite/001_schema.sql");

const PROFILE_COLUMNS: &str =
    "id, username, bio, avatar_url, aura_points, level, created_at, updated_at";
const MISSION_COLUMNS: &str =
    "id, title, description, mission_type, image_url, host_user_id, reward_ap, created_at";
const LEDGER_COLUMNS: &str =
    "id, user_id, mission_id, evidence_reference, status, reward_ap, reason, verified_at";

impl ToSql for ProofStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ProofStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        username: row.get(1)?,
        bio: row.get(2)?,
        avatar_url: row.get(3)?,
        aura_points: row.get(4)?,
        level: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn mission_from_row(row: &Row<'_>) -> rusqlite::Result<Mission> {
    Ok(Mission {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        mission_type: row.get(3)?,
        image_url: row.get(4)?,
        host_user_id: row.get(5)?,
        reward_ap: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mission_id: row.get(2)?,
        evidence_reference: row.get(3)?,
        status: row.get(4)?,
        reward_ap: row.get(5)?,
        reason: row.get(6)?,
        verified_at: row.get(7)?,
    })
}

fn select_profile(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<Profile>> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
        params![user_id],
        profile_from_row,
    )
    .optional()
}

fn select_mission(conn: &Connection, mission_id: &str) -> rusqlite::Result<Option<Mission>> {
    conn.query_row(
        &format!("SELECT {} FROM missions WHERE id = ?1", MISSION_COLUMNS),
        params![mission_id],
        mission_from_row,
    )
    .optional()
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.run_migrations()?;
        info!("SQLite storage opened at {}", path.display());
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to apply SQLite schema")?;
        Ok(())
    }

    /// Run rusqlite work on the blocking pool. Waiting for the connection
    /// and the query itself never stall the async executor, so callers can
    /// time out or be cancelled while the statement finishes.
    async fn with_conn<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || work(&mut conn.lock()))
            .await
            .map_err(|e| anyhow!("SQLite task failed: {}", e))?
    }
}

// ============================================================================
// MISSIONS
// ============================================================================

#[async_trait]
impl MissionRegistry for SqliteStore {
    async fn get_mission(&self, mission_id: &str) -> Result<Option<Mission>> {
        let mission_id = mission_id.to_string();
        self.with_conn(move |conn| Ok(select_mission(conn, &mission_id)?))
            .await
    }

    async fn list_missions(&self, host_user_id: Option<&str>) -> Result<Vec<Mission>> {
        let host_user_id = host_user_id.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM missions
                 WHERE ?1 IS NULL OR host_user_id = ?1
                 ORDER BY created_at DESC",
                MISSION_COLUMNS
            ))?;
            let missions = stmt
                .query_map(params![host_user_id], mission_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(missions)
        })
        .await
    }

    async fn create_mission(&self, mission: NewMission) -> Result<Option<Mission>> {
        self.with_conn(move |conn| {
            let id = mission
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            let inserted = conn.execute(
                "INSERT OR IGNORE INTO missions (id, title, description, mission_type, image_url, host_user_id, reward_ap, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    mission.title,
                    mission.description,
                    mission.mission_type,
                    mission.image_url,
                    mission.host_user_id,
                    mission.reward_ap,
                    Utc::now(),
                ],
            )?;

            if inserted == 0 {
                debug!("Mission {} already exists", id);
                return Ok(None);
            }
            Ok(select_mission(conn, &id)?)
        })
        .await
    }

    async fn update_mission_reward(
        &self,
        mission_id: &str,
        reward_ap: i64,
    ) -> Result<RewardUpdate> {
        let mission_id = mission_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if select_mission(&tx, &mission_id)?.is_none() {
                return Ok(RewardUpdate::NotFound);
            }

            let settled: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM proof_ledger WHERE mission_id = ?1 AND status = 'verified')",
                params![mission_id],
                |row| row.get(0),
            )?;
            if settled {
                return Ok(RewardUpdate::Locked);
            }

            tx.execute(
                "UPDATE missions SET reward_ap = ?2 WHERE id = ?1",
                params![mission_id, reward_ap],
            )?;
            let mission = select_mission(&tx, &mission_id)?;
            tx.commit()?;

            Ok(match mission {
                Some(m) => RewardUpdate::Updated(m),
                None => RewardUpdate::NotFound,
            })
        })
        .await
    }
}

// ============================================================================
// PROFILES
// ============================================================================

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| Ok(select_profile(conn, &user_id)?))
            .await
    }

    async fn create_profile(&self, profile: NewProfile) -> Result<Option<Profile>> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO profiles (id, username, bio, avatar_url, aura_points, level, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, 1, ?5, ?5)",
                params![profile.id, profile.username, profile.bio, profile.avatar_url, now],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(select_profile(conn, &profile.id)?)
        })
        .await
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<Option<Profile>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE profiles SET
                    username = COALESCE(?2, username),
                    bio = COALESCE(?3, bio),
                    avatar_url = COALESCE(?4, avatar_url),
                    updated_at = ?5
                 WHERE id = ?1",
                params![user_id, update.username, update.bio, update.avatar_url, Utc::now()],
            )?;
            Ok(select_profile(conn, &user_id)?)
        })
        .await
    }

    async fn apply_credit(&self, entry: &LedgerEntry) -> Result<CreditOutcome> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let settled = tx.execute(
                "INSERT OR IGNORE INTO reward_settlements (ledger_entry_id, user_id, amount, settled_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry.id, entry.user_id, entry.reward_ap, Utc::now()],
            )?;

            if settled == 0 {
                let outcome = match select_profile(&tx, &entry.user_id)? {
                    Some(profile) => CreditOutcome::AlreadySettled(profile),
                    None => CreditOutcome::ProfileMissing,
                };
                return Ok(outcome);
            }

            let profile = tx
                .query_row(
                    &format!(
                        "UPDATE profiles SET
                            aura_points = aura_points + ?2,
                            level = (aura_points + ?2) / 1000 + 1,
                            updated_at = ?3
                         WHERE id = ?1
                         RETURNING {}",
                        PROFILE_COLUMNS
                    ),
                    params![entry.user_id, entry.reward_ap, Utc::now()],
                    profile_from_row,
                )
                .optional()?;

            match profile {
                Some(profile) => {
                    debug_assert_eq!(profile.level, level_for_points(profile.aura_points));
                    tx.commit()?;
                    Ok(CreditOutcome::Applied(profile))
                }
                // Dropping the transaction rolls back the settlement marker
                None => Ok(CreditOutcome::ProfileMissing),
            }
        })
        .await
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let entries = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, username, avatar_url, aura_points, level
                     FROM profiles
                     ORDER BY aura_points DESC, created_at ASC
                     LIMIT ?1",
                )?;
                let entries = stmt
                    .query_map(params![limit as i64], |row| {
                        Ok(LeaderboardEntry {
                            rank: 0,
                            user_id: row.get(0)?,
                            username: row.get(1)?,
                            avatar_url: row.get(2)?,
                            aura_points: row.get(3)?,
                            level: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(i, mut e)| {
                e.rank = (i + 1) as u32;
                e
            })
            .collect())
    }
}

// ============================================================================
// PROOF LEDGER
// ============================================================================

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append(&self, entry: NewLedgerEntry, once_per_mission: bool) -> Result<AppendOutcome> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if once_per_mission && entry.status == ProofStatus::Verified {
                let prior: Option<Uuid> = tx
                    .query_row(
                        "SELECT id FROM proof_ledger
                         WHERE user_id = ?1 AND mission_id = ?2 AND status = 'verified'
                         LIMIT 1",
                        params![entry.user_id, entry.mission_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(prior_entry_id) = prior {
                    return Ok(AppendOutcome::AlreadyCompleted { prior_entry_id });
                }
            }

            let entry = entry.into_entry();
            tx.execute(
                "INSERT INTO proof_ledger (id, user_id, mission_id, evidence_reference, status, reward_ap, reason, verified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.id,
                    entry.user_id,
                    entry.mission_id,
                    entry.evidence_reference,
                    entry.status,
                    entry.reward_ap,
                    entry.reason,
                    entry.verified_at,
                ],
            )?;
            tx.commit()?;

            Ok(AppendOutcome::Recorded(entry))
        })
        .await
    }

    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM proof_ledger WHERE id = ?1", LEDGER_COLUMNS),
                    params![entry_id],
                    entry_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn entries_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM proof_ledger WHERE user_id = ?1 ORDER BY verified_at DESC LIMIT ?2",
                LEDGER_COLUMNS
            ))?;
            let entries = stmt
                .query_map(params![user_id, limit as i64], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn has_verified(&self, user_id: &str, mission_id: &str) -> Result<bool> {
        let (user_id, mission_id) = (user_id.to_string(), mission_id.to_string());
        self.with_conn(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM proof_ledger WHERE user_id = ?1 AND mission_id = ?2 AND status = 'verified')",
                params![user_id, mission_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn unsettled_entries(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT l.id, l.user_id, l.mission_id, l.evidence_reference, l.status, l.reward_ap, l.reason, l.verified_at
                 FROM proof_ledger l
                 LEFT JOIN reward_settlements s ON s.ledger_entry_id = l.id
                 WHERE l.status = 'verified' AND s.ledger_entry_id IS NULL
                 ORDER BY l.verified_at ASC
                 LIMIT ?1",
            )?;
            let entries = stmt
                .query_map(params![limit as i64], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    async fn store_with(points: i64) -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .create_profile(NewProfile {
                id: "u1".to_string(),
                username: "legend".to_string(),
                bio: None,
                avatar_url: None,
            })
            .await
            .unwrap()
            .unwrap();
        store
            .create_mission(NewMission {
                id: Some("m1".to_string()),
                title: "Beach cleanup".to_string(),
                description: String::new(),
                mission_type: "Environmental".to_string(),
                image_url: None,
                host_user_id: None,
                reward_ap: 700,
            })
            .await
            .unwrap()
            .unwrap();
        if points > 0 {
            let seed = verified("u1", "m1", points);
            let AppendOutcome::Recorded(entry) = store.append(seed, false).await.unwrap() else {
                panic!("seed entry not recorded");
            };
            store.apply_credit(&entry).await.unwrap();
        }
        store
    }

    fn verified(user: &str, mission: &str, reward: i64) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: user.to_string(),
            mission_id: mission.to_string(),
            evidence_reference: "https://cdn/e.jpg".to_string(),
            status: ProofStatus::Verified,
            reward_ap: reward,
            reason: None,
        }
    }

    async fn record(store: &SqliteStore, entry: NewLedgerEntry) -> LedgerEntry {
        match store.append(entry, false).await.unwrap() {
            AppendOutcome::Recorded(entry) => entry,
            other => panic!("unexpected append outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_profile_roundtrip() {
        let store = store_with(0).await;
        let profile = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.aura_points, 0);
        assert_eq!(profile.level, 1);
        assert!(store.get_profile("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_profile_is_refused() {
        let store = store_with(0).await;
        let again = store
            .create_profile(NewProfile {
                id: "u1".to_string(),
                username: "impostor".to_string(),
                bio: None,
                avatar_url: None,
            })
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_update_profile_keeps_points() {
        let store = store_with(1200).await;
        let updated = store
            .update_profile(
                "u1",
                ProfileUpdate {
                    bio: Some("planting trees".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("planting trees"));
        assert_eq!(updated.username, "legend");
        assert_eq!(updated.aura_points, 1200);
        assert_eq!(updated.level, 2);
    }

    #[tokio::test]
    async fn test_credit_applies_once_per_entry() {
        let store = store_with(500).await;
        let entry = record(&store, verified("u1", "m1", 700)).await;

        let CreditOutcome::Applied(profile) = store.apply_credit(&entry).await.unwrap() else {
            panic!("first credit should apply");
        };
        assert_eq!(profile.aura_points, 1200);
        assert_eq!(profile.level, 2);

        let CreditOutcome::AlreadySettled(profile) = store.apply_credit(&entry).await.unwrap()
        else {
            panic!("second credit should be a no-op");
        };
        assert_eq!(profile.aura_points, 1200);
    }

    #[tokio::test]
    async fn test_credit_for_missing_profile_leaves_entry_unsettled() {
        let store = store_with(0).await;
        let entry = record(&store, verified("ghost", "m1", 700)).await;

        assert!(matches!(
            store.apply_credit(&entry).await.unwrap(),
            CreditOutcome::ProfileMissing
        ));
        let pending = store.unsettled_entries(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, entry.id);
    }

    #[tokio::test]
    async fn test_level_boundary() {
        let store = store_with(999).await;
        let entry = record(&store, verified("u1", "m1", 1)).await;
        let CreditOutcome::Applied(profile) = store.apply_credit(&entry).await.unwrap() else {
            panic!("credit should apply");
        };
        assert_eq!(profile.aura_points, 1000);
        assert_eq!(profile.level, 2);
    }

    #[tokio::test]
    async fn test_once_per_mission_guard() {
        let store = store_with(0).await;
        let first = record(&store, verified("u1", "m1", 700)).await;

        match store.append(verified("u1", "m1", 700), true).await.unwrap() {
            AppendOutcome::AlreadyCompleted { prior_entry_id } => {
                assert_eq!(prior_entry_id, first.id)
            }
            other => panic!("expected guard, got {:?}", other),
        }

        // Rejections are always recorded
        let mut rejected = verified("u1", "m1", 700);
        rejected.status = ProofStatus::Rejected;
        assert!(matches!(
            store.append(rejected, true).await.unwrap(),
            AppendOutcome::Recorded(_)
        ));
    }

    #[tokio::test]
    async fn test_busy_connection_does_not_block_timeouts() {
        let store = store_with(0).await;
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let conn = Arc::clone(&store.conn);
        let holder = std::thread::spawn(move || {
            let _guard = conn.lock();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(800));
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            store.append(verified("u1", "m1", 700), true),
        )
        .await;
        assert!(result.is_err(), "append should time out while the connection is held");
        assert!(started.elapsed() < Duration::from_millis(800));

        // The abandoned write still lands once the connection frees up
        holder.join().unwrap();
        let mut pending = Vec::new();
        for _ in 0..50 {
            pending = store.unsettled_entries(10).await.unwrap();
            if !pending.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_rows_are_immutable() {
        let store = store_with(0).await;
        let entry = record(&store, verified("u1", "m1", 700)).await;

        let conn = store.conn.lock();
        let update = conn.execute(
            "UPDATE proof_ledger SET status = 'rejected' WHERE id = ?1",
            params![entry.id],
        );
        assert!(update.is_err());
        let delete = conn.execute("DELETE FROM proof_ledger WHERE id = ?1", params![entry.id]);
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_ledger_requires_known_mission() {
        let store = store_with(0).await;
        assert!(store
            .append(verified("u1", "does-not-exist", 10), false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_entries_newest_first() {
        let store = store_with(0).await;
        let first = record(&store, verified("u1", "m1", 700)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = record(&store, verified("u1", "m1", 700)).await;

        let entries = store.entries_for_user("u1", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, second.id);
        assert_eq!(entries[1].id, first.id);
        assert_eq!(store.get_entry(first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_reward_locked_after_verification() {
        let store = store_with(0).await;
        assert!(matches!(
            store.update_mission_reward("m1", 900).await.unwrap(),
            RewardUpdate::Updated(ref m) if m.reward_ap == 900
        ));

        record(&store, verified("u1", "m1", 900)).await;
        assert_eq!(
            store.update_mission_reward("m1", 50).await.unwrap(),
            RewardUpdate::Locked
        );
        assert_eq!(
            store.update_mission_reward("nope", 50).await.unwrap(),
            RewardUpdate::NotFound
        );
    }

    #[tokio::test]
    async fn test_leaderboard_ranks_by_points() {
        let store = store_with(300).await;
        store
            .create_profile(NewProfile {
                id: "u2".to_string(),
                username: "sprout".to_string(),
                bio: None,
                avatar_url: None,
            })
            .await
            .unwrap();
        let entry = record(&store, verified("u2", "m1", 4000)).await;
        store.apply_credit(&entry).await.unwrap();

        let board = store.leaderboard(10).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].user_id, "u2");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].level, 5);
        assert_eq!(board[1].user_id, "u1");
        assert_eq!(store.leaderboard(1).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_do_not_lose_updates() {
        let store = Arc::new(store_with(0).await);
        let mut entries = Vec::new();
        for reward in [300, 400, 250, 50] {
            entries.push(record(&store, verified("u1", "m1", reward)).await);
        }

        let handles: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                let store = store.clone();
                tokio::spawn(async move { store.apply_credit(&entry).await })
            })
            .collect();
        for handle in futures::future::join_all(handles).await {
            handle.unwrap().unwrap();
        }

        let profile = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.aura_points, 1000);
        assert_eq!(profile.level, 2);
    }
}
