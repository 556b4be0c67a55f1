//! Durable state behind the verification pipeline
//!
//! Three contracts, each implemented by both backends:
//! - [`MissionRegistry`]: mission catalog and rewards
//! - [`ProfileStore`]: point balances, levels and display metadata
//! - [`LedgerStore`]: append-only proof ledger
//!
//! Balance changes only happen through [`ProfileStore::apply_credit`],
//! which settles one verified ledger entry. The settlement marker and the
//! increment commit together, so an entry credits at most once.

pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    AppendOutcome, CreditOutcome, LeaderboardEntry, LedgerEntry, Mission, NewLedgerEntry,
    NewMission, NewProfile, Profile, ProfileUpdate, RewardUpdate,
};

pub use postgres::PgStorage;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait MissionRegistry: Send + Sync {
    async fn get_mission(&self, mission_id: &str) -> Result<Option<Mission>>;

    /// Newest first, optionally only missions hosted by `host_user_id`
    async fn list_missions(&self, host_user_id: Option<&str>) -> Result<Vec<Mission>>;

    /// `None` when the id is already taken
    async fn create_mission(&self, mission: NewMission) -> Result<Option<Mission>>;

    /// Refused once a verified ledger entry references the mission
    async fn update_mission_reward(&self, mission_id: &str, reward_ap: i64)
        -> Result<RewardUpdate>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// `None` when the id is already taken
    async fn create_profile(&self, profile: NewProfile) -> Result<Option<Profile>>;

    async fn update_profile(&self, user_id: &str, update: ProfileUpdate)
        -> Result<Option<Profile>>;

    /// Credit `entry.reward_ap` to `entry.user_id` exactly once per entry.
    ///
    /// The increment happens inside the database and recomputes the level
    /// in the same statement.
    async fn apply_credit(&self, entry: &LedgerEntry) -> Result<CreditOutcome>;

    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one immutable entry.
    ///
    /// With `once_per_mission`, a verified entry is refused when the user
    /// already holds one for the same mission; the check and the insert
    /// are atomic.
    async fn append(&self, entry: NewLedgerEntry, once_per_mission: bool)
        -> Result<AppendOutcome>;

    async fn get_entry(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>>;

    /// Newest first
    async fn entries_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>>;

    async fn has_verified(&self, user_id: &str, mission_id: &str) -> Result<bool>;

    /// Verified entries without a settled credit, oldest first
    async fn unsettled_entries(&self, limit: usize) -> Result<Vec<LedgerEntry>>;
}

/// The three store handles, usually backed by one database
#[derive(Clone)]
pub struct Stores {
    pub missions: Arc<dyn MissionRegistry>,
    pub profiles: Arc<dyn ProfileStore>,
    pub ledger: Arc<dyn LedgerStore>,
}

impl Stores {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: MissionRegistry + ProfileStore + LedgerStore + 'static,
    {
        Self {
            missions: backend.clone(),
            profiles: backend.clone(),
            ledger: backend,
        }
    }

    /// Insert the seed catalog when the registry is empty
    pub async fn seed_missions(&self, seed: &[NewMission]) -> Result<usize> {
        if seed.is_empty() || !self.missions.list_missions(None).await?.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        for mission in seed {
            if let Err(e) = mission.validate() {
                anyhow::bail!("Invalid seed mission '{}': {}", mission.title, e);
            }
            if self.missions.create_mission(mission.clone()).await?.is_some() {
                inserted += 1;
            }
        }
        info!("Seeded {} missions", inserted);
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Vec<NewMission> {
        vec![
            NewMission {
                id: Some("f1".to_string()),
                title: "Amazon Reforestation".to_string(),
                description: String::new(),
                mission_type: "Environmental".to_string(),
                image_url: None,
                host_user_id: None,
                reward_ap: 5000,
            },
            NewMission {
                id: Some("f2".to_string()),
                title: "City Solar Grid".to_string(),
                description: String::new(),
                mission_type: "Civic".to_string(),
                image_url: None,
                host_user_id: None,
                reward_ap: 3500,
            },
        ]
    }

    #[tokio::test]
    async fn test_seed_only_when_empty() {
        let stores = Stores::from_backend(Arc::new(SqliteStore::in_memory().unwrap()));

        assert_eq!(stores.seed_missions(&seed()).await.unwrap(), 2);
        assert_eq!(stores.seed_missions(&seed()).await.unwrap(), 0);
        assert_eq!(stores.missions.list_missions(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_seed_rejects_invalid_mission() {
        let stores = Stores::from_backend(Arc::new(SqliteStore::in_memory().unwrap()));
        let mut bad = seed();
        bad[1].reward_ap = 0;

        assert!(stores.seed_missions(&bad).await.is_err());
    }
}
