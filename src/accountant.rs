//! Reward accounting
//!
//! The only path that raises a point balance. A credit is tied to a
//! verified ledger entry and applied as an in-database increment, so
//! concurrent credits for one user all land.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{level_for_points, CreditOutcome, LedgerEntry, ProofStatus};
use crate::store::ProfileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditReceipt {
    pub entry_id: Uuid,
    pub points_awarded: i64,
    pub new_balance: i64,
    pub new_level: i64,
    /// False when an earlier call already settled this entry
    pub newly_applied: bool,
}

#[derive(Debug, Error)]
pub enum CreditError {
    #[error("ledger entry {0} is not verified")]
    NotVerified(Uuid),

    #[error("credit amount must be positive (got {0})")]
    NonPositiveAmount(i64),

    #[error("profile {0} not found")]
    ProfileNotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct RewardAccountant {
    profiles: Arc<dyn ProfileStore>,
}

impl RewardAccountant {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Settle the reward for one verified ledger entry
    pub async fn credit(&self, entry: &LedgerEntry) -> Result<CreditReceipt, CreditError> {
        if entry.status != ProofStatus::Verified {
            return Err(CreditError::NotVerified(entry.id));
        }
        if entry.reward_ap <= 0 {
            return Err(CreditError::NonPositiveAmount(entry.reward_ap));
        }

        match self.profiles.apply_credit(entry).await? {
            CreditOutcome::Applied(profile) => {
                info!(
                    "+{} AP to {} for mission {} (balance {}, level {})",
                    entry.reward_ap,
                    entry.user_id,
                    entry.mission_id,
                    profile.aura_points,
                    profile.level
                );
                Ok(CreditReceipt {
                    entry_id: entry.id,
                    points_awarded: entry.reward_ap,
                    new_balance: profile.aura_points,
                    new_level: profile.level,
                    newly_applied: true,
                })
            }
            CreditOutcome::AlreadySettled(profile) => Ok(CreditReceipt {
                entry_id: entry.id,
                points_awarded: entry.reward_ap,
                new_balance: profile.aura_points,
                new_level: profile.level,
                newly_applied: false,
            }),
            CreditOutcome::ProfileMissing => {
                warn!(
                    "Cannot credit entry {}: profile {} not found",
                    entry.id, entry.user_id
                );
                Err(CreditError::ProfileNotFound(entry.user_id.clone()))
            }
        }
    }
}

// ============================================================================
// LOCAL PREVIEW
// ============================================================================

/// Projected balance if a reward were credited. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsPreview {
    pub balance: i64,
    pub level: i64,
    pub levels_gained: i64,
}

pub fn preview_credit(current_points: i64, reward_ap: i64) -> PointsPreview {
    let balance = current_points.max(0).saturating_add(reward_ap.max(0));
    let level = level_for_points(balance);
    PointsPreview {
        balance,
        level,
        levels_gained: level - level_for_points(current_points),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppendOutcome, NewLedgerEntry, NewMission, NewProfile};
    use crate::store::{LedgerStore, MissionRegistry, SqliteStore};

    async fn setup() -> (Arc<SqliteStore>, RewardAccountant) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .create_profile(NewProfile {
                id: "u1".to_string(),
                username: "legend".to_string(),
                bio: None,
                avatar_url: None,
            })
            .await
            .unwrap();
        store
            .create_mission(NewMission {
                id: Some("m1".to_string()),
                title: "Solar grid".to_string(),
                description: String::new(),
                mission_type: "Civic".to_string(),
                image_url: None,
                host_user_id: None,
                reward_ap: 700,
            })
            .await
            .unwrap();
        let accountant = RewardAccountant::new(store.clone());
        (store, accountant)
    }

    async fn append(store: &SqliteStore, status: ProofStatus, user: &str) -> LedgerEntry {
        let outcome = store
            .append(
                NewLedgerEntry {
                    user_id: user.to_string(),
                    mission_id: "m1".to_string(),
                    evidence_reference: "https://cdn/e.jpg".to_string(),
                    status,
                    reward_ap: 700,
                    reason: None,
                },
                false,
            )
            .await
            .unwrap();
        match outcome {
            AppendOutcome::Recorded(entry) => entry,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_credit_verified_entry() {
        let (store, accountant) = setup().await;
        let entry = append(&store, ProofStatus::Verified, "u1").await;

        let receipt = tokio_test::assert_ok!(accountant.credit(&entry).await);
        assert!(receipt.newly_applied);
        assert_eq!(receipt.points_awarded, 700);
        assert_eq!(receipt.new_balance, 700);
        assert_eq!(receipt.new_level, 1);

        let again = tokio_test::assert_ok!(accountant.credit(&entry).await);
        assert!(!again.newly_applied);
        assert_eq!(again.new_balance, 700);
    }

    #[tokio::test]
    async fn test_refuses_rejected_entry() {
        let (store, accountant) = setup().await;
        let entry = append(&store, ProofStatus::Rejected, "u1").await;

        assert!(matches!(
            accountant.credit(&entry).await,
            Err(CreditError::NotVerified(id)) if id == entry.id
        ));
        assert!(store.unsettled_entries(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refuses_non_positive_amount() {
        let (store, accountant) = setup().await;
        let mut entry = append(&store, ProofStatus::Verified, "u1").await;
        entry.reward_ap = 0;

        assert!(matches!(
            accountant.credit(&entry).await,
            Err(CreditError::NonPositiveAmount(0))
        ));
    }

    #[tokio::test]
    async fn test_missing_profile() {
        let (store, accountant) = setup().await;
        let entry = append(&store, ProofStatus::Verified, "ghost").await;

        assert!(matches!(
            accountant.credit(&entry).await,
            Err(CreditError::ProfileNotFound(ref u)) if u == "ghost"
        ));
    }

    #[test]
    fn test_preview_credit() {
        assert_eq!(
            preview_credit(500, 700),
            PointsPreview {
                balance: 1200,
                level: 2,
                levels_gained: 1
            }
        );
        assert_eq!(preview_credit(999, 1).level, 2);
        assert_eq!(preview_credit(0, 300).levels_gained, 0);
        assert_eq!(preview_credit(25_000, 5000).level, 31);
    }
}
