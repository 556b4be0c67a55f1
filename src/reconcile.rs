//! Credit reconciliation
//!
//! Finds verified ledger entries whose credit never settled and retries it.
//! Settlement is idempotent per entry, so a sweep racing a live request or
//! another sweep cannot double-credit.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::accountant::{CreditError, RewardAccountant};
use crate::store::LedgerStore;

/// Credits in flight at once during a sweep
const SWEEP_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub examined: usize,
    pub credited: usize,
    /// Settled concurrently by another path
    pub already_settled: usize,
    pub still_pending: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    ledger: Arc<dyn LedgerStore>,
    accountant: RewardAccountant,
}

impl Reconciler {
    pub fn new(ledger: Arc<dyn LedgerStore>, accountant: RewardAccountant) -> Self {
        Self { ledger, accountant }
    }

    /// One sweep over at most `batch_size` unsettled entries
    pub async fn run_once(&self, batch_size: usize) -> anyhow::Result<ReconcileReport> {
        let pending = self.ledger.unsettled_entries(batch_size).await?;
        let mut report = ReconcileReport {
            examined: pending.len(),
            ..Default::default()
        };

        let results: Vec<_> = stream::iter(pending)
            .map(|entry| {
                let accountant = self.accountant.clone();
                async move {
                    let result = accountant.credit(&entry).await;
                    (entry, result)
                }
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        for (entry, result) in results {
            match result {
                Ok(receipt) if receipt.newly_applied => {
                    info!(
                        "Reconciled entry {}: +{} AP to {}",
                        entry.id, receipt.points_awarded, entry.user_id
                    );
                    report.credited += 1;
                }
                Ok(_) => report.already_settled += 1,
                Err(CreditError::ProfileNotFound(user)) => {
                    warn!("Entry {} still pending: profile {} not found", entry.id, user);
                    report.still_pending += 1;
                }
                Err(e) => {
                    error!("Entry {} still pending: {}", entry.id, e);
                    report.still_pending += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                "Reconcile sweep: {} examined, {} credited, {} pending",
                report.examined, report.credited, report.still_pending
            );
        }
        Ok(report)
    }

    /// Sweep forever on a fixed interval
    pub async fn run_every(self, interval: Duration, batch_size: usize) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once(batch_size).await {
                error!("Reconcile sweep failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppendOutcome, NewLedgerEntry, NewMission, NewProfile, ProofStatus};
    use crate::store::{MissionRegistry, ProfileStore, SqliteStore};

    async fn setup() -> (Arc<SqliteStore>, Reconciler) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        for (id, reward) in [("m1", 700), ("m2", 300)] {
            store
                .create_mission(NewMission {
                    id: Some(id.to_string()),
                    title: format!("Mission {}", id),
                    description: String::new(),
                    mission_type: "Civic".to_string(),
                    image_url: None,
                    host_user_id: None,
                    reward_ap: reward,
                })
                .await
                .unwrap();
        }
        let reconciler = Reconciler::new(store.clone(), RewardAccountant::new(store.clone()));
        (store, reconciler)
    }

    async fn profile(store: &SqliteStore, id: &str) {
        store
            .create_profile(NewProfile {
                id: id.to_string(),
                username: id.to_string(),
                bio: None,
                avatar_url: None,
            })
            .await
            .unwrap();
    }

    async fn verified(store: &SqliteStore, user: &str, mission: &str, reward: i64) {
        let outcome = store
            .append(
                NewLedgerEntry {
                    user_id: user.to_string(),
                    mission_id: mission.to_string(),
                    evidence_reference: "https://cdn/e.jpg".to_string(),
                    status: ProofStatus::Verified,
                    reward_ap: reward,
                    reason: None,
                },
                true,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, AppendOutcome::Recorded(_)));
    }

    #[tokio::test]
    async fn test_sweep_credits_unsettled_entries() {
        let (store, reconciler) = setup().await;
        profile(&store, "u1").await;
        verified(&store, "u1", "m1", 700).await;
        verified(&store, "u1", "m2", 300).await;

        let report = reconciler.run_once(100).await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                examined: 2,
                credited: 2,
                already_settled: 0,
                still_pending: 0
            }
        );

        let p = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!((p.aura_points, p.level), (1000, 2));

        // Nothing left, and a second sweep changes nothing
        assert_eq!(reconciler.run_once(100).await.unwrap().examined, 0);
        let p = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(p.aura_points, 1000);
    }

    #[tokio::test]
    async fn test_missing_profile_stays_pending_until_created() {
        let (store, reconciler) = setup().await;
        verified(&store, "late", "m1", 700).await;

        let report = reconciler.run_once(100).await.unwrap();
        assert_eq!(report.still_pending, 1);
        assert_eq!(store.unsettled_entries(10).await.unwrap().len(), 1);

        profile(&store, "late").await;
        let report = reconciler.run_once(100).await.unwrap();
        assert_eq!(report.credited, 1);
        let p = store.get_profile("late").await.unwrap().unwrap();
        assert_eq!(p.aura_points, 700);
    }

    #[tokio::test]
    async fn test_batch_size_limits_sweep() {
        let (store, reconciler) = setup().await;
        profile(&store, "u1").await;
        profile(&store, "u2").await;
        verified(&store, "u1", "m1", 700).await;
        verified(&store, "u2", "m1", 700).await;

        assert_eq!(reconciler.run_once(1).await.unwrap().credited, 1);
        assert_eq!(reconciler.run_once(1).await.unwrap().credited, 1);
        assert_eq!(reconciler.run_once(1).await.unwrap().examined, 0);
    }
}
