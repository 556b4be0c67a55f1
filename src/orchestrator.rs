//! Verification orchestrator
//!
//! Drives one proof submission through
//! `received -> evidence-checked -> judged -> ledger-recorded -> credited | rejected`.
//!
//! The verifier holds no per-request state; every fact lives in the stores.
//! A verified entry is written before the credit is attempted, and the
//! credit is settled per entry, so a failure between the two steps leaves
//! an unsettled entry for the reconciler instead of a lost reward.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accountant::{CreditReceipt, RewardAccountant};
use crate::config::VerificationConfig;
use crate::error::VerifyError;
use crate::judge::AuthenticityJudge;
use crate::models::{AppendOutcome, LedgerEntry, NewLedgerEntry, ProofStatus};
use crate::store::Stores;

const DEFAULT_REJECTION_REASON: &str = "Evidence did not pass verification";

/// Step a submission is working on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStage {
    LoadingMission,
    LoadingProfile,
    CheckingHistory,
    Judging,
    RecordingLedger,
    Crediting,
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VerificationStage::LoadingMission => "loading the mission",
            VerificationStage::LoadingProfile => "loading the profile",
            VerificationStage::CheckingHistory => "checking prior completions",
            VerificationStage::Judging => "judging evidence",
            VerificationStage::RecordingLedger => "recording the ledger entry",
            VerificationStage::Crediting => "crediting the reward",
        };
        f.write_str(text)
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyImpactRequest {
    #[serde(default, alias = "user_id")]
    pub user_id: String,
    #[serde(default, alias = "mission_id")]
    pub mission_id: String,
    #[serde(default, alias = "evidence_url", alias = "evidence_reference")]
    pub evidence_reference: String,
}

impl VerifyImpactRequest {
    pub fn new(
        user_id: impl Into<String>,
        mission_id: impl Into<String>,
        evidence_reference: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            mission_id: mission_id.into(),
            evidence_reference: evidence_reference.into(),
        }
    }

    /// Trimmed copy, or `InvalidRequest` naming every missing field
    fn normalized(&self) -> Result<Self, VerifyError> {
        let normalized = Self {
            user_id: self.user_id.trim().to_string(),
            mission_id: self.mission_id.trim().to_string(),
            evidence_reference: self.evidence_reference.trim().to_string(),
        };

        let missing: Vec<&str> = [
            ("userId", &normalized.user_id),
            ("missionId", &normalized.mission_id),
            ("evidenceReference", &normalized.evidence_reference),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(VerifyError::InvalidRequest(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }
        Ok(normalized)
    }
}

/// Terminal success states of a submission
#[derive(Debug, Clone)]
pub enum VerificationOutcome {
    Verified {
        entry: LedgerEntry,
        receipt: CreditReceipt,
    },
    Rejected {
        entry: LedgerEntry,
        reason: String,
    },
}

impl VerificationOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            VerificationOutcome::Verified { entry, .. } => entry,
            VerificationOutcome::Rejected { entry, .. } => entry,
        }
    }
}

/// Body returned by `POST /verify-impact`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerifyImpactResponse {
    #[serde(rename_all = "camelCase")]
    Verified {
        points_awarded: i64,
        new_balance: i64,
        new_level: i64,
        ledger_entry_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Rejected {
        reason: String,
        ledger_entry_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        error_kind: String,
        message: String,
        retryable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ledger_entry_id: Option<Uuid>,
    },
}

impl From<&VerificationOutcome> for VerifyImpactResponse {
    fn from(outcome: &VerificationOutcome) -> Self {
        match outcome {
            VerificationOutcome::Verified { entry, receipt } => VerifyImpactResponse::Verified {
                points_awarded: receipt.points_awarded,
                new_balance: receipt.new_balance,
                new_level: receipt.new_level,
                ledger_entry_id: entry.id,
            },
            VerificationOutcome::Rejected { entry, reason } => VerifyImpactResponse::Rejected {
                reason: reason.clone(),
                ledger_entry_id: entry.id,
            },
        }
    }
}

impl From<&VerifyError> for VerifyImpactResponse {
    fn from(err: &VerifyError) -> Self {
        let ledger_entry_id = match err {
            VerifyError::CreditApplicationFailed { entry_id, .. } => Some(*entry_id),
            _ => None,
        };
        VerifyImpactResponse::Error {
            error_kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            ledger_entry_id,
        }
    }
}

// ============================================================================
// VERIFIER
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct VerifierSettings {
    pub judge_timeout: Duration,
    pub ledger_timeout: Duration,
    pub once_per_mission: bool,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self::from(&VerificationConfig::default())
    }
}

impl From<&VerificationConfig> for VerifierSettings {
    fn from(config: &VerificationConfig) -> Self {
        Self {
            judge_timeout: config.judge_timeout(),
            ledger_timeout: config.ledger_timeout(),
            once_per_mission: config.once_per_mission,
        }
    }
}

#[derive(Clone)]
pub struct ImpactVerifier {
    stores: Stores,
    judge: Arc<dyn AuthenticityJudge>,
    accountant: RewardAccountant,
    settings: VerifierSettings,
}

impl ImpactVerifier {
    pub fn new(stores: Stores, judge: Arc<dyn AuthenticityJudge>, settings: VerifierSettings) -> Self {
        let accountant = RewardAccountant::new(stores.profiles.clone());
        Self {
            stores,
            judge,
            accountant,
            settings,
        }
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    pub fn judge_name(&self) -> &str {
        self.judge.name()
    }

    pub fn accountant(&self) -> &RewardAccountant {
        &self.accountant
    }

    /// Run one submission to a terminal state
    pub async fn verify(
        &self,
        request: &VerifyImpactRequest,
    ) -> Result<VerificationOutcome, VerifyError> {
        let request = request.normalized()?;
        debug!(
            "Received proof: user={}, mission={}, evidence={}",
            request.user_id, request.mission_id, request.evidence_reference
        );

        let mission = self
            .stores
            .missions
            .get_mission(&request.mission_id)
            .await
            .map_err(|e| storage_error(VerificationStage::LoadingMission, e))?
            .ok_or_else(|| VerifyError::MissionNotFound(request.mission_id.clone()))?;

        // A verified entry for an unknown user could never be settled
        self.stores
            .profiles
            .get_profile(&request.user_id)
            .await
            .map_err(|e| storage_error(VerificationStage::LoadingProfile, e))?
            .ok_or_else(|| VerifyError::ProfileNotFound(request.user_id.clone()))?;

        if self.settings.once_per_mission
            && self
                .stores
                .ledger
                .has_verified(&request.user_id, &request.mission_id)
                .await
                .map_err(|e| storage_error(VerificationStage::CheckingHistory, e))?
        {
            warn!(
                "Duplicate submission: {} already completed mission {}",
                request.user_id, request.mission_id
            );
            return Err(VerifyError::DuplicateSubmission {
                user_id: request.user_id,
                mission_id: request.mission_id,
            });
        }

        debug!("Judging evidence with {} judge", self.judge.name());
        let verdict = match timeout(
            self.settings.judge_timeout,
            self.judge.judge(&mission, &request.evidence_reference),
        )
        .await
        {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                error!("Judge {} failed: {}", self.judge.name(), e);
                return Err(VerifyError::JudgeUnavailable(e.to_string()));
            }
            Err(_) => {
                error!(
                    "Judge {} timed out after {:?}",
                    self.judge.name(),
                    self.settings.judge_timeout
                );
                return Err(VerifyError::Timeout(VerificationStage::Judging));
            }
        };

        let status = if verdict.is_authentic() {
            ProofStatus::Verified
        } else {
            ProofStatus::Rejected
        };
        let new_entry = NewLedgerEntry {
            user_id: request.user_id.clone(),
            mission_id: mission.id.clone(),
            evidence_reference: request.evidence_reference.clone(),
            status,
            reward_ap: mission.reward_ap,
            reason: verdict.reason.clone(),
        };

        let appended = match timeout(
            self.settings.ledger_timeout,
            self.stores
                .ledger
                .append(new_entry, self.settings.once_per_mission),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("Ledger write failed for {}: {:#}", request.user_id, e);
                return Err(VerifyError::LedgerWriteFailed(format!("{:#}", e)));
            }
            Err(_) => {
                error!("Ledger write timed out after {:?}", self.settings.ledger_timeout);
                return Err(VerifyError::Timeout(VerificationStage::RecordingLedger));
            }
        };

        let entry = match appended {
            AppendOutcome::Recorded(entry) => entry,
            AppendOutcome::AlreadyCompleted { prior_entry_id } => {
                warn!(
                    "Duplicate submission: {} already holds entry {} for mission {}",
                    request.user_id, prior_entry_id, request.mission_id
                );
                return Err(VerifyError::DuplicateSubmission {
                    user_id: request.user_id,
                    mission_id: request.mission_id,
                });
            }
        };

        if entry.status == ProofStatus::Rejected {
            let reason = verdict
                .reason
                .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());
            info!(
                "Proof rejected: user={}, mission={}, entry={}, reason={}",
                entry.user_id, entry.mission_id, entry.id, reason
            );
            return Ok(VerificationOutcome::Rejected { entry, reason });
        }

        let receipt = match timeout(self.settings.ledger_timeout, self.accountant.credit(&entry)).await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                error!(
                    "Entry {} verified but credit failed, left for reconciliation: {:#}",
                    entry.id, e
                );
                return Err(VerifyError::CreditApplicationFailed {
                    entry_id: entry.id,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                error!(
                    "Entry {} verified but credit timed out, left for reconciliation",
                    entry.id
                );
                return Err(VerifyError::CreditApplicationFailed {
                    entry_id: entry.id,
                    message: format!("Timed out while {}", VerificationStage::Crediting),
                });
            }
        };

        info!(
            "Proof verified: user={}, mission={}, entry={}, +{} AP (balance {}, level {})",
            entry.user_id,
            entry.mission_id,
            entry.id,
            receipt.points_awarded,
            receipt.new_balance,
            receipt.new_level
        );
        Ok(VerificationOutcome::Verified { entry, receipt })
    }
}

fn storage_error(stage: VerificationStage, err: anyhow::Error) -> VerifyError {
    error!("Storage failure while {}: {:#}", stage, err);
    VerifyError::StorageUnavailable(format!("failed while {}: {:#}", stage, err))
}
