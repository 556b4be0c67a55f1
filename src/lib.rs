//! Aura Impact - Proof-of-impact verification and Aura Point rewards
//!
//! Participants complete real-world missions, upload evidence and earn
//! Aura Points (AP) when the evidence is judged authentic.
//!
//! # How it works
//!
//! 1. Evidence is uploaded to the evidence store and referenced by URL
//! 2. `POST /verify-impact` names the user, mission and evidence reference
//! 3. The authenticity judge returns a verdict for the mission
//! 4. Every verdict is appended to the immutable proof ledger
//! 5. Verified entries credit the mission reward; level = AP / 1000 + 1
//!
//! # Guarantees
//!
//! - Balances only move through a settled ledger entry, once per entry
//! - Credits are in-database increments, so concurrent rewards all land
//! - A verified entry whose credit failed is picked up by the reconciler
//! - With `once_per_mission`, a user earns each mission's reward once

pub mod accountant;
pub mod config;
pub mod error;
pub mod evidence;
pub mod judge;
pub mod models;
pub mod orchestrator;
pub mod reconcile;
pub mod server;
pub mod store;

pub use accountant::{preview_credit, CreditReceipt, PointsPreview, RewardAccountant};
pub use config::Config;
pub use error::{ApiError, VerifyError};
pub use evidence::{EvidenceStore, LocalEvidenceStore, StoredEvidence};
pub use judge::{judge_from_config, AuthenticityJudge, HttpJudge, StubJudge, Verdict};
pub use models::{level_for_points, LedgerEntry, Mission, Profile, ProofStatus};
pub use orchestrator::{
    ImpactVerifier, VerificationOutcome, VerifierSettings, VerifyImpactRequest,
    VerifyImpactResponse,
};
pub use reconcile::{ReconcileReport, Reconciler};
pub use store::{LedgerStore, MissionRegistry, PgStorage, ProfileStore, SqliteStore, Stores};
