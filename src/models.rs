//! Core records: profiles, missions and proof ledger entries

use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aura Points needed per level
pub const POINTS_PER_LEVEL: i64 = 1000;

/// Level derived from a point balance: `floor(points / 1000) + 1`
pub fn level_for_points(aura_points: i64) -> i64 {
    aura_points.max(0) / POINTS_PER_LEVEL + 1
}

// ============================================================================
// PROFILES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub aura_points: i64,
    pub level: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Display metadata a user may change on their own profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.bio.is_none() && self.avatar_url.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub aura_points: i64,
    pub level: i64,
}

// ============================================================================
// MISSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub description: String,
    pub mission_type: String,
    pub image_url: Option<String>,
    pub host_user_id: Option<String>,
    pub reward_ap: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMission {
    /// Assigned by the registry when absent
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_mission_type")]
    pub mission_type: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub host_user_id: Option<String>,
    pub reward_ap: i64,
}

fn default_mission_type() -> String {
    "Environmental".to_string()
}

impl NewMission {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Mission title cannot be empty".to_string());
        }
        if self.reward_ap <= 0 {
            return Err(format!(
                "Mission reward must be positive (got {})",
                self.reward_ap
            ));
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err("Mission id cannot be blank".to_string());
            }
        }
        Ok(())
    }
}

/// Result of trying to change a mission's reward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardUpdate {
    Updated(Mission),
    /// A verified proof already settled against the current reward
    Locked,
    NotFound,
}

// ============================================================================
// PROOF LEDGER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "lowercase")]
#[postgres(name = "proof_status")]
pub enum ProofStatus {
    #[postgres(name = "verified")]
    Verified,
    #[postgres(name = "rejected")]
    Rejected,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Verified => "verified",
            ProofStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ProofStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(ProofStatus::Verified),
            "rejected" => Ok(ProofStatus::Rejected),
            other => Err(format!("unknown proof status: {}", other)),
        }
    }
}

impl std::fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one verification attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    pub mission_id: String,
    pub evidence_reference: String,
    pub status: ProofStatus,
    /// Mission reward at the time of the verdict
    pub reward_ap: i64,
    pub reason: Option<String>,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub mission_id: String,
    pub evidence_reference: String,
    pub status: ProofStatus,
    pub reward_ap: i64,
    pub reason: Option<String>,
}

impl NewLedgerEntry {
    /// Stamp the entry with an id and verdict time
    pub fn into_entry(self) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            mission_id: self.mission_id,
            evidence_reference: self.evidence_reference,
            status: self.status,
            reward_ap: self.reward_ap,
            reason: self.reason,
            verified_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AppendOutcome {
    Recorded(LedgerEntry),
    /// Once-per-mission guard: the user already holds a verified entry
    AlreadyCompleted { prior_entry_id: Uuid },
}

#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Applied(Profile),
    /// The entry was settled by an earlier call; balance untouched
    AlreadySettled(Profile),
    ProfileMissing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for_points(0), 1);
        assert_eq!(level_for_points(500), 1);
        assert_eq!(level_for_points(999), 1);
        assert_eq!(level_for_points(1000), 2);
        assert_eq!(level_for_points(1200), 2);
        assert_eq!(level_for_points(25_000), 26);
    }

    #[test]
    fn test_level_never_below_one() {
        assert_eq!(level_for_points(-50), 1);
    }

    #[test]
    fn test_new_mission_validation() {
        let mut mission = NewMission {
            id: None,
            title: "Beach cleanup".to_string(),
            description: String::new(),
            mission_type: default_mission_type(),
            image_url: None,
            host_user_id: None,
            reward_ap: 700,
        };
        assert!(mission.validate().is_ok());

        mission.reward_ap = 0;
        assert!(mission.validate().is_err());

        mission.reward_ap = 10;
        mission.title = "   ".to_string();
        assert!(mission.validate().is_err());
    }

    #[test]
    fn test_proof_status_strings() {
        assert_eq!("verified".parse::<ProofStatus>(), Ok(ProofStatus::Verified));
        assert_eq!("rejected".parse::<ProofStatus>(), Ok(ProofStatus::Rejected));
        assert!("pending".parse::<ProofStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ProofStatus::Rejected).unwrap(),
            "\"rejected\""
        );
    }
}
