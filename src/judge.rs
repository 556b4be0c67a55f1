//! Authenticity judges
//!
//! A judge looks at a mission and an evidence reference and returns a
//! verdict. It never touches the ledger or balances.
//!
//! `StubJudge` is a placeholder: it ignores the evidence and answers
//! "authentic" with a fixed probability. `HttpJudge` delegates to an
//! external verification service.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::JudgeConfig;
use crate::models::Mission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictOutcome {
    Authentic,
    NotAuthentic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: VerdictOutcome,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn authentic(reason: Option<String>) -> Self {
        Self {
            outcome: VerdictOutcome::Authentic,
            reason,
        }
    }

    pub fn not_authentic(reason: impl Into<String>) -> Self {
        Self {
            outcome: VerdictOutcome::NotAuthentic,
            reason: Some(reason.into()),
        }
    }

    pub fn is_authentic(&self) -> bool {
        self.outcome == VerdictOutcome::Authentic
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge request failed: {0}")]
    Transport(String),

    #[error("judge returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("judge response malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait AuthenticityJudge: Send + Sync {
    async fn judge(&self, mission: &Mission, evidence_reference: &str)
        -> Result<Verdict, JudgeError>;

    fn name(&self) -> &str;
}

// ============================================================================
// STUB JUDGE
// ============================================================================

/// Simulated judge. Evidence content is not inspected.
pub struct StubJudge {
    authentic_probability: f64,
}

impl StubJudge {
    pub fn new(authentic_probability: f64) -> Self {
        Self {
            authentic_probability: authentic_probability.clamp(0.0, 1.0),
        }
    }

    pub fn always_authentic() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl AuthenticityJudge for StubJudge {
    async fn judge(
        &self,
        mission: &Mission,
        _evidence_reference: &str,
    ) -> Result<Verdict, JudgeError> {
        let roll: f64 = rand::thread_rng().gen();
        let verdict = if roll < self.authentic_probability {
            Verdict::authentic(Some("Simulated verification passed".to_string()))
        } else {
            Verdict::not_authentic("Simulated verification flagged the evidence")
        };
        debug!(
            "Stub judge verdict for mission {}: {:?}",
            mission.id, verdict.outcome
        );
        Ok(verdict)
    }

    fn name(&self) -> &str {
        "stub"
    }
}

// ============================================================================
// HTTP JUDGE
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JudgeRequest<'a> {
    mission_id: &'a str,
    mission_title: &'a str,
    mission_type: &'a str,
    evidence_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct JudgeResponse {
    authentic: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Remote judge reached over HTTP
pub struct HttpJudge {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpJudge {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl AuthenticityJudge for HttpJudge {
    async fn judge(
        &self,
        mission: &Mission,
        evidence_reference: &str,
    ) -> Result<Verdict, JudgeError> {
        let request = JudgeRequest {
            mission_id: &mission.id,
            mission_title: &mission.title,
            mission_type: &mission.mission_type,
            evidence_reference,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Judge endpoint returned {}", status);
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: JudgeResponse = resp
            .json()
            .await
            .map_err(|e| JudgeError::Malformed(e.to_string()))?;

        Ok(if parsed.authentic {
            Verdict::authentic(parsed.reason)
        } else {
            Verdict::not_authentic(
                parsed
                    .reason
                    .unwrap_or_else(|| "Evidence did not pass verification".to_string()),
            )
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Build the judge selected in configuration
pub fn judge_from_config(config: &JudgeConfig) -> anyhow::Result<Box<dyn AuthenticityJudge>> {
    match config.kind.as_str() {
        "stub" => Ok(Box::new(StubJudge::new(config.authentic_probability))),
        "http" => {
            let endpoint = config
                .endpoint()
                .ok_or_else(|| anyhow::anyhow!("judge.kind = \"http\" requires an endpoint"))?;
            Ok(Box::new(HttpJudge::new(
                endpoint,
                Duration::from_secs(config.request_timeout_secs),
            )))
        }
        other => anyhow::bail!("Unknown judge kind: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mission() -> Mission {
        Mission {
            id: "m1".to_string(),
            title: "Ocean Plastic Sentinel".to_string(),
            description: String::new(),
            mission_type: "Environmental".to_string(),
            image_url: None,
            host_user_id: None,
            reward_ap: 2500,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stub_always_authentic() {
        let judge = StubJudge::always_authentic();
        for _ in 0..20 {
            let verdict = judge.judge(&mission(), "https://e/1.jpg").await.unwrap();
            assert!(verdict.is_authentic());
        }
    }

    #[tokio::test]
    async fn test_stub_never_authentic() {
        let judge = StubJudge::new(0.0);
        let verdict = judge.judge(&mission(), "https://e/1.jpg").await.unwrap();
        assert_eq!(verdict.outcome, VerdictOutcome::NotAuthentic);
        assert!(verdict.reason.is_some());
    }

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(StubJudge::new(3.0).authentic_probability, 1.0);
        assert_eq!(StubJudge::new(-1.0).authentic_probability, 0.0);
    }

    #[test]
    fn test_judge_from_config() {
        let mut config = JudgeConfig::default();
        assert_eq!(judge_from_config(&config).unwrap().name(), "stub");

        config.kind = "http".to_string();
        config.endpoint = String::new();
        assert!(judge_from_config(&config).is_err());

        config.endpoint = "http://localhost:9000/judge".to_string();
        assert_eq!(judge_from_config(&config).unwrap().name(), "http");

        config.kind = "oracle".to_string();
        assert!(judge_from_config(&config).is_err());
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict::not_authentic("blurry");
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["outcome"], "not-authentic");
        assert_eq!(json["reason"], "blurry");
    }
}
