//! Aura Impact API Client
//!
//! Thin HTTP client over the aura-server endpoints.

use anyhow::{anyhow, Result};
use aura_impact::models::{LeaderboardEntry, LedgerEntry, Mission, NewProfile, Profile};
use aura_impact::orchestrator::{VerifyImpactRequest, VerifyImpactResponse};
use aura_impact::StoredEvidence;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

// Covers a slow judge plus the ledger write
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AuraClient {
    client: Client,
    base_url: String,
}

impl AuraClient {
    pub fn new(server_url: &str) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url, path)
    }

    fn upload_url(&self, filename: &str) -> String {
        self.api_url(&format!(
            "evidence?filename={}",
            urlencoding::encode(filename)
        ))
    }

    pub async fn upload_evidence(&self, bytes: Vec<u8>, filename: &str) -> Result<StoredEvidence> {
        let resp = self
            .client
            .post(self.upload_url(filename))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        match read_verify_response(resp).await? {
            VerifyImpactResponse::Error { message, .. } => {
                Err(anyhow!("Upload failed ({}): {}", status, message))
            }
            other => Err(anyhow!("Upload failed ({}): {:?}", status, other)),
        }
    }

    /// Verification outcome; error outcomes come back as `Ok(Error { .. })`
    pub async fn verify_impact(&self, request: &VerifyImpactRequest) -> Result<VerifyImpactResponse> {
        let resp = self
            .client
            .post(self.api_url("verify-impact"))
            .json(request)
            .send()
            .await?;
        read_verify_response(resp).await
    }

    pub async fn list_missions(&self) -> Result<Vec<Mission>> {
        let resp = self.client.get(self.api_url("missions")).send().await?;
        json_or_error(resp, "Failed to fetch missions").await
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let url = self.api_url(&format!("profiles/{}", urlencoding::encode(user_id)));
        let resp = self.client.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        json_or_error(resp, "Failed to fetch profile").await.map(Some)
    }

    pub async fn create_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let body = serde_json::json!({
            "id": profile.id,
            "username": profile.username,
            "bio": profile.bio,
            "avatar_url": profile.avatar_url,
        });
        let resp = self
            .client
            .post(self.api_url("profiles"))
            .json(&body)
            .send()
            .await?;
        json_or_error(resp, "Failed to create profile").await
    }

    pub async fn get_proofs(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let url = self.api_url(&format!(
            "profiles/{}/proofs?limit={}",
            urlencoding::encode(user_id),
            limit
        ));
        let resp = self.client.get(&url).send().await?;
        json_or_error(resp, "Failed to fetch proofs").await
    }

    pub async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let url = self.api_url(&format!("leaderboard?limit={}", limit));
        let resp = self.client.get(&url).send().await?;
        json_or_error(resp, "Failed to fetch leaderboard").await
    }

    pub async fn get_config(&self) -> Result<serde_json::Value> {
        let resp = self.client.get(self.api_url("config")).send().await?;
        json_or_error(resp, "Failed to fetch config").await
    }
}

async fn json_or_error<T: DeserializeOwned>(resp: Response, context: &str) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp.json().await?)
    } else {
        let error_text = resp.text().await.unwrap_or_else(|_| "Unknown error".into());
        Err(anyhow!("{} ({}): {}", context, status, error_text))
    }
}

async fn read_verify_response(resp: Response) -> Result<VerifyImpactResponse> {
    let status = resp.status();
    let text = resp.text().await?;
    serde_json::from_str(&text)
        .map_err(|_| anyhow!("Unexpected response ({}): {}", status, text))
}
