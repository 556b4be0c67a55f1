//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding settings
//! - Storage backend selection (SQLite file or PostgreSQL via DATABASE_URL)
//! - Verification timeouts and the once-per-mission policy
//! - Authenticity judge selection
//! - Evidence storage location
//! - Seed mission catalog

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::NewMission;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Catalog inserted when the mission registry is empty
    #[serde(default)]
    pub missions: Vec<NewMission>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
///
/// PostgreSQL is used whenever DATABASE_URL is set; otherwise the
/// embedded SQLite file below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("aura.db"),
        }
    }
}

impl DatabaseConfig {
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub judge_timeout_secs: u64,
    pub ledger_timeout_secs: u64,
    /// Credit a mission's reward at most once per user
    pub once_per_mission: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            judge_timeout_secs: 20,
            ledger_timeout_secs: 10,
            once_per_mission: true,
        }
    }
}

impl VerificationConfig {
    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// "stub" or "http"
    pub kind: String,
    /// Probability of an authentic verdict from the stub judge
    pub authentic_probability: f64,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_judge_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_judge_request_timeout() -> u64 {
    15
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            kind: "stub".to_string(),
            authentic_probability: 0.95,
            endpoint: String::new(),
            request_timeout_secs: default_judge_request_timeout(),
        }
    }
}

impl JudgeConfig {
    /// Judge endpoint (env var takes precedence)
    pub fn endpoint(&self) -> Option<String> {
        match std::env::var("AURA_JUDGE_ENDPOINT") {
            Ok(url) if !url.is_empty() => Some(url),
            _ => {
                if self.endpoint.is_empty() {
                    None
                } else {
                    Some(self.endpoint.clone())
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    pub directory: PathBuf,
    pub public_base_url: String,
    pub max_upload_bytes: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("evidence"),
            public_base_url: "http://localhost:8080/evidence".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_size: 100,
        }
    }
}

impl Config {
    /// Load from AURA_CONFIG, then config.toml, then the embedded defaults
    pub fn load() -> Result<Self> {
        let path = std::env::var("AURA_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("AURA_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Some(port) = std::env::var("AURA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.server.port = port;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            verification: VerificationConfig::default(),
            judge: JudgeConfig::default(),
            evidence: EvidenceConfig::default(),
            reconcile: ReconcileConfig::default(),
            missions: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.judge.kind, "stub");
        assert!(config.verification.once_per_mission);
        assert_eq!(config.missions.len(), 3);
        assert!(config.missions.iter().all(|m| m.validate().is_ok()));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Config::load_from("/nonexistent/aura-config.toml").unwrap();
        assert_eq!(config.evidence.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_minimal_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nhost = \"127.0.0.1\"\nport = 9000\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.verification.judge_timeout(), Duration::from_secs(20));
        assert_eq!(config.reconcile.batch_size, 100);
        assert!(config.missions.is_empty());
    }
}
