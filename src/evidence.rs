//! Evidence storage
//!
//! Stores uploaded proof images and hands back a stable public URL.
//! Object keys are namespaced by upload time plus a random suffix so two
//! uploads of `photo.jpg` never collide.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::config::EvidenceConfig;

const SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvidence {
    pub public_url: String,
    pub object_key: String,
    pub sha256: String,
    pub size_bytes: usize,
}

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("evidence file is empty")]
    Empty,

    #[error("evidence is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<StoredEvidence, EvidenceError>;
}

/// Replace anything outside `[A-Za-z0-9.]` with `_`
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "evidence".to_string()
    } else {
        cleaned
    }
}

fn object_key(filename: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        suffix,
        sanitize_filename(filename)
    )
}

/// Filesystem-backed store, served by the HTTP server under /evidence
pub struct LocalEvidenceStore {
    root: PathBuf,
    public_base_url: String,
    max_upload_bytes: usize,
}

impl LocalEvidenceStore {
    pub async fn new(config: &EvidenceConfig) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(&config.directory).await?;
        Ok(Self {
            root: config.directory.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl EvidenceStore for LocalEvidenceStore {
    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<StoredEvidence, EvidenceError> {
        if bytes.is_empty() {
            return Err(EvidenceError::Empty);
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(EvidenceError::TooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        let key = object_key(filename);
        tokio::fs::write(self.root.join(&key), bytes).await?;

        let sha256 = hex::encode(Sha256::digest(bytes));
        info!("Stored evidence {} ({} bytes)", key, bytes.len());

        Ok(StoredEvidence {
            public_url: format!("{}/{}", self.public_base_url, key),
            object_key: key,
            sha256,
            size_bytes: bytes.len(),
        })
    }
}
