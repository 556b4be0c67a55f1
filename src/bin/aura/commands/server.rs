//! Server command - run aura-server in-process

use anyhow::Result;
use aura_impact::Config;
use std::path::PathBuf;

pub async fn run(host: Option<String>, port: Option<u16>, config: Option<PathBuf>) -> Result<()> {
    let mut config = match config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    aura_impact::server::serve(config).await
}
