//! Config command - show server configuration

use crate::style::*;
use anyhow::{Context, Result};

pub async fn run(url: &str) -> Result<()> {
    print_header("Server Configuration");

    let client = crate::client::AuraClient::new(url);
    let config = client
        .get_config()
        .await
        .context("Failed to connect to server")?;

    println!();
    println!("Server:             {}", style_cyan(url));
    println!(
        "Judge:              {}",
        config["judge"].as_str().unwrap_or("?")
    );
    println!(
        "Judge timeout:      {}s",
        config["judgeTimeoutSecs"].as_u64().unwrap_or(0)
    );
    println!(
        "Once per mission:   {}",
        match config["oncePerMission"].as_bool() {
            Some(true) => style_green("yes"),
            Some(false) => style_yellow("no"),
            None => "?".to_string(),
        }
    );
    if let Some(bytes) = config["maxUploadBytes"].as_u64() {
        println!("Max upload:         {} MiB", bytes / (1024 * 1024));
    }

    println!();
    println!("{}", style_bold("Levels:"));
    println!(
        "  Level = Aura Points / {} + 1",
        config["pointsPerLevel"].as_i64().unwrap_or(1000)
    );

    Ok(())
}
