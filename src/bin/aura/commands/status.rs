//! Status command - balance, level and recent proofs

use crate::style::*;
use anyhow::Result;
use aura_impact::models::{ProofStatus, POINTS_PER_LEVEL};

pub async fn run(url: &str, user_id: &str, limit: usize) -> Result<()> {
    print_header("Aura Status");

    let client = crate::client::AuraClient::new(url);

    let Some(profile) = client.get_profile(user_id).await? else {
        print_warning(&format!("No profile found for '{}'.", user_id));
        println!();
        println!("Create one by submitting your first proof:");
        println!("  aura submit --user {}", user_id);
        return Ok(());
    };

    let next_level_at = profile.level * POINTS_PER_LEVEL;
    println!();
    println!("Username:      {}", style_cyan(&profile.username));
    println!("Aura Points:   {}", style_bold(&format_ap(profile.aura_points)));
    println!("Level:         {}", style_green(&profile.level.to_string()));
    println!(
        "Next level:    {}",
        style_dim(&format!(
            "{} to go",
            format_ap(next_level_at - profile.aura_points)
        ))
    );

    let proofs = client.get_proofs(user_id, limit).await?;
    if proofs.is_empty() {
        println!();
        print_info("No proofs submitted yet.");
        return Ok(());
    }

    println!();
    println!("{}", style_bold("Recent proofs:"));
    for entry in &proofs {
        let (marker, detail) = match entry.status {
            ProofStatus::Verified => (style_green("✓"), format!("+{}", format_ap(entry.reward_ap))),
            ProofStatus::Rejected => (
                style_red("✗"),
                entry.reason.clone().unwrap_or_else(|| "rejected".to_string()),
            ),
        };
        println!(
            "  {} {}  {:<10}  {}",
            marker,
            style_dim(&entry.verified_at.format("%Y-%m-%d %H:%M").to_string()),
            entry.mission_id,
            detail
        );
    }

    Ok(())
}
