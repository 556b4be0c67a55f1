//! Submit Wizard - Interactive proof-of-impact submission
//!
//! Picks a mission, uploads the evidence, shows the reward preview and
//! asks the server to verify. Any value passed on the command line skips
//! its prompt.

use anyhow::{bail, Context, Result};
use aura_impact::models::{Mission, NewProfile, Profile};
use aura_impact::orchestrator::{VerifyImpactRequest, VerifyImpactResponse};
use aura_impact::preview_credit;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::client::AuraClient;
use crate::style::{format_ap, truncate_middle};

pub struct SubmitArgs {
    pub user: Option<String>,
    pub mission: Option<String>,
    pub evidence: Option<String>,
    pub skip_confirm: bool,
}

pub async fn run_submit_wizard(server_url: &str, args: SubmitArgs) -> Result<()> {
    crate::print_banner();
    println!("{}", style("  Proof of Impact").cyan().bold());
    println!(
        "  {}",
        style("Show what you did, earn Aura Points").dim()
    );
    println!();

    let client = AuraClient::new(server_url);

    // Step 1: Who is submitting
    println!("  {}", style("Step 1: Your Profile").bold());
    println!();
    let profile = resolve_profile(&client, args.user).await?;
    println!(
        "  {} {} · {} · level {}",
        style("✓").green(),
        style(&profile.username).cyan(),
        format_ap(profile.aura_points),
        profile.level
    );

    // Step 2: Mission
    println!();
    println!("  {}", style("Step 2: Choose a Mission").bold());
    println!();
    let missions = client.list_missions().await?;
    let mission = pick_mission(&missions, args.mission.as_deref())?;
    println!(
        "  {} {} ({})",
        style("✓").green(),
        style(&mission.title).cyan(),
        format_ap(mission.reward_ap)
    );

    // Step 3: Evidence
    println!();
    println!("  {}", style("Step 3: Evidence").bold());
    println!("  {}", style("A photo or video file, or an uploaded evidence URL").dim());
    println!();
    let evidence = match args.evidence {
        Some(evidence) => evidence,
        None => Input::with_theme(&ColorfulTheme::default())
            .with_prompt("  Evidence")
            .validate_with(|input: &String| -> Result<(), &str> {
                let input = input.trim();
                if input.is_empty() {
                    return Err("Evidence cannot be empty");
                }
                if !is_url(input) && !Path::new(input).is_file() {
                    return Err("Not a file or http(s) URL");
                }
                Ok(())
            })
            .interact_text()?,
    };
    let evidence_reference = upload_if_file(&client, evidence.trim()).await?;
    println!(
        "  {} {}",
        style("✓").green(),
        style(truncate_middle(&evidence_reference, 60)).dim()
    );

    // Step 4: Preview and confirm
    let preview = preview_credit(profile.aura_points, mission.reward_ap);
    println!();
    println!("  {}", style("If verified").bold());
    println!("  {}", style("─".repeat(40)).dim());
    println!(
        "  Balance:  {} → {}",
        format_ap(profile.aura_points),
        style(format_ap(preview.balance)).green()
    );
    println!(
        "  Level:    {} → {}",
        profile.level,
        style(preview.level).green()
    );
    println!("  {}", style("(preview, not yet credited)").dim());
    println!();

    if !args.skip_confirm {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("  Submit for verification?")
            .default(true)
            .interact()?;
        if !confirmed {
            println!();
            println!("  {} Submission cancelled", style("✗").red());
            return Ok(());
        }
    }

    // Step 5: Verify
    println!();
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message("Verifying evidence...");
    pb.enable_steady_tick(Duration::from_millis(80));

    let request = VerifyImpactRequest::new(&profile.id, &mission.id, &evidence_reference);
    let result = client.verify_impact(&request).await;
    pb.finish_and_clear();

    match result? {
        VerifyImpactResponse::Verified {
            points_awarded,
            new_balance,
            new_level,
            ..
        } => {
            println!("  {}", style("═".repeat(50)).dim());
            println!();
            println!(
                "  {} Impact verified! +{}",
                style("✓").green().bold(),
                format_ap(points_awarded)
            );
            println!();
            println!("  Balance:  {}", style(format_ap(new_balance)).cyan());
            println!("  Level:    {}", style(new_level).cyan());
            if new_level > profile.level {
                println!();
                println!("  {} Level up!", style("★").yellow().bold());
            }
            println!();
        }
        VerifyImpactResponse::Rejected { reason, .. } => {
            println!(
                "  {} Evidence not accepted: {}",
                style("⚠").yellow(),
                reason
            );
            println!();
            println!("  You can submit new evidence for this mission.");
        }
        VerifyImpactResponse::Error {
            error_kind,
            message,
            retryable,
            ..
        } => {
            println!("  {} {}: {}", style("✗").red(), error_kind, message);
            if error_kind == "CreditApplicationFailed" {
                println!();
                println!("  Your proof is recorded; the reward will be applied shortly.");
            } else if retryable {
                println!();
                println!("  This is temporary. Try again in a moment.");
            }
        }
    }

    Ok(())
}

async fn resolve_profile(client: &AuraClient, user: Option<String>) -> Result<Profile> {
    let user_id = match user {
        Some(user) => user,
        None => Input::with_theme(&ColorfulTheme::default())
            .with_prompt("  User id")
            .validate_with(|input: &String| -> Result<(), &str> {
                if input.trim().is_empty() {
                    return Err("User id cannot be empty");
                }
                Ok(())
            })
            .interact_text()?,
    };
    let user_id = user_id.trim().to_string();

    if let Some(profile) = client.get_profile(&user_id).await? {
        return Ok(profile);
    }

    println!("  {} No profile for '{}'", style("ℹ").cyan(), user_id);
    let create = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("  Create one now?")
        .default(true)
        .interact()?;
    if !create {
        bail!("A profile is required to earn Aura Points");
    }

    let username: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("  Username")
        .default(user_id.clone())
        .interact_text()?;

    client
        .create_profile(&NewProfile {
            id: user_id,
            username: username.trim().to_string(),
            bio: None,
            avatar_url: None,
        })
        .await
}

fn pick_mission<'a>(missions: &'a [Mission], wanted: Option<&str>) -> Result<&'a Mission> {
    if missions.is_empty() {
        bail!("No missions available");
    }

    if let Some(id) = wanted {
        return missions
            .iter()
            .find(|m| m.id == id)
            .with_context(|| format!("Mission '{}' not found", id));
    }

    let items: Vec<String> = missions
        .iter()
        .map(|m| format!("{} ({}) · {}", m.title, format_ap(m.reward_ap), m.mission_type))
        .collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("  Mission")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(&missions[selection])
}

fn is_url(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://")
}

/// Files are uploaded first; URLs are used as-is
async fn upload_if_file(client: &AuraClient, evidence: &str) -> Result<String> {
    if is_url(evidence) {
        return Ok(evidence.to_string());
    }

    let path = Path::new(evidence);
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "evidence".to_string());

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Uploading {}...", filename));
    pb.enable_steady_tick(Duration::from_millis(80));

    let stored = client.upload_evidence(bytes, &filename).await;
    pb.finish_and_clear();

    Ok(stored?.public_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mission(id: &str) -> Mission {
        Mission {
            id: id.to_string(),
            title: format!("Mission {}", id),
            description: String::new(),
            mission_type: "Civic".to_string(),
            image_url: None,
            host_user_id: None,
            reward_ap: 2500,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pick_mission_by_id() {
        let missions = vec![mission("f1"), mission("f2")];
        assert_eq!(pick_mission(&missions, Some("f2")).unwrap().id, "f2");
        assert!(pick_mission(&missions, Some("f9")).is_err());
        assert!(pick_mission(&[], Some("f1")).is_err());
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://cdn.example.com/e.jpg"));
        assert!(is_url("http://localhost:8080/evidence/1-abc-x.jpg"));
        assert!(!is_url("./photos/tree.jpg"));
    }
}
