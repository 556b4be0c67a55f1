//! Missions command

use crate::style::*;
use anyhow::Result;

pub async fn run(url: &str) -> Result<()> {
    print_header("Aura Missions");

    let client = crate::client::AuraClient::new(url);
    let missions = client.list_missions().await?;

    if missions.is_empty() {
        print_info("No missions available yet.");
        return Ok(());
    }

    println!();
    println!("{:<10}  {:<32}  {:<14}  {:>10}", "ID", "Title", "Type", "Reward");
    println!("{}", "─".repeat(72));

    for mission in &missions {
        println!(
            "{:<10}  {:<32}  {:<14}  {:>10}",
            style_dim(&truncate_middle(&mission.id, 10)),
            truncate_middle(&mission.title, 32),
            mission.mission_type,
            style_green(&format_ap(mission.reward_ap))
        );
    }

    println!();
    println!("Submit proof with:");
    println!("  aura submit --mission <ID> --evidence <file>");

    Ok(())
}
