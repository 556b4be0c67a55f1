//! Leaderboard command

use crate::style::*;
use anyhow::Result;

pub async fn run(url: &str, limit: usize) -> Result<()> {
    print_header("Aura Leaderboard");

    let client = crate::client::AuraClient::new(url);

    match client.get_leaderboard(limit).await {
        Ok(entries) => {
            if entries.is_empty() {
                print_info("No profiles yet.");
                return Ok(());
            }

            println!();
            println!(
                "{:>4}  {:<20}  {:>14}  {:>5}",
                "Rank", "Username", "Aura Points", "Level"
            );
            println!("{}", "─".repeat(50));

            for entry in &entries {
                let rank = format!("#{}", entry.rank);
                let rank_styled = if entry.rank == 1 {
                    style_yellow(&rank)
                } else if entry.rank <= 3 {
                    style_cyan(&rank)
                } else {
                    rank
                };

                println!(
                    "{:>4}  {:<20}  {:>14}  {:>5}",
                    rank_styled,
                    truncate_middle(&entry.username, 20),
                    format_ap(entry.aura_points),
                    entry.level
                );
            }

            println!();
            println!("Showing top {}", entries.len());
        }
        Err(e) => {
            print_error(&format!("Failed to fetch leaderboard: {}", e));
        }
    }

    Ok(())
}
