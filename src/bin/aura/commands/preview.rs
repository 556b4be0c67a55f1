//! Preview command - local projection, nothing is submitted

use crate::style::*;
use anyhow::{bail, Result};
use aura_impact::{level_for_points, preview_credit};

pub fn run(points: i64, reward: i64) -> Result<()> {
    if points < 0 {
        bail!("Current points cannot be negative");
    }
    if reward <= 0 {
        bail!("Reward must be positive");
    }

    let preview = preview_credit(points, reward);

    print_header("Reward Preview");
    println!();
    println!(
        "Balance:   {} → {}",
        format_ap(points),
        style_green(&format_ap(preview.balance))
    );
    println!(
        "Level:     {} → {}",
        level_for_points(points),
        style_green(&preview.level.to_string())
    );
    if preview.levels_gained > 0 {
        println!();
        print_success(&format!("+{} level(s)", preview.levels_gained));
    }
    println!();
    println!("{}", style_dim("Preview only. Balances change once a proof is verified."));

    Ok(())
}
