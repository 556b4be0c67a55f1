//! Aura Impact CLI
//!
//! Command-line interface for submitting proof of impact and checking
//! Aura Point standings.

mod client;
mod commands;
mod style;
mod wizard;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use style::*;

const BANNER: &str = r#"
   █████╗ ██╗   ██╗██████╗  █████╗
  ██╔══██╗██║   ██║██╔══██╗██╔══██╗
  ███████║██║   ██║██████╔╝███████║
  ██╔══██║██║   ██║██╔══██╗██╔══██║
  ██║  ██║╚██████╔╝██║  ██║██║  ██║
  ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝
"#;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "aura")]
#[command(author = "AuraVerse")]
#[command(version)]
#[command(about = "Aura Impact - Prove real-world impact, earn Aura Points", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Aura server URL
    #[arg(
        short,
        long,
        env = "AURA_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    url: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit proof of impact for a mission (default)
    #[command(visible_aliases = ["s", "verify"])]
    Submit {
        /// Your user id
        #[arg(long, env = "AURA_USER")]
        user: Option<String>,

        /// Mission id (prompted when absent)
        #[arg(short, long)]
        mission: Option<String>,

        /// Evidence file to upload, or an existing evidence URL
        #[arg(short, long)]
        evidence: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List available missions
    #[command(visible_alias = "m")]
    Missions,

    /// View the leaderboard
    #[command(visible_alias = "lb")]
    Leaderboard {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a profile's balance, level and recent proofs
    #[command(visible_alias = "st")]
    Status {
        /// User id
        #[arg(long, env = "AURA_USER")]
        user: String,

        /// Number of recent proofs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show server configuration
    Config,

    /// Preview the balance and level after a reward, without submitting
    #[command(visible_alias = "p")]
    Preview {
        /// Current Aura Points
        #[arg(long)]
        points: i64,

        /// Mission reward
        #[arg(long)]
        reward: i64,
    },

    /// Run the Aura Impact server in-process
    Server {
        /// Host to bind
        #[arg(long, env = "AURA_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "AURA_PORT")]
        port: Option<u16>,

        /// Config file
        #[arg(short, long, env = "AURA_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Submit {
        user: None,
        mission: None,
        evidence: None,
        yes: false,
    });

    if cli.verbose || matches!(command, Commands::Server { .. }) {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let result = match command {
        Commands::Submit {
            user,
            mission,
            evidence,
            yes,
        } => {
            wizard::run_submit_wizard(
                &cli.url,
                wizard::SubmitArgs {
                    user,
                    mission,
                    evidence,
                    skip_confirm: yes,
                },
            )
            .await
        }
        Commands::Missions => commands::missions::run(&cli.url).await,
        Commands::Leaderboard { limit } => commands::leaderboard::run(&cli.url, limit).await,
        Commands::Status { user, limit } => commands::status::run(&cli.url, &user, limit).await,
        Commands::Config => commands::config::run(&cli.url).await,
        Commands::Preview { points, reward } => commands::preview::run(points, reward),
        Commands::Server { host, port, config } => {
            print_banner();
            commands::server::run(host, port, config).await
        }
    };

    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

pub fn print_banner() {
    println!("{}", style_cyan(BANNER));
    println!(
        "  {} {}",
        style_dim("Aura Impact"),
        style_dim(&format!("v{}", VERSION))
    );
    println!();
}
