pub mod config;
pub mod leaderboard;
pub mod missions;
pub mod preview;
pub mod server;
pub mod status;
