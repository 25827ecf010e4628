//! CLI commands for the surge trading engine.

pub mod paper;
pub mod show_config;

pub use paper::{run_paper, PaperArgs};
pub use show_config::{run_show_config, ShowConfigArgs};
