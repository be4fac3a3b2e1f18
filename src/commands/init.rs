//! Init command - create the .seatcap directory and database.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::local::{self, LocalState};

#[derive(Args)]
pub struct InitCmd {
    /// Directory to create .seatcap in (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

impl InitCmd {
    pub async fn run(&self) -> Result<()> {
        let data_dir = self.path.join(local::DATA_DIR_NAME);

        if data_dir.exists() {
            println!("Already initialized: {}", data_dir.display());
        } else {
            std::fs::create_dir_all(&data_dir).context("Failed to create .seatcap directory")?;
            println!("Created {}", data_dir.display());
        }

        // Opening runs migrations.
        let state = LocalState::open(&data_dir).await?;
        let settings = state.config().cap_settings();

        println!(
            "Free user cap: {} (limit {})",
            if settings.enabled { "enabled" } else { "disabled" },
            settings.limit
        );
        if !state.config().has_portal_credentials() {
            println!("Portal credentials not set. Run: seatcap config set-portal");
        }

        Ok(())
    }
}
