//! Clean command - remove the .seatcap directory or expired cache entries.

use anyhow::Result;
use clap::Args;

use crate::local;

#[derive(Args)]
pub struct CleanCmd {
    /// Only purge expired shared-cache entries
    #[arg(long)]
    pub expired: bool,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl CleanCmd {
    pub async fn run(&self) -> Result<()> {
        let data_dir = match local::get_data_dir() {
            Some(dir) => dir,
            None => {
                println!("No .seatcap directory found.");
                return Ok(());
            }
        };

        if self.expired {
            let state = local::LocalState::open(&data_dir).await?;
            let purged = state.cache().purge_expired().await?;
            println!("Purged {purged} expired cache entries.");
            return Ok(());
        }

        if !self.yes {
            println!("This will delete: {}", data_dir.display());
            print!("Continue? [y/N] ");
            std::io::Write::flush(&mut std::io::stdout())?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;

            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Aborted.");
                return Ok(());
            }
        }

        std::fs::remove_dir_all(&data_dir)?;
        println!("Removed {}", data_dir.display());

        Ok(())
    }
}
