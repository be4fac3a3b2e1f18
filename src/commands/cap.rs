//! Cap command - inspect free user cap state.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::open_state;
use crate::free_user_cap::{CachePolicy, FreeUserCap};
use crate::local::RequestContext;
use crate::types::NamespaceId;

#[derive(Args)]
pub struct CapCmd {
    #[command(subcommand)]
    pub command: CapSubCmd,
}

#[derive(Subcommand)]
pub enum CapSubCmd {
    /// Show seat usage for a namespace's root group
    Status(StatusCmd),
}

#[derive(Args)]
pub struct StatusCmd {
    pub namespace: NamespaceId,

    /// Recount instead of using the cached users count
    #[arg(long)]
    pub fresh: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CapCmd {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            CapSubCmd::Status(cmd) => cmd.run().await,
        }
    }
}

impl StatusCmd {
    async fn run(&self) -> Result<()> {
        let state = open_state().await?;
        let ctx = RequestContext::new();
        let cap = FreeUserCap::for_namespace(
            state.db().clone(),
            state.cache(),
            state.config().cap_settings(),
            self.namespace,
        )
        .await?;

        if self.fresh {
            // Seeds the request cache that `status` reads from.
            cap.users_count(&ctx, CachePolicy::Bypass).await?;
        }
        let status = cap.status(&ctx).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }

        let root = cap.root();
        println!("Root: #{} {} ({})", root.id, root.name, root.path);
        if !status.enforced {
            println!("Free user cap does not apply ({} members billed).", status.users_count);
            return Ok(());
        }

        println!("Seats: {}/{}", status.users_count, status.limit);
        println!("Remaining: {}", status.remaining_seats);
        if status.over_limit {
            println!("Over the limit.");
        } else if status.at_limit {
            println!("At the limit.");
        } else if status.close_to_limit {
            println!("Close to the limit.");
        }

        Ok(())
    }
}
