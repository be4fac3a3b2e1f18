//! Trials command - find namespaces eligible for a trial.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::warn;

use super::open_state;
use crate::local::{CacheStore, MemoryCacheStore, RequestContext};
use crate::portal::HttpPortal;
use crate::trials::{FinderParams, TrialEligibleFinder};
use crate::types::{NamespaceId, TrialType, UserId};

#[derive(Args)]
pub struct TrialsCmd {
    #[command(subcommand)]
    pub command: TrialsSubCmd,
}

#[derive(Subcommand)]
pub enum TrialsSubCmd {
    /// List namespaces that may start a trial
    Eligible(EligibleCmd),
}

#[derive(Args)]
pub struct EligibleCmd {
    /// Check the root groups this user owns
    #[arg(long, conflicts_with = "namespaces", required_unless_present = "namespaces")]
    pub user: Option<UserId>,

    /// Check these namespaces
    #[arg(long = "namespace", num_args = 1..)]
    pub namespaces: Option<Vec<NamespaceId>>,

    /// Only these trial types (free, premium, duo_pro, duo_enterprise)
    #[arg(long = "trial-type", num_args = 1..)]
    pub trial_types: Option<Vec<TrialType>>,

    /// Neither read nor fill the shared cache; always asks the portal
    #[arg(long)]
    pub no_shared_cache: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl TrialsCmd {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            TrialsSubCmd::Eligible(cmd) => cmd.run().await,
        }
    }
}

impl EligibleCmd {
    async fn run(&self) -> Result<()> {
        let state = open_state().await?;
        let portal = HttpPortal::from_config(state.config())
            .context("Subscription portal not configured. Run: seatcap config set-portal")?;

        let namespaces = match &self.namespaces {
            Some(ids) => {
                let found = state.db().namespaces_by_ids(ids).await?;
                for id in ids {
                    if !found.iter().any(|ns| ns.id == *id) {
                        warn!(namespace_id = *id, "namespace not found, skipping");
                    }
                }
                Some(found)
            }
            None => None,
        };

        let cache: Arc<dyn CacheStore> = if self.no_shared_cache {
            Arc::new(MemoryCacheStore::new())
        } else {
            state.cache()
        };

        let finder = TrialEligibleFinder::new(
            state.db().clone(),
            cache,
            Arc::new(portal),
            FinderParams {
                user: self.user,
                namespaces,
                trial_types: self.trial_types.clone(),
            },
        )?;
        let results = finder.execute(&RequestContext::new()).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }

        if results.is_empty() {
            println!("No eligible namespaces.");
            return Ok(());
        }

        for result in &results {
            let types: Vec<&str> = result.trial_types.iter().map(TrialType::as_str).collect();
            println!(
                "#{} {} ({}): {}",
                result.namespace.id,
                result.namespace.name,
                result.namespace.path,
                types.join(", ")
            );
        }

        Ok(())
    }
}
