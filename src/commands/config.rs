//! Config command - manage local configuration.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::local::LocalConfig;

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub command: ConfigSubCmd,
}

#[derive(Subcommand)]
pub enum ConfigSubCmd {
    /// Set the free user limit (default: 5)
    SetLimit(SetLimitCmd),

    /// Turn free user cap enforcement on
    EnableCap,

    /// Turn free user cap enforcement off
    DisableCap,

    /// Remaining seats at which a namespace counts as close to its limit
    SetThreshold(SetThresholdCmd),

    /// Expiry for the cached users count (omit to never expire)
    SetCountTtl(SetCountTtlCmd),

    /// Set subscription portal URL and admin credentials
    SetPortal(SetPortalCmd),

    /// Show current configuration
    Show,
}

#[derive(Args)]
pub struct SetLimitCmd {
    pub limit: u64,
}

#[derive(Args)]
pub struct SetThresholdCmd {
    pub seats: u64,
}

#[derive(Args)]
pub struct SetCountTtlCmd {
    /// Seconds
    pub secs: Option<u64>,
}

#[derive(Args)]
pub struct SetPortalCmd {
    /// Portal base URL (e.g., https://customers.example.com)
    #[arg(long)]
    pub url: Option<String>,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long, env = "SEATCAP_PORTAL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl ConfigCmd {
    pub async fn run(&self) -> Result<()> {
        let mut config = LocalConfig::load()?;

        match &self.command {
            ConfigSubCmd::SetLimit(cmd) => {
                config.dashboard_limit = cmd.limit;
                config.save()?;
                println!("Free user limit set to: {}", cmd.limit);
            }
            ConfigSubCmd::EnableCap => {
                config.dashboard_limit_enabled = true;
                config.save()?;
                println!("Free user cap enabled.");
            }
            ConfigSubCmd::DisableCap => {
                config.dashboard_limit_enabled = false;
                config.save()?;
                println!("Free user cap disabled.");
            }
            ConfigSubCmd::SetThreshold(cmd) => {
                config.close_to_limit_threshold = cmd.seats;
                config.save()?;
                println!("Close-to-limit threshold set to: {}", cmd.seats);
            }
            ConfigSubCmd::SetCountTtl(cmd) => {
                config.users_count_cache_ttl_secs = cmd.secs;
                config.save()?;
                match cmd.secs {
                    Some(secs) => println!("Users count cache expiry set to: {secs}s"),
                    None => println!("Users count cache expiry cleared."),
                }
            }
            ConfigSubCmd::SetPortal(cmd) => {
                if let Some(url) = &cmd.url {
                    url::Url::parse(url)?;
                    config.portal_base_url = url.clone();
                }
                if let Some(email) = &cmd.email {
                    config.portal_admin_email = Some(email.clone());
                }
                if let Some(token) = &cmd.token {
                    config.portal_admin_token = Some(token.clone());
                }
                if let Some(timeout) = cmd.timeout {
                    config.portal_timeout_secs = timeout;
                }
                config.save()?;
                println!("Portal settings saved.");
            }
            ConfigSubCmd::Show => {
                let settings = config.cap_settings();
                println!("Config: {}", LocalConfig::config_path()?.display());
                println!();
                println!("cap_enabled:      {}", settings.enabled);
                println!("limit:            {}", settings.limit);
                println!("close_threshold:  {}", settings.close_to_limit_threshold);
                println!(
                    "count_cache_ttl:  {}",
                    config
                        .users_count_cache_ttl_secs
                        .map_or("(none)".to_string(), |s| format!("{s}s"))
                );
                println!("portal_url:       {}", config.portal_base_url);
                println!(
                    "portal_email:     {}",
                    config.portal_admin_email.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "portal_token:     {}",
                    if config.portal_admin_token_secret().is_some() {
                        "(set)"
                    } else {
                        "(not set)"
                    }
                );
                println!("portal_timeout:   {}s", config.portal_timeout_secs);
            }
        }
        Ok(())
    }
}
