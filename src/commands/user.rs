//! User command - create users and change their state.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::{ensure_success, open_state};
use crate::local::{LocalState, RequestContext};
use crate::local::models::CreateUser;
use crate::members::MembersService;
use crate::types::{UserId, UserState};

#[derive(Args)]
pub struct UserCmd {
    #[command(subcommand)]
    pub command: UserSubCmd,
}

#[derive(Subcommand)]
pub enum UserSubCmd {
    /// Create a user
    Create(CreateCmd),

    /// Block a user; blocked users do not occupy seats
    Block(UserIdArg),

    /// Unblock a user
    Unblock(UserIdArg),
}

#[derive(Args)]
pub struct CreateCmd {
    pub username: String,

    /// Display name (default: username)
    #[arg(long)]
    pub name: Option<String>,

    /// Mark as a bot account; bots never occupy seats
    #[arg(long)]
    pub bot: bool,
}

#[derive(Args)]
pub struct UserIdArg {
    pub id: UserId,
}

impl UserCmd {
    pub async fn run(&self) -> Result<()> {
        let state = open_state().await?;
        let db = state.db();

        match &self.command {
            UserSubCmd::Create(cmd) => {
                let user = db
                    .create_user(&CreateUser {
                        username: cmd.username.clone(),
                        name: cmd.name.clone().unwrap_or_else(|| cmd.username.clone()),
                        bot: cmd.bot,
                    })
                    .await?;
                println!(
                    "Created user #{} @{}{}",
                    user.id,
                    user.username,
                    if user.bot { " [bot]" } else { "" }
                );
            }
            UserSubCmd::Block(cmd) => {
                set_state(&state, cmd.id, UserState::Blocked).await?;
                println!("Blocked user #{}", cmd.id);
            }
            UserSubCmd::Unblock(cmd) => {
                set_state(&state, cmd.id, UserState::Active).await?;
                println!("Unblocked user #{}", cmd.id);
            }
        }

        Ok(())
    }
}

async fn set_state(state: &LocalState, id: UserId, user_state: UserState) -> Result<()> {
    let service = MembersService::new(
        state.db().clone(),
        state.cache(),
        state.config().cap_settings(),
    );
    let resp = service
        .set_user_state(&RequestContext::new(), id, user_state)
        .await?;
    ensure_success(&resp)
}
