//! Member command - add, invite and remove members under the free user cap.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::{ensure_success, open_state};
use crate::local::RequestContext;
use crate::members::MembersService;
use crate::types::{AccessLevel, MemberId, NamespaceId, UserId};

#[derive(Args)]
pub struct MemberCmd {
    #[command(subcommand)]
    pub command: MemberSubCmd,
}

#[derive(Subcommand)]
pub enum MemberSubCmd {
    /// Add users as active members
    Add(AddCmd),

    /// Invite a user; the invitation does not take a seat
    Invite(InviteCmd),

    /// Accept a pending invitation
    Accept(MemberIdArg),

    /// Remove a membership
    Remove(MemberIdArg),

    /// List memberships in a namespace's hierarchy
    List(ListCmd),
}

#[derive(Args)]
pub struct AddCmd {
    pub namespace: NamespaceId,

    #[arg(required = true, num_args = 1..)]
    pub users: Vec<UserId>,

    /// guest, reporter, developer, maintainer or owner
    #[arg(long, short = 'a', default_value = "developer")]
    pub access_level: AccessLevel,
}

#[derive(Args)]
pub struct InviteCmd {
    pub namespace: NamespaceId,
    pub user: UserId,

    #[arg(long, short = 'a', default_value = "developer")]
    pub access_level: AccessLevel,
}

#[derive(Args)]
pub struct MemberIdArg {
    pub id: MemberId,
}

#[derive(Args)]
pub struct ListCmd {
    pub namespace: NamespaceId,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl MemberCmd {
    pub async fn run(&self) -> Result<()> {
        let state = open_state().await?;
        let ctx = RequestContext::new();
        let service = MembersService::new(
            state.db().clone(),
            state.cache(),
            state.config().cap_settings(),
        );

        match &self.command {
            MemberSubCmd::Add(cmd) => {
                let resp = service
                    .add_members(&ctx, cmd.namespace, &cmd.users, cmd.access_level)
                    .await?;
                for member in &resp.payload.members {
                    println!(
                        "Added user #{} as {} (member #{})",
                        member.user_id, member.access_level, member.id
                    );
                }
                if resp.is_error() {
                    for rejection in &resp.payload.rejected {
                        eprintln!("  user #{}: {}", rejection.user_id, rejection.message);
                    }
                }
                if resp.payload.over_limit_caused {
                    eprintln!("Warning: these additions put the namespace over its free user limit");
                }
                ensure_success(&resp)?;
            }
            MemberSubCmd::Invite(cmd) => {
                let resp = service
                    .invite(&ctx, cmd.namespace, cmd.user, cmd.access_level)
                    .await?;
                ensure_success(&resp)?;
                if let Some(member) = &resp.payload {
                    println!("Invited user #{} (member #{})", member.user_id, member.id);
                }
            }
            MemberSubCmd::Accept(cmd) => {
                let resp = service.accept_invite(&ctx, cmd.id).await?;
                ensure_success(&resp)?;
                match &resp.message {
                    Some(message) => println!("{message}"),
                    None => println!("Member #{} is now active", cmd.id),
                }
            }
            MemberSubCmd::Remove(cmd) => {
                let resp = service.remove_member(&ctx, cmd.id).await?;
                ensure_success(&resp)?;
                println!("Removed member #{}", cmd.id);
            }
            MemberSubCmd::List(cmd) => {
                let root = state.db().root_of(cmd.namespace).await?;
                let members = state.db().list_members(root.id).await?;
                if cmd.json {
                    println!("{}", serde_json::to_string_pretty(&members)?);
                    return Ok(());
                }
                if members.is_empty() {
                    println!("No members in {}.", root.path);
                    return Ok(());
                }
                for m in &members {
                    let level = AccessLevel::from_value(m.access_level)
                        .map_or("unknown", |l| l.as_str());
                    let pending = if m.state == "invited" { " [invited]" } else { "" };
                    println!(
                        "#{} {} @{} {}{}",
                        m.id, m.namespace_path, m.username, level, pending
                    );
                }
            }
        }

        Ok(())
    }
}
