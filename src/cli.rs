//! CLI argument definitions.

use clap::{Parser, Subcommand};

use crate::commands::{
    CapCmd, CleanCmd, ConfigCmd, InitCmd, MemberCmd, NamespaceCmd, TrialsCmd, UserCmd,
};

#[derive(Parser)]
#[command(name = "seatcap")]
#[command(about = "Free user cap enforcement and trial eligibility for namespaces")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the .seatcap directory and database
    Init(InitCmd),

    /// Delete the .seatcap directory or purge expired cache entries
    Clean(CleanCmd),

    /// Manage configuration (cap limit, portal credentials)
    Config(ConfigCmd),

    /// Create and inspect namespaces
    Namespace(NamespaceCmd),

    /// Create and block users
    User(UserCmd),

    /// Add, invite and remove members
    Member(MemberCmd),

    /// Inspect free user cap state
    Cap(CapCmd),

    /// Trial eligibility
    Trials(TrialsCmd),
}

impl Command {
    pub async fn execute(&self) -> anyhow::Result<()> {
        match self {
            Command::Init(cmd) => cmd.run().await,
            Command::Clean(cmd) => cmd.run().await,
            Command::Config(cmd) => cmd.run().await,
            Command::Namespace(cmd) => cmd.run().await,
            Command::User(cmd) => cmd.run().await,
            Command::Member(cmd) => cmd.run().await,
            Command::Cap(cmd) => cmd.run().await,
            Command::Trials(cmd) => cmd.run().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_trials_requires_user_or_namespace() {
        assert!(Cli::try_parse_from(["seatcap", "trials", "eligible"]).is_err());
        assert!(
            Cli::try_parse_from(["seatcap", "trials", "eligible", "--user", "1", "--namespace", "2"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "seatcap", "trials", "eligible", "--namespace", "2", "3", "--trial-type", "duo_pro"
            ])
            .is_ok()
        );
    }

    #[test]
    fn test_member_add_parses_access_level() {
        let cli = Cli::try_parse_from(["seatcap", "member", "add", "7", "1", "2", "-a", "owner"])
            .unwrap();
        match cli.command {
            Command::Member(MemberCmd {
                command: crate::commands::MemberSubCmd::Add(cmd),
            }) => {
                assert_eq!(cmd.namespace, 7);
                assert_eq!(cmd.users, vec![1, 2]);
                assert_eq!(cmd.access_level, crate::types::AccessLevel::Owner);
            }
            _ => panic!("expected member add"),
        }
    }
}
