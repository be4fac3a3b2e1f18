//! CLI command implementations.

mod cap;
mod clean;
mod config;
mod init;
mod member;
mod namespace;
mod trials;
mod user;

pub use cap::CapCmd;
pub use clean::CleanCmd;
pub use config::ConfigCmd;
pub use init::InitCmd;
pub use member::{MemberCmd, MemberSubCmd};
pub use namespace::NamespaceCmd;
pub use trials::TrialsCmd;
pub use user::UserCmd;

use anyhow::{Context, Result, bail};

use crate::local::{self, LocalState};
use crate::types::ServiceResponse;

/// Open the state of the nearest `.seatcap/` directory.
async fn open_state() -> Result<LocalState> {
    let data_dir =
        local::get_data_dir().context("No .seatcap directory found. Run `seatcap init` first.")?;
    LocalState::open(&data_dir).await
}

/// Turn an error response into a failed exit.
fn ensure_success<T>(resp: &ServiceResponse<T>) -> Result<()> {
    if !resp.is_success() {
        bail!("{}", resp.message.as_deref().unwrap_or("Operation failed"));
    }
    Ok(())
}
