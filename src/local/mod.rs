//! Local state - namespaces, memberships and the shared cache.
//!
//! Stored in a `.seatcap/` directory:
//! - `db.sqlite` - namespaces, users, members and cache entries

mod cache;
mod config;
mod db;
pub mod models;
mod request;
mod state;

pub use cache::{CacheError, CacheStore, MemoryCacheStore, SqliteCacheStore};
#[cfg(test)]
pub use cache::MockCacheStore;
pub use config::{CapSettings, LocalConfig};
pub use db::LocalDb;
pub use request::{RequestContext, RequestKey, RequestValue};
pub use state::LocalState;

use std::path::{Path, PathBuf};

/// The name of the data directory.
pub const DATA_DIR_NAME: &str = ".seatcap";

/// Find the `.seatcap/` directory by walking up from the given path.
pub fn find_data_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let data_dir = current.join(DATA_DIR_NAME);
        if data_dir.is_dir() {
            return Some(data_dir);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Get the data directory for the current working directory.
pub fn get_data_dir() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| find_data_root(&cwd))
}
