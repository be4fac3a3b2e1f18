use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Plan;

/// Unique identifier for a namespace.
pub type NamespaceId = i64;

/// A namespace is either a group (which may nest) or a user's personal namespace.
///
/// # Billing boundary
/// Only the root of a hierarchy carries a meaningful plan. Members of any
/// subgroup under a root are billed against that root:
/// - `acme` (root, plan = free)
///   - `acme/platform` (subgroup)
///   - `acme/platform/infra` (subgroup)
///
/// A user counted in `acme/platform/infra` consumes one seat of `acme`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: NamespaceId,

    /// Display name (e.g., "Acme Corporation")
    pub name: String,

    /// URL path segment (e.g., "acme")
    pub path: String,

    pub kind: NamespaceKind,

    /// `None` for root namespaces
    pub parent_id: Option<NamespaceId>,

    pub plan: Plan,

    /// Admin override that exempts this namespace from the free-user cap
    pub cap_excluded: bool,

    pub created_at: DateTime<Utc>,
}

impl Namespace {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_group(&self) -> bool {
        self.kind == NamespaceKind::Group
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceKind {
    Group,
    User,
}

impl NamespaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Group => "group",
            NamespaceKind::User => "user",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamespaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(NamespaceKind::Group),
            "user" => Ok(NamespaceKind::User),
            other => Err(format!("unknown namespace kind: {other}")),
        }
    }
}
