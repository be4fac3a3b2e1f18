//! Row models for local storage.
//!
//! Rows mirror the SQLite schema; `TryFrom` impls turn them into domain types
//! and reject values the schema cannot express as an enum.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::types::{
    AccessLevel, DataError, Member, MemberState, Namespace, NamespaceKind, Plan, User, UserState,
};

// ============================================================================
// Namespace Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct NamespaceRow {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub kind: String,
    pub parent_id: Option<i64>,
    pub plan: String,
    pub cap_excluded: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NamespaceRow> for Namespace {
    type Error = DataError;

    fn try_from(row: NamespaceRow) -> Result<Self, Self::Error> {
        Ok(Namespace {
            id: row.id,
            kind: row.kind.parse().map_err(DataError::CorruptRow)?,
            plan: row.plan.parse().map_err(DataError::CorruptRow)?,
            name: row.name,
            path: row.path,
            parent_id: row.parent_id,
            cap_excluded: row.cap_excluded,
            created_at: row.created_at,
        })
    }
}

/// Input for creating a namespace.
#[derive(Debug, Clone)]
pub struct CreateNamespace {
    pub name: String,
    pub path: String,
    pub kind: NamespaceKind,
    pub parent_id: Option<i64>,
    pub plan: Plan,
}

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub bot: bool,
    pub state: String,
}

impl TryFrom<UserRow> for User {
    type Error = DataError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            state: row.state.parse::<UserState>().map_err(DataError::CorruptRow)?,
            username: row.username,
            name: row.name,
            bot: row.bot,
        })
    }
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub name: String,
    pub bot: bool,
}

// ============================================================================
// Member Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct MemberRow {
    pub id: i64,
    pub namespace_id: i64,
    pub user_id: i64,
    pub access_level: i64,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = DataError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(Member {
            id: row.id,
            namespace_id: row.namespace_id,
            user_id: row.user_id,
            access_level: AccessLevel::from_value(row.access_level).ok_or_else(|| {
                DataError::CorruptRow(format!("access level {}", row.access_level))
            })?,
            state: row.state.parse::<MemberState>().map_err(DataError::CorruptRow)?,
            created_at: row.created_at,
        })
    }
}

/// Member joined with its user, for listings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MemberWithUser {
    pub id: i64,
    pub namespace_id: i64,
    pub namespace_path: String,
    pub user_id: i64,
    pub username: String,
    pub access_level: i64,
    pub state: String,
}

/// Upsert input for a membership.
#[derive(Debug, Clone)]
pub struct UpsertMember {
    pub namespace_id: i64,
    pub user_id: i64,
    pub access_level: AccessLevel,
    pub state: MemberState,
}

// ============================================================================
// Cache Models
// ============================================================================

/// An unexpired cache entry; `value` is JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntryRow {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace_row() -> NamespaceRow {
        NamespaceRow {
            id: 1,
            name: "Acme".into(),
            path: "acme".into(),
            kind: "group".into(),
            parent_id: None,
            plan: "free".into(),
            cap_excluded: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_namespace_row_converts() {
        let ns = Namespace::try_from(namespace_row()).unwrap();
        assert_eq!(ns.plan, Plan::Free);
        assert!(ns.is_root());
        assert!(ns.is_group());
    }

    #[test]
    fn test_namespace_row_rejects_unknown_plan() {
        let mut row = namespace_row();
        row.plan = "gold".into();
        assert!(matches!(
            Namespace::try_from(row),
            Err(DataError::CorruptRow(_))
        ));
    }

    #[test]
    fn test_member_row_rejects_unknown_access_level() {
        let row = MemberRow {
            id: 1,
            namespace_id: 1,
            user_id: 1,
            access_level: 35,
            state: "active".into(),
            created_at: Utc::now(),
        };
        assert!(Member::try_from(row).is_err());
    }
}
