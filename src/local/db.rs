//! SQLite database operations for local state.

use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::models::{
    CacheEntryRow, CreateNamespace, CreateUser, MemberRow, MemberWithUser, NamespaceRow,
    UpsertMember, UserRow,
};
use crate::types::{
    AccessLevel, DataError, Member, MemberId, MemberState, Namespace, NamespaceId, Plan, User,
    UserId, UserState,
};

type Result<T> = std::result::Result<T, DataError>;

/// All namespaces in the tree rooted at `?1` (inclusive).
const HIERARCHY_CTE: &str = r#"
    WITH RECURSIVE hierarchy(id) AS (
        SELECT id FROM namespaces WHERE id = ?1
        UNION ALL
        SELECT n.id FROM namespaces n JOIN hierarchy h ON n.parent_id = h.id
    )
"#;

/// Local SQLite database. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct LocalDb {
    pool: SqlitePool,
}

impl LocalDb {
    /// Open or create the database at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Open a private in-memory database.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = "sqlite::memory:".parse::<SqliteConnectOptions>()?.foreign_keys(true);

        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS namespaces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                kind TEXT NOT NULL,
                parent_id INTEGER REFERENCES namespaces(id),
                plan TEXT NOT NULL DEFAULT 'default',
                cap_excluded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_namespaces_route ON namespaces(COALESCE(parent_id, 0), path)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_namespaces_parent ON namespaces(parent_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                bot INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL DEFAULT 'active'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace_id INTEGER NOT NULL REFERENCES namespaces(id),
                user_id INTEGER NOT NULL REFERENCES users(id),
                access_level INTEGER NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(namespace_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_user ON members(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Namespace Operations ====================

    pub async fn create_namespace(&self, input: &CreateNamespace) -> Result<Namespace> {
        let row = sqlx::query_as::<_, NamespaceRow>(
            r#"
            INSERT INTO namespaces (name, path, kind, parent_id, plan, cap_excluded, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.path)
        .bind(input.kind.as_str())
        .bind(input.parent_id)
        .bind(input.plan.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    pub async fn find_namespace(&self, id: NamespaceId) -> Result<Option<Namespace>> {
        let row = sqlx::query_as::<_, NamespaceRow>("SELECT * FROM namespaces WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Namespace::try_from).transpose()
    }

    /// Like [`find_namespace`](Self::find_namespace) but missing rows are an error.
    pub async fn get_namespace(&self, id: NamespaceId) -> Result<Namespace> {
        self.find_namespace(id)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("namespace {id}")))
    }

    /// Load namespaces by id, ordered by name. Unknown ids are skipped.
    pub async fn namespaces_by_ids(&self, ids: &[NamespaceId]) -> Result<Vec<Namespace>> {
        let rows = sqlx::query_as::<_, NamespaceRow>(
            r#"
            SELECT * FROM namespaces
            WHERE id IN (SELECT value FROM json_each(?))
            ORDER BY name, id
            "#,
        )
        .bind(serde_json::to_string(ids)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Namespace::try_from).collect()
    }

    /// List all namespaces.
    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let rows = sqlx::query_as::<_, NamespaceRow>("SELECT * FROM namespaces ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Namespace::try_from).collect()
    }

    /// Walk up the parent chain to the root namespace.
    pub async fn root_of(&self, id: NamespaceId) -> Result<Namespace> {
        let row = sqlx::query_as::<_, NamespaceRow>(
            r#"
            WITH RECURSIVE ancestors(id, parent_id) AS (
                SELECT id, parent_id FROM namespaces WHERE id = ?
                UNION ALL
                SELECT n.id, n.parent_id FROM namespaces n JOIN ancestors a ON n.id = a.parent_id
            )
            SELECT n.* FROM namespaces n
            JOIN ancestors a ON n.id = a.id
            WHERE a.parent_id IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DataError::NotFound(format!("namespace {id}")))?;

        row.try_into()
    }

    pub async fn set_plan(&self, id: NamespaceId, plan: Plan) -> Result<()> {
        let result = sqlx::query("UPDATE namespaces SET plan = ? WHERE id = ?")
            .bind(plan.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("namespace {id}")));
        }
        Ok(())
    }

    pub async fn set_cap_excluded(&self, id: NamespaceId, excluded: bool) -> Result<()> {
        let result = sqlx::query("UPDATE namespaces SET cap_excluded = ? WHERE id = ?")
            .bind(excluded)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("namespace {id}")));
        }
        Ok(())
    }

    /// Root groups where the user is an active owner, ordered by name.
    pub async fn owned_root_groups(&self, user_id: UserId) -> Result<Vec<Namespace>> {
        let rows = sqlx::query_as::<_, NamespaceRow>(
            r#"
            SELECT n.* FROM namespaces n
            JOIN members m ON m.namespace_id = n.id
            WHERE m.user_id = ?
              AND m.access_level >= ?
              AND m.state = 'active'
              AND n.parent_id IS NULL
              AND n.kind = 'group'
            ORDER BY n.name, n.id
            "#,
        )
        .bind(user_id)
        .bind(AccessLevel::Owner.value())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Namespace::try_from).collect()
    }

    // ==================== User Operations ====================

    pub async fn create_user(&self, input: &CreateUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, name, bot, state)
            VALUES (?, ?, ?, 'active')
            RETURNING *
            "#,
        )
        .bind(&input.username)
        .bind(&input.name)
        .bind(input.bot)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    pub async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    pub async fn set_user_state(&self, id: UserId, state: UserState) -> Result<()> {
        let result = sqlx::query("UPDATE users SET state = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    /// Ids of the roots of every hierarchy the user has a membership in.
    pub async fn root_ids_for_user(&self, user_id: UserId) -> Result<Vec<NamespaceId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            WITH RECURSIVE ancestors(id, parent_id) AS (
                SELECT n.id, n.parent_id FROM namespaces n
                JOIN members m ON m.namespace_id = n.id
                WHERE m.user_id = ?
                UNION
                SELECT n.id, n.parent_id FROM namespaces n
                JOIN ancestors a ON n.id = a.parent_id
            )
            SELECT DISTINCT id FROM ancestors WHERE parent_id IS NULL ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    // ==================== Member Operations ====================

    /// Insert a membership, or update level and state of an existing one.
    pub async fn upsert_member(&self, input: &UpsertMember) -> Result<Member> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            INSERT INTO members (namespace_id, user_id, access_level, state, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(namespace_id, user_id) DO UPDATE SET
                access_level = excluded.access_level,
                state = excluded.state
            RETURNING *
            "#,
        )
        .bind(input.namespace_id)
        .bind(input.user_id)
        .bind(input.access_level.value())
        .bind(input.state.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    pub async fn find_member(&self, id: MemberId) -> Result<Option<Member>> {
        let row = sqlx::query_as::<_, MemberRow>("SELECT * FROM members WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Member::try_from).transpose()
    }

    pub async fn find_member_by_user(
        &self,
        namespace_id: NamespaceId,
        user_id: UserId,
    ) -> Result<Option<Member>> {
        let row = sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM members WHERE namespace_id = ? AND user_id = ?",
        )
        .bind(namespace_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Member::try_from).transpose()
    }

    pub async fn set_member_state(&self, id: MemberId, state: MemberState) -> Result<Member> {
        let row = sqlx::query_as::<_, MemberRow>(
            "UPDATE members SET state = ? WHERE id = ? RETURNING *",
        )
        .bind(state.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DataError::NotFound(format!("member {id}")))?;

        row.try_into()
    }

    /// Delete a membership. Returns false if it did not exist.
    pub async fn delete_member(&self, id: MemberId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All memberships in the hierarchy under `root_id`.
    pub async fn list_members(&self, root_id: NamespaceId) -> Result<Vec<MemberWithUser>> {
        let sql = format!(
            r#"{HIERARCHY_CTE}
            SELECT m.id, m.namespace_id, n.path AS namespace_path, m.user_id, u.username,
                   m.access_level, m.state
            FROM members m
            JOIN users u ON u.id = m.user_id
            JOIN namespaces n ON n.id = m.namespace_id
            WHERE m.namespace_id IN (SELECT id FROM hierarchy)
            ORDER BY n.path, u.username
            "#
        );

        let rows = sqlx::query_as::<_, MemberWithUser>(&sql)
            .bind(root_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    // ==================== Seat Queries ====================

    /// Distinct billed users in the hierarchy under `root_id`, ignoring the
    /// given membership rows.
    ///
    /// Billed: active membership, user not a bot and not blocked.
    pub async fn count_billed_users(
        &self,
        root_id: NamespaceId,
        excluded_member_ids: &[MemberId],
    ) -> Result<u64> {
        let sql = format!(
            r#"{HIERARCHY_CTE}
            SELECT COUNT(DISTINCT m.user_id) FROM members m
            JOIN users u ON u.id = m.user_id
            WHERE m.namespace_id IN (SELECT id FROM hierarchy)
              AND m.state = 'active'
              AND u.bot = 0
              AND u.state = 'active'
              AND m.id NOT IN (SELECT value FROM json_each(?2))
            "#
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(root_id)
            .bind(serde_json::to_string(excluded_member_ids)?)
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    /// Whether the user already occupies a seat in the hierarchy under `root_id`.
    pub async fn is_billed_user(&self, root_id: NamespaceId, user_id: UserId) -> Result<bool> {
        let sql = format!(
            r#"{HIERARCHY_CTE}
            SELECT EXISTS (
                SELECT 1 FROM members m
                JOIN users u ON u.id = m.user_id
                WHERE m.namespace_id IN (SELECT id FROM hierarchy)
                  AND m.user_id = ?2
                  AND m.state = 'active'
                  AND u.bot = 0
                  AND u.state = 'active'
            )
            "#
        );

        let exists: i64 = sqlx::query_scalar(&sql)
            .bind(root_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists != 0)
    }

    // ==================== Cache Operations ====================

    /// Fetch unexpired cache entries for the given keys.
    pub async fn cache_read_multi(&self, keys: &[String], now_ms: i64) -> Result<Vec<CacheEntryRow>> {
        let rows = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT key, value FROM cache_entries
            WHERE key IN (SELECT value FROM json_each(?))
              AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(serde_json::to_string(keys)?)
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Overwrite entries in one transaction.
    pub async fn cache_write_multi(
        &self,
        entries: &[(String, String)],
        expires_at: Option<i64>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn cache_delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn cache_purge_expired(&self, now_ms: i64) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?")
                .bind(now_ms)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
