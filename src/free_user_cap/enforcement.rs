//! Seat-cap decisions for a single root namespace.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::local::{CacheStore, CapSettings, LocalDb, RequestContext, RequestKey, RequestValue};
use crate::types::{DataError, MemberId, Namespace, NamespaceId, UserId};

type Result<T> = std::result::Result<T, DataError>;

/// Shared-cache key holding a root namespace's billed user count.
pub fn users_count_key(namespace_id: NamespaceId) -> String {
    format!("free_user_cap:users_count:{namespace_id}")
}

/// Whether a lookup may use memoized answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Cached,
    /// Recompute from the database and refresh the caches.
    Bypass,
}

/// Point-in-time view of a namespace's cap state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapStatus {
    pub namespace_id: NamespaceId,
    pub enforced: bool,
    pub users_count: u64,
    pub limit: u64,
    pub remaining_seats: u64,
    pub over_limit: bool,
    pub at_limit: bool,
    pub reached_limit: bool,
    pub close_to_limit: bool,
}

/// Free-user cap enforcement for one root namespace.
///
/// Answers are booleans and counts; a `false` from [`seat_available`] is for
/// the caller to turn into a rejection. `Err` only means storage failed.
///
/// [`seat_available`]: FreeUserCap::seat_available
pub struct FreeUserCap {
    db: LocalDb,
    cache: Arc<dyn CacheStore>,
    settings: CapSettings,
    root: Namespace,
}

impl FreeUserCap {
    /// Enforcement bound to `root`. A non-root namespace never has the cap enforced.
    pub fn new(
        db: LocalDb,
        cache: Arc<dyn CacheStore>,
        settings: CapSettings,
        root: Namespace,
    ) -> Self {
        Self {
            db,
            cache,
            settings,
            root,
        }
    }

    /// Enforcement for the root of whatever hierarchy `namespace_id` belongs to.
    pub async fn for_namespace(
        db: LocalDb,
        cache: Arc<dyn CacheStore>,
        settings: CapSettings,
        namespace_id: NamespaceId,
    ) -> Result<Self> {
        let root = db.root_of(namespace_id).await?;
        Ok(Self::new(db, cache, settings, root))
    }

    pub fn root(&self) -> &Namespace {
        &self.root
    }

    pub fn limit(&self) -> u64 {
        self.settings.limit
    }

    /// Whether the cap applies to this namespace at all.
    pub async fn enforce_cap(&self, ctx: &RequestContext, policy: CachePolicy) -> Result<bool> {
        let key = RequestKey::EnforceCap(self.root.id);

        if policy == CachePolicy::Cached {
            if let Some(enforced) = ctx.flag(key) {
                return Ok(enforced);
            }
        }

        // Reload so plan or exclusion changes made since construction are seen.
        let current = self.db.get_namespace(self.root.id).await?;
        let enforced = self.qualifies(&current);
        ctx.store(key, RequestValue::Flag(enforced));

        debug!(
            request_id = %ctx.id(),
            namespace_id = self.root.id,
            enforced,
            "evaluated free user cap"
        );
        Ok(enforced)
    }

    fn qualifies(&self, namespace: &Namespace) -> bool {
        self.settings.enabled
            && namespace.is_root()
            && namespace.is_group()
            && namespace.plan.is_free()
            && !namespace.cap_excluded
    }

    /// Billed users in the hierarchy.
    ///
    /// Cached lookups try the request cache, then the shared cache, then the
    /// database. Either way the answer is written back to both caches.
    pub async fn users_count(&self, ctx: &RequestContext, policy: CachePolicy) -> Result<u64> {
        let key = RequestKey::UsersCount(self.root.id);

        if policy == CachePolicy::Cached {
            if let Some(count) = ctx.count(key) {
                return Ok(count);
            }
            if let Some(count) = self.read_shared_count().await {
                ctx.store(key, RequestValue::Count(count));
                return Ok(count);
            }
        }

        let count = self.db.count_billed_users(self.root.id, &[]).await?;
        ctx.store(key, RequestValue::Count(count));
        self.write_shared_count(count).await;

        Ok(count)
    }

    async fn read_shared_count(&self) -> Option<u64> {
        match self.cache.read(&users_count_key(self.root.id)).await {
            Ok(value) => value.and_then(|v| v.as_u64()),
            Err(e) => {
                warn!(namespace_id = self.root.id, error = %e, "users count cache read failed");
                None
            }
        }
    }

    async fn write_shared_count(&self, count: u64) {
        let result = self
            .cache
            .write(
                &users_count_key(self.root.id),
                Value::from(count),
                self.settings.users_count_ttl,
            )
            .await;

        if let Err(e) = result {
            warn!(namespace_id = self.root.id, error = %e, "users count cache write failed");
        }
    }

    /// Drop memoized answers after membership of the hierarchy changed.
    pub async fn invalidate(&self, ctx: &RequestContext) {
        ctx.forget_namespace(self.root.id);
        if let Err(e) = self.cache.delete(&users_count_key(self.root.id)).await {
            warn!(namespace_id = self.root.id, error = %e, "users count cache delete failed");
        }
    }

    pub async fn over_limit(&self, ctx: &RequestContext, policy: CachePolicy) -> Result<bool> {
        Ok(self.enforce_cap(ctx, policy).await?
            && self.users_count(ctx, policy).await? > self.limit())
    }

    pub async fn at_limit(&self, ctx: &RequestContext, policy: CachePolicy) -> Result<bool> {
        Ok(self.enforce_cap(ctx, policy).await?
            && self.users_count(ctx, policy).await? == self.limit())
    }

    pub async fn reached_limit(&self, ctx: &RequestContext, policy: CachePolicy) -> Result<bool> {
        Ok(self.enforce_cap(ctx, policy).await?
            && self.users_count(ctx, policy).await? >= self.limit())
    }

    pub async fn remaining_seats(&self, ctx: &RequestContext, policy: CachePolicy) -> Result<u64> {
        Ok(self
            .limit()
            .saturating_sub(self.users_count(ctx, policy).await?))
    }

    /// Under the cap, not yet at it, but within the configured threshold.
    pub async fn close_to_limit(&self, ctx: &RequestContext, policy: CachePolicy) -> Result<bool> {
        if !self.enforce_cap(ctx, policy).await? || self.reached_limit(ctx, policy).await? {
            return Ok(false);
        }
        Ok(self.remaining_seats(ctx, policy).await? <= self.settings.close_to_limit_threshold)
    }

    /// Whether `user_id` may take a seat right now.
    ///
    /// Always recounts when it matters: this gates admitting a member and must
    /// not act on a stale count.
    pub async fn seat_available(&self, ctx: &RequestContext, user_id: UserId) -> Result<bool> {
        if !self.enforce_cap(ctx, CachePolicy::Cached).await? {
            return Ok(true);
        }

        let user = self
            .db
            .find_user(user_id)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("user {user_id}")))?;
        if !user.billable() {
            return Ok(true);
        }

        if self.db.is_billed_user(self.root.id, user_id).await? {
            return Ok(true);
        }

        let count = self.users_count(ctx, CachePolicy::Bypass).await?;
        let available = count < self.limit();

        debug!(
            request_id = %ctx.id(),
            namespace_id = self.root.id,
            user_id,
            users_count = count,
            limit = self.limit(),
            available,
            "checked seat availability"
        );
        Ok(available)
    }

    /// Whether these specific memberships are what pushed the namespace over
    /// the limit, as opposed to it already being over without them.
    pub async fn over_from_adding_users(
        &self,
        ctx: &RequestContext,
        member_ids: &[MemberId],
    ) -> Result<bool> {
        if member_ids.is_empty() || !self.enforce_cap(ctx, CachePolicy::Cached).await? {
            return Ok(false);
        }

        // Uncached, and without refilling the shared cache.
        if self.db.count_billed_users(self.root.id, &[]).await? <= self.limit() {
            return Ok(false);
        }

        let without = self.db.count_billed_users(self.root.id, member_ids).await?;
        Ok(without <= self.limit())
    }

    pub async fn status(&self, ctx: &RequestContext) -> Result<CapStatus> {
        let policy = CachePolicy::Cached;

        Ok(CapStatus {
            namespace_id: self.root.id,
            enforced: self.enforce_cap(ctx, policy).await?,
            users_count: self.users_count(ctx, policy).await?,
            limit: self.limit(),
            remaining_seats: self.remaining_seats(ctx, policy).await?,
            over_limit: self.over_limit(ctx, policy).await?,
            at_limit: self.at_limit(ctx, policy).await?,
            reached_limit: self.reached_limit(ctx, policy).await?,
            close_to_limit: self.close_to_limit(ctx, policy).await?,
        })
    }
}
