use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::free_user_cap::FreeUserCap;
use crate::local::models::UpsertMember;
use crate::local::{CacheStore, CapSettings, LocalDb, RequestContext};
use crate::types::{
    AccessLevel, DataError, ErrorReason, Member, MemberId, MemberState, NamespaceId,
    ServiceResponse, User, UserId, UserState,
};

type Result<T> = std::result::Result<T, DataError>;

/// A user that `add_members` did not add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub user_id: UserId,
    pub reason: ErrorReason,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AddMembersOutcome {
    pub members: Vec<Member>,
    pub rejected: Vec<Rejection>,
    /// These additions pushed the namespace over its limit.
    pub over_limit_caused: bool,
}

/// Membership changes, gated by the free-user cap of the hierarchy's root.
pub struct MembersService {
    db: LocalDb,
    cache: Arc<dyn CacheStore>,
    settings: CapSettings,
}

impl MembersService {
    pub fn new(db: LocalDb, cache: Arc<dyn CacheStore>, settings: CapSettings) -> Self {
        Self {
            db,
            cache,
            settings,
        }
    }

    async fn cap(&self, namespace_id: NamespaceId) -> Result<FreeUserCap> {
        FreeUserCap::for_namespace(
            self.db.clone(),
            self.cache.clone(),
            self.settings,
            namespace_id,
        )
        .await
    }

    /// Add each user as an active member. Users without a seat are rejected
    /// individually; the rest are still added.
    pub async fn add_members(
        &self,
        ctx: &RequestContext,
        namespace_id: NamespaceId,
        user_ids: &[UserId],
        access_level: AccessLevel,
    ) -> Result<ServiceResponse<AddMembersOutcome>> {
        if self.db.find_namespace(namespace_id).await?.is_none() {
            return Ok(ServiceResponse::error(
                format!("Namespace {namespace_id} not found"),
                ErrorReason::NotFound,
                AddMembersOutcome::default(),
            ));
        }

        let cap = self.cap(namespace_id).await?;
        let mut outcome = AddMembersOutcome::default();
        // Only these can have pushed the namespace over its limit.
        let mut newly_seated: Vec<MemberId> = Vec::new();

        for &user_id in user_ids {
            let Some(user) = self.db.find_user(user_id).await? else {
                outcome.rejected.push(Rejection {
                    user_id,
                    reason: ErrorReason::NotFound,
                    message: format!("User {user_id} not found"),
                });
                continue;
            };

            let already_seated = self.db.is_billed_user(cap.root().id, user.id).await?;

            if !cap.seat_available(ctx, user.id).await? {
                warn!(
                    request_id = %ctx.id(),
                    namespace_id,
                    user_id,
                    "no seat available"
                );
                outcome.rejected.push(Rejection {
                    user_id,
                    reason: ErrorReason::SeatLimitReached,
                    message: no_seat_message(&user, &cap.root().name, cap.limit()),
                });
                continue;
            }

            let member = self
                .db
                .upsert_member(&UpsertMember {
                    namespace_id,
                    user_id,
                    access_level,
                    state: MemberState::Active,
                })
                .await?;
            if !already_seated {
                newly_seated.push(member.id);
            }
            outcome.members.push(member);
        }

        if !outcome.members.is_empty() {
            cap.invalidate(ctx).await;
            outcome.over_limit_caused = cap.over_from_adding_users(ctx, &newly_seated).await?;

            info!(
                request_id = %ctx.id(),
                namespace_id,
                added = outcome.members.len(),
                rejected = outcome.rejected.len(),
                "added members"
            );
        }

        Ok(match outcome.rejected.first() {
            None => ServiceResponse::success(outcome),
            Some(first) => {
                let (reason, message) = (first.reason, rejection_summary(&outcome));
                ServiceResponse::error(message, reason, outcome)
            }
        })
    }

    /// Invite a user. An invitation does not occupy a seat.
    pub async fn invite(
        &self,
        ctx: &RequestContext,
        namespace_id: NamespaceId,
        user_id: UserId,
        access_level: AccessLevel,
    ) -> Result<ServiceResponse<Option<Member>>> {
        if self.db.find_namespace(namespace_id).await?.is_none() {
            return Ok(not_found(format!("Namespace {namespace_id} not found")));
        }
        if self.db.find_user(user_id).await?.is_none() {
            return Ok(not_found(format!("User {user_id} not found")));
        }

        if let Some(existing) = self.db.find_member_by_user(namespace_id, user_id).await? {
            if existing.state == MemberState::Active {
                return Ok(ServiceResponse::error(
                    format!("User {user_id} is already a member"),
                    ErrorReason::UnprocessableEntity,
                    Some(existing),
                ));
            }
        }

        let member = self
            .db
            .upsert_member(&UpsertMember {
                namespace_id,
                user_id,
                access_level,
                state: MemberState::Invited,
            })
            .await?;

        info!(request_id = %ctx.id(), namespace_id, user_id, member_id = member.id, "invited member");
        Ok(ServiceResponse::success(Some(member)))
    }

    /// Turn an invitation into an active membership, if a seat is free.
    pub async fn accept_invite(
        &self,
        ctx: &RequestContext,
        member_id: MemberId,
    ) -> Result<ServiceResponse<Option<Member>>> {
        let Some(member) = self.db.find_member(member_id).await? else {
            return Ok(not_found(format!("Member {member_id} not found")));
        };
        if member.state == MemberState::Active {
            return Ok(ServiceResponse::error(
                "Invitation already accepted",
                ErrorReason::UnprocessableEntity,
                Some(member),
            ));
        }

        let user = self
            .db
            .find_user(member.user_id)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("user {}", member.user_id)))?;

        let cap = self.cap(member.namespace_id).await?;
        if !cap.seat_available(ctx, user.id).await? {
            warn!(
                request_id = %ctx.id(),
                namespace_id = cap.root().id,
                member_id,
                "invitation blocked by free user cap"
            );
            return Ok(ServiceResponse::error(
                no_seat_message(&user, &cap.root().name, cap.limit()),
                ErrorReason::SeatLimitReached,
                Some(member),
            ));
        }

        let member = self.db.set_member_state(member_id, MemberState::Active).await?;
        cap.invalidate(ctx).await;

        info!(request_id = %ctx.id(), member_id, "accepted invitation");
        Ok(ServiceResponse::success_with_message(
            format!("@{} joined {}", user.username, cap.root().path),
            Some(member),
        ))
    }

    pub async fn remove_member(
        &self,
        ctx: &RequestContext,
        member_id: MemberId,
    ) -> Result<ServiceResponse<Option<Member>>> {
        let Some(member) = self.db.find_member(member_id).await? else {
            return Ok(not_found(format!("Member {member_id} not found")));
        };

        let cap = self.cap(member.namespace_id).await?;
        self.db.delete_member(member_id).await?;
        cap.invalidate(ctx).await;

        info!(request_id = %ctx.id(), member_id, namespace_id = member.namespace_id, "removed member");
        Ok(ServiceResponse::success(Some(member)))
    }

    /// Block or unblock a user. Blocked users hold no seat, so every
    /// hierarchy they belong to has its cached count dropped.
    pub async fn set_user_state(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        state: UserState,
    ) -> Result<ServiceResponse<Option<User>>> {
        if self.db.find_user(user_id).await?.is_none() {
            return Ok(not_found(format!("User {user_id} not found")));
        }

        self.db.set_user_state(user_id, state).await?;
        for root_id in self.db.root_ids_for_user(user_id).await? {
            self.cap(root_id).await?.invalidate(ctx).await;
        }

        info!(request_id = %ctx.id(), user_id, state = state.as_str(), "changed user state");
        Ok(ServiceResponse::success(self.db.find_user(user_id).await?))
    }
}

fn not_found<T>(message: String) -> ServiceResponse<Option<T>> {
    ServiceResponse::error(message, ErrorReason::NotFound, None)
}

fn no_seat_message(user: &User, root_name: &str, limit: u64) -> String {
    format!(
        "@{} cannot be added since you've reached your {limit} member limit for {root_name}",
        user.username
    )
}

fn rejection_summary(outcome: &AddMembersOutcome) -> String {
    match outcome.rejected.as_slice() {
        [only] => only.message.clone(),
        rejected => format!(
            "{} of {} users could not be added",
            rejected.len(),
            rejected.len() + outcome.members.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_user_cap::{CachePolicy, users_count_key};
    use crate::local::MemoryCacheStore;
    use crate::local::models::{CreateNamespace, CreateUser};
    use crate::types::{Namespace, NamespaceKind, Plan};
    use serde_json::json;

    struct Fixture {
        db: LocalDb,
        cache: Arc<MemoryCacheStore>,
        root: Namespace,
        service: MembersService,
    }

    impl Fixture {
        async fn new(plan: Plan, limit: u64) -> Self {
            let db = LocalDb::open_in_memory().await.unwrap();
            let root = db
                .create_namespace(&CreateNamespace {
                    name: "Acme".into(),
                    path: "acme".into(),
                    kind: NamespaceKind::Group,
                    parent_id: None,
                    plan,
                })
                .await
                .unwrap();
            let cache = Arc::new(MemoryCacheStore::new());
            let settings = CapSettings {
                limit,
                ..CapSettings::default()
            };
            let service = MembersService::new(db.clone(), cache.clone(), settings);

            Self {
                db,
                cache,
                root,
                service,
            }
        }

        async fn users(&self, n: usize) -> Vec<UserId> {
            let mut ids = Vec::new();
            for i in 0..n {
                let user = self
                    .db
                    .create_user(&CreateUser {
                        username: format!("user{i}"),
                        name: format!("User {i}"),
                        bot: false,
                    })
                    .await
                    .unwrap();
                ids.push(user.id);
            }
            ids
        }

        async fn billed(&self) -> u64 {
            self.db.count_billed_users(self.root.id, &[]).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_add_members_rejects_past_limit() {
        let fx = Fixture::new(Plan::Free, 2).await;
        let users = fx.users(3).await;
        let ctx = RequestContext::new();

        let resp = fx
            .service
            .add_members(&ctx, fx.root.id, &users, AccessLevel::Developer)
            .await
            .unwrap();

        assert!(resp.is_error());
        assert_eq!(resp.reason, Some(ErrorReason::SeatLimitReached));
        assert_eq!(resp.payload.members.len(), 2);
        assert_eq!(resp.payload.rejected.len(), 1);
        assert_eq!(resp.payload.rejected[0].user_id, users[2]);
        assert_eq!(
            resp.payload.rejected[0].message,
            "@user2 cannot be added since you've reached your 2 member limit for Acme"
        );
        assert!(!resp.payload.over_limit_caused);
        assert_eq!(fx.billed().await, 2);
        assert!(
            fx.db
                .find_member_by_user(fx.root.id, users[2])
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_add_members_success() {
        let fx = Fixture::new(Plan::Free, 5).await;
        let users = fx.users(2).await;

        let resp = fx
            .service
            .add_members(&RequestContext::new(), fx.root.id, &users, AccessLevel::Guest)
            .await
            .unwrap();

        assert!(resp.is_success());
        assert_eq!(resp.payload.members.len(), 2);
        assert!(resp.payload.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_existing_member_can_change_level_at_limit() {
        let fx = Fixture::new(Plan::Free, 1).await;
        let users = fx.users(1).await;
        let ctx = RequestContext::new();

        fx.service
            .add_members(&ctx, fx.root.id, &users, AccessLevel::Guest)
            .await
            .unwrap();
        let resp = fx
            .service
            .add_members(&ctx, fx.root.id, &users, AccessLevel::Maintainer)
            .await
            .unwrap();

        assert!(resp.is_success());
        assert_eq!(resp.payload.members[0].access_level, AccessLevel::Maintainer);
    }

    #[tokio::test]
    async fn test_level_change_does_not_cause_existing_overage() {
        let fx = Fixture::new(Plan::Free, 10).await;
        let users = fx.users(3).await;
        let ctx = RequestContext::new();

        fx.service
            .add_members(&ctx, fx.root.id, &users, AccessLevel::Developer)
            .await
            .unwrap();

        // The limit drops below what is already seated.
        let lowered = MembersService::new(
            fx.db.clone(),
            fx.cache.clone(),
            CapSettings {
                limit: 2,
                ..CapSettings::default()
            },
        );
        let resp = lowered
            .add_members(&RequestContext::new(), fx.root.id, &users[..1], AccessLevel::Maintainer)
            .await
            .unwrap();

        assert!(resp.is_success());
        assert_eq!(resp.payload.members[0].access_level, AccessLevel::Maintainer);
        assert!(!resp.payload.over_limit_caused);
    }

    #[tokio::test]
    async fn test_paid_namespace_is_not_capped() {
        let fx = Fixture::new(Plan::Premium, 1).await;
        let users = fx.users(3).await;

        let resp = fx
            .service
            .add_members(&RequestContext::new(), fx.root.id, &users, AccessLevel::Developer)
            .await
            .unwrap();

        assert!(resp.is_success());
        assert_eq!(fx.billed().await, 3);
    }

    #[tokio::test]
    async fn test_subgroup_members_count_against_root() {
        let fx = Fixture::new(Plan::Free, 1).await;
        let sub = fx
            .db
            .create_namespace(&CreateNamespace {
                name: "Team".into(),
                path: "team".into(),
                kind: NamespaceKind::Group,
                parent_id: Some(fx.root.id),
                plan: Plan::Free,
            })
            .await
            .unwrap();
        let users = fx.users(2).await;
        let ctx = RequestContext::new();

        let first = fx
            .service
            .add_members(&ctx, fx.root.id, &users[..1], AccessLevel::Developer)
            .await
            .unwrap();
        assert!(first.is_success());

        let second = fx
            .service
            .add_members(&ctx, sub.id, &users[1..], AccessLevel::Developer)
            .await
            .unwrap();
        assert_eq!(second.reason, Some(ErrorReason::SeatLimitReached));
    }

    #[tokio::test]
    async fn test_add_members_unknown_user_and_namespace() {
        let fx = Fixture::new(Plan::Free, 5).await;
        let ctx = RequestContext::new();

        let resp = fx
            .service
            .add_members(&ctx, fx.root.id, &[999], AccessLevel::Developer)
            .await
            .unwrap();
        assert_eq!(resp.reason, Some(ErrorReason::NotFound));
        assert_eq!(resp.payload.rejected[0].user_id, 999);

        let resp = fx
            .service
            .add_members(&ctx, 999, &[1], AccessLevel::Developer)
            .await
            .unwrap();
        assert_eq!(resp.reason, Some(ErrorReason::NotFound));
    }

    #[tokio::test]
    async fn test_add_members_invalidates_shared_count() {
        let fx = Fixture::new(Plan::Free, 5).await;
        let users = fx.users(1).await;
        fx.cache
            .write(&users_count_key(fx.root.id), json!(0), None)
            .await
            .unwrap();

        fx.service
            .add_members(&RequestContext::new(), fx.root.id, &users, AccessLevel::Developer)
            .await
            .unwrap();

        assert!(
            fx.cache
                .read(&users_count_key(fx.root.id))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_invite_does_not_take_a_seat() {
        let fx = Fixture::new(Plan::Free, 1).await;
        let users = fx.users(2).await;
        let ctx = RequestContext::new();

        fx.service
            .add_members(&ctx, fx.root.id, &users[..1], AccessLevel::Developer)
            .await
            .unwrap();
        let resp = fx
            .service
            .invite(&ctx, fx.root.id, users[1], AccessLevel::Developer)
            .await
            .unwrap();

        assert!(resp.is_success());
        assert_eq!(resp.payload.unwrap().state, MemberState::Invited);
        assert_eq!(fx.billed().await, 1);
    }

    #[tokio::test]
    async fn test_invite_existing_member_is_rejected() {
        let fx = Fixture::new(Plan::Free, 5).await;
        let users = fx.users(1).await;
        let ctx = RequestContext::new();

        fx.service
            .add_members(&ctx, fx.root.id, &users, AccessLevel::Developer)
            .await
            .unwrap();
        let resp = fx
            .service
            .invite(&ctx, fx.root.id, users[0], AccessLevel::Developer)
            .await
            .unwrap();
        assert_eq!(resp.reason, Some(ErrorReason::UnprocessableEntity));
    }

    #[tokio::test]
    async fn test_accept_invite_blocked_when_full() {
        let fx = Fixture::new(Plan::Free, 1).await;
        let users = fx.users(2).await;
        let ctx = RequestContext::new();

        let invited = fx
            .service
            .invite(&ctx, fx.root.id, users[1], AccessLevel::Developer)
            .await
            .unwrap()
            .payload
            .unwrap();
        fx.service
            .add_members(&ctx, fx.root.id, &users[..1], AccessLevel::Developer)
            .await
            .unwrap();

        let resp = fx.service.accept_invite(&ctx, invited.id).await.unwrap();
        assert_eq!(resp.reason, Some(ErrorReason::SeatLimitReached));
        assert_eq!(
            fx.db.find_member(invited.id).await.unwrap().unwrap().state,
            MemberState::Invited
        );
    }

    #[tokio::test]
    async fn test_accept_invite_with_room() {
        let fx = Fixture::new(Plan::Free, 2).await;
        let users = fx.users(1).await;
        let ctx = RequestContext::new();

        let invited = fx
            .service
            .invite(&ctx, fx.root.id, users[0], AccessLevel::Reporter)
            .await
            .unwrap()
            .payload
            .unwrap();

        let resp = fx.service.accept_invite(&ctx, invited.id).await.unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.payload.unwrap().state, MemberState::Active);
        assert_eq!(fx.billed().await, 1);

        let again = fx.service.accept_invite(&ctx, invited.id).await.unwrap();
        assert_eq!(again.reason, Some(ErrorReason::UnprocessableEntity));
    }

    #[tokio::test]
    async fn test_remove_member_frees_a_seat() {
        let fx = Fixture::new(Plan::Free, 1).await;
        let users = fx.users(2).await;
        let ctx = RequestContext::new();

        let added = fx
            .service
            .add_members(&ctx, fx.root.id, &users[..1], AccessLevel::Developer)
            .await
            .unwrap();
        let member_id = added.payload.members[0].id;

        let cap = FreeUserCap::new(
            fx.db.clone(),
            fx.cache.clone(),
            CapSettings {
                limit: 1,
                ..CapSettings::default()
            },
            fx.root.clone(),
        );
        assert!(cap.reached_limit(&ctx, CachePolicy::Cached).await.unwrap());

        let resp = fx.service.remove_member(&ctx, member_id).await.unwrap();
        assert!(resp.is_success());
        assert!(!cap.reached_limit(&ctx, CachePolicy::Cached).await.unwrap());

        let resp = fx
            .service
            .add_members(&ctx, fx.root.id, &users[1..], AccessLevel::Developer)
            .await
            .unwrap();
        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn test_blocking_a_user_drops_cached_count() {
        let fx = Fixture::new(Plan::Free, 5).await;
        let users = fx.users(2).await;
        let ctx = RequestContext::new();

        fx.service
            .add_members(&ctx, fx.root.id, &users, AccessLevel::Developer)
            .await
            .unwrap();

        let cap = FreeUserCap::new(
            fx.db.clone(),
            fx.cache.clone(),
            CapSettings::default(),
            fx.root.clone(),
        );
        assert_eq!(cap.users_count(&ctx, CachePolicy::Cached).await.unwrap(), 2);

        let resp = fx
            .service
            .set_user_state(&ctx, users[0], UserState::Blocked)
            .await
            .unwrap();
        assert_eq!(resp.payload.unwrap().state, UserState::Blocked);

        assert!(
            fx.cache
                .read(&users_count_key(fx.root.id))
                .await
                .unwrap()
                .is_none()
        );
        let next = RequestContext::new();
        assert_eq!(cap.users_count(&next, CachePolicy::Cached).await.unwrap(), 1);

        fx.service
            .set_user_state(&next, users[0], UserState::Active)
            .await
            .unwrap();
        assert_eq!(cap.users_count(&next, CachePolicy::Cached).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_set_state_of_missing_user() {
        let fx = Fixture::new(Plan::Free, 5).await;
        let resp = fx
            .service
            .set_user_state(&RequestContext::new(), 404, UserState::Blocked)
            .await
            .unwrap();
        assert_eq!(resp.reason, Some(ErrorReason::NotFound));
    }

    #[tokio::test]
    async fn test_remove_missing_member() {
        let fx = Fixture::new(Plan::Free, 1).await;
        let resp = fx
            .service
            .remove_member(&RequestContext::new(), 42)
            .await
            .unwrap();
        assert_eq!(resp.reason, Some(ErrorReason::NotFound));
        assert!(resp.payload.is_none());
    }
}
