//! Which namespaces may start which trials.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::local::{CacheStore, LocalDb, RequestContext};
use crate::portal::{EligibleTrials, SubscriptionPortal};
use crate::types::{DataError, Namespace, NamespaceId, TrialType, UserId};

/// How long a namespace's eligibility is trusted.
pub const ELIGIBLE_TRIALS_CACHE_TTL: Duration = Duration::from_secs(8 * 60 * 60);

pub fn eligible_trials_key(namespace_id: NamespaceId) -> String {
    format!("namespaces:eligible_trials:{namespace_id}")
}

#[derive(Debug, Error)]
pub enum FinderError {
    /// Caller bug: the finder was asked the wrong question.
    #[error("invalid arguments: {0}")]
    InvalidArguments(&'static str),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Inputs to [`TrialEligibleFinder`]. Exactly one of `user` or `namespaces`.
#[derive(Debug, Clone, Default)]
pub struct FinderParams {
    /// Search the root groups this user owns.
    pub user: Option<UserId>,
    /// Search exactly these namespaces.
    pub namespaces: Option<Vec<Namespace>>,
    /// Only report these trial types. Defaults to all of them.
    pub trial_types: Option<Vec<TrialType>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibleNamespace {
    pub namespace: Namespace,
    /// Eligible trial types, restricted to the ones asked for.
    pub trial_types: Vec<TrialType>,
}

enum Candidates {
    OwnedBy(UserId),
    Given(Vec<Namespace>),
}

/// Finds namespaces eligible for a trial, asking the subscription portal at
/// most once per call.
pub struct TrialEligibleFinder {
    db: LocalDb,
    cache: Arc<dyn CacheStore>,
    portal: Arc<dyn SubscriptionPortal>,
    candidates: Candidates,
    trial_types: Vec<TrialType>,
}

impl TrialEligibleFinder {
    pub fn new(
        db: LocalDb,
        cache: Arc<dyn CacheStore>,
        portal: Arc<dyn SubscriptionPortal>,
        params: FinderParams,
    ) -> Result<Self, FinderError> {
        let candidates = match (params.user, params.namespaces) {
            (Some(_), Some(_)) => {
                return Err(FinderError::InvalidArguments(
                    "only user or namespaces may be given, not both",
                ));
            }
            (None, None) => {
                return Err(FinderError::InvalidArguments("user or namespaces is required"));
            }
            (Some(user), None) => Candidates::OwnedBy(user),
            (None, Some(namespaces)) => Candidates::Given(namespaces),
        };

        Ok(Self {
            db,
            cache,
            portal,
            candidates,
            trial_types: params.trial_types.unwrap_or_else(|| TrialType::ALL.to_vec()),
        })
    }

    /// Eligible namespaces ordered by name.
    ///
    /// A portal failure yields an empty result, never an error.
    pub async fn execute(&self, ctx: &RequestContext) -> Result<Vec<EligibleNamespace>, FinderError> {
        let candidates: Vec<Namespace> = match &self.candidates {
            Candidates::OwnedBy(user_id) => self.db.owned_root_groups(*user_id).await?,
            Candidates::Given(namespaces) => namespaces.clone(),
        }
        .into_iter()
        .filter(|ns| ns.plan.eligible_for_trial())
        .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<NamespaceId> = candidates.iter().map(|ns| ns.id).collect();
        ids.sort_unstable();
        ids.dedup();

        let eligible = match self.read_cached(&ids).await {
            Some(cached) => {
                debug!(request_id = %ctx.id(), count = ids.len(), "trial eligibility served from cache");
                cached
            }
            None => match self.fetch_and_cache(ctx, &ids).await {
                Some(fetched) => fetched,
                None => return Ok(Vec::new()),
            },
        };

        let mut results: Vec<EligibleNamespace> = candidates
            .into_iter()
            .filter_map(|namespace| {
                let types: Vec<TrialType> = eligible
                    .get(&namespace.id)?
                    .iter()
                    .copied()
                    .filter(|t| self.trial_types.contains(t))
                    .collect();
                (!types.is_empty()).then_some(EligibleNamespace {
                    namespace,
                    trial_types: types,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            a.namespace
                .name
                .cmp(&b.namespace.name)
                .then(a.namespace.id.cmp(&b.namespace.id))
        });
        results.dedup_by_key(|r| r.namespace.id);

        Ok(results)
    }

    /// Cached eligibility, only if every id is present. Any gap is a full miss.
    async fn read_cached(&self, ids: &[NamespaceId]) -> Option<EligibleTrials> {
        let keys: Vec<String> = ids.iter().map(|id| eligible_trials_key(*id)).collect();

        let found = match self.cache.read_multi(&keys).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "trial eligibility cache read failed");
                return None;
            }
        };

        if found.len() != keys.len() {
            return None;
        }

        let mut eligible = EligibleTrials::with_capacity(ids.len());
        for (id, key) in ids.iter().zip(&keys) {
            let tags: Vec<String> = serde_json::from_value(found.get(key)?.clone()).ok()?;
            eligible.insert(*id, TrialType::parse_tags(&tags));
        }
        Some(eligible)
    }

    /// One batched portal call for every id. Nothing is cached on failure.
    async fn fetch_and_cache(
        &self,
        ctx: &RequestContext,
        ids: &[NamespaceId],
    ) -> Option<EligibleTrials> {
        let eligible = match self.portal.namespace_eligible_trials(ids).await {
            Ok(eligible) => eligible,
            Err(e) => {
                error!(
                    request_id = %ctx.id(),
                    namespace_ids = ?ids,
                    error = %e,
                    "failed to fetch trial eligibility"
                );
                return None;
            }
        };

        let entries: Vec<(String, Value)> = eligible
            .iter()
            .map(|(id, types)| {
                let tags: Vec<&str> = types.iter().map(TrialType::as_str).collect();
                (eligible_trials_key(*id), Value::from(tags))
            })
            .collect();

        if !entries.is_empty() {
            if let Err(e) = self
                .cache
                .write_multi(entries, Some(ELIGIBLE_TRIALS_CACHE_TTL))
                .await
            {
                warn!(error = %e, "trial eligibility cache write failed");
            }
        }

        Some(eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::local::models::{CreateNamespace, CreateUser, UpsertMember};
    use crate::local::{MemoryCacheStore, MockCacheStore};
    use crate::portal::{MockSubscriptionPortal, PortalError};
    use crate::types::{AccessLevel, MemberState, NamespaceKind, Plan};
    use serde_json::json;

    async fn namespace(db: &LocalDb, name: &str, plan: Plan) -> Namespace {
        db.create_namespace(&CreateNamespace {
            name: name.into(),
            path: name.to_lowercase(),
            kind: NamespaceKind::Group,
            parent_id: None,
            plan,
        })
        .await
        .unwrap()
    }

    fn given(namespaces: Vec<Namespace>) -> FinderParams {
        FinderParams {
            namespaces: Some(namespaces),
            ..FinderParams::default()
        }
    }

    fn finder(
        db: &LocalDb,
        cache: Arc<dyn CacheStore>,
        portal: MockSubscriptionPortal,
        params: FinderParams,
    ) -> TrialEligibleFinder {
        TrialEligibleFinder::new(db.clone(), cache, Arc::new(portal), params).unwrap()
    }

    async fn warm(cache: &MemoryCacheStore, id: NamespaceId, tags: Value) {
        cache
            .write(&eligible_trials_key(id), tags, Some(ELIGIBLE_TRIALS_CACHE_TTL))
            .await
            .unwrap();
    }

    fn names(results: &[EligibleNamespace]) -> Vec<&str> {
        results.iter().map(|r| r.namespace.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_warm_cache_makes_no_remote_call() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let ns_premium = namespace(&db, "Beta", Plan::Premium).await;
        let ns_free = namespace(&db, "Alpha", Plan::Free).await;

        let cache = Arc::new(MemoryCacheStore::new());
        warm(&cache, ns_free.id, json!(["free"])).await;
        warm(&cache, ns_premium.id, json!(["premium"])).await;

        let mut portal = MockSubscriptionPortal::new();
        portal.expect_namespace_eligible_trials().never();

        let results = finder(&db, cache, portal, given(vec![ns_premium, ns_free]))
            .execute(&RequestContext::new())
            .await
            .unwrap();

        assert_eq!(names(&results), vec!["Alpha", "Beta"]);
        assert_eq!(results[0].trial_types, vec![TrialType::Free]);
        assert_eq!(results[1].trial_types, vec![TrialType::Premium]);
    }

    #[tokio::test]
    async fn test_partial_cache_refetches_everything_once() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let a = namespace(&db, "Alpha", Plan::Free).await;
        let b = namespace(&db, "Beta", Plan::Free).await;

        let cache = Arc::new(MemoryCacheStore::new());
        warm(&cache, a.id, json!(["premium"])).await;

        let (a_id, b_id) = (a.id, b.id);
        let mut portal = MockSubscriptionPortal::new();
        portal
            .expect_namespace_eligible_trials()
            .withf(move |ids| ids.to_vec() == vec![a_id, b_id])
            .times(1)
            .returning(move |_| {
                Ok(HashMap::from([
                    (a_id, vec![TrialType::Free]),
                    (b_id, vec![TrialType::DuoPro]),
                ]))
            });

        let results = finder(&db, cache.clone(), portal, given(vec![a, b]))
            .execute(&RequestContext::new())
            .await
            .unwrap();

        assert_eq!(names(&results), vec!["Alpha", "Beta"]);
        // The stale entry was overwritten along with the missing one.
        assert_eq!(
            cache.read(&eligible_trials_key(a_id)).await.unwrap(),
            Some(json!(["free"]))
        );
        assert_eq!(
            cache.read(&eligible_trials_key(b_id)).await.unwrap(),
            Some(json!(["duo_pro"]))
        );
    }

    #[tokio::test]
    async fn test_cold_cache_writes_with_expiry() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let a = namespace(&db, "Alpha", Plan::Free).await;
        let a_id = a.id;

        let mut portal = MockSubscriptionPortal::new();
        portal
            .expect_namespace_eligible_trials()
            .times(1)
            .returning(move |_| Ok(HashMap::from([(a_id, vec![TrialType::Free])])));

        let mut cache = MockCacheStore::new();
        cache.expect_read_multi().returning(|_| Ok(HashMap::new()));
        cache
            .expect_write_multi()
            .withf(move |entries, expires_in| {
                entries.len() == 1
                    && entries[0] == (eligible_trials_key(a_id), json!(["free"]))
                    && *expires_in == Some(ELIGIBLE_TRIALS_CACHE_TTL)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let results = finder(&db, Arc::new(cache), portal, given(vec![a]))
            .execute(&RequestContext::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_returns_empty_and_skips_cache_write() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let a = namespace(&db, "Alpha", Plan::Free).await;

        let mut portal = MockSubscriptionPortal::new();
        portal
            .expect_namespace_eligible_trials()
            .times(1)
            .returning(|_| Err(PortalError::MissingCredentials));

        let mut cache = MockCacheStore::new();
        cache.expect_read_multi().returning(|_| Ok(HashMap::new()));
        cache.expect_write_multi().never();

        let results = finder(&db, Arc::new(cache), portal, given(vec![a]))
            .execute(&RequestContext::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_namespaces_without_portal_data_are_excluded() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let a = namespace(&db, "Alpha", Plan::Free).await;
        let b = namespace(&db, "Beta", Plan::Free).await;
        let a_id = a.id;

        let mut portal = MockSubscriptionPortal::new();
        portal
            .expect_namespace_eligible_trials()
            .times(1)
            .returning(move |_| Ok(HashMap::from([(a_id, vec![TrialType::Free])])));

        let cache = Arc::new(MemoryCacheStore::new());
        let results = finder(&db, cache.clone(), portal, given(vec![a, b.clone()]))
            .execute(&RequestContext::new())
            .await
            .unwrap();

        assert_eq!(names(&results), vec!["Alpha"]);
        assert!(cache.read(&eligible_trials_key(b.id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trial_type_filter() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let a = namespace(&db, "Alpha", Plan::Free).await;
        let b = namespace(&db, "Beta", Plan::Free).await;

        let cache = Arc::new(MemoryCacheStore::new());
        warm(&cache, a.id, json!(["free"])).await;
        warm(&cache, b.id, json!(["free", "duo_pro"])).await;

        let mut portal = MockSubscriptionPortal::new();
        portal.expect_namespace_eligible_trials().never();

        let params = FinderParams {
            namespaces: Some(vec![a, b]),
            trial_types: Some(vec![TrialType::DuoPro]),
            ..FinderParams::default()
        };
        let results = finder(&db, cache, portal, params)
            .execute(&RequestContext::new())
            .await
            .unwrap();

        assert_eq!(names(&results), vec!["Beta"]);
        assert_eq!(results[0].trial_types, vec![TrialType::DuoPro]);
    }

    #[tokio::test]
    async fn test_user_owned_groups_on_eligible_plans() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let ada = db
            .create_user(&CreateUser {
                username: "ada".into(),
                name: "Ada".into(),
                bot: false,
            })
            .await
            .unwrap();
        let free = namespace(&db, "Free Group", Plan::Free).await;
        let ultimate = namespace(&db, "Ultimate Group", Plan::Ultimate).await;
        let not_owned = namespace(&db, "Someone Else", Plan::Free).await;

        for (ns, level) in [
            (&free, AccessLevel::Owner),
            (&ultimate, AccessLevel::Owner),
            (&not_owned, AccessLevel::Maintainer),
        ] {
            db.upsert_member(&UpsertMember {
                namespace_id: ns.id,
                user_id: ada.id,
                access_level: level,
                state: MemberState::Active,
            })
            .await
            .unwrap();
        }

        let free_id = free.id;
        let mut portal = MockSubscriptionPortal::new();
        portal
            .expect_namespace_eligible_trials()
            .withf(move |ids| ids.to_vec() == vec![free_id])
            .times(1)
            .returning(move |_| Ok(HashMap::from([(free_id, vec![TrialType::Free])])));

        let params = FinderParams {
            user: Some(ada.id),
            ..FinderParams::default()
        };
        let results = finder(&db, Arc::new(MemoryCacheStore::new()), portal, params)
            .execute(&RequestContext::new())
            .await
            .unwrap();

        assert_eq!(names(&results), vec!["Free Group"]);
    }

    #[tokio::test]
    async fn test_no_candidates_skips_portal() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let ultimate = namespace(&db, "Ultimate", Plan::Ultimate).await;

        let mut portal = MockSubscriptionPortal::new();
        portal.expect_namespace_eligible_trials().never();

        let results = finder(&db, Arc::new(MemoryCacheStore::new()), portal, given(vec![ultimate]))
            .execute(&RequestContext::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_user_and_namespaces_together_is_rejected() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let ns = namespace(&db, "Alpha", Plan::Free).await;

        let both = FinderParams {
            user: Some(1),
            namespaces: Some(vec![ns]),
            ..FinderParams::default()
        };
        let result = TrialEligibleFinder::new(
            db.clone(),
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MockSubscriptionPortal::new()),
            both,
        );
        assert!(matches!(result, Err(FinderError::InvalidArguments(_))));

        let neither = TrialEligibleFinder::new(
            db,
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MockSubscriptionPortal::new()),
            FinderParams::default(),
        );
        assert!(matches!(neither, Err(FinderError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_counts_as_miss() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let a = namespace(&db, "Alpha", Plan::Free).await;
        let a_id = a.id;

        let cache = Arc::new(MemoryCacheStore::new());
        warm(&cache, a_id, json!({"not": "a list"})).await;

        let mut portal = MockSubscriptionPortal::new();
        portal
            .expect_namespace_eligible_trials()
            .times(1)
            .returning(move |_| Ok(HashMap::from([(a_id, vec![TrialType::Premium])])));

        let results = finder(&db, cache, portal, given(vec![a]))
            .execute(&RequestContext::new())
            .await
            .unwrap();
        assert_eq!(results[0].trial_types, vec![TrialType::Premium]);
    }
}
