//! Request-scoped state.
//!
//! A `RequestContext` lives for exactly one request (one CLI invocation) and
//! is passed by reference to every service that memoizes per request. Nothing
//! here outlives the request.

use dashmap::DashMap;
use uuid::Uuid;

use crate::types::NamespaceId;

/// What a request-cache entry memoizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKey {
    EnforceCap(NamespaceId),
    UsersCount(NamespaceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestValue {
    Flag(bool),
    Count(u64),
}

pub struct RequestContext {
    id: Uuid,
    cache: DashMap<RequestKey, RequestValue>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cache: DashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn flag(&self, key: RequestKey) -> Option<bool> {
        match self.cache.get(&key).map(|v| *v) {
            Some(RequestValue::Flag(b)) => Some(b),
            _ => None,
        }
    }

    pub fn count(&self, key: RequestKey) -> Option<u64> {
        match self.cache.get(&key).map(|v| *v) {
            Some(RequestValue::Count(n)) => Some(n),
            _ => None,
        }
    }

    pub fn store(&self, key: RequestKey, value: RequestValue) {
        self.cache.insert(key, value);
    }

    /// Forget everything memoized for a namespace, e.g. after its membership changed.
    pub fn forget_namespace(&self, namespace_id: NamespaceId) {
        self.cache.remove(&RequestKey::EnforceCap(namespace_id));
        self.cache.remove(&RequestKey::UsersCount(namespace_id));
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
