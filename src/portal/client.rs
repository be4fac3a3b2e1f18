//! Subscription portal trait and common types.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::PortalError;
use crate::types::{NamespaceId, TrialType};

/// Trial types each namespace may start, as reported by the portal.
///
/// Namespaces the portal knows nothing about are absent.
pub type EligibleTrials = HashMap<NamespaceId, Vec<TrialType>>;

/// The external billing service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionPortal: Send + Sync {
    /// Look up trial eligibility for a batch of namespaces in one call.
    async fn namespace_eligible_trials(
        &self,
        namespace_ids: &[NamespaceId],
    ) -> Result<EligibleTrials, PortalError>;
}
