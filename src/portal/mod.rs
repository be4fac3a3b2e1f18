//! Subscription portal - the external billing service.
//!
//! # Example
//!
//! ```ignore
//! use crate::portal::{HttpPortal, SubscriptionPortal};
//!
//! let portal = HttpPortal::from_config(&config)?;
//! let eligible = portal.namespace_eligible_trials(&[42, 43]).await?;
//! ```

mod client;
mod error;
mod http;

pub use client::{EligibleTrials, SubscriptionPortal};
#[cfg(test)]
pub use client::MockSubscriptionPortal;
pub use error::PortalError;
pub use http::HttpPortal;
