//! Free-user cap: a hard seat limit for root groups on a free plan.
//!
//! The limit and the on/off switch are instance-wide settings. A namespace is
//! capped when it is a root group on a free plan and not explicitly excluded.

mod enforcement;

pub use enforcement::{CachePolicy, CapStatus, FreeUserCap, users_count_key};
