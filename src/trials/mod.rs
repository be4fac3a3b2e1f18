//! Trial eligibility.
//!
//! The subscription portal decides which trials a namespace may start. Answers
//! are cached per namespace for eight hours so repeated lookups stay local.

mod finder;

pub use finder::{
    ELIGIBLE_TRIALS_CACHE_TTL, EligibleNamespace, FinderError, FinderParams, TrialEligibleFinder,
    eligible_trials_key,
};
