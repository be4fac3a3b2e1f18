//! Membership changes that consume or free seats.

mod service;

pub use service::{AddMembersOutcome, MembersService, Rejection};
