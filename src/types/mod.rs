mod error;
mod member;
mod namespace;
mod plan;
mod response;
mod trial;

pub use error::DataError;
pub use member::*;
pub use namespace::*;
pub use plan::*;
pub use response::*;
pub use trial::*;
