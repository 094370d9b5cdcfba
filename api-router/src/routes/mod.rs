pub mod documents;
pub mod engines;
pub mod liveness;
pub mod query;
