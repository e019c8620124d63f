//! Query execution and statement policy.

pub mod executor;
pub mod policy;

pub use executor::QueryExecutor;
pub use policy::StatementPolicy;
