//! Shared vocabulary for qos-hud: providers, their throttling policy,
//! failure kinds, cache sources and the error type callers match on.

pub mod error;
pub mod lenient;
pub mod types;

pub use error::AppError;
pub use types::{
    CacheSource, DEFAULT_ACCOUNT_ID, FailureKind, PolicyTable, Provider, ProviderPolicy,
    validate_account_id,
};
