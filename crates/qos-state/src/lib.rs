//! Persistent per-provider, per-account concurrency profile.

pub mod normalize;
pub mod profile;
pub mod store;

pub use normalize::normalize;
pub use profile::{AccountState, PROFILE_VERSION, Profile, ProviderProfile, ProviderSet};
pub use store::ProfileStore;
