//! User-level configuration (`~/.config/qos-hud/config.toml`) and XDG paths.

pub mod global;
pub mod paths;

pub use global::{CacheConfig, GeminiConfig, GlobalConfig, PolicyConfig, ProviderOverride};
