//! Failure classification and adaptive concurrency control.

pub mod classify;
pub mod controller;
pub mod hint;

pub use classify::classify;
pub use controller::{
    ConcurrencyController, FailureOutcome, SuccessOutcome, apply_failure, apply_success,
};
pub use hint::render_hint;
