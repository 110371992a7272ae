//! Cooperative cancellation for planning runs.
//!
//! A run owns one [`CancellationToken`]. Failure chains check it between
//! stage attempts; attempts already in flight are never interrupted.

mod token;

pub use token::{CancelReason, CancellationToken};
