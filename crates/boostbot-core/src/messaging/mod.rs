//! Reaction-apply port and its decorators.

pub mod port;
pub mod throttled;
