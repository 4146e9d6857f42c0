//! Diriyah Brain decision core.
//!
//! Routes construction chat messages to service handlers and narrows what
//! comes back to what the caller's role may see.

pub mod access;
pub mod brain;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reload;
pub mod telemetry;

pub use access::{AccessPolicy, User};
pub use brain::{IntentRouter, RouteContext, RouteOutcome};
pub use config::CoreConfig;
pub use error::AppError;
pub use pipeline::{BrainCore, BrainState, ChatReply};

#[cfg(test)]
mod tests;
