//! Imports the OpenSesame course catalog into a learning platform.
//!
//! A sweep ([`orchestrator`]) lists the remote catalog through the
//! [`api`] client, creates [`category`] trees, records each course and queues
//! it. Background tasks ([`queue`]) then drive every course through the
//! [`state_machine`] using the edge handlers in [`handler`], while a circuit
//! breaker stops the queue after repeated failures.

pub mod api;
pub mod category;
pub mod config;
pub mod error;
pub mod handler;
pub mod host;
pub mod mapper;
pub mod orchestrator;
pub mod queue;
pub mod state_machine;
pub mod status;

#[cfg(test)]
mod testing;

pub use error::SyncError;
