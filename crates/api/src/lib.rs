//! Deckhand API server library.
//!
//! Exposes config, state, error handling, the job queue and routes so the
//! binary entrypoint and integration tests share them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod queue;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
