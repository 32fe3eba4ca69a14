//! Deckhand worker library.
//!
//! Exposes the controller, renderer adapter and HTTP surface so the binary,
//! integration tests and the API's end-to-end tests share them.

pub mod config;
pub mod controller;
pub mod error;
pub mod renderer;
pub mod router;
pub mod routes;
