//! Classroom chat relay server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! WebSocket infrastructure, chat dispatcher) so integration tests and the
//! binary entrypoint can both access them.

pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
