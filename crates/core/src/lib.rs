//! Domain vocabulary shared by the storage layer and the API server.
//!
//! Nothing in this crate performs I/O: roles, statuses, message records,
//! identifier helpers, the student visibility filter and the event-channel
//! wire protocol all live here so both sides agree on them.

pub mod chat;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod roles;
pub mod types;
pub mod visibility;
