//! Row models for the three durable tables.
//!
//! Rows keep enum columns as `TEXT`; `TryFrom` converts them into the
//! domain types from `classchat_core::chat`.

pub mod message;
pub mod session;
pub mod student;
