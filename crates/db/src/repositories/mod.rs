//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod message_repo;
pub mod session_repo;
pub mod student_repo;

pub use message_repo::MessageRepo;
pub use session_repo::SessionRepo;
pub use student_repo::StudentRepo;
