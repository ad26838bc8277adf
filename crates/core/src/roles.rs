//! Roles a message sender or connection can hold.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The role of a message sender.
///
/// `Teacher` and `Student` are the only roles a connection can join with;
/// `System` and `Ai` appear only on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
    System,
    Ai,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::System => "system",
            Role::Ai => "ai",
        }
    }

    /// Returns `true` for roles a live connection may join a session with.
    pub fn can_join(self) -> bool {
        matches!(self, Role::Teacher | Role::Student)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            "system" => Ok(Role::System),
            "ai" => Ok(Role::Ai),
            other => Err(CoreError::Validation(format!("Unknown role '{other}'"))),
        }
    }
}
