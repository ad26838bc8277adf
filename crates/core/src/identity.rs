//! Identifier helpers: session codes, persistent student ids, message ids.

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::types::PersistentId;

/// Number of digits in a session code.
pub const SESSION_CODE_LEN: usize = 5;

/// Length of the random suffix appended to synthesized student ids.
pub const STUDENT_ID_SUFFIX_LEN: usize = 6;

/// Generate a random five-digit session code (`10000..=99999`).
pub fn generate_session_code() -> String {
    rand::rng().random_range(10_000..=99_999u32).to_string()
}

/// Returns `true` if `code` looks like a session code.
pub fn is_valid_session_code(code: &str) -> bool {
    code.len() == SESSION_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

/// Lowercase a username and replace every run of non-alphanumeric
/// characters with a single `-`.
pub fn normalize_username(username: &str) -> String {
    let mut out = String::with_capacity(username.len());
    let mut pending_dash = false;
    for ch in username.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        out.push_str("student");
    }
    out
}

/// Case-insensitive username comparison, ignoring surrounding whitespace.
pub fn usernames_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Synthesize a persistent student id from the session and username.
///
/// The prefix is deterministic; the random suffix keeps two distinct
/// students with the same normalized name apart.
pub fn synthesize_student_id(session_id: &str, username: &str) -> PersistentId {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(STUDENT_ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{session_id}-{}-{suffix}", normalize_username(username))
}

/// New message id: time-ordered UUIDv7 (millisecond timestamp + random bits).
pub fn new_message_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
