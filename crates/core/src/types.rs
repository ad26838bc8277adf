use chrono::SubsecRound;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Current time, truncated to the microsecond precision of `TIMESTAMPTZ`
/// so a stored value reads back equal to the one handed out.
pub fn now() -> Timestamp {
    chrono::Utc::now().trunc_subsecs(6)
}

/// Five-digit numeric session code, e.g. `"12345"`.
pub type SessionId = String;

/// Stable per-student identity that survives reconnects.
pub type PersistentId = String;

/// Transport-assigned identifier of a single live connection.
pub type ConnectionId = String;
