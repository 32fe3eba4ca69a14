/// All persisted timestamps are whole seconds since the Unix epoch (UTC).
pub type UnixTimestamp = i64;

/// Job identifiers are opaque strings (UUID v4 in practice).
pub type JobId = String;

/// Current wall-clock time as a [`UnixTimestamp`].
pub fn now_unix() -> UnixTimestamp {
    chrono::Utc::now().timestamp()
}

/// Generate a fresh job identifier.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}

/// Whether `id` has the shape of an identifier produced by [`new_job_id`].
///
/// Job ids double as staging directory names, so anything that is not a
/// canonical UUID is rejected before it can reach the filesystem.
pub fn is_valid_job_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id)
        .map(|u| u.hyphenated().to_string() == id)
        .unwrap_or(false)
}
