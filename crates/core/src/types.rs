use uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub type BlueprintId = Uuid;
pub type RangeId = Uuid;
pub type JobId = Uuid;

/// Caller identity. Authentication is handled upstream; this is the
/// opaque user name the request was made on behalf of.
pub type Owner = String;

/// Generate a new time-ordered identifier.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}
