/// Current UTC timestamp in Unix milliseconds.
///
/// All persisted timestamps on the edge node use this representation;
/// conversion to wall-clock formats happens at presentation boundaries.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
