//! Timestamps for metadata records.

/// Current Unix time in milliseconds, as stored in `createdAt`.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_match_wall_clock() {
        let before = chrono::Utc::now().timestamp();
        let millis = now_timestamp_millis();
        let after = chrono::Utc::now().timestamp();

        assert!(millis / 1000 >= before && millis / 1000 <= after);
    }

    #[test]
    fn test_millis_are_monotonic_enough() {
        let first = now_timestamp_millis();
        let second = now_timestamp_millis();
        assert!(second >= first);
    }
}
