//! Stored Entry Module
//!
//! Defines the record held in the store for each cached key.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

// == Stored Entry ==
/// A single cached value with its load and access metadata.
///
/// `last_access` uses the tokio clock so idle-TTL behavior can be driven
/// deterministically by paused-clock tests; `loaded_at_millis` is wall time
/// for display in snapshots. Together with `access_seq`, `last_access`
/// forms the entry's position in the store's access order.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// The loaded value
    pub value: String,
    /// Wall-clock load time (Unix milliseconds)
    pub loaded_at_millis: u64,
    /// Monotonic instant of the most recent read or load
    pub last_access: Instant,
    /// Tie breaker for entries sharing an instant; assigned by the store,
    /// strictly increasing, so equal instants keep insertion order
    pub(crate) access_seq: u64,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates an entry that was just loaded and accessed.
    pub fn new(value: String, now: Instant, seq: u64) -> Self {
        Self {
            value,
            loaded_at_millis: current_timestamp_ms(),
            last_access: now,
            access_seq: seq,
        }
    }

    /// Marks the entry as accessed, resetting its idle-TTL clock and its
    /// position in the access order.
    pub fn touch(&mut self, now: Instant, seq: u64) {
        self.last_access = now;
        self.access_seq = seq;
    }

    /// The entry's current slot in the access order.
    pub(crate) fn access_stamp(&self) -> (Instant, u64) {
        (self.last_access, self.access_seq)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_entry_records_load_time() {
        let before = current_timestamp_ms();
        let entry = StoredEntry::new("value".to_string(), Instant::now(), 1);
        let after = current_timestamp_ms();

        assert!(entry.loaded_at_millis >= before);
        assert!(entry.loaded_at_millis <= after);
        assert_eq!(entry.value, "value");
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_advances_access_stamp() {
        let mut entry = StoredEntry::new("value".to_string(), Instant::now(), 1);
        let created = entry.access_stamp();

        tokio::time::advance(Duration::from_secs(30)).await;
        entry.touch(Instant::now(), 2);

        assert!(entry.access_stamp() > created);
        assert_eq!(
            entry.last_access.duration_since(created.0),
            Duration::from_secs(30)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stamps_order_by_sequence_at_equal_instants() {
        let now = Instant::now();
        let first = StoredEntry::new("a".to_string(), now, 1);
        let second = StoredEntry::new("b".to_string(), now, 2);

        // Same instant under the paused clock, so the sequence decides
        assert!(first.access_stamp() < second.access_stamp());
    }
}
