//! In-memory record storage using DashMap for concurrent access

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use geowitness_types::{Epoch, LocationReport, PartyId, StoredRecord, Tick};

/// Thread-safe record store keyed by `(user, epoch)`
///
/// Each record carries the logical timestamp of the write that produced it;
/// conflicting writes resolve last-writer-wins on that timestamp.
#[derive(Clone, Default)]
pub struct RecordStore {
    records: Arc<DashMap<(PartyId, Epoch), StoredRecord>>,
}

impl RecordStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for a user and epoch
    pub fn get(&self, user: PartyId, epoch: Epoch) -> Option<StoredRecord> {
        self.records.get(&(user, epoch)).map(|r| r.value().clone())
    }

    /// Check whether a record exists
    pub fn exists(&self, user: PartyId, epoch: Epoch) -> bool {
        self.records.contains_key(&(user, epoch))
    }

    /// Last-writer-wins apply: replace the stored record only if the
    /// incoming timestamp strictly exceeds the current one. Returns the
    /// timestamp the store holds afterwards.
    pub fn put_lww(&self, report: LocationReport, write_ts: Tick) -> Tick {
        let key = report.key();
        match self.records.entry(key) {
            Entry::Occupied(mut entry) => {
                if write_ts > entry.get().write_ts {
                    entry.insert(StoredRecord { report, write_ts });
                    write_ts
                } else {
                    entry.get().write_ts
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredRecord { report, write_ts });
                write_ts
            }
        }
    }

    /// Remove a record
    pub fn remove(&self, user: PartyId, epoch: Epoch) -> Option<StoredRecord> {
        self.records.remove(&(user, epoch)).map(|(_, record)| record)
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clear all records (for testing)
    pub fn clear(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geowitness_types::Position;

    fn report(user: PartyId, epoch: Epoch, x: f64) -> LocationReport {
        LocationReport {
            user,
            epoch,
            position: Position::new(x, 0.0),
            proofs: vec![],
        }
    }

    #[test]
    fn test_store_and_get() {
        let store = RecordStore::new();
        assert!(!store.exists(1, 2));

        let applied = store.put_lww(report(1, 2, 5.0), 10);
        assert_eq!(applied, 10);
        assert!(store.exists(1, 2));

        let record = store.get(1, 2).unwrap();
        assert_eq!(record.write_ts, 10);
        assert_eq!(record.report.position.x, 5.0);
        assert!(store.get(1, 3).is_none());
    }

    #[test]
    fn test_last_writer_wins_in_arrival_order() {
        let store = RecordStore::new();
        store.put_lww(report(1, 2, 1.0), 10);
        let applied = store.put_lww(report(1, 2, 2.0), 20);
        assert_eq!(applied, 20);
        assert_eq!(store.get(1, 2).unwrap().report.position.x, 2.0);
    }

    #[test]
    fn test_last_writer_wins_in_reverse_order() {
        let store = RecordStore::new();
        store.put_lww(report(1, 2, 2.0), 20);

        // The older write arrives late; the store keeps the newer record
        let applied = store.put_lww(report(1, 2, 1.0), 10);
        assert_eq!(applied, 20);
        assert_eq!(store.get(1, 2).unwrap().report.position.x, 2.0);
        assert_eq!(store.get(1, 2).unwrap().write_ts, 20);
    }

    #[test]
    fn test_equal_timestamps_keep_first_write() {
        let store = RecordStore::new();
        store.put_lww(report(1, 2, 1.0), 10);
        let applied = store.put_lww(report(1, 2, 2.0), 10);
        assert_eq!(applied, 10);
        assert_eq!(store.get(1, 2).unwrap().report.position.x, 1.0);
    }

    #[test]
    fn test_remove() {
        let store = RecordStore::new();
        store.put_lww(report(1, 2, 1.0), 1);
        assert_eq!(store.len(), 1);
        assert!(store.remove(1, 2).is_some());
        assert!(store.is_empty());
        assert!(store.remove(1, 2).is_none());
    }
}
