//! Ranks the entries of a table by how often they have been accessed.
//!
//! The ranking doesn't keep any state on its own. For each query, the access counts of all
//! entries are captured, sorted and the top entries are then resolved against the live table.
//! Entries which are deleted between these two steps are skipped, therefore a result can be
//! shorter than requested.
//!
//! Entries with the same access count are ranked by their creation order: the entry which was
//! created first comes first.
//!
//! # Examples
//! ```
//! # use cachetable::scheduler::ManualScheduler;
//! # use cachetable::table::Table;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! let table = Table::new("ranking", Arc::new(ManualScheduler::new()));
//! table.add("rarely", Duration::ZERO, ());
//! table.add("often", Duration::ZERO, ());
//!
//! for _ in 0..3 {
//!     let _ = table.get(&"often");
//! }
//! let _ = table.get(&"rarely");
//!
//! let ranking: Vec<_> = table.most_accessed(5).iter().map(|entry| *entry.key()).collect();
//! assert_eq!(ranking, vec!["often", "rarely"]);
//! ```
use std::sync::Arc;

use itertools::Itertools;

use crate::entry::Entry;
use crate::table::{CacheKey, CacheValue, Table};

impl<K: CacheKey, V: CacheValue> Table<K, V> {
    /// Returns up to **count** entries, ordered by their access count (highest first).
    pub fn most_accessed(&self, count: usize) -> Vec<Arc<Entry<K, V>>> {
        self.resolve(rank(self.access_snapshot(), count))
    }
}

/// Sorts the given (key, access count, serial) triples and yields the keys of the top **count**.
fn rank<K>(snapshot: Vec<(K, u64, u64)>, count: usize) -> Vec<K> {
    snapshot
        .into_iter()
        .sorted_by(|(_, hits_a, serial_a), (_, hits_b, serial_b)| {
            hits_b.cmp(hits_a).then(serial_a.cmp(serial_b))
        })
        .take(count)
        .map(|(key, _, _)| key)
        .collect()
}
