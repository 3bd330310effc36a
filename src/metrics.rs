//! Keeps track of the operations performed on a table.
//!
//! All counters are plain atomics, therefore recording a metric never requires a lock. A
//! consistent view of all counters isn't guaranteed - a [TableStats] snapshot might be taken while
//! other threads are still busy updating the table.
use std::fmt;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fmt::format_duration;

#[derive(Default)]
pub(crate) struct Metrics {
    reads: AtomicU64,
    hits: AtomicU64,
    loads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    expirations: AtomicU64,
    sweeps: AtomicU64,
}

impl Metrics {
    pub(crate) fn record_read(&self, hit: bool) {
        let _ = self.reads.fetch_add(1, Ordering::Relaxed);
        if hit {
            let _ = self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_load(&self) {
        let _ = self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        let _ = self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, expired: bool) {
        let _ = self.deletes.fetch_add(1, Ordering::Relaxed);
        if expired {
            let _ = self.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_sweep(&self) {
        let _ = self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.reads,
            &self.hits,
            &self.loads,
            &self.writes,
            &self.deletes,
            &self.expirations,
            &self.sweeps,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, entries: usize, sweep_interval: std::time::Duration) -> TableStats {
        TableStats {
            entries,
            sweep_interval,
            reads: self.reads.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }
}

/// Provides a snapshot of the metrics of a table.
///
/// Note that all counters are reset when the table is flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    /// The number of entries in the table.
    pub entries: usize,
    /// The delay of the next scheduled sweep as computed by the last sweep (zero if none is
    /// scheduled).
    pub sweep_interval: std::time::Duration,
    /// The number of lookups performed via **get**.
    pub reads: u64,
    /// The number of lookups which found an entry without invoking the data loader.
    pub hits: u64,
    /// The number of entries which have been provided by the data loader.
    pub loads: u64,
    /// The number of entries which have been added.
    pub writes: u64,
    /// The number of entries which have been deleted (explicitly or due to expiration).
    pub deletes: u64,
    /// The number of entries which have been evicted by a sweep.
    pub expirations: u64,
    /// The number of sweeps which have been executed.
    pub sweeps: u64,
}

impl TableStats {
    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the number of lookups which didn't find an entry in the table.
    pub fn misses(&self) -> u64 {
        self.reads.saturating_sub(self.hits)
    }
}

impl Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<30} {:>20}", "Num Entries", self.entries)?;
        writeln!(
            f,
            "{:<30} {:>20}",
            "Next Sweep",
            if self.sweep_interval.is_zero() {
                "-".to_owned()
            } else {
                format_duration(self.sweep_interval)
            }
        )?;
        writeln!(f, "{:<30} {:>20}", "Reads", self.reads)?;
        writeln!(f, "{:<30} {:>18.2} %", "Hit Rate", self.hit_rate())?;
        writeln!(f, "{:<30} {:>20}", "Loads", self.loads)?;
        writeln!(f, "{:<30} {:>20}", "Writes", self.writes)?;
        writeln!(f, "{:<30} {:>20}", "Deletes", self.deletes)?;
        writeln!(f, "{:<30} {:>20}", "Expirations", self.expirations)?;
        writeln!(f, "{:<30} {:>20}", "Sweeps", self.sweeps)
    }
}
