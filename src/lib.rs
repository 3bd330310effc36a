//! Cachetable is an in-process, keyed cache whose entries expire once they have not been accessed
//! for longer than their lifespan.
//!
//! # Introduction
//! A [Table](table::Table) stores arbitrary values under arbitrary keys. Each entry is added with
//! a **lifespan**: if the entry isn't read for that long, it is evicted automatically. A lifespan
//! of zero marks an entry as eternal - it stays until it is deleted explicitly or the table is
//! flushed.
//!
//! Instead of polling at a fixed rate, each table runs a **self-tuning expiration sweep**. Every
//! sweep evicts what has expired and then re-arms itself for the moment the next surviving entry
//! would expire. Inserting an entry which expires sooner than the pending sweep pulls the sweep
//! forward. This keeps the cost of a sweep proportional to the number of live entries without
//! letting short-lived entries linger around.
//!
//! # Features
//! * **Lifecycle callbacks**: a table can be notified when entries are added or about to be
//!   deleted, and each entry can carry its own "about to expire" callback. All callbacks run
//!   without holding the table lock, therefore they may safely call back into the table.
//! * **Loaders**: a data loader is invoked on a cache miss to materialize the requested value on
//!   demand (see [Table::get_with](table::Table::get_with)).
//! * **Access statistics**: each entry keeps track of its access count and last access, which
//!   permits to query the most accessed entries (see [ranking]).
//! * **Pluggable timers**: sweeps are armed via a [Scheduler](scheduler::Scheduler). In production
//!   this is backed by **tokio**, tests use a [ManualScheduler](scheduler::ManualScheduler) to
//!   fire sweeps deterministically.
//! * **Registry**: a [Registry](registry::Registry) hands out named tables and applies the
//!   settings loaded from a YAML [config].
//!
//! # Example
//! ```
//! # use cachetable::scheduler::ManualScheduler;
//! # use cachetable::table::Table;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! let table = Table::new("sessions", Arc::new(ManualScheduler::new()));
//!
//! table.add("alice".to_owned(), Duration::from_secs(60), 42);
//! assert_eq!(table.get(&"alice".to_owned()).unwrap().value(), &42);
//! assert_eq!(table.exists(&"bob".to_owned()), false);
//! ```
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod fmt;
pub mod metrics;
pub mod ranking;
pub mod registry;
pub mod scheduler;
pub mod table;

pub use entry::Entry;
pub use error::{CacheError, CacheResult};
pub use registry::Registry;
pub use table::Table;

/// Contains the version of this crate.
pub const CACHETABLE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up a
/// registry, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests and embedding applications might call this several times, but a logger can only
    // be installed once...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            eprintln!("Failed to initialize logging system: {}", error);
        }
    });
}

#[cfg(test)]
mod testing {
    use crate::scheduler::ManualScheduler;
    use crate::table::Table;
    use mock_instant::MockClock;
    use std::sync::Arc;
    use std::time::Duration;

    /// Creates a table of string keys and values which is driven by a manual scheduler.
    pub fn manual_table(name: &str) -> (Arc<Table<String, String>>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        (Table::new(name, scheduler.clone()), scheduler)
    }

    /// Moves the mock clock forward and fires every sweep which became due.
    pub fn advance(scheduler: &ManualScheduler, duration: Duration) -> usize {
        MockClock::advance(duration);
        scheduler.run_due()
    }

    /// Shorthand to create an owned key.
    pub fn key(key: &str) -> String {
        key.to_owned()
    }
}
