//! Provides a registry which hands out tables by their name.
//!
//! The registry is an explicit object owned by the application. It is created once (usually via
//! the [Builder](crate::builder::Builder)) and then passed to whoever needs to look up tables.
//! Tables are created on first use and receive the [TableSettings] configured for their name.
//!
//! A registry can store tables of different key and value types. Requesting an existing table
//! using other types than the ones it was created with yields
//! [CacheError::TableTypeMismatch].
//!
//! # Examples
//! ```
//! # use cachetable::registry::Registry;
//! # use cachetable::scheduler::ManualScheduler;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! let registry = Registry::new(Arc::new(ManualScheduler::new()));
//!
//! let users = registry.table::<u32, String>("users").unwrap();
//! users.add(1, Duration::ZERO, "Alice".to_owned());
//!
//! // The same name yields the same table...
//! let same = registry.table::<u32, String>("users").unwrap();
//! assert_eq!(same.count(), 1);
//!
//! // ...as long as the types match.
//! assert_eq!(registry.table::<String, String>("users").is_err(), true);
//! ```
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::config::{Settings, TableSettings};
use crate::error::{CacheError, CacheResult};
use crate::fmt::format_duration;
use crate::scheduler::Scheduler;
use crate::table::{CacheKey, CacheValue, Table};

/// Permits the registry to manage tables regardless of their key and value types.
trait ManagedTable: Send + Sync {
    fn settings(&self) -> Arc<TableSettings>;
    fn apply_settings(&self, settings: TableSettings);
    fn flush(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K: CacheKey, V: CacheValue> ManagedTable for Table<K, V> {
    fn settings(&self) -> Arc<TableSettings> {
        Table::settings(self)
    }

    fn apply_settings(&self, settings: TableSettings) {
        Table::apply_settings(self, settings)
    }

    fn flush(&self) {
        Table::flush(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Hands out named tables and applies their settings.
pub struct Registry {
    tables: RwLock<HashMap<String, Arc<dyn ManagedTable>>>,
    scheduler: Arc<dyn Scheduler>,
    settings: ArcSwap<Settings>,
}

impl Registry {
    /// Creates a new registry whose tables arm their sweeps using the given scheduler.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Registry::with_settings(scheduler, Settings::default())
    }

    /// Creates a new registry which applies the given settings to its tables.
    pub fn with_settings(scheduler: Arc<dyn Scheduler>, settings: Settings) -> Arc<Self> {
        Arc::new(Registry {
            tables: RwLock::new(HashMap::new()),
            scheduler,
            settings: ArcSwap::from_pointee(settings),
        })
    }

    /// Returns the table with the given name, creating it if necessary.
    ///
    /// # Errors
    /// Fails with [CacheError::TableTypeMismatch] if a table with the given name exists but
    /// uses other key or value types.
    pub fn table<K: CacheKey, V: CacheValue>(&self, name: &str) -> CacheResult<Arc<Table<K, V>>> {
        if let Some(table) = self.tables.read().get(name) {
            return downcast(name, table.clone());
        }

        let mut tables = self.tables.write();

        // Another thread might have created the table while we were waiting for the lock...
        if let Some(table) = tables.get(name) {
            return downcast(name, table.clone());
        }

        log::info!("Creating table {}...", name);
        let table = Table::<K, V>::with_settings(
            name,
            self.scheduler.clone(),
            self.settings.load().table(name),
        );
        let managed: Arc<dyn ManagedTable> = table.clone();
        let _ = tables.insert(name.to_owned(), managed);

        Ok(table)
    }

    /// Returns the table with the given name if it exists and uses the given types.
    pub fn find<K: CacheKey, V: CacheValue>(&self, name: &str) -> Option<Arc<Table<K, V>>> {
        let table = self.tables.read().get(name).cloned()?;
        table.into_any().downcast::<Table<K, V>>().ok()
    }

    /// Returns the names of all known tables in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of known tables.
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    /// Determines if no table has been created yet.
    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    /// Flushes and forgets the table with the given name.
    ///
    /// Handles to the table which are still held elsewhere remain usable, but the registry will
    /// create a new table when the name is requested again. Returns **true** if a table was
    /// dropped.
    pub fn drop_table(&self, name: &str) -> bool {
        let table = self.tables.write().remove(name);
        match table {
            Some(table) => {
                log::info!("Dropping table {}...", name);
                table.flush();
                true
            }
            None => false,
        }
    }

    /// Flushes all known tables.
    pub fn flush_all(&self) {
        let tables: Vec<_> = self.tables.read().values().cloned().collect();
        for table in tables {
            table.flush();
        }
    }

    /// Returns the settings currently in use.
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    /// Applies the given settings to all existing tables and uses them for all future ones.
    ///
    /// Each changed value is reported in the log.
    pub fn reconfigure(&self, settings: Settings) {
        let tables: Vec<_> = self
            .tables
            .read()
            .iter()
            .map(|(name, table)| (name.clone(), table.clone()))
            .collect();

        for (name, table) in tables {
            let current = table.settings();
            let next = settings.table(&name);

            if current.default_lifespan != next.default_lifespan {
                log::info!(
                    "Updating the default lifespan of table {} from {} to {}.",
                    name,
                    format_duration(current.default_lifespan),
                    format_duration(next.default_lifespan)
                );
            }
            if current.log_events != next.log_events {
                log::info!(
                    "Updating log_events of table {} from {} to {}.",
                    name,
                    current.log_events,
                    next.log_events
                );
            }

            if *current != next {
                table.apply_settings(next);
            }
        }

        self.settings.store(Arc::new(settings));
    }
}

fn downcast<K: CacheKey, V: CacheValue>(
    name: &str,
    table: Arc<dyn ManagedTable>,
) -> CacheResult<Arc<Table<K, V>>> {
    table
        .into_any()
        .downcast::<Table<K, V>>()
        .map_err(|_| CacheError::TableTypeMismatch {
            name: name.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use crate::config::{Settings, TableSettings};
    use crate::error::CacheError;
    use crate::registry::Registry;
    use crate::scheduler::ManualScheduler;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    fn registry() -> Arc<Registry> {
        Registry::new(Arc::new(ManualScheduler::new()))
    }

    #[test]
    fn tables_are_created_on_first_use() {
        let registry = registry();
        assert_eq!(registry.is_empty(), true);

        let first = registry.table::<String, i32>("numbers").unwrap();
        let second = registry.table::<String, i32>("numbers").unwrap();
        assert_eq!(Arc::ptr_eq(&first, &second), true);
        assert_eq!(first.name(), "numbers");

        let _ = registry.table::<u8, u8>("bytes").unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["bytes", "numbers"]);
    }

    #[test]
    fn types_are_checked() {
        let registry = registry();
        let numbers = registry.table::<String, i32>("numbers").unwrap();
        assert_eq!(
            format!("{:?}", numbers),
            "Table { name: \"numbers\", entries: 0 }"
        );

        assert_eq!(
            registry.table::<String, String>("numbers").unwrap_err(),
            CacheError::TableTypeMismatch {
                name: "numbers".to_owned()
            }
        );
        assert_eq!(registry.find::<String, i32>("numbers").is_some(), true);
        assert_eq!(registry.find::<String, String>("numbers").is_none(), true);
        assert_eq!(registry.find::<String, i32>("unknown").is_none(), true);
    }

    #[test]
    fn concurrent_lookups_yield_one_table() {
        let registry = registry();
        let barrier = Arc::new(Barrier::new(4));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let _ = barrier.wait();
                    registry.table::<u32, u32>("shared").unwrap()
                })
            })
            .collect();

        let tables: Vec<_> = threads
            .into_iter()
            .map(|thread| thread.join().unwrap())
            .collect();
        for table in &tables {
            assert_eq!(Arc::ptr_eq(table, &tables[0]), true);
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn dropped_tables_are_flushed_and_forgotten() {
        let registry = registry();
        let table = registry.table::<u32, u32>("temp").unwrap();
        let _ = table.add(1, Duration::ZERO, 1);

        assert_eq!(registry.drop_table("temp"), true);
        assert_eq!(registry.drop_table("temp"), false);
        assert_eq!(table.count(), 0);

        let fresh = registry.table::<u32, u32>("temp").unwrap();
        assert_eq!(Arc::ptr_eq(&table, &fresh), false);
    }

    #[test]
    fn flush_all_empties_every_table() {
        let registry = registry();
        let numbers = registry.table::<u32, u32>("numbers").unwrap();
        let names = registry.table::<String, String>("names").unwrap();
        let _ = numbers.add(1, Duration::ZERO, 1);
        let _ = names.add("a".to_owned(), Duration::ZERO, "b".to_owned());

        registry.flush_all();
        assert_eq!(numbers.count(), 0);
        assert_eq!(names.count(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn settings_are_applied() {
        let sessions = TableSettings {
            default_lifespan: Duration::from_secs(60),
            log_events: false,
        };
        let registry = Registry::with_settings(
            Arc::new(ManualScheduler::new()),
            Settings::new().with_table("sessions", sessions.clone()),
        );

        let table = registry.table::<u32, u32>("sessions").unwrap();
        assert_eq!(*table.settings(), sessions);
        assert_eq!(
            registry.table::<u32, u32>("other").unwrap().settings().default_lifespan,
            Duration::ZERO
        );

        let updated = TableSettings {
            default_lifespan: Duration::from_secs(5),
            log_events: true,
        };
        registry.reconfigure(
            Settings::new()
                .with_table("sessions", updated.clone())
                .with_table("later", updated.clone()),
        );

        assert_eq!(*table.settings(), updated);
        assert_eq!(table.put(1, 1).lifespan(), Duration::from_secs(5));
        assert_eq!(
            *registry.table::<u32, u32>("later").unwrap().settings(),
            updated
        );
        assert_eq!(registry.settings().tables().count(), 2);
    }
}
