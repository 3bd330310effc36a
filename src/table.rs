//! Provides the table which stores the entries of a cache and evicts them once they expire.
//!
//! # Expiration
//! A table doesn't poll its entries at a fixed rate. Instead, each sweep walks all entries,
//! evicts those which have been idle for at least their lifespan and computes how long it takes
//! until the next surviving entry would expire. Exactly this delay is used to arm the next sweep
//! (via the [Scheduler](crate::scheduler::Scheduler) of the table). If no entry with a finite
//! lifespan remains, no sweep is scheduled at all.
//!
//! Adding an entry which would expire before the pending sweep fires (or adding the first entry
//! with a finite lifespan) triggers a sweep right away, which then re-arms the timer for the new
//! minimal delay. Therefore at most one sweep is pending per table at any time.
//!
//! # Locking
//! The entries of a table are guarded by a single reader/writer lock. Lookups share the lock,
//! structural changes (adding, deleting, sweeping, flushing) acquire it exclusively. The access
//! statistics of an entry are guarded by a lock of the entry itself (see [Entry]).
//!
//! All callbacks (data loader, added and "about to delete" callbacks on the table, "about to
//! expire" callbacks on entries) are invoked after the lock has been released. Callbacks may
//! therefore call back into the table. The price is a small window in which the table might
//! change between deciding to invoke a callback and actually invoking it.
//!
//! # Examples
//! ```
//! # use cachetable::scheduler::ManualScheduler;
//! # use cachetable::table::Table;
//! # use cachetable::error::CacheError;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! let table = Table::new("users", Arc::new(ManualScheduler::new()));
//!
//! // Entries with a lifespan are evicted once they are not accessed for that long...
//! table.add(1, Duration::from_secs(30), "Alice".to_owned());
//! // ..a lifespan of zero marks an entry as eternal.
//! table.add(2, Duration::ZERO, "Bob".to_owned());
//!
//! assert_eq!(table.count(), 2);
//! assert_eq!(table.get(&1).unwrap().value(), "Alice");
//!
//! // A data loader can provide missing entries on demand...
//! table.set_data_loader(|key, _| {
//!     Some(cachetable::Entry::new(*key, Duration::from_secs(10), format!("User {}", key)))
//! });
//! assert_eq!(table.get(&3).unwrap().value(), "User 3");
//! assert_eq!(table.exists(&3), true);
//!
//! assert_eq!(table.delete(&2).unwrap().value(), "Bob");
//! assert_eq!(table.delete(&2).unwrap_err(), CacheError::KeyNotFound);
//! ```
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use log::{Level, Log, Record};
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::clock::{idle_time, Instant};
use crate::config::TableSettings;
use crate::entry::Entry;
use crate::error::{CacheError, CacheResult};
use crate::fmt::format_duration;
use crate::metrics::{Metrics, TableStats};
use crate::scheduler::{Scheduler, TimerHandle};

/// The log target used for all table events.
pub const LOG_TARGET: &str = "cachetable";

/// Describes the requirements for keys of a table.
///
/// Keys are used in a hash map and reported in log messages.
pub trait CacheKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}
impl<T: Eq + Hash + Clone + Debug + Send + Sync + 'static> CacheKey for T {}

/// Describes the requirements for values of a table.
///
/// Values aren't constrained otherwise. Note however, that a value is shared by all callers which
/// obtain its entry. If it is internally mutable, it is up to the caller to coordinate access.
pub trait CacheValue: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> CacheValue for T {}

/// Invoked on a cache miss with the requested key and the extra arguments passed to
/// [Table::get_with]. Returns the entry to store or **None** if no value can be provided.
pub type DataLoader<K, V> = Arc<dyn Fn(&K, &[&dyn Any]) -> Option<Entry<K, V>> + Send + Sync>;

/// Invoked with an entry which has been added or which is about to be deleted.
pub type EntryCallback<K, V> = Arc<dyn Fn(&Arc<Entry<K, V>>) + Send + Sync>;

/// Stores the entries of a cache and evicts them once their lifespan is exceeded.
///
/// A table is always handed out as **Arc<Table>** as its scheduled sweeps need to refer back
/// to it.
pub struct Table<K, V> {
    name: String,
    state: RwLock<State<K, V>>,
    scheduler: Arc<dyn Scheduler>,
    settings: ArcSwap<TableSettings>,
    metrics: Metrics,
    this: Weak<Table<K, V>>,
}

struct State<K, V> {
    entries: HashMap<K, Arc<Entry<K, V>>>,
    sweep_interval: Duration,
    scheduled_sweep: Option<TimerHandle>,
    data_loader: Option<DataLoader<K, V>>,
    added: Option<EntryCallback<K, V>>,
    about_to_delete: Option<EntryCallback<K, V>>,
    logger: Option<Arc<dyn Log>>,
}

impl<K: CacheKey, V: CacheValue> Table<K, V> {
    /// Creates a new table with default settings.
    ///
    /// All sweeps of this table will be armed using the given scheduler.
    pub fn new(name: impl Into<String>, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Table::with_settings(name, scheduler, TableSettings::default())
    }

    /// Creates a new table using the given settings.
    pub fn with_settings(
        name: impl Into<String>,
        scheduler: Arc<dyn Scheduler>,
        settings: TableSettings,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this| Table {
            name,
            state: RwLock::new(State {
                entries: HashMap::new(),
                sweep_interval: Duration::ZERO,
                scheduled_sweep: None,
                data_loader: None,
                added: None,
                about_to_delete: None,
                logger: None,
            }),
            scheduler,
            settings: ArcSwap::from_pointee(settings),
            metrics: Metrics::default(),
            this: this.clone(),
        })
    }

    /// Returns the name of this table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the settings currently applied to this table.
    pub fn settings(&self) -> Arc<TableSettings> {
        self.settings.load_full()
    }

    /// Replaces the settings of this table.
    ///
    /// Note that a changed default lifespan only affects entries which are added afterwards.
    pub fn apply_settings(&self, settings: TableSettings) {
        self.settings.store(Arc::new(settings));
    }

    /// Adds the given value under the given key.
    ///
    /// An existing entry for the same key is replaced. A **lifespan** of zero marks the entry as
    /// eternal. If the new entry expires before the currently pending sweep, the sweep is
    /// re-scheduled immediately.
    ///
    /// Returns the newly created entry.
    pub fn add(&self, key: K, lifespan: Duration, value: V) -> Arc<Entry<K, V>> {
        let entry = Arc::new(Entry::new(key, lifespan, value));
        self.insert(self.state.write(), entry.clone());

        entry
    }

    /// Adds the given value using the default lifespan of this table.
    ///
    /// See [TableSettings::default_lifespan](crate::config::TableSettings::default_lifespan).
    pub fn put(&self, key: K, value: V) -> Arc<Entry<K, V>> {
        let lifespan = self.settings.load().default_lifespan;
        self.add(key, lifespan, value)
    }

    /// Adds the given value only if no entry for the given key is present yet.
    ///
    /// Checking and inserting happen atomically, therefore among concurrent callers for the same
    /// key, at most one will succeed. Returns **true** if the value has been added.
    pub fn not_found_add(&self, key: K, lifespan: Duration, value: V) -> bool {
        let state = self.state.write();
        if state.entries.contains_key(&key) {
            return false;
        }

        self.insert(state, Arc::new(Entry::new(key, lifespan, value)));
        true
    }

    /// Stores the given entry and releases the lock before invoking the "added" callback.
    fn insert(&self, mut state: RwLockWriteGuard<State<K, V>>, entry: Arc<Entry<K, V>>) {
        self.emit(
            state.logger.as_ref(),
            format_args!(
                "Adding entry with key {:?} and lifespan of {} to table {}",
                entry.key(),
                format_duration(entry.lifespan()),
                self.name
            ),
        );
        let _ = state.entries.insert(entry.key().clone(), entry.clone());
        let sweep_interval = state.sweep_interval;
        let added = state.added.clone();
        drop(state);

        self.metrics.record_write();

        if let Some(added) = added {
            added(&entry);
        }

        if !entry.is_eternal() && (sweep_interval.is_zero() || entry.lifespan() < sweep_interval)
        {
            self.expiration_check();
        }
    }

    /// Removes the entry for the given key.
    ///
    /// Before the entry is removed, the "about to delete" callback of the table and then the
    /// "about to expire" callback of the entry are invoked (both without holding the table lock).
    ///
    /// # Errors
    /// Fails with [CacheError::KeyNotFound] if no entry is present for the given key.
    pub fn delete(&self, key: &K) -> CacheResult<Arc<Entry<K, V>>> {
        let (entry, about_to_delete) = {
            let state = self.state.read();
            (state.entries.get(key).cloned(), state.about_to_delete.clone())
        };

        let entry = entry.ok_or(CacheError::KeyNotFound)?;
        self.evict(&entry, about_to_delete.as_ref(), false);

        Ok(entry)
    }

    /// Runs the delete sequence for the given entry.
    ///
    /// Nothing happens if the entry has already left the table (e.g. as a callback of an earlier
    /// eviction deleted it or flushed the table). The entry is only removed if the table still
    /// maps its key to this very entry once the callbacks completed. Therefore an entry which has
    /// been replaced by one of the callbacks survives.
    fn evict(
        &self,
        entry: &Arc<Entry<K, V>>,
        about_to_delete: Option<&EntryCallback<K, V>>,
        expired: bool,
    ) {
        if !Self::is_current(&self.state.read(), entry) {
            return;
        }

        if let Some(about_to_delete) = about_to_delete {
            about_to_delete(entry);
        }
        entry.notify_about_to_expire();

        let mut state = self.state.write();
        if Self::is_current(&state, entry) {
            let _ = state.entries.remove(entry.key());
            self.emit(
                state.logger.as_ref(),
                format_args!(
                    "Deleting entry with key {:?} which has been accessed {} times from table {}",
                    entry.key(),
                    entry.access_count(),
                    self.name
                ),
            );
            self.metrics.record_delete(expired);
        }
    }

    fn is_current(state: &State<K, V>, entry: &Arc<Entry<K, V>>) -> bool {
        state
            .entries
            .get(entry.key())
            .filter(|current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    /// Determines if an entry for the given key is present.
    pub fn exists(&self, key: &K) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Returns the entry for the given key.
    ///
    /// This is a shortcut for [get_with](Table::get_with) without any extra arguments for the
    /// data loader.
    pub fn get(&self, key: &K) -> CacheResult<Arc<Entry<K, V>>> {
        self.get_with(key, &[])
    }

    /// Returns the entry for the given key and marks it as accessed.
    ///
    /// If no entry is present and a data loader is installed, the loader is invoked with the key
    /// and the given arguments. An entry provided by the loader is added to the table (just like
    /// [add](Table::add) would do) and returned. Note that the loader is invoked synchronously and
    /// no timeout is enforced.
    ///
    /// # Errors
    /// Fails with [CacheError::KeyNotFound] if no entry is present and no data loader is installed.
    /// Fails with [CacheError::KeyNotFoundOrLoadable] if the data loader didn't provide an entry.
    pub fn get_with(&self, key: &K, args: &[&dyn Any]) -> CacheResult<Arc<Entry<K, V>>> {
        let (entry, data_loader) = {
            let state = self.state.read();
            (state.entries.get(key).cloned(), state.data_loader.clone())
        };

        if let Some(entry) = entry {
            self.metrics.record_read(true);
            entry.keep_alive();
            return Ok(entry);
        }

        self.metrics.record_read(false);
        let data_loader = data_loader.ok_or(CacheError::KeyNotFound)?;
        let loaded = data_loader(key, args).ok_or(CacheError::KeyNotFoundOrLoadable)?;

        self.metrics.record_load();
        let entry = Arc::new(loaded);
        self.insert(self.state.write(), entry.clone());

        Ok(entry)
    }

    /// Removes all entries and cancels the pending sweep.
    ///
    /// In contrast to [delete](Table::delete) or an expiration, no callbacks are invoked for the
    /// discarded entries. Note that this also resets all [metrics](Table::stats).
    pub fn flush(&self) {
        let mut state = self.state.write();
        self.emit(
            state.logger.as_ref(),
            format_args!("Flushing table {}", self.name),
        );

        state.entries.clear();
        state.sweep_interval = Duration::ZERO;
        if let Some(pending) = state.scheduled_sweep.take() {
            pending.cancel();
        }

        self.metrics.reset();
    }

    /// Returns the number of entries in this table.
    pub fn count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Determines if this table is empty.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Invokes the given closure for each entry of this table.
    ///
    /// The table is locked exclusively while the closure runs for all entries. Therefore the
    /// closure observes a consistent state, but it must not call back into this table (which
    /// would deadlock) and should return quickly.
    pub fn for_each(&self, mut visitor: impl FnMut(&K, &Arc<Entry<K, V>>)) {
        let state = self.state.write();
        for (key, entry) in state.entries.iter() {
            visitor(key, entry);
        }
    }

    /// Returns the delay of the pending sweep as computed by the last sweep.
    ///
    /// Zero indicates that no sweep is scheduled, as no entry with a finite lifespan is present.
    pub fn sweep_interval(&self) -> Duration {
        self.state.read().sweep_interval
    }

    /// Determines if a sweep is currently scheduled.
    pub fn has_scheduled_sweep(&self) -> bool {
        self.state.read().scheduled_sweep.is_some()
    }

    /// Returns the current metrics of this table.
    pub fn stats(&self) -> TableStats {
        let state = self.state.read();
        self.metrics
            .snapshot(state.entries.len(), state.sweep_interval)
    }

    /// Performs a sweep right away.
    ///
    /// All entries which have been idle for at least their lifespan are evicted (running the same
    /// callbacks as [delete](Table::delete)). The next sweep is scheduled for the moment the
    /// next remaining entry would expire. This is automatically invoked by scheduled sweeps and
    /// whenever an entry is added which expires before the pending sweep.
    pub fn expiration_check(&self) {
        let (expired, about_to_delete) = {
            let mut state = self.state.write();
            if let Some(pending) = state.scheduled_sweep.take() {
                pending.cancel();
            }

            if state.sweep_interval.is_zero() {
                self.emit(
                    state.logger.as_ref(),
                    format_args!("Expiration check installed for table {}", self.name),
                );
            } else {
                self.emit(
                    state.logger.as_ref(),
                    format_args!(
                        "Expiration check triggered after {} for table {}",
                        format_duration(state.sweep_interval),
                        self.name
                    ),
                );
            }

            let now = Instant::now();
            let mut expired = Vec::new();
            let mut next_sweep: Option<Duration> = None;
            for entry in state.entries.values().filter(|entry| !entry.is_eternal()) {
                let idle = idle_time(now, entry.accessed_at());
                if idle >= entry.lifespan() {
                    expired.push(entry.clone());
                } else {
                    let remaining = entry.lifespan() - idle;
                    next_sweep = Some(next_sweep.map_or(remaining, |next| next.min(remaining)));
                }
            }

            state.sweep_interval = next_sweep.unwrap_or(Duration::ZERO);
            if let Some(delay) = next_sweep {
                state.scheduled_sweep = Some(self.schedule_sweep(delay));
            }

            (expired, state.about_to_delete.clone())
        };

        self.metrics.record_sweep();

        for entry in &expired {
            self.evict(entry, about_to_delete.as_ref(), true);
        }
    }

    fn schedule_sweep(&self, delay: Duration) -> TimerHandle {
        let table = self.this.clone();
        self.scheduler.schedule(
            delay,
            Box::new(move || {
                // The table might have been dropped in the meantime...
                if let Some(table) = table.upgrade() {
                    table.expiration_check();
                }
            }),
        )
    }

    /// Installs the data loader which is invoked on a cache miss.
    ///
    /// The loader receives the requested key and the extra arguments passed to
    /// [get_with](Table::get_with). The entry it returns is stored under its own key, which
    /// should therefore match the requested one.
    pub fn set_data_loader(
        &self,
        loader: impl Fn(&K, &[&dyn Any]) -> Option<Entry<K, V>> + Send + Sync + 'static,
    ) {
        self.state.write().data_loader = Some(Arc::new(loader));
    }

    /// Removes the data loader.
    pub fn remove_data_loader(&self) {
        self.state.write().data_loader = None;
    }

    /// Installs a callback which is invoked for each added entry.
    pub fn set_added_callback(
        &self,
        callback: impl Fn(&Arc<Entry<K, V>>) + Send + Sync + 'static,
    ) {
        self.state.write().added = Some(Arc::new(callback));
    }

    /// Removes the "added" callback.
    pub fn remove_added_callback(&self) {
        self.state.write().added = None;
    }

    /// Installs a callback which is invoked before an entry is deleted or evicted.
    pub fn set_about_to_delete_callback(
        &self,
        callback: impl Fn(&Arc<Entry<K, V>>) + Send + Sync + 'static,
    ) {
        self.state.write().about_to_delete = Some(Arc::new(callback));
    }

    /// Removes the "about to delete" callback.
    pub fn remove_about_to_delete_callback(&self) {
        self.state.write().about_to_delete = None;
    }

    /// Installs a logger which receives all events of this table (additions, deletions, sweeps
    /// and flushes).
    pub fn set_logger(&self, logger: Arc<dyn Log>) {
        self.state.write().logger = Some(logger);
    }

    /// Removes the logger of this table.
    ///
    /// Events are then only reported to the **log** facade if enabled via
    /// [TableSettings::log_events](crate::config::TableSettings::log_events).
    pub fn remove_logger(&self) {
        self.state.write().logger = None;
    }

    fn emit(&self, logger: Option<&Arc<dyn Log>>, message: fmt::Arguments<'_>) {
        match logger {
            Some(logger) => logger.log(
                &Record::builder()
                    .args(message)
                    .level(Level::Debug)
                    .target(LOG_TARGET)
                    .module_path_static(Some(module_path!()))
                    .build(),
            ),
            None if self.settings.load().log_events => {
                log::debug!(target: LOG_TARGET, "{}", message)
            }
            None => (),
        }
    }

    /// Captures key, access count and creation order of all entries under the shared lock.
    pub(crate) fn access_snapshot(&self) -> Vec<(K, u64, u64)> {
        self.state
            .read()
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.access_count(), entry.serial()))
            .collect()
    }

    /// Resolves the given keys against the live table, skipping those which have vanished.
    pub(crate) fn resolve(&self, keys: impl IntoIterator<Item = K>) -> Vec<Arc<Entry<K, V>>> {
        let state = self.state.read();
        keys.into_iter()
            .filter_map(|key| state.entries.get(&key).cloned())
            .collect()
    }
}

impl<K: CacheKey, V: CacheValue> Debug for Table<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("entries", &self.count())
            .finish()
    }
}

impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        if let Some(pending) = self.state.get_mut().scheduled_sweep.take() {
            pending.cancel();
        }
    }
}
