//! Provides a single cached key/value pair along with its lifespan and access statistics.
//!
//! An [Entry] is owned by its [Table](crate::table::Table) and handed out as **Arc<Entry>**. The
//! key, the value and the lifespan are immutable. The access statistics (time of the last access
//! and the number of accesses) are guarded by a lock which belongs to the entry itself. Therefore
//! frequent reads of a hot entry never contend with structural changes of the table.
//!
//! Note that the value itself is stored as is. If a value provides interior mutability, it is up
//! to the caller to coordinate access to it.
//!
//! # Examples
//! ```
//! # use cachetable::entry::Entry;
//! # use std::time::Duration;
//! let entry = Entry::new("key", Duration::from_secs(5), "value");
//! assert_eq!(entry.access_count(), 0);
//! assert_eq!(entry.accessed_at(), entry.created_at());
//!
//! entry.keep_alive();
//! assert_eq!(entry.access_count(), 1);
//! assert!(entry.accessed_at() >= entry.created_at());
//! ```
use std::fmt;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::clock::Instant;

/// Invoked with the key of an entry right before the entry is removed from its table.
pub type ExpireCallback<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Hands out the creation order of entries. Used as tie-break when ranking entries.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

struct Access {
    accessed_at: Instant,
    count: u64,
}

/// Represents a cached value.
pub struct Entry<K, V> {
    key: K,
    value: V,
    lifespan: Duration,
    created_at: Instant,
    serial: u64,
    access: Mutex<Access>,
    about_to_expire: RwLock<Option<ExpireCallback<K>>>,
}

impl<K, V> Entry<K, V> {
    /// Creates a new entry.
    ///
    /// A **lifespan** of zero marks the entry as eternal, otherwise it specifies how long the
    /// entry may remain unaccessed before it is evicted.
    pub fn new(key: K, lifespan: Duration, value: V) -> Self {
        let now = Instant::now();
        Entry {
            key,
            value,
            lifespan,
            created_at: now,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            access: Mutex::new(Access {
                accessed_at: now,
                count: 0,
            }),
            about_to_expire: RwLock::new(None),
        }
    }

    /// Marks the entry as accessed.
    ///
    /// This resets the idle time of the entry and increments its access counter.
    pub fn keep_alive(&self) {
        let mut access = self.access.lock();
        access.accessed_at = Instant::now();
        access.count += 1;
    }

    /// Returns the key of this entry.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns the lifespan of this entry. Zero indicates an eternal entry.
    pub fn lifespan(&self) -> Duration {
        self.lifespan
    }

    /// Determines if this entry never expires.
    pub fn is_eternal(&self) -> bool {
        self.lifespan.is_zero()
    }

    /// Returns the timestamp at which this entry was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns the timestamp of the last access (or the creation timestamp if the entry was
    /// never accessed).
    pub fn accessed_at(&self) -> Instant {
        self.access.lock().accessed_at
    }

    /// Returns how often this entry was accessed.
    pub fn access_count(&self) -> u64 {
        self.access.lock().count
    }

    /// Returns the creation order of this entry. Smaller values were created earlier.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Returns the time of the last access and the access count as a consistent pair.
    pub(crate) fn access_snapshot(&self) -> (Instant, u64) {
        let access = self.access.lock();
        (access.accessed_at, access.count)
    }

    /// Installs a callback which is invoked with the key right before this entry is removed.
    ///
    /// This replaces a previously installed callback. Note that if the entry is already visible
    /// to other threads, it might be removed concurrently before the callback is installed.
    pub fn set_about_to_expire_callback(&self, callback: impl Fn(&K) + Send + Sync + 'static) {
        *self.about_to_expire.write() = Some(Arc::new(callback));
    }

    /// Removes the "about to expire" callback.
    pub fn remove_about_to_expire_callback(&self) {
        *self.about_to_expire.write() = None;
    }

    /// Runs the "about to expire" callback if one is present.
    ///
    /// The callback is cloned out of its lock before it is run, so that it may replace itself.
    pub(crate) fn notify_about_to_expire(&self) {
        let callback = self.about_to_expire.read().clone();
        if let Some(callback) = callback {
            callback(&self.key);
        }
    }
}

impl<K: Debug, V: Debug> Debug for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (accessed_at, count) = self.access_snapshot();
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("lifespan", &self.lifespan)
            .field("created_at", &self.created_at)
            .field("accessed_at", &accessed_at)
            .field("access_count", &count)
            .finish()
    }
}
