//! Per-table exclusive locks with bounded waiting.
//!
//! Every mutation of a table runs under that table's lock. Acquisition waits
//! at most the configured timeout and then fails with `Busy` instead of
//! blocking forever. Multi-table operations (archive) lock in sorted name
//! order so two such operations can never wait on each other in a cycle.

use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabula_core::{TabulaError, TabulaResult};

#[derive(Debug, Default)]
struct Slot {
    held: Mutex<bool>,
    released: Condvar,
}

impl Slot {
    fn try_acquire(&self, deadline: Instant) -> bool {
        let mut held = self.held.lock();
        while *held {
            if self.released.wait_until(&mut held, deadline).timed_out() && *held {
                return false;
            }
        }
        *held = true;
        true
    }

    fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_one();
    }

    fn is_held(&self) -> bool {
        *self.held.lock()
    }
}

/// Registry of table locks.
#[derive(Debug)]
pub struct TableLockManager {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    timeout: Duration,
}

/// Guard holding one or more table locks. Released on drop.
#[derive(Debug)]
pub struct TableGuard {
    // Sorted acquisition order; released in reverse.
    held: Vec<(String, Arc<Slot>)>,
}

impl TableGuard {
    /// Names of the tables this guard holds.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(|(name, _)| name.as_str())
    }
}

impl Drop for TableGuard {
    fn drop(&mut self) {
        while let Some((_, slot)) = self.held.pop() {
            slot.release();
        }
    }
}

impl TableLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn slot(&self, table: &str) -> Arc<Slot> {
        self.slots
            .lock()
            .entry(table.to_string())
            .or_default()
            .clone()
    }

    /// Lock a single table.
    pub fn acquire(&self, table: &str) -> TabulaResult<TableGuard> {
        self.acquire_many(&[table])
    }

    /// Lock several tables in a deadlock-free order.
    ///
    /// If any lock cannot be taken within the timeout, locks already taken
    /// are released and `Busy` names the table that could not be locked.
    pub fn acquire_many<S: AsRef<str>>(&self, tables: &[S]) -> TabulaResult<TableGuard> {
        let names: BTreeSet<&str> = tables.iter().map(|t| t.as_ref()).collect();
        let deadline = Instant::now() + self.timeout;

        let mut guard = TableGuard {
            held: Vec::with_capacity(names.len()),
        };
        for name in names {
            let slot = self.slot(name);
            if !slot.try_acquire(deadline) {
                tracing::warn!(
                    table = name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "table lock not acquired"
                );
                // `guard` drops here and releases everything taken so far.
                return Err(TabulaError::Busy {
                    table: name.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            guard.held.push((name.to_string(), slot));
        }
        Ok(guard)
    }

    /// Forget registry entries nobody holds or waits on. Returns how many
    /// entries were dropped.
    pub fn prune_idle(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| Arc::strong_count(slot) > 1 || slot.is_held());
        before - slots.len()
    }

    /// Number of tables with a registry entry.
    pub fn tracked(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_lock_and_release() {
        let locks = TableLockManager::new(Duration::from_millis(50));
        {
            let guard = locks.acquire("Widgets").unwrap();
            assert_eq!(guard.tables().collect::<Vec<_>>(), vec!["Widgets"]);
        }
        // Released on drop, so a second acquisition succeeds.
        assert!(locks.acquire("Widgets").is_ok());
    }

    #[test]
    fn test_contended_lock_times_out_busy() {
        let locks = Arc::new(TableLockManager::new(Duration::from_millis(30)));
        let _held = locks.acquire("Widgets").unwrap();

        let other = Arc::clone(&locks);
        let result = thread::spawn(move || other.acquire("Widgets").map(|_| ()))
            .join()
            .unwrap();
        assert!(matches!(
            result,
            Err(TabulaError::Busy { ref table, timeout_ms: 30 }) if table == "Widgets"
        ));
    }

    #[test]
    fn test_independent_tables_do_not_block() {
        let locks = TableLockManager::new(Duration::from_millis(30));
        let _a = locks.acquire("A").unwrap();
        assert!(locks.acquire("B").is_ok());
    }

    #[test]
    fn test_acquire_many_is_sorted_and_deduplicated() {
        let locks = TableLockManager::new(Duration::from_millis(30));
        let guard = locks.acquire_many(&["b", "a", "b"]).unwrap();
        assert_eq!(guard.tables().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_failed_multi_lock_releases_partial_locks() {
        let locks = Arc::new(TableLockManager::new(Duration::from_millis(30)));
        let _b = locks.acquire("b").unwrap();
        assert!(locks.acquire_many(&["a", "b"]).is_err());
        // "a" was taken then released when "b" timed out.
        assert!(locks.acquire("a").is_ok());
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let locks = Arc::new(TableLockManager::new(Duration::from_millis(2000)));
        let guard = locks.acquire("Widgets").unwrap();

        let other = Arc::clone(&locks);
        let waiter = thread::spawn(move || other.acquire("Widgets").is_ok());
        thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_prune_idle_keeps_held_slots() {
        let locks = TableLockManager::new(Duration::from_millis(30));
        let _held = locks.acquire("A").unwrap();
        drop(locks.acquire("B").unwrap());
        assert_eq!(locks.tracked(), 2);
        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.tracked(), 1);
    }
}
