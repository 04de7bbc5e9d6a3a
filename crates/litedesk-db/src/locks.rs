//! Per-object lock registry
//!
//! Structural operations (commit, ALTER, import) take an exclusive lock
//! on the object they touch so two owners cannot interleave. Locks are
//! purely in-memory and advisory; the `None` name slot locks the whole
//! database.

use indexmap::IndexMap;
use parking_lot::Mutex;

use litedesk_core::{CoreError, ObjectCategory, Result, ident_key};

type LockKey = (Option<ObjectCategory>, Option<String>);

/// Registry of object locks, keyed by category and name.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<IndexMap<LockKey, String>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(category: Option<ObjectCategory>, name: Option<&str>) -> LockKey {
        (category, name.map(ident_key))
    }

    /// Take the lock for an owner. Re-locking by the same owner is a
    /// no-op; another holder yields `CoreError::Conflict`.
    pub fn lock(
        &self,
        category: Option<ObjectCategory>,
        name: Option<&str>,
        owner: &str,
    ) -> Result<()> {
        let mut locks = self.locks.lock();
        let key = Self::key(category, name);
        match locks.get(&key) {
            Some(holder) if holder != owner => {
                let what = describe(category, name);
                tracing::debug!(what = %what, holder = %holder, "lock refused");
                Err(CoreError::Conflict(what, holder.clone()))
            }
            _ => {
                locks.insert(key, owner.to_string());
                Ok(())
            }
        }
    }

    /// Release a lock held by `owner`. Releasing a lock someone else
    /// holds (or nobody holds) is a no-op.
    pub fn unlock(&self, category: Option<ObjectCategory>, name: Option<&str>, owner: &str) {
        let mut locks = self.locks.lock();
        let key = Self::key(category, name);
        if locks.get(&key).is_some_and(|holder| holder == owner) {
            locks.shift_remove(&key);
        }
    }

    /// Current holder of a lock covering the object, `skip_owner`
    /// excluded. The whole-database lock covers every object.
    pub fn get_lock(
        &self,
        category: Option<ObjectCategory>,
        name: Option<&str>,
        skip_owner: Option<&str>,
    ) -> Option<String> {
        let locks = self.locks.lock();
        for key in [Self::key(category, name), Self::key(None, None)] {
            if let Some(holder) = locks.get(&key) {
                if skip_owner != Some(holder.as_str()) {
                    return Some(holder.clone());
                }
            }
        }
        None
    }
}

fn describe(category: Option<ObjectCategory>, name: Option<&str>) -> String {
    match (category, name) {
        (Some(category), Some(name)) => format!("{} {}", category, name),
        (None, Some(name)) => name.to_string(),
        _ => "database".to_string(),
    }
}
