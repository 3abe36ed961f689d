//! # Config Cell
//!
//! Read-mostly configuration that can be swapped while tasks are reading it.
//!
//! Readers take an `Arc<T>` snapshot and keep using it for as long as they
//! like; writers publish a whole new value. A reader therefore sees either
//! the old composite value or the new one, never a mix of fields.

use std::sync::Arc;

use parking_lot::RwLock;

/// Atomically replaceable, immutable configuration snapshot.
#[derive(Debug, Default)]
pub struct ConfigCell<T> {
    current: RwLock<Arc<T>>,
}

impl<T> ConfigCell<T> {
    pub fn new(value: T) -> Self {
        ConfigCell {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    /// Publishes a new snapshot.
    pub fn store(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }
}

impl<T: PartialEq> ConfigCell<T> {
    /// Publishes `value` only if it differs from the current snapshot.
    /// Returns true if it was published.
    pub fn replace_if_changed(&self, value: T) -> bool {
        let mut current = self.current.write();
        if **current == value {
            return false;
        }
        *current = Arc::new(value);
        true
    }
}
