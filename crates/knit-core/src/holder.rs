//! Single-slot, lazily initialised cache cell.

use parking_lot::{Mutex, RwLock};

/// Thread-safe cell set at most once per generation.
///
/// Reads take a shared lock only. Initialisation is serialised by a mutex
/// scoped to this cell, so concurrent callers of [`Holder::get_or_try_init`]
/// block until the first one finishes and then observe its value.
#[derive(Debug)]
pub struct Holder<T> {
    value: RwLock<Option<T>>,
    init: Mutex<()>,
}

impl<T> Default for Holder<T> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
            init: Mutex::new(()),
        }
    }
}

impl<T: Clone> Holder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, if set.
    pub fn get(&self) -> Option<T> {
        self.value.read().clone()
    }

    /// Return the value, creating it with `create` on first access.
    ///
    /// A failed `create` leaves the cell empty.
    pub fn get_or_try_init<E, F>(&self, create: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let _guard = self.init.lock();
        if let Some(value) = self.get() {
            return Ok(value);
        }

        let value = create()?;
        *self.value.write() = Some(value.clone());
        Ok(value)
    }

    /// Infallible form of [`Holder::get_or_try_init`].
    pub fn get_or_init<F>(&self, create: F) -> T
    where
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get() {
            return value;
        }

        let _guard = self.init.lock();
        if let Some(value) = self.get() {
            return value;
        }

        let value = create();
        *self.value.write() = Some(value.clone());
        value
    }

    /// Replace the value unconditionally.
    pub fn set(&self, value: T) {
        let _guard = self.init.lock();
        *self.value.write() = Some(value);
    }

    /// Empty the cell, returning the previous value.
    pub fn reset(&self) -> Option<T> {
        let _guard = self.init.lock();
        self.value.write().take()
    }

    pub fn is_set(&self) -> bool {
        self.value.read().is_some()
    }
}
