use core::cell::Cell;

use critical_section::Mutex;

/// A cell which can be shared between an interrupt handler and the main loop
///
/// Every access happens inside a critical section, so any `Copy` value can be stored regardless of
/// whether the target supports native atomics of that width. Compound values stored in a single
/// cell are always read and written as one unit.
pub struct AtomicCell<T: Copy> {
    inner: Mutex<Cell<T>>,
}

impl<T: Copy> AtomicCell<T> {
    /// Create a new cell holding `value`
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    /// Read the current value
    pub fn load(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Overwrite the current value
    pub fn store(&self, value: T) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value))
    }

    /// Store a new value, returning the previous one
    pub fn replace(&self, value: T) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).replace(value))
    }

    /// Read, modify and write back the value without being interrupted
    ///
    /// The closure runs inside the critical section and should be short.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let mut value = cell.get();
            let result = f(&mut value);
            cell.set(value);
            result
        })
    }
}

impl<T: Copy + Default> AtomicCell<T> {
    /// Take the value, leaving the default in its place
    pub fn take(&self) -> T {
        self.replace(T::default())
    }
}

impl<T: Copy + Default> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy + core::fmt::Debug> core::fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("AtomicCell").field(&self.load()).finish()
    }
}
