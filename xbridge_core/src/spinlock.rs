//! A minimal test-and-test-and-set spinlock for O(1) critical sections.
//!
//! Intended for realtime contexts where a critical section is short and
//! bounded (a handful of field reads/writes) and a parking mutex's syscall
//! path would be unacceptable latency. Never hold a `Spinlock` guard across
//! I/O or anything else that could block — spinning while the lock holder
//! is blocked on a syscall defeats the point.

use core::{
    cell::UnsafeCell,
    hint,
    sync::atomic::{AtomicBool, Ordering},
};

/// A spinlock-guarded value.
///
/// `Spinlock<T>` is `Sync` when `T: Send`, mirroring `std::sync::Mutex`'s
/// bound, since the lock itself provides the exclusion `T` needs to be
/// shared across threads.
pub struct Spinlock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is only ever granted through `lock()`, which
// establishes exclusive access via the atomic `locked` flag.
unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    /// Creates a new unlocked spinlock wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, spinning until it is free.
    ///
    /// The returned guard releases the lock on drop.
    #[inline]
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
        SpinlockGuard { lock: self }
    }

    /// Attempts to acquire the lock without spinning.
    ///
    /// Returns `None` if the lock is currently held.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinlockGuard { lock: self })
    }

    /// Consumes the spinlock, returning the wrapped value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// RAII guard returned by [`Spinlock::lock`] and [`Spinlock::try_lock`].
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<T> core::ops::Deref for SpinlockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: holding the guard means `locked` was set by this thread.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> core::ops::DerefMut for SpinlockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard means `locked` was set by this thread.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
