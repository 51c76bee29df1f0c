//! Interruptible binary semaphore
//!
//! [`Semaphore`] is a mutual-exclusion lock whose blocking acquisition can
//! be abandoned when the caller's [`Signal`] is raised, mirroring
//! `down_interruptible()`. The protected value is only reachable through the
//! guard, so every exit path releases the lock.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

/// How often a blocked waiter re-checks its signal
const SIGNAL_POLL: Duration = Duration::from_millis(5);

/// Pending-signal flag for one caller
///
/// Clones share the flag, so another thread can interrupt a waiter.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    pending: Arc<AtomicBool>,
}

impl Signal {
    /// Create a signal with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a signal as pending, interrupting any wait using this flag
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Clear the pending flag
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Whether a signal is pending
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// The wait was abandoned because a signal was pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Binary semaphore guarding a value of type `T`
#[derive(Debug, Default)]
pub struct Semaphore<T> {
    held: Mutex<bool>,
    released: Condvar,
    value: Mutex<T>,
}

impl<T> Semaphore<T> {
    /// Create an available semaphore guarding `value`
    pub fn new(value: T) -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
            value: Mutex::new(value),
        }
    }

    /// Acquire, giving up if `signal` is or becomes pending
    ///
    /// A pending signal is checked before the first attempt, so an
    /// interrupted caller never acquires.
    pub fn down_interruptible(
        &self,
        signal: &Signal,
    ) -> Result<SemaphoreGuard<'_, T>, Interrupted> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if signal.is_pending() {
                return Err(Interrupted);
            }
            if !*held {
                *held = true;
                break;
            }
            held = self
                .released
                .wait_timeout(held, SIGNAL_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(held);
        Ok(self.guard())
    }

    /// Acquire without blocking
    pub fn try_down(&self) -> Option<SemaphoreGuard<'_, T>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if *held {
            return None;
        }
        *held = true;
        drop(held);
        Some(self.guard())
    }

    /// Consume the semaphore, returning the guarded value
    pub fn into_inner(self) -> T {
        self.value.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard(&self) -> SemaphoreGuard<'_, T> {
        // Uncontended: the previous holder unlocked the value before
        // releasing the semaphore.
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        SemaphoreGuard {
            sem: self,
            value: ManuallyDrop::new(value),
        }
    }

    fn up(&self) {
        debug_assert!(!self.value_locked(), "semaphore released with its value locked");
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        self.released.notify_one();
    }

    fn value_locked(&self) -> bool {
        matches!(self.value.try_lock(), Err(TryLockError::WouldBlock))
    }
}

/// Holds the semaphore; released on drop
pub struct SemaphoreGuard<'a, T> {
    sem: &'a Semaphore<T>,
    value: ManuallyDrop<MutexGuard<'a, T>>,
}

impl<T> Deref for SemaphoreGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for SemaphoreGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for SemaphoreGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: `value` is never touched again after this.
        unsafe { ManuallyDrop::drop(&mut self.value) };
        self.sem.up();
    }
}
