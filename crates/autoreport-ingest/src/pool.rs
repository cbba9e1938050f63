//! Bounded pool of data source handles.

use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::adapter::SourceHandle;

/// A fixed number of handles shared by concurrent merges.
///
/// Handles are returned by [`HandleGuard`] on drop, whatever the exit path.
#[derive(Debug)]
pub struct HandlePool {
    idle: Mutex<Vec<SourceHandle>>,
    returned: Condvar,
    capacity: usize,
}

impl HandlePool {
    /// Creates a pool with `capacity` handles (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let idle = (0..capacity).rev().map(SourceHandle::new).collect();
        Self {
            idle: Mutex::new(idle),
            returned: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Waits up to `timeout` for a free handle.
    pub fn checkout(&self, timeout: Duration) -> Option<HandleGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut idle = self.lock();
        loop {
            if let Some(handle) = idle.pop() {
                trace!(handle = %handle, "handle checked out");
                return Some(HandleGuard { pool: self, handle });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .returned
                .wait_timeout(idle, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            idle = guard;
        }
    }

    fn release(&self, handle: SourceHandle) {
        trace!(handle = %handle, "handle released");
        self.lock().push(handle);
        self.returned.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SourceHandle>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A checked-out handle; returns itself to the pool when dropped.
#[derive(Debug)]
pub struct HandleGuard<'a> {
    pool: &'a HandlePool,
    handle: SourceHandle,
}

impl Deref for HandleGuard<'_> {
    type Target = SourceHandle;

    fn deref(&self) -> &SourceHandle {
        &self.handle
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        self.pool.release(self.handle.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn guard_returns_handle_on_drop() {
        let pool = HandlePool::new(2);
        {
            let first = pool.checkout(Duration::from_millis(10)).unwrap();
            let second = pool.checkout(Duration::from_millis(10)).unwrap();
            assert_ne!(first.id(), second.id());
            assert_eq!(pool.available(), 0);
            assert!(pool.checkout(Duration::from_millis(10)).is_none());
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn waiting_checkout_receives_released_handle() {
        let pool = HandlePool::new(1);
        thread::scope(|scope| {
            let held = pool.checkout(Duration::from_millis(10)).unwrap();
            let waiter = scope.spawn(|| pool.checkout(Duration::from_secs(5)).map(|h| h.id()));
            thread::sleep(Duration::from_millis(20));
            drop(held);
            assert_eq!(waiter.join().unwrap(), Some(0));
        });
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn zero_capacity_still_has_one_handle() {
        assert_eq!(HandlePool::new(0).capacity(), 1);
    }
}
