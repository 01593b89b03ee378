//! Bounded-wait exclusion around encode passes.
//!
//! Encoding rewrites the hardware buffers in place. Only one pass may run at a
//! time, and reconfiguration must not overlap a pass. [`FlushGate`] wraps the
//! shared value in an async mutex. Callers wait a bounded time for it and skip
//! the pass when it stays busy, so a stuck holder can never stall the refresh
//! loop for good.

use core::ops::Deref;
use core::ops::DerefMut;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::mutex::MutexGuard;
use embassy_time::with_timeout;
use embassy_time::Duration;

/// Default wait before an encode pass is skipped.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_millis(100);

/// Async mutex with a bounded acquire.
pub struct FlushGate<M: RawMutex, T> {
    inner: Mutex<M, T>,
    timeout: Duration,
}

impl<M: RawMutex, T> FlushGate<M, T> {
    /// Create a gate around `value` that waits [`DEFAULT_GATE_TIMEOUT`].
    pub const fn new(value: T) -> Self {
        Self::new_with_timeout(value, DEFAULT_GATE_TIMEOUT)
    }

    /// Create a gate around `value` with its own timeout.
    pub const fn new_with_timeout(value: T, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(value),
            timeout,
        }
    }

    /// The timeout used by [`FlushGate::acquire`].
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait up to the gate's timeout for exclusive access.
    ///
    /// Returns `None` if the gate stayed held for the whole timeout.
    pub async fn acquire(&self) -> Option<FlushGuard<'_, M, T>> {
        self.acquire_within(self.timeout).await
    }

    /// Wait up to `timeout` for exclusive access.
    pub async fn acquire_within(&self, timeout: Duration) -> Option<FlushGuard<'_, M, T>> {
        with_timeout(timeout, self.inner.lock())
            .await
            .ok()
            .map(|guard| FlushGuard { guard })
    }

    /// Take exclusive access only if it is free right now.
    pub fn try_acquire(&self) -> Option<FlushGuard<'_, M, T>> {
        self.inner.try_lock().ok().map(|guard| FlushGuard { guard })
    }

    /// Direct access when the gate is exclusively borrowed.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consume the gate and return the value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Exclusive access granted by a [`FlushGate`]. Dropping it releases the gate.
pub struct FlushGuard<'a, M: RawMutex, T> {
    guard: MutexGuard<'a, M, T>,
}

impl<M: RawMutex, T> FlushGuard<'_, M, T> {
    /// Release the gate.
    pub fn release(self) {
        drop(self);
    }
}

impl<M: RawMutex, T> Deref for FlushGuard<'_, M, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<M: RawMutex, T> DerefMut for FlushGuard<'_, M, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_time::Instant;

    use super::*;

    #[test]
    fn test_acquire_free_gate() {
        let gate: FlushGate<NoopRawMutex, u32> = FlushGate::new(7);
        let mut guard = block_on(gate.acquire()).expect("gate is free");
        *guard += 1;
        guard.release();
        assert_eq!(gate.into_inner(), 8);
    }

    #[test]
    fn test_acquire_times_out_while_held() {
        let gate: FlushGate<NoopRawMutex, u32> =
            FlushGate::new_with_timeout(0, Duration::from_millis(20));
        let held = gate.try_acquire().expect("gate is free");
        let started = Instant::now();
        assert!(block_on(gate.acquire()).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
        drop(held);
        assert!(block_on(gate.acquire()).is_some());
    }

    #[test]
    fn test_try_acquire_is_exclusive() {
        let gate: FlushGate<NoopRawMutex, ()> = FlushGate::new(());
        let first = gate.try_acquire();
        assert!(first.is_some());
        assert!(gate.try_acquire().is_none());
        drop(first);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_default_timeout() {
        let gate: FlushGate<NoopRawMutex, ()> = FlushGate::new(());
        assert_eq!(gate.timeout(), Duration::from_millis(100));
    }
}
