//! Millisecond tick counter.
//!
//! The SysTick interrupt is the only writer and calls [`Ticks::increment`];
//! everything else reads. Only single-word loads and stores are used, which is
//! enough on cores without atomic read-modify-write (Cortex-M0).

use core::sync::atomic::{AtomicU32, Ordering};

/// Source of a wrapping millisecond count.
pub trait Clock {
    /// Milliseconds since an arbitrary origin, wrapping at `u32::MAX`.
    fn now_ms(&self) -> u32;

    /// Milliseconds elapsed since `start`, correct across one wraparound.
    fn elapsed_since(&self, start: u32) -> u32 {
        self.now_ms().wrapping_sub(start)
    }
}

/// Interrupt-updated tick counter, suitable for a `static`.
#[derive(Debug)]
pub struct Ticks {
    count: AtomicU32,
}

impl Ticks {
    /// Counter starting at zero.
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Counter starting at `count`.
    pub const fn starting_at(count: u32) -> Self {
        Self {
            count: AtomicU32::new(count),
        }
    }

    /// Advance by one tick. Call from the tick interrupt only.
    #[inline]
    pub fn increment(&self) {
        let next = self.count.load(Ordering::Relaxed).wrapping_add(1);
        self.count.store(next, Ordering::Release);
    }

    /// Current count.
    #[inline]
    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for Ticks {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for Ticks {
    fn now_ms(&self) -> u32 {
        self.get()
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Spin until `duration_ms` has elapsed on `clock`, calling `idle` on every spin.
///
/// Only bounded while the clock advances. Do not feed a watchdog from `idle`:
/// a stopped tick would then hang forever instead of resetting.
pub fn wait_ms<K: Clock + ?Sized>(clock: &K, duration_ms: u32, mut idle: impl FnMut()) {
    let start = clock.now_ms();
    while clock.elapsed_since(start) < duration_ms {
        idle();
    }
}
