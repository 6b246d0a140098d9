//! Capacities and run-loop tuning.
//!
//! Table capacities are compile-time constants used as const-generic defaults
//! by [`ControlRouter`](crate::router::ControlRouter). Loop timing lives in
//! [`RunLoopConfig`] so boards and tests can shorten it.

/// Maximum number of class-request handlers registered at once.
pub const MAX_CONTROL_CLASS_CALLBACKS: usize = 8;

/// Maximum number of configuration-activation handlers.
pub const MAX_SET_CONFIG_CALLBACKS: usize = 8;

/// Size of the scratch buffer IN class handlers write their response into.
pub const CONTROL_BUFFER_SIZE: usize = 128;

/// The only configuration value the composite device exposes.
pub const CONFIGURATION_VALUE: u16 = 1;

/// Timing of the cooperative run loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunLoopConfig {
    /// Loop iterations the activity indicator stays lit after the last traffic.
    pub activity_window: u32,
    /// Number of blinks shown before resetting into the bootloader.
    pub reset_blinks: u8,
    /// On and off time of a single blink, in milliseconds.
    pub blink_ms: u32,
    /// Hardware watchdog period the board should start with, in milliseconds.
    pub watchdog_period_ms: u32,
}

impl RunLoopConfig {
    /// Defaults used by the DAP42 boards.
    pub const DEFAULT: Self = Self {
        activity_window: 1000,
        reset_blinks: 3,
        blink_ms: 150,
        watchdog_period_ms: 1000,
    };

    /// On or off time actually used for one blink: `blink_ms`, capped at half
    /// the watchdog period since the watchdog is only fed between phases.
    pub const fn blink_pause_ms(&self) -> u32 {
        let cap = self.watchdog_period_ms / 2;
        if self.blink_ms < cap {
            self.blink_ms
        } else {
            cap
        }
    }

    /// Worst-case duration of the reset indication in milliseconds.
    pub const fn indication_ms(&self) -> u32 {
        self.reset_blinks as u32 * 2 * self.blink_pause_ms()
    }
}

impl Default for RunLoopConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
