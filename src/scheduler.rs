//! Cooperative run loop.
//!
//! One iteration feeds the watchdog, services the USB peripheral, polls every
//! class driver, advances the reset-to-bootloader state machine and updates
//! the activity indicator, in that order. Class drivers are never polled from
//! interrupt context.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::watchdog::Watchdog;

use crate::backup::{BackupRegisters, BootIntentStore};
use crate::config::RunLoopConfig;
use crate::leds::StatusLeds;
use crate::tick::{wait_ms, Clock};

/// Lifecycle of one boot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunState {
    /// Normal operation.
    Running,
    /// A driver asked for the bootloader; waiting for a quiet iteration.
    DfuRequested,
    /// Intent written, reset pending. Terminal.
    Resetting,
}

/// "Restart into the bootloader" notification shared by drivers and the loop.
///
/// Single-word flag, so it may also be raised from an interrupt handler.
#[derive(Debug)]
pub struct ResetRequest {
    pending: AtomicBool,
}

impl ResetRequest {
    /// No request pending.
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Ask for a restart into the bootloader.
    pub fn signal(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Whether a restart has been asked for.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for ResetRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Countdown that keeps the busy indicator lit for a while after traffic.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActivityWindow {
    window: u32,
    remaining: u32,
}

impl ActivityWindow {
    /// Idle window of `window` iterations.
    pub const fn new(window: u32) -> Self {
        Self {
            window,
            remaining: 0,
        }
    }

    /// Traffic seen: restart the countdown.
    pub fn touch(&mut self) {
        self.remaining = self.window;
    }

    /// Consume one iteration. Returns whether the indicator should be active.
    pub fn tick(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Iterations left before going idle.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// Per-iteration work of one class driver.
pub trait DriverService {
    /// Do pending work; return `true` if the driver saw traffic.
    fn service(&mut self) -> bool;
}

/// Poll every driver, without short-circuiting, and report whether any saw traffic.
pub fn service_all(drivers: &mut [&mut dyn DriverService]) -> bool {
    let mut traffic = false;
    for driver in drivers.iter_mut() {
        traffic |= driver.service();
    }
    traffic
}

/// Work the loop drives each iteration.
pub trait Services {
    /// Drain pending USB peripheral events (control and data transfers).
    fn poll_usb(&mut self);

    /// Poll every class driver; `true` if any reported traffic.
    fn service_drivers(&mut self) -> bool;

    /// Called once after the boot intent is written, right before the system
    /// reset. Boards may drop off the bus here so the host re-enumerates, and
    /// may reset from inside it.
    fn before_reset(&mut self) {}
}

/// Performs the final hardware reset.
pub trait SystemReset {
    /// Reset the system. Does not return.
    fn reset(&mut self) -> !;
}

/// The cooperative scheduler.
pub struct RunLoop<'a, W, L, K, R> {
    watchdog: W,
    leds: L,
    clock: K,
    store: BootIntentStore<R>,
    request: &'a ResetRequest,
    activity: ActivityWindow,
    state: RunState,
    config: RunLoopConfig,
}

impl<'a, W, L, K, R> RunLoop<'a, W, L, K, R>
where
    W: Watchdog,
    L: StatusLeds,
    K: Clock,
    R: BackupRegisters,
{
    /// Assemble the loop. The watchdog is expected to be running already.
    pub fn new(
        watchdog: W,
        leds: L,
        clock: K,
        store: BootIntentStore<R>,
        request: &'a ResetRequest,
        config: RunLoopConfig,
    ) -> Self {
        Self {
            watchdog,
            leds,
            clock,
            store,
            request,
            activity: ActivityWindow::new(config.activity_window),
            state: RunState::Running,
            config,
        }
    }

    /// Run one iteration and return the resulting state.
    ///
    /// Once [`RunState::Resetting`] is reached further calls do nothing; the
    /// caller is expected to reset the system.
    pub fn iterate<S: Services>(&mut self, services: &mut S) -> RunState {
        if self.state == RunState::Resetting {
            return self.state;
        }

        self.watchdog.feed();
        services.poll_usb();

        let traffic = services.service_drivers();
        if traffic {
            self.activity.touch();
        }

        if self.state == RunState::Running && self.request.is_pending() {
            info!("reset to bootloader requested");
            self.state = RunState::DfuRequested;
        }

        if self.state == RunState::DfuRequested {
            if traffic {
                debug!("reset deferred, drivers busy");
            } else {
                self.enter_bootloader();
                return self.state;
            }
        }

        let active = self.activity.tick();
        self.leds.set_activity(active);
        self.state
    }

    /// Run forever; resets into the bootloader when asked to.
    pub fn run<S: Services, X: SystemReset>(&mut self, services: &mut S, reset: &mut X) -> ! {
        loop {
            if self.iterate(services) == RunState::Resetting {
                services.before_reset();
                reset.reset();
            }
        }
    }

    fn enter_bootloader(&mut self) {
        let blink_ms = self.config.blink_pause_ms();
        for _ in 0..self.config.reset_blinks {
            self.leds.show(0b111);
            self.pause(blink_ms);
            self.leds.show(0);
            self.pause(blink_ms);
        }

        // The watchdog cannot be stopped on every part; a fresh feed covers the
        // few instructions left before the reset.
        self.watchdog.feed();
        if let Err(_e) = self.store.request_bootloader() {
            error!("boot intent not written: {}", _e);
        }
        self.state = RunState::Resetting;
    }

    // Fed once per pause, never while spinning: if the tick stops, the
    // watchdog still ends the wait.
    fn pause(&mut self, duration_ms: u32) {
        self.watchdog.feed();
        wait_ms(&self.clock, duration_ms, core::hint::spin_loop);
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Activity countdown.
    pub fn activity(&self) -> &ActivityWindow {
        &self.activity
    }

    /// Boot-intent store.
    pub fn store(&self) -> &BootIntentStore<R> {
        &self.store
    }

    /// Indicator outputs.
    pub fn leds(&self) -> &L {
        &self.leds
    }

    /// The watchdog.
    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }

    /// Time source used for the reset indication.
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Loop timing.
    pub fn config(&self) -> &RunLoopConfig {
        &self.config
    }
}
