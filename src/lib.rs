#![no_std]
#![deny(missing_docs)]

//! Core of a composite USB debug-probe firmware
//!
//! A single USB device exposes a CMSIS-DAP probe, a CDC serial console, an MTP
//! endpoint and a DFU run-time interface. This crate holds the parts that let
//! those functions share one device:
//! * [`ControlRouter`]: registry that dispatches class requests to the
//!   interface handlers installed by each function, rebuilt every time the host
//!   activates the configuration
//! * [`BootIntentStore`]: backup-domain slot that carries "enter the
//!   bootloader" across a hardware reset and is consumed exactly once by the
//!   earliest boot code
//! * [`RunLoop`]: cooperative main loop that feeds the watchdog, services USB
//!   and the class drivers, drives the activity LED and sequences the reset
//!   into the bootloader
//!
//! Class drivers stay independent: each registers a configuration handler,
//! re-registers its class-request handler from there, and signals a
//! [`ResetRequest`] when the host asks for a firmware update.

#[macro_use]
mod fmt;

/// Backup-domain boot intent
pub mod backup;
/// `usb-device` adapter for the router
pub mod composite;
/// Capacities and loop timing
pub mod config;
/// Device identity
pub mod descriptor;
/// DFU run-time function
pub mod dfu;
mod error;
/// Status LEDs
pub mod leds;
/// Cortex-M glue
#[cfg(feature = "cortex-m")]
pub mod platform;
/// Control-plane router
pub mod router;
/// Cooperative run loop
pub mod scheduler;
/// Millisecond tick counter
pub mod tick;

pub use crate::backup::{BackupRegisters, BootDecision, BootIntentStore, MemoryBackupRegisters};
pub use crate::composite::CompositeClass;
pub use crate::config::RunLoopConfig;
pub use crate::dfu::DfuRuntime;
pub use crate::error::{Error, Result};
pub use crate::leds::{LedBank, StatusLeds};
pub use crate::router::{ClassRegistry, ControlRequest, ControlResponse, ControlRouter, Outcome};
pub use crate::scheduler::{
    service_all, DriverService, ResetRequest, RunLoop, RunState, Services, SystemReset,
};
pub use crate::tick::{Clock, Ticks};
