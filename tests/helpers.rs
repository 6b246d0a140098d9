//! Shared mock hardware for integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::vec::Vec;

use embedded_hal::watchdog::Watchdog;
use usb_device::bus::{PollResult, UsbBus, UsbBusAllocator};
use usb_device::control::{Recipient, Request, RequestType};
use usb_device::endpoint::{EndpointAddress, EndpointType};
use usb_device::{UsbDirection, UsbError};
use usbd_composite_rt::{
    BootIntentStore, Clock, MemoryBackupRegisters, ResetRequest, RunLoop, RunLoopConfig, Services,
    StatusLeds,
};

// ============================================================================
// Requests
// ============================================================================

pub fn class_request(direction: UsbDirection, interface: u16, code: u8, value: u16) -> Request {
    Request {
        direction,
        request_type: RequestType::Class,
        recipient: Recipient::Interface,
        request: code,
        value,
        index: interface,
        length: 64,
    }
}

pub fn class_out(interface: u16, code: u8) -> Request {
    class_request(UsbDirection::Out, interface, code, 0)
}

pub fn class_in(interface: u16, code: u8) -> Request {
    class_request(UsbDirection::In, interface, code, 0)
}

// ============================================================================
// Hardware mocks
// ============================================================================

#[derive(Debug, Default)]
pub struct CountingWatchdog {
    pub feeds: u32,
}

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

#[derive(Debug, Default)]
pub struct RecordingLeds {
    /// Activity indicator value after every iteration.
    pub activity: Vec<bool>,
    /// Every value passed to `show`.
    pub shown: Vec<u8>,
}

impl StatusLeds for RecordingLeds {
    fn set_activity(&mut self, active: bool) {
        self.activity.push(active);
    }

    fn show(&mut self, value: u8) {
        self.shown.push(value);
    }
}

/// Clock that advances one millisecond on every read.
#[derive(Debug, Default)]
pub struct StepClock {
    now: Cell<u32>,
}

impl StepClock {
    pub fn starting_at(now: u32) -> Self {
        Self {
            now: Cell::new(now),
        }
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }
}

/// USB bus that never sees any traffic; enough to allocate interfaces.
pub struct NullBus;

impl UsbBus for NullBus {
    fn alloc_ep(
        &mut self,
        _ep_dir: UsbDirection,
        ep_addr: Option<EndpointAddress>,
        _ep_type: EndpointType,
        _max_packet_size: u16,
        _interval: u8,
    ) -> usb_device::Result<EndpointAddress> {
        ep_addr.ok_or(UsbError::EndpointOverflow)
    }

    fn enable(&mut self) {}

    fn reset(&self) {}

    fn set_device_address(&self, _addr: u8) {}

    fn write(&self, _ep_addr: EndpointAddress, buf: &[u8]) -> usb_device::Result<usize> {
        Ok(buf.len())
    }

    fn read(&self, _ep_addr: EndpointAddress, _buf: &mut [u8]) -> usb_device::Result<usize> {
        Err(UsbError::WouldBlock)
    }

    fn set_stalled(&self, _ep_addr: EndpointAddress, _stalled: bool) {}

    fn is_stalled(&self, _ep_addr: EndpointAddress) -> bool {
        false
    }

    fn suspend(&self) {}

    fn resume(&self) {}

    fn poll(&self) -> PollResult {
        PollResult::None
    }
}

pub fn null_allocator() -> UsbBusAllocator<NullBus> {
    UsbBusAllocator::new(NullBus)
}

/// USB bus fed from a queue of setup packets. Records everything written to
/// endpoints and every stall.
#[derive(Default)]
pub struct ScriptedBus {
    setups: Mutex<VecDeque<[u8; 8]>>,
    bus_reset: AtomicBool,
    writes: Mutex<Vec<(u8, Vec<u8>)>>,
    stalls: Mutex<Vec<u8>>,
}

impl ScriptedBus {
    pub fn push_setup(&self, packet: [u8; 8]) {
        self.setups.lock().unwrap().push_back(packet);
    }

    pub fn push_reset(&self) {
        self.bus_reset.store(true, Ordering::SeqCst);
    }

    /// Data written to EP0 IN since the last call; a status-stage ZLP shows up
    /// as an empty entry.
    pub fn take_ep0_writes(&self) -> Vec<Vec<u8>> {
        let mut writes = self.writes.lock().unwrap();
        let ep0 = writes
            .iter()
            .filter(|(addr, _)| *addr == 0x80)
            .map(|(_, data)| data.clone())
            .collect();
        writes.clear();
        ep0
    }

    /// Endpoints stalled since the last call.
    pub fn take_stalls(&self) -> Vec<u8> {
        self.stalls.lock().unwrap().drain(..).collect()
    }
}

impl UsbBus for ScriptedBus {
    fn alloc_ep(
        &mut self,
        _ep_dir: UsbDirection,
        ep_addr: Option<EndpointAddress>,
        _ep_type: EndpointType,
        _max_packet_size: u16,
        _interval: u8,
    ) -> usb_device::Result<EndpointAddress> {
        ep_addr.ok_or(UsbError::EndpointOverflow)
    }

    fn enable(&mut self) {}

    fn reset(&self) {}

    fn set_device_address(&self, _addr: u8) {}

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> usb_device::Result<usize> {
        self.writes
            .lock()
            .unwrap()
            .push((u8::from(ep_addr), buf.to_vec()));
        Ok(buf.len())
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> usb_device::Result<usize> {
        if ep_addr.index() != 0 {
            return Err(UsbError::WouldBlock);
        }
        match self.setups.lock().unwrap().pop_front() {
            Some(packet) => {
                buf[..8].copy_from_slice(&packet);
                Ok(8)
            }
            None => Err(UsbError::WouldBlock),
        }
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        if stalled {
            self.stalls.lock().unwrap().push(u8::from(ep_addr));
        }
    }

    fn is_stalled(&self, _ep_addr: EndpointAddress) -> bool {
        false
    }

    fn suspend(&self) {}

    fn resume(&self) {}

    fn poll(&self) -> PollResult {
        if self.bus_reset.swap(false, Ordering::SeqCst) {
            PollResult::Reset
        } else if !self.setups.lock().unwrap().is_empty() {
            PollResult::Data {
                ep_out: 0,
                ep_in_complete: 0,
                ep_setup: 1,
            }
        } else {
            PollResult::None
        }
    }
}

/// Eight-byte setup packet.
pub fn setup_packet(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let [value_lo, value_hi] = value.to_le_bytes();
    let [index_lo, index_hi] = index.to_le_bytes();
    let [length_lo, length_hi] = length.to_le_bytes();
    [
        request_type,
        request,
        value_lo,
        value_hi,
        index_lo,
        index_hi,
        length_lo,
        length_hi,
    ]
}

// ============================================================================
// Run loop
// ============================================================================

/// Services with scripted traffic and an optional reset signal raised from
/// inside the USB poll, the way a DFU_DETACH would arrive.
pub struct ScriptedServices<'a> {
    pub iteration: usize,
    pub usb_polls: usize,
    pub traffic_at: Vec<usize>,
    pub signal_at: Option<usize>,
    pub resets_prepared: usize,
    pub request: &'a ResetRequest,
}

impl<'a> ScriptedServices<'a> {
    pub fn new(request: &'a ResetRequest) -> Self {
        Self {
            iteration: 0,
            usb_polls: 0,
            traffic_at: Vec::new(),
            signal_at: None,
            resets_prepared: 0,
            request,
        }
    }

    pub fn with_traffic(mut self, iterations: &[usize]) -> Self {
        self.traffic_at.extend_from_slice(iterations);
        self
    }

    pub fn with_signal(mut self, iteration: usize) -> Self {
        self.signal_at = Some(iteration);
        self
    }
}

impl Services for ScriptedServices<'_> {
    fn poll_usb(&mut self) {
        self.usb_polls += 1;
        if self.signal_at == Some(self.iteration) {
            self.request.signal();
        }
    }

    fn service_drivers(&mut self) -> bool {
        let traffic = self.traffic_at.contains(&self.iteration);
        self.iteration += 1;
        traffic
    }

    fn before_reset(&mut self) {
        self.resets_prepared += 1;
    }
}

pub type TestLoop<'a> =
    RunLoop<'a, CountingWatchdog, RecordingLeds, StepClock, MemoryBackupRegisters<10>>;

pub fn test_config() -> RunLoopConfig {
    RunLoopConfig {
        activity_window: 5,
        reset_blinks: 3,
        blink_ms: 10,
        watchdog_period_ms: 1000,
    }
}

pub fn create_loop(request: &ResetRequest, config: RunLoopConfig) -> TestLoop<'_> {
    RunLoop::new(
        CountingWatchdog::default(),
        RecordingLeds::default(),
        StepClock::default(),
        BootIntentStore::new(MemoryBackupRegisters::new()),
        request,
        config,
    )
}
