use usb_device::class_prelude::*;
use usb_device::{Result, UsbDirection};

use crate::router::{ClassRegistry, ClassHandler, ControlRequest, ControlResponse, Outcome};
use crate::scheduler::{DriverService, ResetRequest};

const USB_CLASS_APPLICATION_SPECIFIC: u8 = 0xfe;

const DFU_SUBCLASS_FIRMWARE_UPGRADE: u8 = 0x01;

const DFU_PROTOCOL_RUNTIME: u8 = 0x01;

const DFU_TYPE_FUNCTIONAL: u8 = 0x21;
const DFU_WILL_DETACH: u8 = 1 << 3;
const DFU_MANIFESTATION_TOLERANT: u8 = 1 << 2;
const DFU_CAN_UPLOAD: u8 = 1 << 1;
const DFU_CAN_DNLOAD: u8 = 1 << 0;

const DFU_REQ_DETACH: u8 = 0;
const DFU_REQ_GETSTATUS: u8 = 3;
const DFU_REQ_GETSTATE: u8 = 5;

const DFU_STATUS_OK: u8 = 0x00;

/// Longest detach timeout advertised to the host, in milliseconds.
pub const DETACH_TIMEOUT_MS: u16 = 255;

/// Transfer size the bootloader accepts per DFU_DNLOAD.
pub const TRANSFER_SIZE: u16 = 1024;

/// DFU 1.1a
pub const DFU_VERSION: u16 = 0x011a;

/// Run-time states reported through DFU_GETSTATUS / DFU_GETSTATE.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DfuState {
    /// Running normally.
    AppIdle = 0,
    /// DFU_DETACH received; restart into the bootloader is pending.
    AppDetach = 1,
}

/// DFU run-time function.
///
/// Writes the run-time interface and functional descriptor, and answers the
/// run-time class requests once registered with the control-plane router.
/// DFU_DETACH raises the shared [`ResetRequest`]; the run loop takes it from
/// there.
pub struct DfuRuntime<'a> {
    iface: InterfaceNumber,
    name: Option<(StringIndex, &'static str)>,
    request: &'a ResetRequest,
    state: DfuState,
    detach_timeout: Option<u16>,
    traffic: bool,
}

impl<'a> DfuRuntime<'a> {
    /// Allocate the run-time interface.
    pub fn new<B: UsbBus>(alloc: &UsbBusAllocator<B>, request: &'a ResetRequest) -> Self {
        Self {
            iface: alloc.interface(),
            name: None,
            request,
            state: DfuState::AppIdle,
            detach_timeout: None,
            traffic: false,
        }
    }

    /// Allocate the run-time interface with an interface string.
    pub fn with_name<B: UsbBus>(
        alloc: &UsbBusAllocator<B>,
        request: &'a ResetRequest,
        name: &'static str,
    ) -> Self {
        let mut dfu = Self::new(alloc, request);
        dfu.name = Some((alloc.string(), name));
        dfu
    }

    /// Interface number the host addresses DFU requests to.
    pub fn interface(&self) -> InterfaceNumber {
        self.iface
    }

    /// Current run-time state.
    pub fn state(&self) -> DfuState {
        self.state
    }

    /// `wDetachTimeOut` of the last DFU_DETACH, if one was received.
    pub fn detach_timeout(&self) -> Option<u16> {
        self.detach_timeout
    }

    /// Install `handler` for this function's interface.
    ///
    /// Meant to be called from the function's configuration handler;
    /// `handler` typically forwards to [`DfuRuntime::handle_request`].
    pub fn register<C, const N: usize>(
        &self,
        registry: &mut ClassRegistry<C, N>,
        handler: ClassHandler<C>,
    ) -> crate::Result<()> {
        registry.register(self.iface, handler)
    }

    /// Answer a class request routed to this interface.
    pub fn handle_request(
        &mut self,
        request: &ControlRequest<'_>,
        response: &mut ControlResponse<'_>,
    ) -> Outcome {
        if request.interface() != u16::from(u8::from(self.iface)) {
            return Outcome::Next;
        }
        self.traffic = true;

        match (request.request().direction, request.code()) {
            (UsbDirection::Out, DFU_REQ_DETACH) => {
                info!("DFU_DETACH, timeout {} ms", request.value());
                self.detach_timeout = Some(request.value());
                self.state = DfuState::AppDetach;
                self.request.signal();
                Outcome::Handled
            }
            (UsbDirection::In, DFU_REQ_GETSTATUS) => {
                let status = [
                    DFU_STATUS_OK, // bStatus
                    0, 0, 0, // bwPollTimeout
                    self.state as u8, // bState
                    0, // iString
                ];
                match response.write(&status) {
                    Ok(()) => Outcome::Handled,
                    Err(_) => Outcome::NotSupported,
                }
            }
            (UsbDirection::In, DFU_REQ_GETSTATE) => match response.write(&[self.state as u8]) {
                Ok(()) => Outcome::Handled,
                Err(_) => Outcome::NotSupported,
            },
            _ => Outcome::NotSupported,
        }
    }
}

impl DriverService for DfuRuntime<'_> {
    /// Reports requests answered since the last call, so a reset waits for
    /// the status stage of a DFU_DETACH.
    fn service(&mut self) -> bool {
        core::mem::replace(&mut self.traffic, false)
    }
}

impl<B: UsbBus> UsbClass<B> for DfuRuntime<'_> {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
        writer.interface_alt(
            self.iface,
            0,
            USB_CLASS_APPLICATION_SPECIFIC,
            DFU_SUBCLASS_FIRMWARE_UPGRADE,
            DFU_PROTOCOL_RUNTIME,
            self.name.map(|(index, _)| index),
        )?;

        // Run-Time DFU Functional Descriptor
        let [timeout_lo, timeout_hi] = DETACH_TIMEOUT_MS.to_le_bytes();
        let [size_lo, size_hi] = TRANSFER_SIZE.to_le_bytes();
        let [version_lo, version_hi] = DFU_VERSION.to_le_bytes();
        writer.write(
            DFU_TYPE_FUNCTIONAL, // bDescriptorType
            &[
                (DFU_WILL_DETACH | DFU_CAN_UPLOAD | DFU_CAN_DNLOAD) & !DFU_MANIFESTATION_TOLERANT, // bmAttributes
                timeout_lo, timeout_hi, // wDetachTimeOut
                size_lo, size_hi, // wTransferSize
                version_lo, version_hi, // bcdDFUVersion
            ],
        )
    }

    fn get_string(&self, index: StringIndex, _lang_id: LangID) -> Option<&str> {
        match self.name {
            Some((own, name)) if own == index => Some(name),
            _ => None,
        }
    }

    fn reset(&mut self) {
        // A bus reset while detaching is the host's cue; the request stays raised.
        if self.state == DfuState::AppIdle {
            self.detach_timeout = None;
        }
    }
}
