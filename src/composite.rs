//! `usb-device` glue for the control-plane router.
//!
//! [`CompositeClass`] is the single `UsbClass` handed to `UsbDevice::poll`.
//! It forwards descriptors and endpoint events to the wrapped functions, feeds
//! SET_CONFIGURATION and bus resets to the router, and routes class requests
//! to interfaces through the registered handlers.

use usb_device::class_prelude::*;
use usb_device::Result;

use crate::config::CONTROL_BUFFER_SIZE;
use crate::router::{is_set_configuration, ControlRequest, ControlResponse, ControlRouter, Outcome};

/// A router bound to the functions it dispatches to, for one call to `UsbDevice::poll`.
pub struct CompositeClass<'r, C, const N: usize, const M: usize> {
    router: &'r mut ControlRouter<C, N, M>,
    functions: &'r mut C,
}

impl<C, const N: usize, const M: usize> ControlRouter<C, N, M> {
    /// Bind the router to `functions` so the pair can be polled as one `UsbClass`.
    pub fn bind<'r>(&'r mut self, functions: &'r mut C) -> CompositeClass<'r, C, N, M> {
        CompositeClass {
            router: self,
            functions,
        }
    }
}

impl<'r, C, const N: usize, const M: usize> CompositeClass<'r, C, N, M> {
    /// The wrapped functions.
    pub fn functions(&mut self) -> &mut C {
        self.functions
    }
}

impl<B: UsbBus, C: UsbClass<B>, const N: usize, const M: usize> UsbClass<B>
    for CompositeClass<'_, C, N, M>
{
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
        self.functions.get_configuration_descriptors(writer)
    }

    fn get_bos_descriptors(&self, writer: &mut BosWriter) -> Result<()> {
        self.functions.get_bos_descriptors(writer)
    }

    fn get_string(&self, index: StringIndex, lang_id: LangID) -> Option<&str> {
        self.functions.get_string(index, lang_id)
    }

    fn reset(&mut self) {
        self.router.deactivate();
        self.functions.reset();
    }

    fn poll(&mut self) {
        self.functions.poll();
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        if is_set_configuration(&req) {
            // Observed only; the device's standard handling still answers it.
            self.router.on_set_configuration(self.functions, req.value);
            self.functions.control_out(xfer);
            return;
        }

        let outcome = {
            let request = ControlRequest::new(req, xfer.data());
            let mut buf = [0u8; 0];
            let mut response = ControlResponse::new(&mut buf);
            self.router.route(self.functions, &request, &mut response)
        };

        match outcome {
            Outcome::Handled => {
                xfer.accept().ok();
            }
            Outcome::NotSupported => {
                xfer.reject().ok();
            }
            Outcome::Next => self.functions.control_out(xfer),
        }
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        let mut buf = [0u8; CONTROL_BUFFER_SIZE];
        let mut response = ControlResponse::new(&mut buf);

        let outcome = self
            .router
            .route(self.functions, &ControlRequest::new(req, &[]), &mut response);

        match outcome {
            Outcome::Handled => {
                xfer.accept_with(response.as_slice()).ok();
            }
            Outcome::NotSupported => {
                xfer.reject().ok();
            }
            Outcome::Next => self.functions.control_in(xfer),
        }
    }

    fn endpoint_setup(&mut self, addr: EndpointAddress) {
        self.functions.endpoint_setup(addr);
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        self.functions.endpoint_out(addr);
    }

    fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
        self.functions.endpoint_in_complete(addr);
    }

    fn get_alt_setting(&mut self, interface: InterfaceNumber) -> Option<u8> {
        self.functions.get_alt_setting(interface)
    }

    fn set_alt_setting(&mut self, interface: InterfaceNumber, alternative: u8) -> bool {
        self.functions.set_alt_setting(interface, alternative)
    }
}
