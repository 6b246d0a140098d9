//! Control-plane router.
//!
//! Lets independently written class drivers share the "class request,
//! interface recipient" control pathway of one USB device. Drivers install a
//! [`ClassHandler`] for the interface numbers they own and a [`ConfigHandler`]
//! that runs whenever the host activates the configuration. The router keeps
//! no knowledge of which classes exist.
//!
//! Handlers are plain function pointers over a shared context `C` (usually
//! the struct that owns all class drivers), so the tables are small, `Copy`
//! and bounded.

use heapless::Vec;
use usb_device::control::{Recipient, Request, RequestType};

use crate::config::{CONFIGURATION_VALUE, MAX_CONTROL_CLASS_CALLBACKS, MAX_SET_CONFIG_CALLBACKS};
use crate::{Error, Result};

/// Result of running one class handler.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The response is fully prepared; stop scanning.
    Handled,
    /// The class rejects the request; stop scanning and stall.
    NotSupported,
    /// No opinion; try the next handler for the same interface.
    Next,
}

/// A class request as seen by a handler.
#[derive(Debug, Copy, Clone)]
pub struct ControlRequest<'a> {
    request: Request,
    data: &'a [u8],
}

impl<'a> ControlRequest<'a> {
    /// Wrap a setup packet and the data stage of an OUT transfer (empty for IN).
    pub fn new(request: Request, data: &'a [u8]) -> Self {
        Self { request, data }
    }

    /// The raw setup packet.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Data stage received from the host.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// `bRequest`
    pub fn code(&self) -> u8 {
        self.request.request
    }

    /// `wValue`
    pub fn value(&self) -> u16 {
        self.request.value
    }

    /// Target interface (`wIndex`).
    pub fn interface(&self) -> u16 {
        self.request.index
    }

    /// `wLength`
    pub fn length(&self) -> u16 {
        self.request.length
    }

    /// Whether this is a class request addressed to an interface.
    pub fn is_class_interface(&self) -> bool {
        is_class_interface(&self.request)
    }
}

/// Buffer an IN handler writes its response into.
#[derive(Debug)]
pub struct ControlResponse<'b> {
    buf: &'b mut [u8],
    len: usize,
}

impl<'b> ControlResponse<'b> {
    /// Start an empty response backed by `buf`.
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Append bytes to the response.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.len + bytes.len();
        if end > self.buf.len() {
            return Err(Error::ResponseOverflow {
                capacity: self.buf.len(),
            });
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Discard anything written.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Class-specific control request handler.
pub type ClassHandler<C> = fn(&mut C, &ControlRequest<'_>, &mut ControlResponse<'_>) -> Outcome;

/// Configuration-activation handler. Receives the class table so the driver
/// can re-register its interfaces, and the configuration value.
pub type ConfigHandler<C, const N: usize> = fn(&mut C, &mut ClassRegistry<C, N>, u16);

/// One class-handler registration.
pub struct ClassCallbackEntry<C> {
    interface: u8,
    handler: ClassHandler<C>,
}

impl<C> ClassCallbackEntry<C> {
    /// Interface number this entry answers for.
    pub fn interface(&self) -> u8 {
        self.interface
    }
}

/// Bounded table of class-request handlers, scanned in registration order.
pub struct ClassRegistry<C, const N: usize = { MAX_CONTROL_CLASS_CALLBACKS }> {
    entries: Vec<ClassCallbackEntry<C>, N>,
    dropped: u16,
}

impl<C, const N: usize> ClassRegistry<C, N> {
    /// Empty table.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            dropped: 0,
        }
    }

    /// Install `handler` for `interface`.
    ///
    /// When the table is full the registration is dropped, existing entries are
    /// left untouched and [`Error::RegistryFull`] is returned.
    pub fn register(&mut self, interface: impl Into<u8>, handler: ClassHandler<C>) -> Result<()> {
        let interface = interface.into();
        if self.entries.push(ClassCallbackEntry { interface, handler }).is_err() {
            self.dropped = self.dropped.saturating_add(1);
            warn!("class handler for interface {} dropped, table full", interface);
            return Err(Error::RegistryFull { capacity: N });
        }
        Ok(())
    }

    /// Run every handler registered for the request's interface, in
    /// registration order, until one returns [`Outcome::Handled`] or
    /// [`Outcome::NotSupported`].
    pub fn dispatch(
        &self,
        ctx: &mut C,
        request: &ControlRequest<'_>,
        response: &mut ControlResponse<'_>,
    ) -> Outcome {
        let target = request.interface();
        let mut outcome = Outcome::Next;
        for entry in self.entries.iter().filter(|e| u16::from(e.interface) == target) {
            response.clear();
            outcome = (entry.handler)(ctx, request, response);
            if outcome != Outcome::Next {
                break;
            }
        }
        outcome
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Registered entries in scan order.
    pub fn entries(&self) -> &[ClassCallbackEntry<C>] {
        &self.entries
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registrations rejected because the table was full, since creation.
    pub fn dropped(&self) -> u16 {
        self.dropped
    }
}

impl<C, const N: usize> Default for ClassRegistry<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Composite-device control-plane router.
///
/// Owns the class-handler table and the configuration-activation table. The
/// class table is rebuilt from scratch on every configuration activation.
pub struct ControlRouter<
    C,
    const N: usize = { MAX_CONTROL_CLASS_CALLBACKS },
    const M: usize = { MAX_SET_CONFIG_CALLBACKS },
> {
    classes: ClassRegistry<C, N>,
    configs: Vec<ConfigHandler<C, N>, M>,
    dropped_configs: u16,
    installed: bool,
    configuration: Option<u16>,
}

impl<C, const N: usize, const M: usize> ControlRouter<C, N, M> {
    /// Router with empty tables and the class-request entry point not yet installed.
    pub const fn new() -> Self {
        Self {
            classes: ClassRegistry::new(),
            configs: Vec::new(),
            dropped_configs: 0,
            installed: false,
            configuration: None,
        }
    }

    /// Install a class-request handler for `interface`. See [`ClassRegistry::register`].
    pub fn register_class_handler(
        &mut self,
        interface: impl Into<u8>,
        handler: ClassHandler<C>,
    ) -> Result<()> {
        self.classes.register(interface, handler)
    }

    /// Install a configuration-activation handler.
    pub fn register_config_handler(&mut self, handler: ConfigHandler<C, N>) -> Result<()> {
        if self.configs.push(handler).is_err() {
            self.dropped_configs = self.dropped_configs.saturating_add(1);
            warn!("config handler dropped, table full");
            return Err(Error::RegistryFull { capacity: M });
        }
        Ok(())
    }

    /// Activate configuration `value`.
    ///
    /// Clears every class handler, installs the router's class-request entry
    /// point, then runs the configuration handlers in registration order so
    /// that drivers re-register themselves.
    pub fn activate_configuration(&mut self, ctx: &mut C, value: u16) {
        self.classes.clear();
        self.installed = true;
        self.configuration = Some(value);
        info!("configuration {} activated", value);
        for handler in self.configs.iter() {
            handler(ctx, &mut self.classes, value);
        }
    }

    /// Forget the active configuration after a bus reset or SET_CONFIGURATION(0).
    pub fn deactivate(&mut self) {
        if self.installed {
            debug!("configuration deactivated");
        }
        self.classes.clear();
        self.installed = false;
        self.configuration = None;
    }

    /// React to a standard SET_CONFIGURATION request seen on the control pipe.
    pub fn on_set_configuration(&mut self, ctx: &mut C, value: u16) {
        match value {
            CONFIGURATION_VALUE => self.activate_configuration(ctx, value),
            0 => self.deactivate(),
            // Unsupported values are rejected by the device's standard handling.
            _ => {}
        }
    }

    /// Entry point for control requests.
    ///
    /// Only class requests to an interface are dispatched, and only once a
    /// configuration is active; everything else yields [`Outcome::Next`].
    pub fn route(
        &self,
        ctx: &mut C,
        request: &ControlRequest<'_>,
        response: &mut ControlResponse<'_>,
    ) -> Outcome {
        if !self.installed || !request.is_class_interface() {
            return Outcome::Next;
        }
        self.classes.dispatch(ctx, request, response)
    }

    /// Class-handler table.
    pub fn classes(&self) -> &ClassRegistry<C, N> {
        &self.classes
    }

    /// Whether the class-request entry point is installed.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Currently active configuration value.
    pub fn configuration(&self) -> Option<u16> {
        self.configuration
    }

    /// Number of configuration handlers registered.
    pub fn config_handlers(&self) -> usize {
        self.configs.len()
    }

    /// Registrations dropped in both tables since creation.
    pub fn dropped(&self) -> u16 {
        self.classes.dropped().saturating_add(self.dropped_configs)
    }
}

impl<C, const N: usize, const M: usize> Default for ControlRouter<C, N, M> {
    fn default() -> Self {
        Self::new()
    }
}

/// `true` for class-type requests with an interface recipient.
pub fn is_class_interface(request: &Request) -> bool {
    request.request_type == RequestType::Class && request.recipient == Recipient::Interface
}

/// `true` for the standard SET_CONFIGURATION device request.
pub fn is_set_configuration(request: &Request) -> bool {
    request.request_type == RequestType::Standard
        && request.recipient == Recipient::Device
        && request.request == Request::SET_CONFIGURATION
}
