//! Device identity shared by the composite functions.

use heapless::String;

/// pid.codes vendor ID.
pub const USB_VID: u16 = 0x1209;

/// DAP42 product ID.
pub const USB_PID: u16 = 0xda42;

/// `bcdDevice`
pub const DEVICE_RELEASE: u16 = 0x0100;

/// Control endpoint packet size.
pub const MAX_PACKET_SIZE_0: u8 = 64;

/// Length of the serial number string.
pub const SERIAL_NUMBER_LENGTH: usize = 24;

/// Manufacturer string.
pub const MANUFACTURER: &str = "Devanarchy";

/// Product string.
pub const PRODUCT: &str = "DAP42 CMSIS-DAP";

/// Interface string of the DFU run-time function.
pub const DFU_INTERFACE_NAME: &str = "DAP42 DFU";

/// Interface numbers, in the order the functions allocate them.
pub mod interface {
    /// CMSIS-DAP HID
    pub const HID: u8 = 0;
    /// CDC-ACM control
    pub const CDC_COMM: u8 = 1;
    /// CDC-ACM data
    pub const CDC_DATA: u8 = 2;
    /// MTP
    pub const MTP: u8 = 3;
    /// DFU run-time
    pub const DFU: u8 = 4;
    /// Number of interfaces in the configuration.
    pub const COUNT: u8 = 5;
}

/// Serial number string.
pub type SerialNumber = String<SERIAL_NUMBER_LENGTH>;

/// Serial number string: the 96-bit unique device ID as uppercase hex.
pub fn serial_number(uid: &[u8; 12]) -> SerialNumber {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut serial = String::new();
    for byte in uid {
        for nibble in [byte >> 4, byte & 0x0f] {
            // 12 bytes, two digits each, exactly fills the string
            let _ = serial.push(char::from(HEX[usize::from(nibble)]));
        }
    }
    serial
}
