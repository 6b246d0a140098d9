use core::fmt;

/// Errors reported by the control-plane router and the boot-intent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Backup register index past the end of the register bank.
    SlotOutOfRange {
        /// Requested slot
        slot: usize,
        /// Number of slots the bank provides
        slots: usize,
    },

    /// Registration table already holds `capacity` entries; the entry was dropped.
    RegistryFull {
        /// Table capacity
        capacity: usize,
    },

    /// Handler produced more IN data than the control buffer holds.
    ResponseOverflow {
        /// Buffer capacity in bytes
        capacity: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SlotOutOfRange { slot, slots } => {
                write!(f, "backup slot {} out of range (0..{})", slot, slots)
            }
            Error::RegistryFull { capacity } => {
                write!(f, "registry full ({} entries)", capacity)
            }
            Error::ResponseOverflow { capacity } => {
                write!(f, "control response exceeds {} bytes", capacity)
            }
        }
    }
}

/// Result type used across the crate.
pub type Result<T> = core::result::Result<T, Error>;
