//! Reset-persistent boot intent.
//!
//! Backup-domain registers keep their value across a system reset as long as
//! the backup supply stays up. The application writes [`BOOTLOADER_MAGIC`]
//! into [`BOOT_INTENT_SLOT`] right before resetting itself; the earliest boot
//! code calls [`BootIntentStore::take_boot_decision`], which clears the slot
//! so every bootloader entry is a one-shot transition.

use core::ptr;

use crate::{Error, Result};

/// Slot holding the boot intent.
pub const BOOT_INTENT_SLOT: usize = 0;

/// Value that asks the next boot to enter the bootloader.
pub const BOOTLOADER_MAGIC: u16 = 0x544f;

/// Value written back once the request has been consumed.
pub const BOOT_INTENT_CLEAR: u16 = 0x0000;

/// Only an exact match counts. Stale or power-on garbage is "no request".
pub const fn is_bootloader_request(value: u16) -> bool {
    value == BOOTLOADER_MAGIC
}

/// Where the next boot should go.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    /// Continue into the application.
    Application,
    /// Jump to the secondary bootloader.
    Bootloader,
}

/// Raw access to a bank of 16-bit backup registers.
///
/// Implementations may assume `index < self.slots()`; bounds are checked by
/// [`BootIntentStore`].
pub trait BackupRegisters {
    /// Number of addressable slots.
    fn slots(&self) -> usize;

    /// Read slot `index`.
    fn read(&self, index: usize) -> u16;

    /// Write slot `index`.
    fn write(&mut self, index: usize, value: u16);
}

/// Bounds-checked key-value view over [`BackupRegisters`].
pub struct BootIntentStore<R> {
    regs: R,
}

impl<R: BackupRegisters> BootIntentStore<R> {
    /// Wrap a register bank.
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    fn check(&self, slot: usize) -> Result<()> {
        let slots = self.regs.slots();
        if slot >= slots {
            return Err(Error::SlotOutOfRange { slot, slots });
        }
        Ok(())
    }

    /// Read `slot`.
    pub fn read(&self, slot: usize) -> Result<u16> {
        self.check(slot)?;
        Ok(self.regs.read(slot))
    }

    /// Write `value` into `slot`.
    pub fn write(&mut self, slot: usize, value: u16) -> Result<()> {
        self.check(slot)?;
        self.regs.write(slot, value);
        Ok(())
    }

    /// Ask the next boot to enter the bootloader.
    pub fn request_bootloader(&mut self) -> Result<()> {
        self.write(BOOT_INTENT_SLOT, BOOTLOADER_MAGIC)
    }

    /// Whether a bootloader request is pending, without consuming it.
    pub fn bootloader_requested(&self) -> Result<bool> {
        Ok(is_bootloader_request(self.read(BOOT_INTENT_SLOT)?))
    }

    /// Consume the boot intent.
    ///
    /// On a magic match the slot is cleared before [`BootDecision::Bootloader`]
    /// is returned, so a failed bootloader attempt that resets again comes back
    /// to the application.
    pub fn take_boot_decision(&mut self) -> Result<BootDecision> {
        if !self.bootloader_requested()? {
            return Ok(BootDecision::Application);
        }
        self.write(BOOT_INTENT_SLOT, BOOT_INTENT_CLEAR)?;
        info!("boot intent consumed, entering bootloader");
        Ok(BootDecision::Bootloader)
    }

    /// The underlying register bank.
    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Give back the register bank.
    pub fn into_registers(self) -> R {
        self.regs
    }
}

/// RAM-backed register bank.
///
/// Contents survive a simulated reset as long as the value itself is kept,
/// which makes it useful for host tests and for boards that park the intent in
/// a `.uninit` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBackupRegisters<const N: usize> {
    cells: [u16; N],
}

impl<const N: usize> MemoryBackupRegisters<N> {
    /// Bank with every slot zero.
    pub const fn new() -> Self {
        Self { cells: [0; N] }
    }

    /// Bank with explicit power-on contents.
    pub const fn with_contents(cells: [u16; N]) -> Self {
        Self { cells }
    }
}

impl<const N: usize> Default for MemoryBackupRegisters<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BackupRegisters for MemoryBackupRegisters<N> {
    fn slots(&self) -> usize {
        N
    }

    fn read(&self, index: usize) -> u16 {
        self.cells[index]
    }

    fn write(&mut self, index: usize, value: u16) {
        self.cells[index] = value;
    }
}

impl<R: BackupRegisters + ?Sized> BackupRegisters for &mut R {
    fn slots(&self) -> usize {
        (**self).slots()
    }

    fn read(&self, index: usize) -> u16 {
        (**self).read(index)
    }

    fn write(&mut self, index: usize, value: u16) {
        (**self).write(index, value)
    }
}

/// Memory-mapped backup registers.
///
/// Each slot is a 32-bit register of which the low half-word is used.
#[derive(Debug)]
pub struct MmioBackupRegisters {
    first: usize,
    stride: usize,
    slots: usize,
}

impl MmioBackupRegisters {
    /// STM32F1 `BKP_DR1..BKP_DR10`.
    pub const STM32F1_BKP: usize = 0x4000_6c00;

    /// STM32F0 `RTC_BKP0R..RTC_BKP4R`.
    pub const STM32F0_RTC: usize = 0x4000_2800;

    /// Bank of `slots` registers starting at `first`, `stride` bytes apart.
    ///
    /// # Safety
    ///
    /// The range must map to backup registers that are powered, clocked and
    /// write-enabled for as long as the bank is used, and nothing else may
    /// access them concurrently.
    pub const unsafe fn new(first: usize, stride: usize, slots: usize) -> Self {
        Self {
            first,
            stride,
            slots,
        }
    }

    /// Backup data registers of the STM32F1 family.
    ///
    /// # Safety
    ///
    /// See [`MmioBackupRegisters::new`]; PWR/BKP clocks and `PWR_CR.DBP` must be set.
    pub const unsafe fn stm32f1() -> Self {
        Self::new(Self::STM32F1_BKP + 0x04, 4, 10)
    }

    /// RTC backup registers of the STM32F0 family.
    ///
    /// # Safety
    ///
    /// See [`MmioBackupRegisters::new`]; the PWR clock and `PWR_CR.DBP` must be set.
    pub const unsafe fn stm32f0() -> Self {
        Self::new(Self::STM32F0_RTC + 0x50, 4, 5)
    }

    fn address(&self, index: usize) -> *mut u32 {
        (self.first + index * self.stride) as *mut u32
    }
}

impl BackupRegisters for MmioBackupRegisters {
    fn slots(&self) -> usize {
        self.slots
    }

    fn read(&self, index: usize) -> u16 {
        // SAFETY: index was bounds-checked by the store; the constructor
        // contract guarantees the address is a backup register.
        unsafe { ptr::read_volatile(self.address(index)) as u16 }
    }

    fn write(&mut self, index: usize, value: u16) {
        // SAFETY: see `read`.
        unsafe { ptr::write_volatile(self.address(index), u32::from(value)) }
    }
}
