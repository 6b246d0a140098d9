//! Cortex-M reset and bootloader entry.

use cortex_m::peripheral::SCB;

use crate::backup::{BackupRegisters, BootDecision, BootIntentStore};
use crate::scheduler::SystemReset;

/// System reset through `SCB.AIRCR`.
#[derive(Debug, Default)]
pub struct ScbReset;

impl SystemReset for ScbReset {
    fn reset(&mut self) -> ! {
        cortex_m::interrupt::disable();
        SCB::sys_reset()
    }
}

/// Jump to the bootloader whose vector table starts at `vector_table`.
///
/// # Safety
///
/// `vector_table` must point at a valid vector table (initial stack pointer
/// followed by the reset vector). Call before any peripheral is configured.
pub unsafe fn jump_to_bootloader(vector_table: u32) -> ! {
    cortex_m::interrupt::disable();
    cortex_m::asm::bootload(vector_table as *const u32)
}

/// Earliest boot step: consume the boot intent and jump if one was pending.
///
/// Returns normally when the application should start.
///
/// # Safety
///
/// See [`jump_to_bootloader`].
pub unsafe fn maybe_jump_to_bootloader<R: BackupRegisters>(
    store: &mut BootIntentStore<R>,
    vector_table: u32,
) {
    if let Ok(BootDecision::Bootloader) = store.take_boot_decision() {
        jump_to_bootloader(vector_table)
    }
}
