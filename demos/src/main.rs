#![no_std]
#![no_main]

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::{entry, exception};
use embedded_hal::watchdog::WatchdogEnable;
use hal::{pac, prelude::*};
use panic_halt as _;
use stm32f0xx_hal as hal;
use usb_device::{
    bus::UsbBus,
    class_prelude::*,
    device::{UsbDevice, UsbDeviceBuilder, UsbVidPid},
    prelude::StringDescriptors,
};
use usbd_composite_rt::{
    backup::MmioBackupRegisters,
    descriptor::{self, SerialNumber},
    platform::{self, ScbReset},
    BootIntentStore, ClassRegistry, ControlRequest, ControlResponse, ControlRouter, DfuRuntime,
    service_all, LedBank, Outcome, ResetRequest, RunLoop, RunLoopConfig, Services, Ticks,
};

// Location of the embedded bootloader in stm32f072
const SYSTEM_MEMORY_BASE: u32 = 0x1fffc800;

// 96-bit unique device ID
const UID_BASE: usize = 0x1fff_f7ac;

static TICKS: Ticks = Ticks::new();
static RESET_REQUEST: ResetRequest = ResetRequest::new();

#[exception]
fn SysTick() {
    TICKS.increment();
}

// Backup domain writes need the PWR clock and DBP set.
fn unlock_backup_domain() {
    // SAFETY: single-bit read-modify-writes before any driver owns RCC/PWR
    unsafe {
        (*pac::RCC::ptr()).apb1enr.modify(|_, w| w.pwren().set_bit());
        (*pac::PWR::ptr()).cr.modify(|_, w| w.dbp().set_bit());
    }
}

fn read_uid() -> [u8; 12] {
    let mut uid = [0u8; 12];
    for (i, byte) in uid.iter_mut().enumerate() {
        // SAFETY: UID_BASE is a read-only factory area
        *byte = unsafe { core::ptr::read_volatile((UID_BASE + i) as *const u8) };
    }
    uid
}

/// Every USB function of the device. Only the DFU run-time is built in here;
/// other class drivers join the struct and the forwarding below.
pub struct Functions {
    dfu: DfuRuntime<'static>,
}

impl<B: UsbBus> UsbClass<B> for Functions {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> usb_device::Result<()> {
        UsbClass::<B>::get_configuration_descriptors(&self.dfu, writer)
    }

    fn get_string(&self, index: StringIndex, lang_id: LangID) -> Option<&str> {
        UsbClass::<B>::get_string(&self.dfu, index, lang_id)
    }

    fn reset(&mut self) {
        UsbClass::<B>::reset(&mut self.dfu)
    }
}

fn dfu_request(f: &mut Functions, req: &ControlRequest<'_>, resp: &mut ControlResponse<'_>) -> Outcome {
    f.dfu.handle_request(req, resp)
}

fn dfu_configured(f: &mut Functions, registry: &mut ClassRegistry<Functions>, _config: u16) {
    // Registry is cleared on every activation, so this cannot run out of room.
    let _ = f.dfu.register(registry, dfu_request);
}

struct Device<'a> {
    usb_dev: UsbDevice<'a, hal::usb::UsbBusType>,
    router: ControlRouter<Functions>,
    functions: Functions,
}

impl Services for Device<'_> {
    fn poll_usb(&mut self) {
        let mut composite = self.router.bind(&mut self.functions);
        self.usb_dev.poll(&mut [&mut composite]);
    }

    fn service_drivers(&mut self) -> bool {
        service_all(&mut [&mut self.functions.dfu])
    }

    fn before_reset(&mut self) {
        // Sometimes host fails to reenumerate our device when jumping to bootloader,
        // so we reset while the bus is powered down.
        self.usb_dev
            .bus()
            .force_reenumeration(|| cortex_m::peripheral::SCB::sys_reset());
    }
}

#[entry]
fn main() -> ! {
    unlock_backup_domain();
    // SAFETY: backup domain unlocked above, nothing else touches RTC_BKPxR
    let mut store = BootIntentStore::new(unsafe { MmioBackupRegisters::stm32f0() });
    // SAFETY: clocks and peripherals are still in their reset state
    unsafe { platform::maybe_jump_to_bootloader(&mut store, SYSTEM_MEMORY_BASE) };

    let mut p = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    let mut rcc = p.RCC
        .configure()
        .hsi48()
        .sysclk(48.mhz())
        .pclk(24.mhz())
        .enable_crs(p.CRS) // synchronization to USB SOF
        .freeze(&mut p.FLASH);

    let config = RunLoopConfig::default();
    let mut watchdog = hal::watchdog::Watchdog::new(p.IWDG);
    watchdog.start((1000 / config.watchdog_period_ms).max(1).hz());

    // Interrupt every millisecond
    let mut systick = cp.SYST;
    systick.set_clock_source(SystClkSource::Core);
    systick.set_reload(48_000 - 1);
    systick.clear_current();
    systick.enable_interrupt();
    systick.enable_counter();

    let gpioa = p.GPIOA.split(&mut rcc);

    let leds = cortex_m::interrupt::free(|cs| {
        LedBank::new(
            gpioa.pa4.into_open_drain_output(cs),
            gpioa.pa1.into_open_drain_output(cs),
            gpioa.pa0.into_open_drain_output(cs),
        )
    });

    let usb = hal::usb::Peripheral {
        usb: p.USB,
        pin_dp: gpioa.pa12,
        pin_dm: gpioa.pa11,
    };
    let usb_bus = hal::usb::UsbBus::new(usb);

    let functions = Functions {
        dfu: DfuRuntime::with_name(&usb_bus, &RESET_REQUEST, descriptor::DFU_INTERFACE_NAME),
    };

    let serial: &'static mut SerialNumber =
        cortex_m::singleton!(: SerialNumber = descriptor::serial_number(&read_uid())).unwrap();

    let usb_dev = UsbDeviceBuilder::new(&usb_bus, UsbVidPid(descriptor::USB_VID, descriptor::USB_PID))
        .strings(&[
            StringDescriptors::default()
                .manufacturer(descriptor::MANUFACTURER)
                .product(descriptor::PRODUCT)
                .serial_number(serial.as_str())
        ])
        .unwrap()
        .device_release(descriptor::DEVICE_RELEASE)
        .max_packet_size_0(descriptor::MAX_PACKET_SIZE_0)
        .unwrap()
        .build();

    let mut router: ControlRouter<Functions> = ControlRouter::new();
    router.register_config_handler(dfu_configured).unwrap();

    let mut device = Device {
        usb_dev,
        router,
        functions,
    };

    let mut run_loop = RunLoop::new(watchdog, leds, &TICKS, store, &RESET_REQUEST, config);
    run_loop.run(&mut device, &mut ScbReset)
}
