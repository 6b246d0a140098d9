//! Status LEDs.

use embedded_hal::digital::v2::OutputPin;

/// Visible indicators driven by the run loop.
pub trait StatusLeds {
    /// Drive the busy/idle indicator.
    fn set_activity(&mut self, active: bool);

    /// Show a small number across all indicators (used for the reset blink).
    fn show(&mut self, value: u8);
}

/// Three open-drain LEDs wired active-low.
///
/// `show` maps bit 0 to LED 0, bit 1 to LED 1 and bit 2 to LED 2. LED 0 doubles
/// as the activity indicator.
pub struct LedBank<L0, L1, L2> {
    led0: L0,
    led1: L1,
    led2: L2,
}

impl<L0, L1, L2> LedBank<L0, L1, L2>
where
    L0: OutputPin,
    L1: OutputPin,
    L2: OutputPin,
{
    /// Index of the activity LED.
    pub const ACTIVITY: u8 = 0;

    /// Take ownership of the pins and switch every LED off.
    pub fn new(led0: L0, led1: L1, led2: L2) -> Self {
        let mut bank = Self { led0, led1, led2 };
        bank.show(0);
        bank
    }

    /// Switch LED `position` on or off. Positions past 2 are ignored.
    pub fn set(&mut self, position: u8, on: bool) {
        match position {
            0 => drive(&mut self.led0, on),
            1 => drive(&mut self.led1, on),
            2 => drive(&mut self.led2, on),
            _ => {}
        }
    }

    /// Give back the pins.
    pub fn release(self) -> (L0, L1, L2) {
        (self.led0, self.led1, self.led2)
    }
}

impl<L0, L1, L2> StatusLeds for LedBank<L0, L1, L2>
where
    L0: OutputPin,
    L1: OutputPin,
    L2: OutputPin,
{
    fn set_activity(&mut self, active: bool) {
        self.set(Self::ACTIVITY, active);
    }

    fn show(&mut self, value: u8) {
        self.set(0, value & 0x1 != 0);
        self.set(1, value & 0x2 != 0);
        self.set(2, value & 0x4 != 0);
    }
}

// Active-low: sink current to light the LED.
fn drive<P: OutputPin>(pin: &mut P, on: bool) {
    let _ = if on { pin.set_low() } else { pin.set_high() };
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use super::*;

    #[derive(Default)]
    struct Pin {
        high: bool,
    }

    impl OutputPin for Pin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            Ok(())
        }
    }

    fn lit(bank: LedBank<Pin, Pin, Pin>) -> [bool; 3] {
        let (a, b, c) = bank.release();
        [!a.high, !b.high, !c.high]
    }

    #[test]
    fn new_bank_is_dark() {
        let bank = LedBank::new(Pin::default(), Pin::default(), Pin::default());
        assert_eq!(lit(bank), [false, false, false]);
    }

    #[test]
    fn show_maps_bits_to_leds() {
        let cases = [
            (0u8, [false, false, false]),
            (1, [true, false, false]),
            (6, [false, true, true]),
            (7, [true, true, true]),
        ];
        for (value, expected) in cases {
            let mut bank = LedBank::new(Pin::default(), Pin::default(), Pin::default());
            bank.show(value);
            assert_eq!(lit(bank), expected, "value {}", value);
        }
    }

    #[test]
    fn activity_uses_led_zero() {
        let mut bank = LedBank::new(Pin::default(), Pin::default(), Pin::default());
        bank.set_activity(true);
        bank.set(7, true);
        assert_eq!(lit(bank), [true, false, false]);
    }
}
