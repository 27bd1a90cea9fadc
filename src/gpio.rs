//! GPIO driver.
//!
//! Only what the timer and UART drivers need to route their signals, plus
//! plain digital output and input.

use stm32f4::gpio::{Gpio, PINS_PER_PORT};

pub use stm32f4::gpio::{Mode, OutputType, Port, Pull, Speed};

use crate::clock::ClockController;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinConfig {
    pub mode: Mode,
    pub output_type: OutputType,
    pub speed: Speed,
    pub pull: Pull,
    /// Only applied in `Mode::Alternate`.
    pub alternate_function: u8,
}

impl PinConfig {
    pub const fn input(pull: Pull) -> PinConfig {
        PinConfig {
            mode: Mode::Input,
            output_type: OutputType::PushPull,
            speed: Speed::Low,
            pull,
            alternate_function: 0,
        }
    }

    pub const fn output() -> PinConfig {
        PinConfig {
            mode: Mode::Output,
            output_type: OutputType::PushPull,
            speed: Speed::Low,
            pull: Pull::None,
            alternate_function: 0,
        }
    }

    /// Push-pull alternate function at fast speed, as used for timer and
    /// UART outputs.
    pub const fn alternate(af: u8) -> PinConfig {
        PinConfig {
            mode: Mode::Alternate,
            output_type: OutputType::PushPull,
            speed: Speed::Fast,
            pull: Pull::None,
            alternate_function: af,
        }
    }
}

pub struct GpioPort<'a> {
    regs: &'a Gpio,
    port: Port,
}

impl<'a> GpioPort<'a> {
    /// Enables the port clock and wraps its register block.
    pub fn new(regs: &'a Gpio, port: Port, clocks: &ClockController) -> GpioPort<'a> {
        clocks.enable_peripheral_clock(port.peripheral());
        GpioPort { regs, port }
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn set_pin_mode(&self, pin: u8, mode: Mode) {
        check_pin(pin);
        self.regs.moder.update_with_mask(0x3 << (pin * 2), (mode as u32) << (pin * 2));
    }

    /// Selects alternate function `af` (0..=15) for `pin`. The pin must also
    /// be put in `Mode::Alternate`.
    pub fn set_alternate_function(&self, pin: u8, af: u8) {
        check_pin(pin);
        debug_assert!(af < 16, "alternate function out of range");

        let (reg, shift) = if pin < 8 {
            (&self.regs.afrl, pin * 4)
        } else {
            (&self.regs.afrh, (pin - 8) * 4)
        };
        reg.update_with_mask(0xF << shift, u32::from(af) << shift);
    }

    pub fn set_output_type(&self, pin: u8, output_type: OutputType) {
        check_pin(pin);
        self.regs.otyper.update_with_mask(1 << pin, (output_type as u32) << pin);
    }

    pub fn set_speed(&self, pin: u8, speed: Speed) {
        check_pin(pin);
        self.regs.ospeedr.update_with_mask(0x3 << (pin * 2), (speed as u32) << (pin * 2));
    }

    pub fn set_pull(&self, pin: u8, pull: Pull) {
        check_pin(pin);
        self.regs.pupdr.update_with_mask(0x3 << (pin * 2), (pull as u32) << (pin * 2));
    }

    /// Applies the whole `config`. The alternate function is written before
    /// the mode so the pin never drives a stale function.
    pub fn configure(&self, pin: u8, config: PinConfig) {
        if config.mode == Mode::Alternate {
            self.set_alternate_function(pin, config.alternate_function);
        }
        self.set_output_type(pin, config.output_type);
        self.set_speed(pin, config.speed);
        self.set_pull(pin, config.pull);
        self.set_pin_mode(pin, config.mode);
    }

    pub fn set_high(&self, pin: u8) {
        check_pin(pin);
        self.regs.bsrr.set(1 << pin);
    }

    pub fn set_low(&self, pin: u8) {
        check_pin(pin);
        self.regs.bsrr.set(1 << (pin + 16));
    }

    pub fn write(&self, pin: u8, high: bool) {
        if high {
            self.set_high(pin);
        } else {
            self.set_low(pin);
        }
    }

    pub fn is_high(&self, pin: u8) -> bool {
        check_pin(pin);
        self.regs.idr.is_set(1 << pin)
    }
}

#[inline]
fn check_pin(pin: u8) {
    debug_assert!(pin < PINS_PER_PORT, "pin out of range");
}

#[cfg(test)]
mod test {
    use super::*;

    use stm32f4::rcc::Rcc;

    use crate::clock::ClockConfig;

    #[test]
    fn test_new_enables_port_clock() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Gpio::default();

        let port = GpioPort::new(&regs, Port::D, &clocks);
        assert_eq!(Port::D, port.port());
        assert_eq!(1 << 3, rcc.ahb1enr.get());
    }

    #[test]
    fn test_configure_alternate() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Gpio::default();
        regs.moder.set(0xFFFF_FFFF);

        let port = GpioPort::new(&regs, Port::A, &clocks);
        port.configure(2, PinConfig::alternate(7));
        port.configure(10, PinConfig::alternate(1));

        assert_eq!(0xFFEF_FFEF, regs.moder.get());
        assert_eq!(7 << 8, regs.afrl.get());
        assert_eq!(1 << 8, regs.afrh.get());
        assert_eq!(0x2 << 4 | 0x2 << 20, regs.ospeedr.get());
        assert_eq!(0, regs.pupdr.get());
    }

    #[test]
    fn test_input_config_leaves_af() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Gpio::default();
        regs.afrl.set(0x5 << 12);

        let port = GpioPort::new(&regs, Port::B, &clocks);
        port.configure(3, PinConfig::input(Pull::Up));

        assert_eq!(0x5 << 12, regs.afrl.get());
        assert_eq!(0, regs.moder.get());
        assert_eq!(0x1 << 6, regs.pupdr.get());
    }

    #[test]
    fn test_output_uses_bsrr() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Gpio::default();
        let port = GpioPort::new(&regs, Port::D, &clocks);

        port.set_high(12);
        assert_eq!(1 << 12, regs.bsrr.get());
        port.write(12, false);
        assert_eq!(1 << 28, regs.bsrr.get());

        regs.idr.set(1 << 0);
        assert!(port.is_high(0));
        assert!(!port.is_high(1));
    }

    #[test]
    fn test_open_drain() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Gpio::default();
        let port = GpioPort::new(&regs, Port::C, &clocks);

        port.set_output_type(15, OutputType::OpenDrain);
        assert_eq!(1 << 15, regs.otyper.get());
        port.set_output_type(15, OutputType::PushPull);
        assert_eq!(0, regs.otyper.get());
    }
}
