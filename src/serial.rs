//! Polled UART driver.
//!
//! Transmit and receive busy-wait on the status register without a
//! timeout. Anything needing a bounded wait has to be built on top.

use core::fmt;

use stm32f4::usart::{brr, cr2, Cr1, Sr, Usart, UsartId, CR3_RESET_MASK};

use crate::clock::ClockController;
use crate::gpio::{GpioPort, PinConfig, Pull};

/// Receive error reported by the hardware for one frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Parity,
    Framing,
    Noise,
    /// A frame arrived before the previous one was read and was lost.
    Overrun,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Error::Parity => "parity error",
            Error::Framing => "framing error",
            Error::Noise => "noise detected",
            Error::Overrun => "receive overrun",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    BaudRateZero,
    /// The divisor for this baud rate does not fit BRR.
    BaudRateOutOfRange { baud_rate: u32 },
    /// Seven data bits need a parity bit.
    UnsupportedFrame,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ConfigError::BaudRateZero => f.write_str("baud rate is zero"),
            ConfigError::BaudRateOutOfRange { baud_rate } => {
                write!(f, "baud rate {} out of range for the bus clock", baud_rate)
            }
            ConfigError::UnsupportedFrame => f.write_str("unsupported frame format"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    By16,
    By8,
}

impl Oversampling {
    pub const fn factor(self) -> u32 {
        match self {
            Oversampling::By16 => 16,
            Oversampling::By8 => 8,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    Seven,
    Eight,
}

/// CR2.STOP encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum StopBits {
    One        = 0b00,
    Half       = 0b01,
    Two        = 0b10,
    OneAndHalf = 0b11,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub baud_rate: u32,
    pub oversampling: Oversampling,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Config {
    /// 8N1 at `baud_rate`, oversampling by 16.
    pub const fn new(baud_rate: u32) -> Config {
        Config {
            baud_rate,
            oversampling: Oversampling::By16,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }

    pub fn oversampling(self, oversampling: Oversampling) -> Config {
        Config { oversampling, ..self }
    }

    pub fn data_bits(self, data_bits: DataBits) -> Config {
        Config { data_bits, ..self }
    }

    pub fn stop_bits(self, stop_bits: StopBits) -> Config {
        Config { stop_bits, ..self }
    }

    pub fn parity(self, parity: Parity) -> Config {
        Config { parity, ..self }
    }

    /// CR1 bits for the frame format: word length, parity and
    /// oversampling.
    fn cr1_bits(&self) -> Result<u32, ConfigError> {
        let mut bits = 0;

        // M counts the parity bit as a data bit
        match (self.data_bits, self.parity) {
            (DataBits::Seven, Parity::None) => return Err(ConfigError::UnsupportedFrame),
            (DataBits::Seven, _) | (DataBits::Eight, Parity::None) => {}
            (DataBits::Eight, _) => bits |= Cr1::M as u32,
        }

        match self.parity {
            Parity::None => {}
            Parity::Even => bits |= Cr1::PCE as u32,
            Parity::Odd => bits |= Cr1::PCE as u32 | Cr1::PS as u32,
        }

        if self.oversampling == Oversampling::By8 {
            bits |= Cr1::OVER8 as u32;
        }

        Ok(bits)
    }
}

/// BRR value for `baud_rate` on a `bus_hz` peripheral clock.
///
/// `USARTDIV = bus_hz / (factor * baud_rate)` is rounded half up to the
/// nearest 1/`factor`. With 16x oversampling this makes BRR equal to
/// `round(bus_hz / baud_rate)`. With 8x the 3-bit fraction sits in
/// BRR[2:0] and BRR[3] stays clear.
pub fn baud_rate_divisor(
    bus_hz: u32,
    baud_rate: u32,
    oversampling: Oversampling,
) -> Result<u32, ConfigError> {
    if baud_rate == 0 {
        return Err(ConfigError::BaudRateZero);
    }

    // in 1/factor units of USARTDIV
    let div = (u64::from(bus_hz) + u64::from(baud_rate) / 2) / u64::from(baud_rate);
    let factor = u64::from(oversampling.factor());
    let mantissa = div / factor;
    let fraction = div % factor;

    if mantissa == 0 || mantissa > u64::from(brr::DIV_MANTISSA.max()) {
        return Err(ConfigError::BaudRateOutOfRange { baud_rate });
    }

    Ok(brr::DIV_MANTISSA.encode(mantissa as u32) | brr::DIV_FRACTION.encode(fraction as u32))
}

/// Baud rate produced by BRR value `divisor` on a `bus_hz` clock, rounded
/// to nearest.
pub fn effective_baud_rate(bus_hz: u32, divisor: u32, oversampling: Oversampling) -> u32 {
    let mantissa = u64::from(brr::DIV_MANTISSA.extract(divisor));
    let fraction = u64::from(brr::DIV_FRACTION.extract(divisor));
    let div = mantissa * u64::from(oversampling.factor()) + fraction;
    if div == 0 {
        return 0;
    }
    ((u64::from(bus_hz) + div / 2) / div) as u32
}

pub struct Serial<'a> {
    regs: &'a Usart,
    id: UsartId,
}

impl<'a> Serial<'a> {
    /// Enables the UART clock. The UART stays disabled until
    /// [`Serial::configure`].
    pub fn new(regs: &'a Usart, id: UsartId, clocks: &ClockController) -> Serial<'a> {
        clocks.enable_peripheral_clock(id.peripheral());
        Serial { regs, id }
    }

    pub fn id(&self) -> UsartId {
        self.id
    }

    /// Programs the frame format and baud rate, then enables the
    /// transmitter and receiver. Nothing is written when `config` is
    /// rejected.
    ///
    /// The bus clock is read from `clocks` on every call.
    pub fn configure(
        &mut self,
        clocks: &ClockController,
        config: &Config,
    ) -> Result<(), ConfigError> {
        debug_assert!(clocks.is_enabled(self.id.peripheral()));

        let bus_hz = clocks.bus_frequency(self.id.bus());
        let divisor = baud_rate_divisor(bus_hz, config.baud_rate, config.oversampling)?;
        let frame = config.cr1_bits()?;

        let regs = self.regs;

        // BRR and the frame format may only change while UE is clear
        regs.cr1.clear_flag(Cr1::UE as u32);

        regs.cr2.write_field(cr2::STOP, config.stop_bits as u32);
        regs.cr3.update_with_mask(CR3_RESET_MASK, 0);
        regs.brr.set(divisor);

        let mask = Cr1::SBK as u32
            | Cr1::RWU as u32
            | Cr1::RE as u32
            | Cr1::TE as u32
            | Cr1::IDLEIE as u32
            | Cr1::RXNEIE as u32
            | Cr1::TCIE as u32
            | Cr1::TXEIE as u32
            | Cr1::PEIE as u32
            | Cr1::PS as u32
            | Cr1::PCE as u32
            | Cr1::WAKE as u32
            | Cr1::M as u32
            | Cr1::UE as u32
            | Cr1::OVER8 as u32;
        let value = frame | Cr1::UE as u32 | Cr1::TE as u32 | Cr1::RE as u32;
        regs.cr1.update_with_mask(mask, value);

        info!(
            "usart: {} at {=u32} baud, brr={=u32:#x} bus={=u32}",
            self.id,
            config.baud_rate,
            divisor,
            bus_hz
        );
        Ok(())
    }

    /// Blocks until the data register is free, then queues `byte`.
    pub fn transmit_byte(&self, byte: u8) {
        while !self.regs.sr.is_set(Sr::TXE as u32) {}
        self.regs.dr.set(u32::from(byte));
    }

    /// Blocks until a frame arrives.
    ///
    /// A frame flagged with an error is consumed and reported instead of
    /// returned. The SR read followed by the DR read clears the error
    /// flags, so the next call starts clean.
    pub fn receive_byte(&self) -> Result<u8, Error> {
        let sr = loop {
            let sr = self.regs.sr.get();
            if sr & (Sr::RXNE as u32 | Sr::ORE as u32) != 0 {
                break sr;
            }
        };
        let data = self.regs.dr.get();

        let err = if sr & Sr::PE as u32 != 0 {
            Some(Error::Parity)
        } else if sr & Sr::FE as u32 != 0 {
            Some(Error::Framing)
        } else if sr & Sr::NF as u32 != 0 {
            Some(Error::Noise)
        } else if sr & Sr::ORE as u32 != 0 {
            Some(Error::Overrun)
        } else {
            None
        };

        match err {
            Some(err) => {
                warn!("usart: {} receive error: {}", self.id, err);
                Err(err)
            }
            None => Ok(self.data_mask(data)),
        }
    }

    fn data_mask(&self, data: u32) -> u8 {
        // the parity bit is the MSB of the received word
        let cr1 = self.regs.cr1.get();
        let mask = match (cr1 & Cr1::PCE as u32 != 0, cr1 & Cr1::M as u32 != 0) {
            (true, false) => 0x7F,
            _ => 0xFF,
        };
        (data & mask) as u8
    }

    pub fn write_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.transmit_byte(byte);
        }
    }

    pub fn write_str(&self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Blocks until the last queued frame has left the shift register.
    pub fn flush(&self) {
        while !self.regs.sr.is_set(Sr::TC as u32) {}
    }

    /// Baud rate currently produced under the current clock state.
    pub fn baud_rate(&self, clocks: &ClockController) -> u32 {
        let oversampling = if self.regs.cr1.is_set(Cr1::OVER8 as u32) {
            Oversampling::By8
        } else {
            Oversampling::By16
        };
        effective_baud_rate(
            clocks.bus_frequency(self.id.bus()),
            self.regs.brr.get(),
            oversampling,
        )
    }

    /// Routes TX and RX to `tx_pin` and `rx_pin` of `gpio`. RX gets a
    /// pull-up so a disconnected line idles high.
    pub fn route(&self, gpio: &GpioPort, tx_pin: u8, rx_pin: u8) {
        let af = self.id.alternate_function();
        gpio.configure(tx_pin, PinConfig::alternate(af));
        gpio.configure(
            rx_pin,
            PinConfig {
                pull: Pull::Up,
                ..PinConfig::alternate(af)
            },
        );
    }
}

impl<'a> fmt::Write for Serial<'a> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use core::fmt::Write;

    use stm32f4::gpio::Gpio;
    use stm32f4::rcc::Rcc;

    use crate::clock::{ApbPrescaler, ClockConfig, ClockSource, PllInput, PllP};
    use crate::gpio::{Mode, Port};

    fn config_168mhz() -> ClockConfig {
        ClockConfig::new(ClockSource::Pll {
            input: PllInput::Hse { freq_hz: 8_000_000 },
            m: 8,
            n: 336,
            p: PllP::Div2,
        })
        .apb1(ApbPrescaler::Div4)
        .apb2(ApbPrescaler::Div2)
    }

    #[test]
    fn test_divisor_9600_on_hsi() {
        let brr = baud_rate_divisor(16_000_000, 9600, Oversampling::By16).unwrap();
        assert_eq!(0x683, brr);
        // nearest representable divisor
        assert!(u64::from(brr) * 9600 >= 16_000_000 - 4800);
        assert!(u64::from(brr) * 9600 <= 16_000_000 + 4800);
        assert_eq!(9598, effective_baud_rate(16_000_000, brr, Oversampling::By16));
    }

    #[test]
    fn test_divisor_rounds_to_nearest() {
        // 42 MHz / 115200 = 364.58, truncation would give 364
        assert_eq!(365, baud_rate_divisor(42_000_000, 115_200, Oversampling::By16).unwrap());
    }

    #[test]
    fn test_divisor_over8() {
        // 42 MHz / 115200 rounds to 365 eighths: mantissa 45, fraction 5
        let brr = baud_rate_divisor(42_000_000, 115_200, Oversampling::By8).unwrap();
        assert_eq!(45 << 4 | 5, brr);
        assert_eq!(0, brr & (1 << 3));
        assert_eq!(115_068, effective_baud_rate(42_000_000, brr, Oversampling::By8));
    }

    #[test]
    fn test_divisor_out_of_range() {
        assert_eq!(
            Err(ConfigError::BaudRateZero),
            baud_rate_divisor(16_000_000, 0, Oversampling::By16)
        );
        // rounds to less than one
        assert_eq!(
            Err(ConfigError::BaudRateOutOfRange { baud_rate: 2_000_000 }),
            baud_rate_divisor(16_000_000, 2_000_000, Oversampling::By16)
        );
        // mantissa overflows 12 bits
        assert_eq!(
            Err(ConfigError::BaudRateOutOfRange { baud_rate: 300 }),
            baud_rate_divisor(84_000_000, 300, Oversampling::By16)
        );
    }

    #[test]
    fn test_configure() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Usart::default();
        regs.cr3.set(CR3_RESET_MASK);

        let mut serial = Serial::new(&regs, UsartId::Usart2, &clocks);
        assert_eq!(1 << 17, rcc.apb1enr.get());

        serial.configure(&clocks, &Config::new(9600)).unwrap();
        assert_eq!(0x683, regs.brr.get());
        assert_eq!(Cr1::UE as u32 | Cr1::TE as u32 | Cr1::RE as u32, regs.cr1.get());
        assert_eq!(0, regs.cr2.get());
        assert_eq!(0, regs.cr3.get());
        assert_eq!(9598, serial.baud_rate(&clocks));
    }

    #[test]
    fn test_configure_frame_format() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, config_168mhz()).unwrap();
        let regs = Usart::default();
        let mut serial = Serial::new(&regs, UsartId::Usart1, &clocks);

        let config = Config::new(115_200)
            .parity(Parity::Odd)
            .stop_bits(StopBits::Two)
            .oversampling(Oversampling::By8);
        serial.configure(&clocks, &config).unwrap();

        let cr1 = regs.cr1.get();
        assert!(cr1 & Cr1::M as u32 != 0);
        assert!(cr1 & Cr1::PCE as u32 != 0);
        assert!(cr1 & Cr1::PS as u32 != 0);
        assert!(cr1 & Cr1::OVER8 as u32 != 0);
        assert_eq!(0b10, regs.cr2.read_field(cr2::STOP));
        // USART1 on APB2 at 84 MHz
        assert_eq!(
            baud_rate_divisor(84_000_000, 115_200, Oversampling::By8).unwrap(),
            regs.brr.get()
        );
    }

    #[test]
    fn test_configure_error_leaves_registers() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Usart::default();
        regs.cr1.set(Cr1::UE as u32 | Cr1::TE as u32);
        regs.brr.set(0x683);

        let mut serial = Serial::new(&regs, UsartId::Usart3, &clocks);
        assert_eq!(
            Err(ConfigError::BaudRateZero),
            serial.configure(&clocks, &Config::new(0))
        );
        assert_eq!(
            Err(ConfigError::UnsupportedFrame),
            serial.configure(&clocks, &Config::new(9600).data_bits(DataBits::Seven))
        );
        assert_eq!(Cr1::UE as u32 | Cr1::TE as u32, regs.cr1.get());
        assert_eq!(0x683, regs.brr.get());
    }

    #[test]
    fn test_transmit() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Usart::default();
        regs.sr.set(Sr::TXE as u32 | Sr::TC as u32);

        let mut serial = Serial::new(&regs, UsartId::Usart2, &clocks);
        serial.transmit_byte(b'x');
        assert_eq!(u32::from(b'x'), regs.dr.get());

        serial.write_str("ok");
        assert_eq!(u32::from(b'k'), regs.dr.get());

        write!(serial, "{}", 42).unwrap();
        assert_eq!(u32::from(b'2'), regs.dr.get());

        serial.flush();
    }

    #[test]
    fn test_receive() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Usart::default();
        let serial = Serial::new(&regs, UsartId::Usart2, &clocks);

        regs.sr.set(Sr::RXNE as u32);
        regs.dr.set(0x1A5);
        assert_eq!(Ok(0xA5), serial.receive_byte());
    }

    #[test]
    fn test_receive_overrun_then_recovers() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Usart::default();
        let serial = Serial::new(&regs, UsartId::Usart2, &clocks);

        regs.sr.set(Sr::RXNE as u32 | Sr::ORE as u32);
        regs.dr.set(u32::from(b'a'));
        assert_eq!(Err(Error::Overrun), serial.receive_byte());

        // line healthy again
        regs.sr.set(Sr::RXNE as u32);
        regs.dr.set(u32::from(b'b'));
        assert_eq!(Ok(b'b'), serial.receive_byte());
    }

    #[test]
    fn test_receive_error_priority() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Usart::default();
        let serial = Serial::new(&regs, UsartId::Usart2, &clocks);

        regs.sr.set(Sr::RXNE as u32 | Sr::FE as u32 | Sr::ORE as u32);
        assert_eq!(Err(Error::Framing), serial.receive_byte());
        regs.sr.set(Sr::RXNE as u32 | Sr::NF as u32 | Sr::PE as u32);
        assert_eq!(Err(Error::Parity), serial.receive_byte());
        regs.sr.set(Sr::RXNE as u32 | Sr::NF as u32);
        assert_eq!(Err(Error::Noise), serial.receive_byte());
    }

    #[test]
    fn test_receive_seven_bit_parity() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Usart::default();
        let mut serial = Serial::new(&regs, UsartId::Usart2, &clocks);

        let config = Config::new(9600).data_bits(DataBits::Seven).parity(Parity::Even);
        serial.configure(&clocks, &config).unwrap();
        assert!(!regs.cr1.is_set(Cr1::M as u32));

        regs.sr.set(Sr::RXNE as u32);
        regs.dr.set(0xC1);
        assert_eq!(Ok(0x41), serial.receive_byte());
    }

    #[test]
    fn test_route() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let regs = Usart::default();
        let gpio_regs = Gpio::default();

        let gpio = GpioPort::new(&gpio_regs, Port::A, &clocks);
        let serial = Serial::new(&regs, UsartId::Usart2, &clocks);
        serial.route(&gpio, 2, 3);

        let af_mode = Mode::Alternate as u32;
        assert_eq!(af_mode << 4 | af_mode << 6, gpio_regs.moder.get());
        assert_eq!(7 << 8 | 7 << 12, gpio_regs.afrl.get());
        assert_eq!(0x1 << 6, gpio_regs.pupdr.get());
    }
}
