//! Clock controller.
//!
//! Owns the process-wide bus frequency state and gates peripheral clocks
//! through RCC.
//!
//! The clock source (HSI, HSE or PLL) is brought up by startup code and
//! handed in as a [`ClockConfig`]. [`ClockController::new`] is the single
//! initialization step: it derives the AHB/APB frequencies from that
//! configuration and programs the bus prescalers. Drivers never store a
//! frequency; they borrow the controller for the duration of a
//! configuration call and read the current value, so a
//! [`ClockController::reconfigure`] can never leave a driver with a stale
//! frequency.
//!
//! # Enable ordering
//!
//! On this family a write to an RCC enable register is not immediately
//! seen by the peripheral's own address decoder. A configuration write
//! issued right after the enable may be dropped. Every enable is
//! therefore a two-step protocol: set the bit, then read the same
//! register back before returning.

use core::fmt;

use stm32f4::rcc::{cfgr, pllcfgr, Bus, Peripheral, Rcc};
use stm32f4::volatile::RW;

/// Internal 16 MHz RC oscillator.
pub const HSI_FREQ: u32 = 16_000_000;

pub const HSE_MIN: u32 = 4_000_000;
pub const HSE_MAX: u32 = 26_000_000;

pub const SYSCLK_MAX: u32 = 180_000_000;
pub const PCLK1_MAX: u32 = 45_000_000;
pub const PCLK2_MAX: u32 = 90_000_000;

const VCO_INPUT_MIN: u32 = 1_000_000;
const VCO_INPUT_MAX: u32 = 2_000_000;
const VCO_OUTPUT_MIN: u32 = 100_000_000;
const VCO_OUTPUT_MAX: u32 = 432_000_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// HSE crystal outside 4-26 MHz.
    HseOutOfRange { freq_hz: u32 },
    /// PLLM, PLLN or PLLP not encodable.
    PllDividerOutOfRange,
    /// PLL input after PLLM outside 1-2 MHz.
    VcoInputOutOfRange { freq_hz: u32 },
    /// VCO output outside 100-432 MHz.
    VcoOutputOutOfRange { freq_hz: u32 },
    SysclkTooHigh { freq_hz: u32 },
    Pclk1TooHigh { freq_hz: u32 },
    Pclk2TooHigh { freq_hz: u32 },
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ClockError::HseOutOfRange { freq_hz } => {
                write!(f, "HSE frequency {} Hz outside 4-26 MHz", freq_hz)
            }
            ClockError::PllDividerOutOfRange => f.write_str("PLL divider out of range"),
            ClockError::VcoInputOutOfRange { freq_hz } => {
                write!(f, "PLL VCO input {} Hz outside 1-2 MHz", freq_hz)
            }
            ClockError::VcoOutputOutOfRange { freq_hz } => {
                write!(f, "PLL VCO output {} Hz outside 100-432 MHz", freq_hz)
            }
            ClockError::SysclkTooHigh { freq_hz } => {
                write!(f, "SYSCLK {} Hz above {} Hz", freq_hz, SYSCLK_MAX)
            }
            ClockError::Pclk1TooHigh { freq_hz } => {
                write!(f, "APB1 clock {} Hz above {} Hz", freq_hz, PCLK1_MAX)
            }
            ClockError::Pclk2TooHigh { freq_hz } => {
                write!(f, "APB2 clock {} Hz above {} Hz", freq_hz, PCLK2_MAX)
            }
        }
    }
}

/// Oscillator feeding the main PLL.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllInput {
    Hsi,
    Hse { freq_hz: u32 },
}

/// Main PLL output divider.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllP {
    Div2,
    Div4,
    Div6,
    Div8,
}

impl PllP {
    pub const fn divisor(self) -> u32 {
        match self {
            PllP::Div2 => 2,
            PllP::Div4 => 4,
            PllP::Div6 => 6,
            PllP::Div8 => 8,
        }
    }

    /// PLLP field encoding.
    pub const fn bits(self) -> u32 {
        self.divisor() / 2 - 1
    }
}

/// SYSCLK source.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    Hsi,
    Hse { freq_hz: u32 },
    /// `SYSCLK = input / m * n / p`.
    Pll {
        input: PllInput,
        m: u8,
        n: u16,
        p: PllP,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AhbPrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
    Div16,
    Div64,
    Div128,
    Div256,
    Div512,
}

impl AhbPrescaler {
    pub const fn divisor(self) -> u32 {
        match self {
            AhbPrescaler::Div1 => 1,
            AhbPrescaler::Div2 => 2,
            AhbPrescaler::Div4 => 4,
            AhbPrescaler::Div8 => 8,
            AhbPrescaler::Div16 => 16,
            AhbPrescaler::Div64 => 64,
            AhbPrescaler::Div128 => 128,
            AhbPrescaler::Div256 => 256,
            AhbPrescaler::Div512 => 512,
        }
    }

    /// HPRE field encoding.
    pub const fn bits(self) -> u32 {
        match self {
            AhbPrescaler::Div1 => 0b0000,
            AhbPrescaler::Div2 => 0b1000,
            AhbPrescaler::Div4 => 0b1001,
            AhbPrescaler::Div8 => 0b1010,
            AhbPrescaler::Div16 => 0b1011,
            AhbPrescaler::Div64 => 0b1100,
            AhbPrescaler::Div128 => 0b1101,
            AhbPrescaler::Div256 => 0b1110,
            AhbPrescaler::Div512 => 0b1111,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApbPrescaler {
    Div1,
    Div2,
    Div4,
    Div8,
    Div16,
}

impl ApbPrescaler {
    pub const fn divisor(self) -> u32 {
        match self {
            ApbPrescaler::Div1 => 1,
            ApbPrescaler::Div2 => 2,
            ApbPrescaler::Div4 => 4,
            ApbPrescaler::Div8 => 8,
            ApbPrescaler::Div16 => 16,
        }
    }

    /// PPRE1/PPRE2 field encoding.
    pub const fn bits(self) -> u32 {
        match self {
            ApbPrescaler::Div1 => 0b000,
            ApbPrescaler::Div2 => 0b100,
            ApbPrescaler::Div4 => 0b101,
            ApbPrescaler::Div8 => 0b110,
            ApbPrescaler::Div16 => 0b111,
        }
    }
}

/// Clock tree as brought up by startup code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    pub source: ClockSource,
    pub ahb: AhbPrescaler,
    pub apb1: ApbPrescaler,
    pub apb2: ApbPrescaler,
}

impl ClockConfig {
    /// `source` with every bus prescaler at 1.
    pub const fn new(source: ClockSource) -> ClockConfig {
        ClockConfig {
            source,
            ahb: AhbPrescaler::Div1,
            apb1: ApbPrescaler::Div1,
            apb2: ApbPrescaler::Div1,
        }
    }

    pub fn ahb(self, ahb: AhbPrescaler) -> ClockConfig {
        ClockConfig { ahb, ..self }
    }

    pub fn apb1(self, apb1: ApbPrescaler) -> ClockConfig {
        ClockConfig { apb1, ..self }
    }

    pub fn apb2(self, apb2: ApbPrescaler) -> ClockConfig {
        ClockConfig { apb2, ..self }
    }

    /// PLLCFGR word startup code programs for this configuration, `None`
    /// when the PLL is unused. PLLQ keeps its reset value.
    pub fn pllcfgr(&self) -> Option<u32> {
        match self.source {
            ClockSource::Pll { input, m, n, p } => {
                let src = match input {
                    PllInput::Hsi => 0,
                    PllInput::Hse { .. } => 1,
                };
                Some(
                    pllcfgr::PLLM.encode(u32::from(m))
                        | pllcfgr::PLLN.encode(u32::from(n))
                        | pllcfgr::PLLP.encode(p.bits())
                        | pllcfgr::PLLSRC.encode(src)
                        | pllcfgr::PLLQ.encode(4),
                )
            }
            ClockSource::Hsi | ClockSource::Hse { .. } => None,
        }
    }
}

impl Default for ClockConfig {
    /// Reset state: HSI, no bus division.
    fn default() -> ClockConfig {
        ClockConfig::new(ClockSource::Hsi)
    }
}

/// Bus frequencies derived from a [`ClockConfig`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    sysclk: u32,
    hclk: u32,
    pclk1: u32,
    pclk2: u32,
    apb1: ApbPrescaler,
    apb2: ApbPrescaler,
}

impl Clocks {
    pub fn compute(config: &ClockConfig) -> Result<Clocks, ClockError> {
        let sysclk = match config.source {
            ClockSource::Hsi => HSI_FREQ,
            ClockSource::Hse { freq_hz } => check_hse(freq_hz)?,
            ClockSource::Pll { input, m, n, p } => pll_output(input, m, n, p)?,
        };
        if sysclk > SYSCLK_MAX {
            return Err(ClockError::SysclkTooHigh { freq_hz: sysclk });
        }

        let hclk = sysclk / config.ahb.divisor();
        let pclk1 = hclk / config.apb1.divisor();
        let pclk2 = hclk / config.apb2.divisor();

        if pclk1 > PCLK1_MAX {
            return Err(ClockError::Pclk1TooHigh { freq_hz: pclk1 });
        }
        if pclk2 > PCLK2_MAX {
            return Err(ClockError::Pclk2TooHigh { freq_hz: pclk2 });
        }

        Ok(Clocks {
            sysclk,
            hclk,
            pclk1,
            pclk2,
            apb1: config.apb1,
            apb2: config.apb2,
        })
    }

    pub fn sysclk(&self) -> u32 {
        self.sysclk
    }

    pub fn hclk(&self) -> u32 {
        self.hclk
    }

    pub fn pclk1(&self) -> u32 {
        self.pclk1
    }

    pub fn pclk2(&self) -> u32 {
        self.pclk2
    }

    /// Clock delivered to peripherals on `bus`. All AHB buses run at HCLK.
    pub fn bus(&self, bus: Bus) -> u32 {
        match bus {
            Bus::Ahb1 | Bus::Ahb2 | Bus::Ahb3 => self.hclk,
            Bus::Apb1 => self.pclk1,
            Bus::Apb2 => self.pclk2,
        }
    }

    /// Counter clock of timers on `bus`: the APB clock when its prescaler
    /// is 1, twice the APB clock otherwise.
    pub fn timer_clock(&self, bus: Bus) -> u32 {
        let (pclk, prescaler) = match bus {
            Bus::Apb1 => (self.pclk1, self.apb1),
            Bus::Apb2 => (self.pclk2, self.apb2),
            Bus::Ahb1 | Bus::Ahb2 | Bus::Ahb3 => return self.hclk,
        };

        if prescaler == ApbPrescaler::Div1 {
            pclk
        } else {
            pclk * 2
        }
    }
}

fn check_hse(freq_hz: u32) -> Result<u32, ClockError> {
    if (HSE_MIN..=HSE_MAX).contains(&freq_hz) {
        Ok(freq_hz)
    } else {
        Err(ClockError::HseOutOfRange { freq_hz })
    }
}

fn pll_output(input: PllInput, m: u8, n: u16, p: PllP) -> Result<u32, ClockError> {
    if !(2..=63).contains(&m) || !(50..=432).contains(&n) {
        return Err(ClockError::PllDividerOutOfRange);
    }

    let input = match input {
        PllInput::Hsi => HSI_FREQ,
        PllInput::Hse { freq_hz } => check_hse(freq_hz)?,
    };

    let vco_in = input / u32::from(m);
    if !(VCO_INPUT_MIN..=VCO_INPUT_MAX).contains(&vco_in) {
        return Err(ClockError::VcoInputOutOfRange { freq_hz: vco_in });
    }

    // input * n overflows u32 for fast crystals
    let vco_out = u64::from(input) * u64::from(n) / u64::from(m);
    if !(u64::from(VCO_OUTPUT_MIN)..=u64::from(VCO_OUTPUT_MAX)).contains(&vco_out) {
        return Err(ClockError::VcoOutputOutOfRange {
            freq_hz: vco_out.min(u64::from(u32::MAX)) as u32,
        });
    }

    Ok(vco_out as u32 / p.divisor())
}

/// Sets `mask` in `reg` and reads the register back. The returned word is
/// the read-back value.
fn enable_with_read_back(reg: &RW<u32>, mask: u32) -> u32 {
    reg.set_flag(mask);
    reg.get()
}

/// RCC driver and owner of the bus frequency state.
pub struct ClockController<'a> {
    rcc: &'a Rcc,
    config: ClockConfig,
    clocks: Clocks,
}

impl<'a> ClockController<'a> {
    /// Derives the bus frequencies from `config` and programs the AHB and
    /// APB prescalers to match.
    pub fn new(rcc: &'a Rcc, config: ClockConfig) -> Result<ClockController<'a>, ClockError> {
        let clocks = Clocks::compute(&config)?;
        let controller = ClockController {
            rcc,
            config,
            clocks,
        };
        controller.program_prescalers();

        info!(
            "rcc: sysclk={=u32} hclk={=u32} pclk1={=u32} pclk2={=u32}",
            clocks.sysclk,
            clocks.hclk,
            clocks.pclk1,
            clocks.pclk2
        );
        Ok(controller)
    }

    /// Replaces the bus frequency state after the clock tree changed. On
    /// error the previous state stays in effect.
    pub fn reconfigure(&mut self, config: ClockConfig) -> Result<(), ClockError> {
        let clocks = Clocks::compute(&config)?;
        self.config = config;
        self.clocks = clocks;
        self.program_prescalers();

        info!(
            "rcc: reconfigured sysclk={=u32} pclk1={=u32} pclk2={=u32}",
            clocks.sysclk,
            clocks.pclk1,
            clocks.pclk2
        );
        Ok(())
    }

    fn program_prescalers(&self) {
        let mask = cfgr::HPRE.mask() | cfgr::PPRE1.mask() | cfgr::PPRE2.mask();
        let value = cfgr::HPRE.encode(self.config.ahb.bits())
            | cfgr::PPRE1.encode(self.config.apb1.bits())
            | cfgr::PPRE2.encode(self.config.apb2.bits());
        self.rcc.cfgr.update_with_mask(mask, value);
    }

    /// Gates the clock of `peripheral` on. Returns only after the enable
    /// register has been read back, so the peripheral's registers may be
    /// written immediately afterwards. Enabling twice is harmless.
    pub fn enable_peripheral_clock(&self, peripheral: Peripheral) {
        let record = peripheral.clock_enable();
        let reg = self.rcc.enable_register(record.bus);

        let read_back = enable_with_read_back(reg, record.mask());
        debug_assert!(
            read_back & record.mask() != 0,
            "clock enable did not stick"
        );

        trace!("rcc: enabled {}", peripheral);
    }

    /// Gates the clock of `peripheral` off. The caller makes sure the
    /// peripheral is idle.
    pub fn disable_peripheral_clock(&self, peripheral: Peripheral) {
        let record = peripheral.clock_enable();
        self.rcc.enable_register(record.bus).clear_flag(record.mask());

        trace!("rcc: disabled {}", peripheral);
    }

    /// Pulses the peripheral's reset line, returning its registers to
    /// their reset values.
    pub fn reset_peripheral(&self, peripheral: Peripheral) {
        let record = peripheral.clock_enable();
        let reg = self.rcc.reset_register(record.bus);
        reg.set_flag(record.mask());
        reg.clear_flag(record.mask());
    }

    pub fn is_enabled(&self, peripheral: Peripheral) -> bool {
        let record = peripheral.clock_enable();
        self.rcc.enable_register(record.bus).is_set(record.mask())
    }

    /// Current frequency of `bus` in Hz.
    pub fn bus_frequency(&self, bus: Bus) -> u32 {
        self.clocks.bus(bus)
    }

    /// Current counter clock of timers on `bus` in Hz.
    pub fn timer_clock(&self, bus: Bus) -> u32 {
        self.clocks.timer_clock(bus)
    }

    pub fn clocks(&self) -> Clocks {
        self.clocks
    }

    pub fn config(&self) -> ClockConfig {
        self.config
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// 8 MHz crystal to 168 MHz, APB1 at 42 MHz, APB2 at 84 MHz.
    fn pll_168mhz() -> ClockConfig {
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
    fn test_hsi_reset_clocks() {
        let clocks = Clocks::compute(&ClockConfig::default()).unwrap();
        assert_eq!(16_000_000, clocks.sysclk());
        assert_eq!(16_000_000, clocks.bus(Bus::Apb1));
        assert_eq!(16_000_000, clocks.bus(Bus::Apb2));
        assert_eq!(16_000_000, clocks.timer_clock(Bus::Apb1));
    }

    #[test]
    fn test_pll_clocks() {
        let clocks = Clocks::compute(&pll_168mhz()).unwrap();
        assert_eq!(168_000_000, clocks.sysclk());
        assert_eq!(168_000_000, clocks.hclk());
        assert_eq!(42_000_000, clocks.pclk1());
        assert_eq!(84_000_000, clocks.pclk2());
        assert_eq!(84_000_000, clocks.timer_clock(Bus::Apb1));
        assert_eq!(168_000_000, clocks.timer_clock(Bus::Apb2));
    }

    #[test]
    fn test_pllcfgr_word() {
        assert_eq!(
            Some(8 | 336 << 6 | 1 << 22 | 4 << 24),
            pll_168mhz().pllcfgr()
        );
        assert_eq!(None, ClockConfig::default().pllcfgr());
    }

    #[test]
    fn test_invalid_configs() {
        let too_fast = ClockConfig::new(ClockSource::Pll {
            input: PllInput::Hsi,
            m: 8,
            n: 200,
            p: PllP::Div2,
        });
        assert_eq!(
            Err(ClockError::SysclkTooHigh { freq_hz: 200_000_000 }),
            Clocks::compute(&too_fast.apb1(ApbPrescaler::Div16).apb2(ApbPrescaler::Div16))
        );

        let apb1_too_fast = pll_168mhz().apb1(ApbPrescaler::Div2);
        assert_eq!(
            Err(ClockError::Pclk1TooHigh { freq_hz: 84_000_000 }),
            Clocks::compute(&apb1_too_fast)
        );

        let bad_m = ClockConfig::new(ClockSource::Pll {
            input: PllInput::Hsi,
            m: 1,
            n: 200,
            p: PllP::Div2,
        });
        assert_eq!(Err(ClockError::PllDividerOutOfRange), Clocks::compute(&bad_m));

        let bad_vco_in = ClockConfig::new(ClockSource::Pll {
            input: PllInput::Hsi,
            m: 4,
            n: 100,
            p: PllP::Div4,
        });
        assert_eq!(
            Err(ClockError::VcoInputOutOfRange { freq_hz: 4_000_000 }),
            Clocks::compute(&bad_vco_in)
        );

        let bad_hse = ClockConfig::new(ClockSource::Hse { freq_hz: 32_000_000 });
        assert_eq!(
            Err(ClockError::HseOutOfRange { freq_hz: 32_000_000 }),
            Clocks::compute(&bad_hse)
        );
    }

    #[test]
    fn test_new_programs_prescalers() {
        let rcc = Rcc::default();
        // unrelated CFGR bits (SW = PLL) must survive
        rcc.cfgr.set(0b10);

        let _controller = ClockController::new(&rcc, pll_168mhz()).unwrap();

        assert_eq!(0b10, rcc.cfgr.read_field(cfgr::SW));
        assert_eq!(0b0000, rcc.cfgr.read_field(cfgr::HPRE));
        assert_eq!(0b101, rcc.prescaler(cfgr::PPRE1));
        assert_eq!(0b100, rcc.prescaler(cfgr::PPRE2));
    }

    #[test]
    fn test_enable_read_back_sees_bit() {
        let rcc = Rcc::default();
        let read_back = enable_with_read_back(&rcc.apb1enr, 1 << 17);
        assert_eq!(1 << 17, read_back & (1 << 17));
    }

    #[test]
    fn test_enable_and_disable_peripheral_clock() {
        let rcc = Rcc::default();
        rcc.apb1enr.set(1 << 28);
        let controller = ClockController::new(&rcc, ClockConfig::default()).unwrap();

        controller.enable_peripheral_clock(Peripheral::Usart2);
        assert_eq!(1 << 28 | 1 << 17, rcc.apb1enr.get());
        assert!(controller.is_enabled(Peripheral::Usart2));

        // idempotent
        controller.enable_peripheral_clock(Peripheral::Usart2);
        assert_eq!(1 << 28 | 1 << 17, rcc.apb1enr.get());

        controller.enable_peripheral_clock(Peripheral::Tim1);
        assert_eq!(1, rcc.apb2enr.get());

        controller.disable_peripheral_clock(Peripheral::Usart2);
        assert_eq!(1 << 28, rcc.apb1enr.get());
        assert!(!controller.is_enabled(Peripheral::Usart2));
    }

    #[test]
    fn test_reset_peripheral_releases_reset() {
        let rcc = Rcc::default();
        let controller = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        controller.reset_peripheral(Peripheral::Usart1);
        assert_eq!(0, rcc.apb2rstr.get());
    }

    #[test]
    fn test_reconfigure_replaces_state() {
        let rcc = Rcc::default();
        let mut controller = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        assert_eq!(16_000_000, controller.bus_frequency(Bus::Apb1));

        controller.reconfigure(pll_168mhz()).unwrap();
        assert_eq!(42_000_000, controller.bus_frequency(Bus::Apb1));
        assert_eq!(84_000_000, controller.bus_frequency(Bus::Apb2));
        assert_eq!(84_000_000, controller.timer_clock(Bus::Apb1));
        assert_eq!(0b101, rcc.cfgr.read_field(cfgr::PPRE1));

        // rejected config keeps the old state
        let bad = pll_168mhz().apb2(ApbPrescaler::Div1);
        assert_eq!(
            Err(ClockError::Pclk2TooHigh { freq_hz: 168_000_000 }),
            controller.reconfigure(bad)
        );
        assert_eq!(84_000_000, controller.bus_frequency(Bus::Apb2));
        assert_eq!(pll_168mhz(), controller.config());
    }
}
