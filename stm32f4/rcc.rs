//! Reset and clock control.

use crate::volatile::{Field, RES, RW};
use crate::Periph;

pub type RccPeriph = Periph<Rcc, 0x4002_3800>;

pub const RCC: RccPeriph = unsafe { Periph::new() };

#[repr(C)]
#[derive(Default)]
pub struct Rcc {
    pub cr:          RW<u32>,  // 0x00
    pub pllcfgr:     RW<u32>,  // 0x04
    pub cfgr:        RW<u32>,  // 0x08
    pub cir:         RW<u32>,  // 0x0C
    pub ahb1rstr:    RW<u32>,  // 0x10
    pub ahb2rstr:    RW<u32>,  // 0x14
    pub ahb3rstr:    RW<u32>,  // 0x18
    _0:              RES<u32>, // 0x1C
    pub apb1rstr:    RW<u32>,  // 0x20
    pub apb2rstr:    RW<u32>,  // 0x24
    _1:              RES<u32>, // 0x28
    _2:              RES<u32>, // 0x2C
    pub ahb1enr:     RW<u32>,  // 0x30
    pub ahb2enr:     RW<u32>,  // 0x34
    pub ahb3enr:     RW<u32>,  // 0x38
    _3:              RES<u32>, // 0x3C
    pub apb1enr:     RW<u32>,  // 0x40
    pub apb2enr:     RW<u32>,  // 0x44
    _4:              RES<u32>, // 0x48
    _5:              RES<u32>, // 0x4C
    pub ahb1lpenr:   RW<u32>,  // 0x50
    pub ahb2lpenr:   RW<u32>,  // 0x54
    pub ahb3lpenr:   RW<u32>,  // 0x58
    _6:              RES<u32>, // 0x5C
    pub apb1lpenr:   RW<u32>,  // 0x60
    pub apb2lpenr:   RW<u32>,  // 0x64
    _7:              RES<u32>, // 0x68
    _8:              RES<u32>, // 0x6C
    pub bdcr:        RW<u32>,  // 0x70
    pub csr:         RW<u32>,  // 0x74
    _9:              RES<u32>, // 0x78
    _10:             RES<u32>, // 0x7C
    pub sscgr:       RW<u32>,  // 0x80
    pub plli2scfgr:  RW<u32>,  // 0x84
    pub pllsaicfgr:  RW<u32>,  // 0x88
    pub dckcfgr:     RW<u32>,  // 0x8C
    pub ckgatenr:    RW<u32>,  // 0x90
    pub dckcfgr2:    RW<u32>,  // 0x94
}

#[test]
fn test_register_size() {
    assert_eq!(0x98, ::core::mem::size_of::<Rcc>());
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Cr {
    HSION  = 1 << 0,
    HSIRDY = 1 << 1,
    HSEON  = 1 << 16,
    HSERDY = 1 << 17,
    HSEBYP = 1 << 18,
    CSSON  = 1 << 19,
    PLLON  = 1 << 24,
    PLLRDY = 1 << 25,
}

pub mod pllcfgr {
    use crate::volatile::Field;

    pub const PLLM: Field = Field::new(6, 0);
    pub const PLLN: Field = Field::new(9, 6);
    pub const PLLP: Field = Field::new(2, 16);
    /// 0: HSI, 1: HSE.
    pub const PLLSRC: Field = Field::new(1, 22);
    pub const PLLQ: Field = Field::new(4, 24);
}

pub mod cfgr {
    use crate::volatile::Field;

    /// System clock switch.
    pub const SW: Field = Field::new(2, 0);
    /// System clock switch status.
    pub const SWS: Field = Field::new(2, 2);
    /// AHB prescaler.
    pub const HPRE: Field = Field::new(4, 4);
    /// APB1 (low-speed) prescaler.
    pub const PPRE1: Field = Field::new(3, 10);
    /// APB2 (high-speed) prescaler.
    pub const PPRE2: Field = Field::new(3, 13);
}

/// Bus a peripheral hangs off.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bus {
    Ahb1,
    Ahb2,
    Ahb3,
    Apb1,
    Apb2,
}

/// Where a peripheral's clock gate lives: the bus selects the RCC enable
/// (and reset) register, `bit` the position inside it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockEnable {
    pub bus: Bus,
    pub bit: u8,
}

impl ClockEnable {
    pub const fn mask(self) -> u32 {
        1 << self.bit
    }
}

/// Peripherals whose clock the drivers gate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Peripheral {
    GpioA,
    GpioB,
    GpioC,
    GpioD,
    GpioE,
    GpioF,
    GpioG,
    GpioH,
    Tim1,
    Tim2,
    Tim3,
    Tim4,
    Tim5,
    Tim6,
    Tim7,
    Tim8,
    Tim9,
    Tim10,
    Tim11,
    Tim12,
    Tim13,
    Tim14,
    Usart1,
    Usart2,
    Usart3,
    Uart4,
    Uart5,
    Usart6,
    Syscfg,
    Pwr,
}

impl Peripheral {
    /// Clock enable record. Bit positions are shared by the matching
    /// `*RSTR` reset register.
    pub const fn clock_enable(self) -> ClockEnable {
        use self::Bus::*;
        use self::Peripheral::*;

        let (bus, bit) = match self {
            GpioA  => (Ahb1, 0),
            GpioB  => (Ahb1, 1),
            GpioC  => (Ahb1, 2),
            GpioD  => (Ahb1, 3),
            GpioE  => (Ahb1, 4),
            GpioF  => (Ahb1, 5),
            GpioG  => (Ahb1, 6),
            GpioH  => (Ahb1, 7),
            Tim2   => (Apb1, 0),
            Tim3   => (Apb1, 1),
            Tim4   => (Apb1, 2),
            Tim5   => (Apb1, 3),
            Tim6   => (Apb1, 4),
            Tim7   => (Apb1, 5),
            Tim12  => (Apb1, 6),
            Tim13  => (Apb1, 7),
            Tim14  => (Apb1, 8),
            Usart2 => (Apb1, 17),
            Usart3 => (Apb1, 18),
            Uart4  => (Apb1, 19),
            Uart5  => (Apb1, 20),
            Pwr    => (Apb1, 28),
            Tim1   => (Apb2, 0),
            Tim8   => (Apb2, 1),
            Usart1 => (Apb2, 4),
            Usart6 => (Apb2, 5),
            Syscfg => (Apb2, 14),
            Tim9   => (Apb2, 16),
            Tim10  => (Apb2, 17),
            Tim11  => (Apb2, 18),
        };

        ClockEnable { bus, bit }
    }

    pub const fn bus(self) -> Bus {
        self.clock_enable().bus
    }
}

impl Rcc {
    /// Peripheral clock enable register for `bus`.
    pub fn enable_register(&self, bus: Bus) -> &RW<u32> {
        match bus {
            Bus::Ahb1 => &self.ahb1enr,
            Bus::Ahb2 => &self.ahb2enr,
            Bus::Ahb3 => &self.ahb3enr,
            Bus::Apb1 => &self.apb1enr,
            Bus::Apb2 => &self.apb2enr,
        }
    }

    /// Peripheral reset register for `bus`.
    pub fn reset_register(&self, bus: Bus) -> &RW<u32> {
        match bus {
            Bus::Ahb1 => &self.ahb1rstr,
            Bus::Ahb2 => &self.ahb2rstr,
            Bus::Ahb3 => &self.ahb3rstr,
            Bus::Apb1 => &self.apb1rstr,
            Bus::Apb2 => &self.apb2rstr,
        }
    }

    pub fn prescaler(&self, field: Field) -> u32 {
        self.cfgr.read_field(field)
    }
}
