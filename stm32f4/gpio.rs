//! General-Purpose Input/Output registers.

use crate::rcc::Peripheral;
use crate::volatile::RW;
use crate::Periph;

pub const GPIOA: Periph<Gpio, 0x4002_0000> = unsafe { Periph::new() };
pub const GPIOB: Periph<Gpio, 0x4002_0400> = unsafe { Periph::new() };
pub const GPIOC: Periph<Gpio, 0x4002_0800> = unsafe { Periph::new() };
pub const GPIOD: Periph<Gpio, 0x4002_0C00> = unsafe { Periph::new() };
pub const GPIOE: Periph<Gpio, 0x4002_1000> = unsafe { Periph::new() };
pub const GPIOF: Periph<Gpio, 0x4002_1400> = unsafe { Periph::new() };
pub const GPIOG: Periph<Gpio, 0x4002_1800> = unsafe { Periph::new() };
pub const GPIOH: Periph<Gpio, 0x4002_1C00> = unsafe { Periph::new() };

#[repr(C)]
#[derive(Default)]
pub struct Gpio {
    pub moder:   RW<u32>, // 0x00
    pub otyper:  RW<u32>, // 0x04
    pub ospeedr: RW<u32>, // 0x08
    pub pupdr:   RW<u32>, // 0x0C
    pub idr:     RW<u32>, // 0x10
    pub odr:     RW<u32>, // 0x14
    pub bsrr:    RW<u32>, // 0x18 (reads as zero)
    pub lckr:    RW<u32>, // 0x1C
    pub afrl:    RW<u32>, // 0x20
    pub afrh:    RW<u32>, // 0x24
}

#[test]
fn test_register_size() {
    assert_eq!(0x28, ::core::mem::size_of::<Gpio>());
}

/// Number of pins per port.
pub const PINS_PER_PORT: u8 = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl Port {
    pub const fn address(self) -> usize {
        0x4002_0000 + 0x400 * self as usize
    }

    pub const fn peripheral(self) -> Peripheral {
        match self {
            Port::A => Peripheral::GpioA,
            Port::B => Peripheral::GpioB,
            Port::C => Peripheral::GpioC,
            Port::D => Peripheral::GpioD,
            Port::E => Peripheral::GpioE,
            Port::F => Peripheral::GpioF,
            Port::G => Peripheral::GpioG,
            Port::H => Peripheral::GpioH,
        }
    }
}

/// MODER encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Mode {
    Input     = 0x0,
    Output    = 0x1,
    Alternate = 0x2,
    Analog    = 0x3,
}

/// OTYPER encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum OutputType {
    PushPull  = 0x0,
    OpenDrain = 0x1,
}

/// OSPEEDR encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Speed {
    Low    = 0x0,
    Medium = 0x1,
    Fast   = 0x2,
    High   = 0x3,
}

/// PUPDR encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum Pull {
    None = 0x0,
    Up   = 0x1,
    Down = 0x2,
}

#[test]
fn test_port_addresses() {
    assert_eq!(Port::A.address(), Periph::<Gpio, 0x4002_0000>::ADDRESS);
    assert_eq!(Port::B.address(), Periph::<Gpio, 0x4002_0400>::ADDRESS);
    assert_eq!(Port::H.address(), Periph::<Gpio, 0x4002_1C00>::ADDRESS);
}
