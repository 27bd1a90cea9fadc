//! Universal Synchronous Asynchronous Receiver Transmitter registers.

use crate::rcc::{Bus, Peripheral};
use crate::volatile::RW;
use crate::Periph;

pub const USART1: Periph<Usart, 0x4001_1000> = unsafe { Periph::new() };
pub const USART2: Periph<Usart, 0x4000_4400> = unsafe { Periph::new() };
pub const USART3: Periph<Usart, 0x4000_4800> = unsafe { Periph::new() };
pub const UART4: Periph<Usart, 0x4000_4C00> = unsafe { Periph::new() };
pub const UART5: Periph<Usart, 0x4000_5000> = unsafe { Periph::new() };
pub const USART6: Periph<Usart, 0x4001_1400> = unsafe { Periph::new() };

#[repr(C)]
#[derive(Default)]
pub struct Usart {
    pub sr:   RW<u32>, // 0x00
    pub dr:   RW<u32>, // 0x04
    pub brr:  RW<u32>, // 0x08
    pub cr1:  RW<u32>, // 0x0C
    pub cr2:  RW<u32>, // 0x10
    pub cr3:  RW<u32>, // 0x14
    pub gtpr: RW<u32>, // 0x18
}

#[test]
fn test_register_size() {
    assert_eq!(0x1C, ::core::mem::size_of::<Usart>());
}

#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Sr {
    /// Parity error.
    PE   = 1 << 0,
    /// Framing error.
    FE   = 1 << 1,
    /// Noise detected.
    NF   = 1 << 2,
    /// Overrun error.
    ORE  = 1 << 3,
    IDLE = 1 << 4,
    /// Read data register not empty.
    RXNE = 1 << 5,
    /// Transmission complete.
    TC   = 1 << 6,
    /// Transmit data register empty.
    TXE  = 1 << 7,
    LBD  = 1 << 8,
    CTS  = 1 << 9,
}

/// PE, FE, NF and ORE. Cleared by reading SR followed by DR.
pub const SR_ERRORS: u32 = Sr::PE as u32 | Sr::FE as u32 | Sr::NF as u32 | Sr::ORE as u32;

pub mod brr {
    use crate::volatile::Field;

    /// With OVER8 set only the low three bits are used and bit 3 must
    /// stay clear.
    pub const DIV_FRACTION: Field = Field::new(4, 0);
    pub const DIV_MANTISSA: Field = Field::new(12, 4);
}

#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Cr1 {
    SBK    = 1 << 0,
    RWU    = 1 << 1,
    RE     = 1 << 2,
    TE     = 1 << 3,
    IDLEIE = 1 << 4,
    RXNEIE = 1 << 5,
    TCIE   = 1 << 6,
    TXEIE  = 1 << 7,
    PEIE   = 1 << 8,
    /// Odd parity when set.
    PS     = 1 << 9,
    PCE    = 1 << 10,
    WAKE   = 1 << 11,
    /// 9 data bits when set.
    M      = 1 << 12,
    /// USART Enable
    UE     = 1 << 13,
    OVER8  = 1 << 15,
}

pub mod cr2 {
    use crate::volatile::Field;

    pub const STOP: Field = Field::new(2, 12);
}

#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Cr3 {
    EIE    = 1 << 0,
    IREN   = 1 << 1,
    IRLP   = 1 << 2,
    HDSEL  = 1 << 3,
    NACK   = 1 << 4,
    SCEN   = 1 << 5,
    DMAR   = 1 << 6,
    DMAT   = 1 << 7,
    RTSE   = 1 << 8,
    CTSE   = 1 << 9,
    CTSIE  = 1 << 10,
    ONEBIT = 1 << 11,
}

/// Everything in CR3 this layer leaves at reset: flow control, DMA,
/// smartcard and IrDA.
pub const CR3_RESET_MASK: u32 = 0x0FFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsartId {
    Usart1,
    Usart2,
    Usart3,
    Uart4,
    Uart5,
    Usart6,
}

impl UsartId {
    pub const fn address(self) -> usize {
        match self {
            UsartId::Usart1 => 0x4001_1000,
            UsartId::Usart2 => 0x4000_4400,
            UsartId::Usart3 => 0x4000_4800,
            UsartId::Uart4  => 0x4000_4C00,
            UsartId::Uart5  => 0x4000_5000,
            UsartId::Usart6 => 0x4001_1400,
        }
    }

    pub const fn peripheral(self) -> Peripheral {
        match self {
            UsartId::Usart1 => Peripheral::Usart1,
            UsartId::Usart2 => Peripheral::Usart2,
            UsartId::Usart3 => Peripheral::Usart3,
            UsartId::Uart4  => Peripheral::Uart4,
            UsartId::Uart5  => Peripheral::Uart5,
            UsartId::Usart6 => Peripheral::Usart6,
        }
    }

    pub const fn bus(self) -> Bus {
        self.peripheral().bus()
    }

    /// GPIO alternate function routing TX/RX to pins.
    pub const fn alternate_function(self) -> u8 {
        match self {
            UsartId::Usart1 | UsartId::Usart2 | UsartId::Usart3 => 7,
            UsartId::Uart4 | UsartId::Uart5 | UsartId::Usart6 => 8,
        }
    }
}
