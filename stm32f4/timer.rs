//! Timer registers (TIM1-TIM14).
//!
//! All timers share one block layout. Registers a given timer lacks
//! (RCR and BDTR outside TIM1/TIM8, OR outside TIM2/TIM5/TIM11) read as
//! reserved.

use crate::rcc::{Bus, Peripheral};
use crate::volatile::{Field, RW};
use crate::Periph;

pub const TIM1: Periph<Tim, 0x4001_0000> = unsafe { Periph::new() };
pub const TIM2: Periph<Tim, 0x4000_0000> = unsafe { Periph::new() };
pub const TIM3: Periph<Tim, 0x4000_0400> = unsafe { Periph::new() };
pub const TIM4: Periph<Tim, 0x4000_0800> = unsafe { Periph::new() };
pub const TIM5: Periph<Tim, 0x4000_0C00> = unsafe { Periph::new() };
pub const TIM6: Periph<Tim, 0x4000_1000> = unsafe { Periph::new() };
pub const TIM7: Periph<Tim, 0x4000_1400> = unsafe { Periph::new() };
pub const TIM8: Periph<Tim, 0x4001_0400> = unsafe { Periph::new() };
pub const TIM9: Periph<Tim, 0x4001_4000> = unsafe { Periph::new() };
pub const TIM10: Periph<Tim, 0x4001_4400> = unsafe { Periph::new() };
pub const TIM11: Periph<Tim, 0x4001_4800> = unsafe { Periph::new() };
pub const TIM12: Periph<Tim, 0x4000_1800> = unsafe { Periph::new() };
pub const TIM13: Periph<Tim, 0x4000_1C00> = unsafe { Periph::new() };
pub const TIM14: Periph<Tim, 0x4000_2000> = unsafe { Periph::new() };

#[repr(C)]
#[derive(Default)]
pub struct Tim {
    pub cr1:   RW<u32>, // 0x00
    pub cr2:   RW<u32>, // 0x04
    pub smcr:  RW<u32>, // 0x08
    pub dier:  RW<u32>, // 0x0C
    pub sr:    RW<u32>, // 0x10
    pub egr:   RW<u32>, // 0x14
    pub ccmr1: RW<u32>, // 0x18
    pub ccmr2: RW<u32>, // 0x1C
    pub ccer:  RW<u32>, // 0x20
    pub cnt:   RW<u32>, // 0x24
    pub psc:   RW<u32>, // 0x28
    pub arr:   RW<u32>, // 0x2C
    pub rcr:   RW<u32>, // 0x30
    pub ccr1:  RW<u32>, // 0x34
    pub ccr2:  RW<u32>, // 0x38
    pub ccr3:  RW<u32>, // 0x3C
    pub ccr4:  RW<u32>, // 0x40
    pub bdtr:  RW<u32>, // 0x44
    pub dcr:   RW<u32>, // 0x48
    pub dmar:  RW<u32>, // 0x4C
    /// Unique to TIM2, TIM5 and TIM11
    pub or:    RW<u32>, // 0x50
}

#[test]
fn test_register_size() {
    assert_eq!(0x54, ::core::mem::size_of::<Tim>());
}

#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Cr1 {
    CEN  = 1 << 0,
    UDIS = 1 << 1,
    URS  = 1 << 2,
    OPM  = 1 << 3,
    DIR  = 1 << 4,
    ARPE = 1 << 7,
}

pub mod cr1 {
    use crate::volatile::Field;

    /// Center-aligned mode selection. 0 is edge-aligned.
    pub const CMS: Field = Field::new(2, 5);
    /// Clock division.
    pub const CKD: Field = Field::new(2, 8);
}

#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Egr {
    UG   = 1 << 0,
    CC1G = 1 << 1,
    CC2G = 1 << 2,
    CC3G = 1 << 3,
    CC4G = 1 << 4,
    TG   = 1 << 6,
}

#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Sr {
    UIF   = 1 << 0,
    CC1IF = 1 << 1,
    CC2IF = 1 << 2,
    CC3IF = 1 << 3,
    CC4IF = 1 << 4,
    TIF   = 1 << 6,
}

#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Bdtr {
    /// Main output enable (advanced timers).
    MOE = 1 << 15,
}

/// Output compare mode, OCxM encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum OutputCompareMode {
    Frozen        = 0b000,
    ActiveOnMatch = 0b001,
    InactiveOnMatch = 0b010,
    Toggle        = 0b011,
    ForceInactive = 0b100,
    ForceActive   = 0b101,
    /// Active while CNT < CCRx when counting up.
    PwmMode1      = 0b110,
    PwmMode2      = 0b111,
}

/// Bit-fields of one capture/compare channel in its CCMRx register and
/// in CCER.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelFields {
    /// Capture/compare selection, 0 is output.
    pub ccs: Field,
    /// Output compare preload enable.
    pub ocpe: Field,
    /// Output compare mode.
    pub ocm: Field,
    /// Capture/compare output enable in CCER.
    pub cce: Field,
    /// Capture/compare output polarity in CCER.
    pub ccp: Field,
}

/// `index` is the zero-based channel number (0 for CH1).
pub const fn channel_fields(index: u8) -> ChannelFields {
    // CH1/CH3 use the low byte of CCMR1/CCMR2, CH2/CH4 the high byte.
    let base = (index % 2) * 8;
    ChannelFields {
        ccs: Field::new(2, base),
        ocpe: Field::new(1, base + 3),
        ocm: Field::new(3, base + 4),
        cce: Field::new(1, index * 4),
        ccp: Field::new(1, index * 4 + 1),
    }
}

/// Counter width of a timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterWidth {
    Bits16,
    Bits32,
}

impl CounterWidth {
    pub const fn max(self) -> u32 {
        match self {
            CounterWidth::Bits16 => u16::MAX as u32,
            CounterWidth::Bits32 => u32::MAX,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
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
}

impl TimerId {
    pub const fn address(self) -> usize {
        use self::TimerId::*;
        match self {
            Tim1  => 0x4001_0000,
            Tim2  => 0x4000_0000,
            Tim3  => 0x4000_0400,
            Tim4  => 0x4000_0800,
            Tim5  => 0x4000_0C00,
            Tim6  => 0x4000_1000,
            Tim7  => 0x4000_1400,
            Tim8  => 0x4001_0400,
            Tim9  => 0x4001_4000,
            Tim10 => 0x4001_4400,
            Tim11 => 0x4001_4800,
            Tim12 => 0x4000_1800,
            Tim13 => 0x4000_1C00,
            Tim14 => 0x4000_2000,
        }
    }

    pub const fn peripheral(self) -> Peripheral {
        use self::TimerId::*;
        match self {
            Tim1  => Peripheral::Tim1,
            Tim2  => Peripheral::Tim2,
            Tim3  => Peripheral::Tim3,
            Tim4  => Peripheral::Tim4,
            Tim5  => Peripheral::Tim5,
            Tim6  => Peripheral::Tim6,
            Tim7  => Peripheral::Tim7,
            Tim8  => Peripheral::Tim8,
            Tim9  => Peripheral::Tim9,
            Tim10 => Peripheral::Tim10,
            Tim11 => Peripheral::Tim11,
            Tim12 => Peripheral::Tim12,
            Tim13 => Peripheral::Tim13,
            Tim14 => Peripheral::Tim14,
        }
    }

    pub const fn bus(self) -> Bus {
        self.peripheral().bus()
    }

    pub const fn width(self) -> CounterWidth {
        match self {
            TimerId::Tim2 | TimerId::Tim5 => CounterWidth::Bits32,
            _ => CounterWidth::Bits16,
        }
    }

    /// Number of capture/compare channels. Basic timers have none.
    pub const fn channels(self) -> u8 {
        use self::TimerId::*;
        match self {
            Tim1 | Tim2 | Tim3 | Tim4 | Tim5 | Tim8 => 4,
            Tim9 | Tim12 => 2,
            Tim10 | Tim11 | Tim13 | Tim14 => 1,
            Tim6 | Tim7 => 0,
        }
    }

    /// TIM1 and TIM8 gate their outputs behind BDTR.MOE.
    pub const fn is_advanced(self) -> bool {
        matches!(self, TimerId::Tim1 | TimerId::Tim8)
    }

    /// GPIO alternate function routing the timer's channels to pins.
    pub const fn alternate_function(self) -> u8 {
        use self::TimerId::*;
        match self {
            Tim1 | Tim2 => 1,
            Tim3 | Tim4 | Tim5 => 2,
            Tim8 | Tim9 | Tim10 | Tim11 => 3,
            Tim12 | Tim13 | Tim14 => 9,
            // No channels to route.
            Tim6 | Tim7 => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_fields() {
        let ch1 = channel_fields(0);
        assert_eq!(0x7 << 4, ch1.ocm.mask());
        assert_eq!(1 << 3, ch1.ocpe.mask());
        assert_eq!(1 << 0, ch1.cce.mask());

        let ch2 = channel_fields(1);
        assert_eq!(0x7 << 12, ch2.ocm.mask());
        assert_eq!(1 << 11, ch2.ocpe.mask());
        assert_eq!(1 << 4, ch2.cce.mask());
        assert_eq!(1 << 5, ch2.ccp.mask());

        let ch4 = channel_fields(3);
        assert_eq!(0x7 << 12, ch4.ocm.mask());
        assert_eq!(1 << 12, ch4.cce.mask());
    }

    #[test]
    fn test_addresses_match_views() {
        assert_eq!(TimerId::Tim1.address(), Periph::<Tim, 0x4001_0000>::ADDRESS);
        assert_eq!(TimerId::Tim14.address(), Periph::<Tim, 0x4000_2000>::ADDRESS);
    }

    #[test]
    fn test_timer_properties() {
        assert_eq!(CounterWidth::Bits32, TimerId::Tim2.width());
        assert_eq!(CounterWidth::Bits16, TimerId::Tim3.width());
        assert_eq!(Bus::Apb2, TimerId::Tim1.bus());
        assert_eq!(Bus::Apb1, TimerId::Tim4.bus());
        assert_eq!(0, TimerId::Tim6.channels());
        assert!(TimerId::Tim8.is_advanced());
    }
}
