//! Cortex-M4 system timer.

use crate::volatile::{RO, RW};
use crate::Periph;

pub const SYST: Periph<SysTick, 0xE000_E010> = unsafe { Periph::new() };

#[repr(C)]
#[derive(Default)]
pub struct SysTick {
    pub ctrl:  RW<u32>, // 0x00
    pub load:  RW<u32>, // 0x04
    pub val:   RW<u32>, // 0x08
    pub calib: RO<u32>, // 0x0C
}

#[test]
fn test_register_size() {
    assert_eq!(0x10, ::core::mem::size_of::<SysTick>());
}

#[derive(Copy, Clone)]
#[repr(u32)]
pub enum Ctrl {
    ENABLE    = 1 << 0,
    TICKINT   = 1 << 1,
    /// Processor clock (HCLK) when set, HCLK/8 otherwise.
    CLKSOURCE = 1 << 2,
    /// Set when the counter reached zero. Cleared on read.
    COUNTFLAG = 1 << 16,
}

/// LOAD is 24 bits wide.
pub const RELOAD_MAX: u32 = 0x00FF_FFFF;
