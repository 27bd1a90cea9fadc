//! STM32F4xx register map.
//!
//! Each peripheral is a `#[repr(C)]` block of [`volatile`] cells laid over
//! the vendor-documented base address. The blocks are reached through
//! zero-sized [`Periph`] views bound to constant addresses, so the address
//! is part of the type and nothing is allocated at runtime.
#![cfg_attr(target_os = "none", no_std)]

use core::marker::PhantomData;
use core::ops::Deref;

pub mod volatile;
pub mod rcc;
pub mod gpio;
pub mod timer;
pub mod usart;
pub mod systick;

/// Typed view of the register block `T` located at `ADDR`.
///
/// The view itself is zero-sized. Dereferencing it is only meaningful on
/// the target silicon.
pub struct Periph<T, const ADDR: usize> {
    _marker: PhantomData<*const T>,
}

impl<T, const ADDR: usize> Periph<T, ADDR> {
    pub const ADDRESS: usize = ADDR;

    /// # Safety
    ///
    /// `ADDR` must be the base address of a `T` block on the target and
    /// only one driver may own the returned view.
    pub const unsafe fn new() -> Periph<T, ADDR> {
        Periph {
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub const fn ptr() -> *const T {
        ADDR as *const T
    }
}

impl<T, const ADDR: usize> Deref for Periph<T, ADDR> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { &*Self::ptr() }
    }
}

#[test]
fn test_periph_is_zero_sized() {
    assert_eq!(0, ::core::mem::size_of::<rcc::RccPeriph>());
    assert_eq!(0x4002_3800, rcc::RccPeriph::ADDRESS);
}
