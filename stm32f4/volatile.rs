//! Volatile register cells.
//!
//! Every register of a peripheral block is one of these cells. Multi-bit
//! fields are always written through a masked read-modify-write, so
//! neighbouring fields of the same register keep their values.

use core::cell::UnsafeCell;
use core::ptr;

/// Read-write register.
#[repr(transparent)]
pub struct RW<T: Copy>(UnsafeCell<T>);

/// Read-only register.
#[repr(transparent)]
pub struct RO<T: Copy>(UnsafeCell<T>);

/// Reserved word. Never accessed.
#[repr(transparent)]
pub struct RES<T: Copy>(UnsafeCell<T>);

impl<T: Copy> RW<T> {
    pub const fn new(value: T) -> RW<T> {
        RW(UnsafeCell::new(value))
    }

    #[inline]
    pub fn get(&self) -> T {
        unsafe { ptr::read_volatile(self.0.get()) }
    }

    #[inline]
    pub fn set(&self, value: T) {
        unsafe { ptr::write_volatile(self.0.get(), value) }
    }

    #[inline]
    pub fn update<F: FnOnce(T) -> T>(&self, f: F) {
        self.set(f(self.get()));
    }
}

impl RW<u32> {
    /// Replaces the bits selected by `mask` with the matching bits of
    /// `value`.
    #[inline]
    pub fn update_with_mask(&self, mask: u32, value: u32) {
        self.update(|x| (x & !mask) | (value & mask));
    }

    #[inline]
    pub fn set_flag(&self, flag: u32) {
        self.update(|x| x | flag);
    }

    #[inline]
    pub fn clear_flag(&self, flag: u32) {
        self.update(|x| x & !flag);
    }

    #[inline]
    pub fn is_set(&self, flag: u32) -> bool {
        self.get() & flag != 0
    }

    #[inline]
    pub fn read_field(&self, field: Field) -> u32 {
        field.extract(self.get())
    }

    #[inline]
    pub fn write_field(&self, field: Field, value: u32) {
        self.update_with_mask(field.mask(), field.encode(value));
    }
}

impl<T: Copy> RO<T> {
    pub const fn new(value: T) -> RO<T> {
        RO(UnsafeCell::new(value))
    }

    #[inline]
    pub fn get(&self) -> T {
        unsafe { ptr::read_volatile(self.0.get()) }
    }
}

impl<T: Copy> RES<T> {
    pub const fn new(value: T) -> RES<T> {
        RES(UnsafeCell::new(value))
    }
}

macro_rules! impl_default {
    ($($cell:ident),*) => {
        $(
            impl Default for $cell<u32> {
                fn default() -> Self {
                    $cell::new(0)
                }
            }
        )*
    };
}

impl_default!(RW, RO, RES);

/// A bit-field inside a 32-bit register, described by its width and the
/// position of its lowest bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Field {
    width: u8,
    shift: u8,
}

impl Field {
    pub const fn new(width: u8, shift: u8) -> Field {
        assert!(width > 0 && width as u32 + shift as u32 <= 32);
        Field { width, shift }
    }

    pub const fn width(self) -> u8 {
        self.width
    }

    pub const fn shift(self) -> u8 {
        self.shift
    }

    /// Mask of the field in register position.
    pub const fn mask(self) -> u32 {
        (u32::MAX >> (32 - self.width as u32)) << self.shift
    }

    /// Largest value the field can hold.
    pub const fn max(self) -> u32 {
        u32::MAX >> (32 - self.width as u32)
    }

    /// Moves `value` into register position. Bits above the field width
    /// are dropped.
    pub const fn encode(self, value: u32) -> u32 {
        (value << self.shift) & self.mask()
    }

    pub const fn extract(self, register: u32) -> u32 {
        (register & self.mask()) >> self.shift
    }
}
