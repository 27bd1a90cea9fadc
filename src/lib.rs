//! Polled drivers for STM32F4 peripherals.
//!
//! The register map lives in the [`stm32f4`] crate. This crate builds the
//! driver layer on top of it: clock gating and bus frequencies ([`clock`]),
//! pin routing ([`gpio`]), timebase and PWM timers ([`timer`], [`pwm`]),
//! UART ([`serial`]) and SysTick delays ([`delay`]).
//!
//! Drivers hold a reference to their register block and borrow the
//! [`clock::ClockController`] whenever they need a frequency. On the target
//! the block comes from a constant view such as [`stm32f4::usart::USART2`];
//! on a host any `Default` block in RAM works.
#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
mod log;

pub mod clock;
pub mod delay;
pub mod gpio;
pub mod pwm;
pub mod serial;
pub mod timer;

pub use stm32f4;
