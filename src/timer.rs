//! Timebase timers and the prescaler/reload arithmetic shared with
//! [`crate::pwm`].
//!
//! A timer's counter runs at `timer_clock / prescaler` and wraps after
//! `auto_reload` ticks, so its update rate is
//! `timer_clock / (prescaler * auto_reload)`. PSC and ARR hold these values
//! minus one.

use core::fmt;

use stm32f4::timer::{cr1, CounterWidth, Cr1, Egr, Sr, Tim, TimerId};

use crate::clock::ClockController;

/// Largest prescaler: PSC is 16 bits wide on every timer.
pub const PRESCALER_MAX: u32 = 1 << 16;

/// Relative error tolerated between the requested and the achieved update
/// rate, in percent.
pub const FREQUENCY_TOLERANCE_PERCENT: u64 = 1;

/// No prescaler/reload pair reaches `target_hz` within tolerance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrequencyOutOfRange {
    pub target_hz: u32,
}

impl fmt::Display for FrequencyOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer frequency {} Hz not achievable", self.target_hz)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// No prescaler/reload pair reaches `target_hz` within tolerance.
    FrequencyOutOfRange { target_hz: u32 },
    /// `wait` on a stopped counter would never return.
    NotRunning,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TimerError::FrequencyOutOfRange { target_hz } => {
                write!(f, "timer frequency {} Hz not achievable", target_hz)
            }
            TimerError::NotRunning => f.write_str("timer is not running"),
        }
    }
}

impl From<FrequencyOutOfRange> for TimerError {
    fn from(err: FrequencyOutOfRange) -> TimerError {
        TimerError::FrequencyOutOfRange {
            target_hz: err.target_hz,
        }
    }
}

/// Prescaler and period of a timer, both as divisors (not register values).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerTiming {
    /// `1..=65536`.
    pub prescaler: u32,
    /// Period in counter ticks, `2..=width.max()`.
    pub auto_reload: u32,
}

impl TimerTiming {
    /// Picks the smallest prescaler that lets the period fit the counter,
    /// then the period closest to the target.
    ///
    /// Fails if `target_hz` is zero, above half the timer clock, below what
    /// the largest prescaler reaches, or if the achieved rate is off by more
    /// than [`FREQUENCY_TOLERANCE_PERCENT`].
    pub fn compute(
        timer_clock: u32,
        target_hz: u32,
        width: CounterWidth,
    ) -> Result<TimerTiming, FrequencyOutOfRange> {
        let out_of_range = FrequencyOutOfRange { target_hz };
        if target_hz == 0 {
            return Err(out_of_range);
        }

        let clock = u64::from(timer_clock);
        let target = u64::from(target_hz);
        let max_period = u64::from(width.max());

        let ticks = (clock + target / 2) / target;
        if ticks < 2 {
            return Err(out_of_range);
        }

        let prescaler = (ticks + max_period - 1) / max_period;
        if prescaler > u64::from(PRESCALER_MAX) {
            return Err(out_of_range);
        }

        let auto_reload = (ticks + prescaler / 2) / prescaler;
        if auto_reload < 2 || auto_reload > max_period {
            return Err(out_of_range);
        }

        // |clock / (p * a) - target| <= target * tol / 100
        let divisor = prescaler * auto_reload;
        let achieved = target * divisor;
        if clock.abs_diff(achieved) * 100 > achieved * FREQUENCY_TOLERANCE_PERCENT {
            return Err(out_of_range);
        }

        Ok(TimerTiming {
            prescaler: prescaler as u32,
            auto_reload: auto_reload as u32,
        })
    }

    /// Timing currently programmed in PSC and ARR.
    pub fn from_registers(psc: u32, arr: u32) -> TimerTiming {
        TimerTiming {
            prescaler: psc.wrapping_add(1),
            auto_reload: arr.wrapping_add(1),
        }
    }

    /// Value for the PSC register. Inverse of [`TimerTiming::from_registers`]
    /// for every register value.
    pub fn psc(&self) -> u32 {
        self.prescaler.wrapping_sub(1)
    }

    /// Value for the ARR register.
    pub fn arr(&self) -> u32 {
        self.auto_reload.wrapping_sub(1)
    }

    /// Update rate in Hz for a counter clocked at `timer_clock`, rounded to
    /// nearest.
    pub fn frequency(&self, timer_clock: u32) -> u32 {
        // ARR = 0xFFFF_FFFF is a period of 2^32 ticks
        let prescaler = u64::from(self.psc()) + 1;
        let auto_reload = u64::from(self.arr()) + 1;
        match prescaler.checked_mul(auto_reload) {
            Some(divisor) => ((u64::from(timer_clock) + divisor / 2) / divisor) as u32,
            None => 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Up,
    Down,
}

/// Periodic timebase on any timer.
pub struct Timer<'a> {
    regs: &'a Tim,
    id: TimerId,
}

impl<'a> Timer<'a> {
    pub fn new(regs: &'a Tim, id: TimerId, clocks: &ClockController) -> Timer<'a> {
        clocks.enable_peripheral_clock(id.peripheral());
        Timer { regs, id }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Starts the counter so that it overflows `freq_hz` times per second.
    ///
    /// The timer clock is read from `clocks` on every call.
    pub fn start(
        &mut self,
        clocks: &ClockController,
        freq_hz: u32,
        direction: Direction,
    ) -> Result<(), TimerError> {
        debug_assert!(clocks.is_enabled(self.id.peripheral()));

        let timer_clock = clocks.timer_clock(self.id.bus());
        let timing = TimerTiming::compute(timer_clock, freq_hz, self.id.width())?;

        let dir = match direction {
            Direction::Up => 0,
            Direction::Down => Cr1::DIR as u32,
        };

        self.regs.cr1.clear_flag(Cr1::CEN as u32);
        self.regs.cr1.update_with_mask(Cr1::DIR as u32 | cr1::CMS.mask(), dir);
        self.regs.psc.set(timing.psc());
        self.regs.arr.set(timing.arr());
        self.regs.cnt.set(0);

        // Load PSC now instead of at the first overflow. The event also
        // raises UIF, which must not count as a period.
        self.regs.egr.set(Egr::UG as u32);
        self.regs.sr.set(!(Sr::UIF as u32));

        self.regs.cr1.set_flag(Cr1::CEN as u32);

        debug!(
            "tim: {} at {=u32} Hz psc={=u32} arr={=u32}",
            self.id,
            freq_hz,
            timing.psc(),
            timing.arr()
        );
        Ok(())
    }

    /// Blocks until the next counter overflow and acknowledges it.
    pub fn wait(&self) -> Result<(), TimerError> {
        if !self.is_running() {
            return Err(TimerError::NotRunning);
        }

        while !self.regs.sr.is_set(Sr::UIF as u32) {}
        // rc_w0: writing ones leaves the other flags alone
        self.regs.sr.set(!(Sr::UIF as u32));
        Ok(())
    }

    /// Stops the counter. PSC and ARR are kept.
    pub fn cancel(&mut self) {
        self.regs.cr1.clear_flag(Cr1::CEN as u32);
    }

    pub fn counter(&self) -> u32 {
        self.regs.cnt.get()
    }

    pub fn is_running(&self) -> bool {
        self.regs.cr1.is_set(Cr1::CEN as u32)
    }
}
