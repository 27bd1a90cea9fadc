//! Edge-aligned PWM on the channels of one timer.
//!
//! A [`Pwm`] owns the whole timer: prescaler, period and counter are shared
//! by all of its channels, each of which only carries a duty cycle and an
//! output enable.
//!
//! ```text
//! Unconfigured --configure--> Configured --start--> Running
//!                                 ^                  |  ^
//!                                 |                stop start
//!                                 +--configure-- Stopped
//! ```
//!
//! The output is active while the counter is below the compare value
//! (PWM mode 1, counting up). Compare values equal to the period keep the
//! output active for the whole period.

use core::fmt;

use stm32f4::timer::{channel_fields, cr1, Bdtr, Cr1, Egr, OutputCompareMode, Tim, TimerId};
use stm32f4::volatile::RW;

use crate::clock::ClockController;
use crate::gpio::{GpioPort, PinConfig};
use crate::timer::{FrequencyOutOfRange, TimerTiming};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmError {
    /// No prescaler/reload pair reaches `target_hz` within tolerance.
    FrequencyOutOfRange { target_hz: u32 },
    /// Duty cycle above 100 percent.
    DutyCycleOutOfRange { percent: u8 },
    /// The timer has no such channel.
    ChannelUnavailable,
    /// Operation not allowed in the current state.
    InvalidState(PwmState),
}

impl fmt::Display for PwmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PwmError::FrequencyOutOfRange { target_hz } => {
                write!(f, "PWM frequency {} Hz not achievable", target_hz)
            }
            PwmError::DutyCycleOutOfRange { percent } => {
                write!(f, "duty cycle {}% out of range", percent)
            }
            PwmError::ChannelUnavailable => f.write_str("timer has no such channel"),
            PwmError::InvalidState(state) => write!(f, "not allowed while {:?}", state),
        }
    }
}

impl From<FrequencyOutOfRange> for PwmError {
    fn from(err: FrequencyOutOfRange) -> PwmError {
        PwmError::FrequencyOutOfRange {
            target_hz: err.target_hz,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    C1,
    C2,
    C3,
    C4,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::C1, Channel::C2, Channel::C3, Channel::C4];

    /// Zero-based channel number.
    pub const fn index(self) -> u8 {
        self as u8
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

/// Compare value for `percent` of a period of `auto_reload` ticks,
/// rounded half up.
pub fn compare_value(auto_reload: u32, percent: u8) -> u32 {
    let compare = (u64::from(auto_reload) * u64::from(percent) + 50) / 100;
    compare.min(u64::from(auto_reload)) as u32
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmTiming {
    pub prescaler: u32,
    pub auto_reload: u32,
    /// Written to CCRx as is.
    pub compare: u32,
}

impl PwmTiming {
    pub fn compute(
        timer_clock: u32,
        target_hz: u32,
        percent: u8,
        timer: TimerId,
    ) -> Result<PwmTiming, PwmError> {
        if percent > 100 {
            return Err(PwmError::DutyCycleOutOfRange { percent });
        }

        let TimerTiming {
            prescaler,
            auto_reload,
        } = TimerTiming::compute(timer_clock, target_hz, timer.width())?;

        Ok(PwmTiming {
            prescaler,
            auto_reload,
            compare: compare_value(auto_reload, percent),
        })
    }
}

pub struct Pwm<'a> {
    regs: &'a Tim,
    id: TimerId,
    state: PwmState,
    /// Duty cycle of every enabled channel, reapplied when the period
    /// changes.
    duty: [Option<u8>; 4],
}

impl<'a> Pwm<'a> {
    /// Enables the timer clock. Registers are left alone until
    /// [`Pwm::configure`]. Basic timers have no outputs and are refused.
    pub fn new(
        regs: &'a Tim,
        id: TimerId,
        clocks: &ClockController,
    ) -> Result<Pwm<'a>, PwmError> {
        if id.channels() == 0 {
            return Err(PwmError::ChannelUnavailable);
        }

        clocks.enable_peripheral_clock(id.peripheral());
        Ok(Pwm {
            regs,
            id,
            state: PwmState::Unconfigured,
            duty: [None; 4],
        })
    }

    /// Programs the timer for `target_hz` and enables `channel` at `percent`
    /// duty cycle. Channels enabled earlier keep their duty cycle against the
    /// new period. Nothing is written when the request is rejected.
    ///
    /// The timer clock is read from `clocks` on every call.
    pub fn configure(
        &mut self,
        clocks: &ClockController,
        target_hz: u32,
        channel: Channel,
        percent: u8,
    ) -> Result<PwmTiming, PwmError> {
        if self.state == PwmState::Running {
            return Err(PwmError::InvalidState(self.state));
        }
        self.check_channel(channel)?;
        debug_assert!(clocks.is_enabled(self.id.peripheral()));

        let timer_clock = clocks.timer_clock(self.id.bus());
        let timing = PwmTiming::compute(timer_clock, target_hz, percent, self.id)?;

        let regs = self.regs;

        // edge-aligned, up-counting, buffered ARR
        regs.cr1.update_with_mask(
            Cr1::DIR as u32 | cr1::CMS.mask() | Cr1::ARPE as u32,
            Cr1::ARPE as u32,
        );
        regs.psc.set(timing.prescaler - 1);
        regs.arr.set(timing.auto_reload - 1);

        for other in Channel::ALL {
            if let Some(duty) = self.duty[other.index() as usize] {
                self.ccr(other).set(compare_value(timing.auto_reload, duty));
            }
        }
        self.enable_output(channel, timing.compare);
        self.duty[channel.index() as usize] = Some(percent);

        if self.id.is_advanced() {
            regs.bdtr.set_flag(Bdtr::MOE as u32);
        }

        // move the preloaded values into the shadow registers
        regs.egr.set(Egr::UG as u32);

        self.state = PwmState::Configured;

        debug!(
            "pwm: {} {} at {=u32} Hz, {=u8}% psc={=u32} arr={=u32} ccr={=u32}",
            self.id,
            channel,
            target_hz,
            percent,
            timing.prescaler - 1,
            timing.auto_reload - 1,
            timing.compare
        );
        Ok(timing)
    }

    /// Sets the duty cycle of `channel` against the programmed period,
    /// enabling its output if needed. Takes effect at the next period.
    pub fn set_duty_cycle(&mut self, channel: Channel, percent: u8) -> Result<(), PwmError> {
        if self.state == PwmState::Unconfigured {
            return Err(PwmError::InvalidState(self.state));
        }
        self.check_channel(channel)?;
        if percent > 100 {
            return Err(PwmError::DutyCycleOutOfRange { percent });
        }

        let timing = TimerTiming::from_registers(self.regs.psc.get(), self.regs.arr.get());
        let compare = compare_value(timing.auto_reload, percent);

        let index = channel.index() as usize;
        if self.duty[index].is_some() {
            self.ccr(channel).set(compare);
        } else {
            self.enable_output(channel, compare);
        }
        self.duty[index] = Some(percent);
        Ok(())
    }

    /// Turns the output of `channel` off. The other channels keep running.
    pub fn disable(&mut self, channel: Channel) -> Result<(), PwmError> {
        self.check_channel(channel)?;

        let fields = channel_fields(channel.index());
        self.regs.ccer.clear_flag(fields.cce.mask());
        self.duty[channel.index() as usize] = None;
        Ok(())
    }

    /// Starts the counter. Restarting a stopped timer keeps its prescaler,
    /// period and compare values.
    pub fn start(&mut self) -> Result<(), PwmError> {
        match self.state {
            PwmState::Unconfigured => Err(PwmError::InvalidState(self.state)),
            PwmState::Running => Ok(()),
            PwmState::Configured | PwmState::Stopped => {
                self.regs.cr1.set_flag(Cr1::CEN as u32);
                self.state = PwmState::Running;
                Ok(())
            }
        }
    }

    /// Stops the counter and with it every channel.
    pub fn stop(&mut self) -> Result<(), PwmError> {
        if self.state != PwmState::Running {
            return Err(PwmError::InvalidState(self.state));
        }

        self.regs.cr1.clear_flag(Cr1::CEN as u32);
        self.state = PwmState::Stopped;
        Ok(())
    }

    pub fn state(&self) -> PwmState {
        self.state
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Duty cycle of `channel`, `None` while its output is disabled.
    pub fn duty_cycle(&self, channel: Channel) -> Option<u8> {
        self.duty[channel.index() as usize]
    }

    /// Achieved output frequency in Hz under the current clock state.
    pub fn frequency(&self, clocks: &ClockController) -> Result<u32, PwmError> {
        if self.state == PwmState::Unconfigured {
            return Err(PwmError::InvalidState(self.state));
        }

        let timing = TimerTiming::from_registers(self.regs.psc.get(), self.regs.arr.get());
        Ok(timing.frequency(clocks.timer_clock(self.id.bus())))
    }

    /// Programmed compare value of `channel`.
    pub fn compare(&self, channel: Channel) -> u32 {
        self.ccr(channel).get()
    }

    /// Routes the timer's outputs to `pin` of `gpio`. Which channel appears
    /// on a pin is fixed by the pin.
    pub fn route(&self, gpio: &GpioPort, pin: u8) {
        gpio.configure(pin, PinConfig::alternate(self.id.alternate_function()));
    }

    fn check_channel(&self, channel: Channel) -> Result<(), PwmError> {
        if channel.index() >= self.id.channels() {
            return Err(PwmError::ChannelUnavailable);
        }
        Ok(())
    }

    /// PWM mode 1 with preload, active high, output on.
    fn enable_output(&self, channel: Channel, compare: u32) {
        let fields = channel_fields(channel.index());

        self.ccr(channel).set(compare);
        self.ccmr(channel).update_with_mask(
            fields.ccs.mask() | fields.ocm.mask() | fields.ocpe.mask(),
            fields.ocm.encode(OutputCompareMode::PwmMode1 as u32) | fields.ocpe.encode(1),
        );
        self.regs
            .ccer
            .update_with_mask(fields.cce.mask() | fields.ccp.mask(), fields.cce.mask());
    }

    fn ccr(&self, channel: Channel) -> &'a RW<u32> {
        let regs = self.regs;
        match channel {
            Channel::C1 => &regs.ccr1,
            Channel::C2 => &regs.ccr2,
            Channel::C3 => &regs.ccr3,
            Channel::C4 => &regs.ccr4,
        }
    }

    fn ccmr(&self, channel: Channel) -> &'a RW<u32> {
        let regs = self.regs;
        match channel {
            Channel::C1 | Channel::C2 => &regs.ccmr1,
            Channel::C3 | Channel::C4 => &regs.ccmr2,
        }
    }
}
