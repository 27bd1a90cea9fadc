//! Busy-wait delays on the SysTick timer, clocked from HCLK.

use core::fmt;

use stm32f4::systick::{Ctrl, SysTick, RELOAD_MAX};

use crate::clock::ClockController;

/// Longest single SysTick period in ticks.
pub const MAX_PERIOD: u32 = RELOAD_MAX + 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DelayError {
    /// Period outside `2..=2^24` ticks.
    PeriodOutOfRange { ticks: u32 },
}

impl fmt::Display for DelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DelayError::PeriodOutOfRange { ticks } => {
                write!(f, "SysTick period of {} ticks out of range", ticks)
            }
        }
    }
}

pub struct Delay<'a> {
    syst: &'a SysTick,
}

impl<'a> Delay<'a> {
    pub fn new(syst: &'a SysTick) -> Delay<'a> {
        Delay { syst }
    }

    /// Runs SysTick periodically with a period of `ticks` HCLK cycles.
    pub fn start(&mut self, ticks: u32) -> Result<(), DelayError> {
        if !(2..=MAX_PERIOD).contains(&ticks) {
            return Err(DelayError::PeriodOutOfRange { ticks });
        }

        self.run(ticks);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.syst.ctrl.clear_flag(Ctrl::ENABLE as u32);
    }

    /// Blocks for `ms` milliseconds at the current HCLK.
    pub fn delay_ms(&mut self, clocks: &ClockController, ms: u32) {
        let hclk = u64::from(clocks.clocks().hclk());
        self.delay_ticks(hclk * u64::from(ms) / 1_000);
    }

    /// Blocks for `us` microseconds at the current HCLK.
    pub fn delay_us(&mut self, clocks: &ClockController, us: u32) {
        let hclk = u64::from(clocks.clocks().hclk());
        self.delay_ticks(hclk * u64::from(us) / 1_000_000);
    }

    fn delay_ticks(&mut self, ticks: u64) {
        let mut remaining = ticks;
        while remaining >= 2 {
            let chunk = remaining.min(u64::from(MAX_PERIOD)) as u32;
            self.run(chunk);
            while !self.syst.ctrl.is_set(Ctrl::COUNTFLAG as u32) {}
            remaining -= u64::from(chunk);
        }
        self.stop();
    }

    fn run(&mut self, ticks: u32) {
        self.syst.load.set(ticks - 1);
        // clears COUNTFLAG as well
        self.syst.val.set(0);
        self.syst.ctrl.update_with_mask(
            Ctrl::ENABLE as u32 | Ctrl::TICKINT as u32 | Ctrl::CLKSOURCE as u32,
            Ctrl::ENABLE as u32 | Ctrl::CLKSOURCE as u32,
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use stm32f4::rcc::Rcc;

    use crate::clock::ClockConfig;

    #[test]
    fn test_start() {
        let syst = SysTick::default();
        let mut delay = Delay::new(&syst);

        delay.start(16_000).unwrap();
        assert_eq!(15_999, syst.load.get());
        assert_eq!(Ctrl::ENABLE as u32 | Ctrl::CLKSOURCE as u32, syst.ctrl.get());

        delay.stop();
        assert_eq!(Ctrl::CLKSOURCE as u32, syst.ctrl.get());
    }

    #[test]
    fn test_start_out_of_range() {
        let syst = SysTick::default();
        let mut delay = Delay::new(&syst);

        assert_eq!(Err(DelayError::PeriodOutOfRange { ticks: 1 }), delay.start(1));
        assert_eq!(
            Err(DelayError::PeriodOutOfRange { ticks: MAX_PERIOD + 1 }),
            delay.start(MAX_PERIOD + 1)
        );
        assert_eq!(0, syst.ctrl.get());

        // LOAD = 0 would leave the counter disabled
        delay.start(2).unwrap();
        assert_eq!(1, syst.load.get());
        delay.start(MAX_PERIOD).unwrap();
        assert_eq!(RELOAD_MAX, syst.load.get());
    }

    #[test]
    fn test_delay_ms() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let syst = SysTick::default();
        syst.ctrl.set(Ctrl::COUNTFLAG as u32);

        let mut delay = Delay::new(&syst);
        delay.delay_ms(&clocks, 1);
        assert_eq!(15_999, syst.load.get());
        assert!(!syst.ctrl.is_set(Ctrl::ENABLE as u32));
    }

    #[test]
    fn test_long_delay_is_split() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let syst = SysTick::default();
        syst.ctrl.set(Ctrl::COUNTFLAG as u32);

        let mut delay = Delay::new(&syst);
        // 32_000_000 ticks: one full period, then the rest
        delay.delay_ms(&clocks, 2_000);
        assert_eq!(32_000_000 - MAX_PERIOD - 1, syst.load.get());
    }

    #[test]
    fn test_delay_us_zero() {
        let rcc = Rcc::default();
        let clocks = ClockController::new(&rcc, ClockConfig::default()).unwrap();
        let syst = SysTick::default();

        let mut delay = Delay::new(&syst);
        delay.delay_us(&clocks, 0);
        assert_eq!(0, syst.load.get());

        syst.ctrl.set(Ctrl::COUNTFLAG as u32);
        delay.delay_us(&clocks, 10);
        assert_eq!(159, syst.load.get());
    }
}
