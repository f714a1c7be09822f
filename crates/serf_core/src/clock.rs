//! Fixed-step simulation clock.
//!
//! The clock advances a 32-bit tick counter by the game speed (16.16 fixed
//! point) once per fixed quantum. The animation phase is the high half of
//! the counter. Everything here is a pure function of the sequence of
//! advances and speed commands; wall time only enters through
//! [`TickAccumulator`], which decides how many quanta a frame owes.
//!
//! The clock never performs I/O. When the phase wraps around it reports
//! `autosave_due` and leaves the save itself to the driver.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, whole_part, Fixed16, ONE_BITS};

/// Wall-clock length of one simulation quantum.
pub const TICK_LENGTH: Duration = Duration::from_millis(20);

/// Phase changes below this bit are too small to be worth a redraw.
const REDRAW_PHASE_BITS: u32 = 3;

/// Largest raw speed from which `speed_up` still adds a unit.
const SPEED_UP_LIMIT: u32 = 0xffff_0000;

/// Game speed multiplier; zero means paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameSpeed(#[serde(with = "fixed_serde")] Fixed16);

impl GameSpeed {
    /// Stopped.
    pub const PAUSED: Self = Self(Fixed16::ZERO);

    /// Speed of a new game: two phases per tick.
    pub const DEFAULT: Self = Self(Fixed16::from_bits(2 * ONE_BITS));

    /// Speed in whole units.
    #[must_use]
    pub const fn from_units(units: u16) -> Self {
        Self(Fixed16::from_bits((units as u32) << 16))
    }

    /// Speed from raw 16.16 bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(Fixed16::from_bits(bits))
    }

    /// Raw 16.16 bits.
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        self.0.to_bits()
    }

    /// Fixed-point value.
    #[must_use]
    pub const fn value(self) -> Fixed16 {
        self.0
    }

    /// Whether this speed stops the clock.
    #[must_use]
    pub const fn is_paused(self) -> bool {
        self.0.to_bits() == 0
    }
}

impl Default for GameSpeed {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for GameSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// The two clock states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClockState {
    /// Speed above zero.
    Running,
    /// Speed zero.
    Paused,
}

/// Outcome of one advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Animation phases elapsed during this tick.
    pub anim_delta: u32,
    /// The phase crossed a coarse boundary.
    pub redraw: bool,
    /// The phase wrapped to zero while running.
    pub autosave_due: bool,
}

/// Persisted clock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockSnapshot {
    /// Tick counter.
    pub tick: u32,
    /// Current speed.
    pub speed: GameSpeed,
    /// Speed restored by `resume`.
    pub saved_speed: GameSpeed,
}

/// Virtual tick counter plus speed control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimClock {
    tick: u32,
    speed: GameSpeed,
    saved_speed: GameSpeed,
    anim: u32,
    old_anim: u32,
}

impl SimClock {
    /// Clock at tick zero running at `speed`.
    #[must_use]
    pub fn new(speed: GameSpeed) -> Self {
        Self {
            tick: 0,
            speed,
            saved_speed: if speed.is_paused() {
                GameSpeed::DEFAULT
            } else {
                speed
            },
            anim: 0,
            old_anim: 0,
        }
    }

    /// Advance by one quantum.
    pub fn advance(&mut self) -> TickReport {
        let (tick, wrapped) = self.tick.overflowing_add(self.speed.to_bits());
        self.tick = tick;
        self.old_anim = self.anim;
        self.anim = whole_part(tick);

        let anim_delta = self.anim.wrapping_sub(self.old_anim) & 0xffff;
        let redraw = (self.anim ^ self.old_anim) >= (1 << REDRAW_PHASE_BITS);
        let autosave_due = wrapped && self.state() == ClockState::Running;

        TickReport {
            anim_delta,
            redraw,
            autosave_due,
        }
    }

    /// Set the speed. Zero pauses.
    pub fn set_speed(&mut self, speed: GameSpeed) {
        if speed != self.speed {
            tracing::info!(from = %self.speed, to = %speed, "Game speed changed");
        }
        if !speed.is_paused() {
            self.saved_speed = speed;
        }
        self.speed = speed;
    }

    /// Stop the clock, remembering the current speed.
    pub fn pause(&mut self) {
        if self.state() == ClockState::Running {
            self.saved_speed = self.speed;
            self.speed = GameSpeed::PAUSED;
            tracing::info!(tick = self.tick, "Game paused");
        }
    }

    /// Restart at the speed in effect before the pause.
    pub fn resume(&mut self) {
        if self.state() == ClockState::Paused {
            self.speed = self.saved_speed;
            tracing::info!(tick = self.tick, speed = %self.speed, "Game resumed");
        }
    }

    /// Pause if running, resume if paused.
    pub fn toggle_pause(&mut self) {
        match self.state() {
            ClockState::Running => self.pause(),
            ClockState::Paused => self.resume(),
        }
    }

    /// Add one unit of speed unless already at the top of the range.
    pub fn speed_up(&mut self) {
        let bits = self.speed.to_bits();
        if bits < SPEED_UP_LIMIT {
            self.set_speed(GameSpeed::from_bits(bits + ONE_BITS));
        }
    }

    /// Remove one unit of speed, stopping at zero.
    pub fn slow_down(&mut self) {
        let bits = self.speed.to_bits();
        if bits >= ONE_BITS {
            self.set_speed(GameSpeed::from_bits(bits - ONE_BITS));
        }
    }

    /// Return to [`GameSpeed::DEFAULT`].
    pub fn reset_speed(&mut self) {
        self.set_speed(GameSpeed::DEFAULT);
    }

    /// Running or paused.
    #[must_use]
    pub const fn state(&self) -> ClockState {
        if self.speed.is_paused() {
            ClockState::Paused
        } else {
            ClockState::Running
        }
    }

    /// Raw tick counter.
    #[must_use]
    pub const fn tick(&self) -> u32 {
        self.tick
    }

    /// Current speed.
    #[must_use]
    pub const fn speed(&self) -> GameSpeed {
        self.speed
    }

    /// Animation phase after the latest advance.
    #[must_use]
    pub const fn anim(&self) -> u32 {
        self.anim
    }

    /// Animation phase before the latest advance.
    #[must_use]
    pub const fn old_anim(&self) -> u32 {
        self.old_anim
    }

    /// Capture the persisted part of the clock.
    #[must_use]
    pub const fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            tick: self.tick,
            speed: self.speed,
            saved_speed: self.saved_speed,
        }
    }

    /// Replace the clock state with a snapshot.
    ///
    /// The phase is rederived, so the first advance afterwards reports only
    /// its own delta.
    pub fn restore(&mut self, snapshot: ClockSnapshot) {
        self.tick = snapshot.tick;
        self.speed = snapshot.speed;
        self.saved_speed = snapshot.saved_speed;
        self.anim = whole_part(snapshot.tick);
        self.old_anim = self.anim;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(GameSpeed::DEFAULT)
    }
}

/// Converts elapsed wall time into whole simulation quanta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickAccumulator {
    pending: Duration,
}

impl TickAccumulator {
    /// Empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Duration::ZERO,
        }
    }

    /// Add elapsed time and take out every whole quantum it completes.
    pub fn accumulate(&mut self, elapsed: Duration) -> u32 {
        self.pending = self.pending.saturating_add(elapsed);
        let mut quanta = 0u32;
        while self.pending >= TICK_LENGTH && quanta < u32::MAX {
            self.pending -= TICK_LENGTH;
            quanta += 1;
        }
        quanta
    }

    /// Time carried over to the next frame.
    #[must_use]
    pub const fn pending(&self) -> Duration {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advance_accumulates_speed() {
        let mut clock = SimClock::new(GameSpeed::from_bits(0x1_8000));
        clock.advance();
        clock.advance();
        assert_eq!(clock.tick(), 0x3_0000);
        assert_eq!(clock.anim(), 3);
    }

    #[test]
    fn test_anim_delta_and_redraw() {
        let mut clock = SimClock::new(GameSpeed::from_units(3));
        let report = clock.advance();
        assert_eq!(report.anim_delta, 3);
        assert!(!report.redraw);

        // 6 -> 9 flips bit 3.
        clock.advance();
        let report = clock.advance();
        assert_eq!((clock.old_anim(), clock.anim()), (6, 9));
        assert!(report.redraw);
    }

    #[test]
    fn test_autosave_once_per_wrap() {
        let mut clock = SimClock::new(GameSpeed::from_units(1));
        let mut saves = Vec::new();
        for i in 1..=3 * 65_536u32 {
            if clock.advance().autosave_due {
                saves.push(i);
            }
        }
        assert_eq!(saves, [65_536, 131_072, 196_608]);
    }

    #[test]
    fn test_autosave_delta_across_wrap() {
        let mut clock = SimClock::new(GameSpeed::from_units(2));
        clock.restore(ClockSnapshot {
            tick: 0xffff_0000,
            speed: GameSpeed::from_units(2),
            saved_speed: GameSpeed::from_units(2),
        });
        let report = clock.advance();
        assert!(report.autosave_due);
        assert_eq!(report.anim_delta, 2);
        assert_eq!(clock.anim(), 1);
    }

    #[test]
    fn test_paused_clock_never_autosaves() {
        let mut clock = SimClock::new(GameSpeed::from_units(4));
        clock.restore(ClockSnapshot {
            tick: 0xffff_fff0,
            speed: GameSpeed::PAUSED,
            saved_speed: GameSpeed::from_units(4),
        });
        for _ in 0..100_000 {
            let report = clock.advance();
            assert!(!report.autosave_due);
            assert_eq!(report.anim_delta, 0);
        }
        assert_eq!(clock.tick(), 0xffff_fff0);
        assert_eq!(clock.state(), ClockState::Paused);
    }

    #[test]
    fn test_pause_resume_restores_speed() {
        let mut clock = SimClock::new(GameSpeed::from_units(5));
        clock.pause();
        assert_eq!(clock.state(), ClockState::Paused);
        clock.pause();
        clock.resume();
        assert_eq!(clock.speed(), GameSpeed::from_units(5));

        clock.toggle_pause();
        assert_eq!(clock.state(), ClockState::Paused);
        clock.toggle_pause();
        assert_eq!(clock.speed(), GameSpeed::from_units(5));
    }

    #[test]
    fn test_speed_zero_pauses_and_resume_uses_last_speed() {
        let mut clock = SimClock::new(GameSpeed::from_units(3));
        clock.set_speed(GameSpeed::PAUSED);
        assert_eq!(clock.state(), ClockState::Paused);
        clock.resume();
        assert_eq!(clock.speed(), GameSpeed::from_units(3));
    }

    #[test]
    fn test_speed_steps() {
        let mut clock = SimClock::new(GameSpeed::from_units(1));
        clock.slow_down();
        assert_eq!(clock.speed(), GameSpeed::PAUSED);
        clock.slow_down();
        assert_eq!(clock.speed(), GameSpeed::PAUSED);
        clock.speed_up();
        clock.speed_up();
        assert_eq!(clock.speed(), GameSpeed::from_units(2));

        clock.set_speed(GameSpeed::from_bits(0xffff_0000));
        clock.speed_up();
        assert_eq!(clock.speed().to_bits(), 0xffff_0000);

        clock.reset_speed();
        assert_eq!(clock.speed(), GameSpeed::DEFAULT);
        assert_eq!(GameSpeed::DEFAULT.to_bits(), 0x2_0000);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut clock = SimClock::default();
        for _ in 0..17 {
            clock.advance();
        }
        clock.pause();
        let snapshot = clock.snapshot();

        let mut other = SimClock::new(GameSpeed::from_units(9));
        other.restore(snapshot);
        assert_eq!(other.tick(), clock.tick());
        assert_eq!(other.anim(), clock.anim());
        other.resume();
        assert_eq!(other.speed(), GameSpeed::DEFAULT);
    }

    #[test]
    fn test_accumulator_carries_remainder() {
        let mut acc = TickAccumulator::new();
        assert_eq!(acc.accumulate(Duration::from_millis(15)), 0);
        assert_eq!(acc.accumulate(Duration::from_millis(15)), 1);
        assert_eq!(acc.pending(), Duration::from_millis(10));
        // A slow frame owes several quanta.
        assert_eq!(acc.accumulate(Duration::from_millis(95)), 5);
        assert_eq!(acc.pending(), Duration::from_millis(5));
    }

    proptest! {
        #[test]
        fn prop_clock_deterministic(
            speeds in proptest::collection::vec((0u32..0x8_0000, 1u32..200), 1..20)
        ) {
            let run = || {
                let mut clock = SimClock::default();
                let mut reports = Vec::new();
                for &(bits, ticks) in &speeds {
                    clock.set_speed(GameSpeed::from_bits(bits));
                    for _ in 0..ticks {
                        reports.push(clock.advance());
                    }
                }
                (clock.tick(), clock.anim(), reports)
            };
            prop_assert_eq!(run(), run());
        }

        #[test]
        fn prop_autosave_count_matches_wraps(
            bits in 1u32..0x40_0000,
            ticks in 1u32..20_000,
        ) {
            let mut clock = SimClock::new(GameSpeed::from_bits(bits));
            let saves = (0..ticks).filter(|_| clock.advance().autosave_due).count() as u64;
            let wraps = (u64::from(ticks) * u64::from(bits)) >> 32;
            prop_assert_eq!(saves, wraps);
        }
    }
}
