//! Top-level session driver.
//!
//! The driver owns a [`Session`] and a [`Persistence`] store. It turns
//! elapsed frame time into fixed quanta, applies player commands between
//! frames, and decides how persistence errors are treated: autosave
//! failures are logged and counted, explicit saves and loads report their
//! errors to the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{GameSpeed, TickAccumulator};
use crate::error::Result;
use crate::persistence::{Persistence, SaveKind};
use crate::session::Session;

/// Commands applied between frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    /// Set an exact speed; zero pauses.
    SetSpeed(GameSpeed),
    /// One unit faster.
    SpeedUp,
    /// One unit slower.
    SlowDown,
    /// Back to the default speed.
    ResetSpeed,
    /// Stop the clock.
    Pause,
    /// Restart the clock.
    Resume,
    /// Pause or resume.
    TogglePause,
    /// Write a manual save.
    Save,
    /// Replace the session with a save.
    Load(PathBuf),
    /// Start an empty game on a map of the given size class.
    NewGame(u32),
    /// Stop the frame loop after the current frame.
    Quit,
}

/// What happened during one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameReport {
    /// Quanta simulated.
    pub ticks: u32,
    /// Some tick asked for a full redraw.
    pub redraw: bool,
    /// Autosaves written.
    pub autosaves: u32,
    /// Autosaves that failed.
    pub autosave_failures: u32,
}

/// Totals since the driver was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriverStats {
    /// Frames processed.
    pub frames: u64,
    /// Quanta simulated.
    pub ticks: u64,
    /// Autosaves written.
    pub autosaves: u64,
    /// Autosaves that failed.
    pub autosave_failures: u64,
    /// Manual saves written.
    pub saves: u64,
    /// Successful loads.
    pub loads: u64,
}

/// Runs a session against a persistence store.
#[derive(Debug)]
pub struct SessionDriver<P: Persistence> {
    session: Session,
    store: P,
    accumulator: TickAccumulator,
    autosave: bool,
    quit: bool,
    stats: DriverStats,
    last_save: Option<PathBuf>,
}

impl<P: Persistence> SessionDriver<P> {
    /// Wrap a session. Autosave follows the session configuration.
    #[must_use]
    pub fn new(session: Session, store: P) -> Self {
        let autosave = session.config().autosave;
        Self {
            session,
            store,
            accumulator: TickAccumulator::new(),
            autosave,
            quit: false,
            stats: DriverStats::default(),
            last_save: None,
        }
    }

    /// Apply one command.
    ///
    /// # Errors
    ///
    /// Save and load failures are returned unchanged. A failed load leaves
    /// the running session as it was.
    pub fn handle(&mut self, command: DriverCommand) -> Result<()> {
        match command {
            DriverCommand::SetSpeed(speed) => self.session.clock_mut().set_speed(speed),
            DriverCommand::SpeedUp => self.session.clock_mut().speed_up(),
            DriverCommand::SlowDown => self.session.clock_mut().slow_down(),
            DriverCommand::ResetSpeed => self.session.clock_mut().reset_speed(),
            DriverCommand::Pause => self.session.clock_mut().pause(),
            DriverCommand::Resume => self.session.clock_mut().resume(),
            DriverCommand::TogglePause => self.session.clock_mut().toggle_pause(),
            DriverCommand::Save => {
                self.save_now()?;
            }
            DriverCommand::Load(path) => self.load(&path)?,
            DriverCommand::NewGame(map_size) => {
                self.session.new_game(map_size)?;
                self.accumulator = TickAccumulator::new();
            }
            DriverCommand::Quit => {
                tracing::info!(tick = self.session.clock().tick(), "Quit requested");
                self.quit = true;
            }
        }
        Ok(())
    }

    /// Write a manual save now.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn save_now(&mut self) -> Result<PathBuf> {
        let path = self.store.save(&self.session.snapshot(), SaveKind::Manual)?;
        tracing::info!(path = %path.display(), "Game saved");
        self.stats.saves += 1;
        self.last_save = Some(path.clone());
        Ok(path)
    }

    /// Replace the session with the save at `source`.
    ///
    /// # Errors
    ///
    /// Returns the store's or the session's error; the session is unchanged
    /// in that case.
    pub fn load(&mut self, source: &Path) -> Result<()> {
        let snapshot = self.store.load(source)?;
        self.session.restore(snapshot)?;
        self.accumulator = TickAccumulator::new();
        self.stats.loads += 1;
        tracing::info!(path = %source.display(), "Game loaded");
        Ok(())
    }

    /// Run `ticks` quanta back to back.
    pub fn run_ticks(&mut self, ticks: u32) -> FrameReport {
        let mut report = FrameReport::default();
        for _ in 0..ticks {
            let tick = self.session.tick();
            report.ticks += 1;
            report.redraw |= tick.redraw;
            if tick.autosave_due && self.autosave {
                if self.autosave_now() {
                    report.autosaves += 1;
                } else {
                    report.autosave_failures += 1;
                }
            }
        }
        self.stats.ticks += u64::from(report.ticks);
        report
    }

    /// Simulate every quantum owed after `elapsed` wall time.
    pub fn advance_frame(&mut self, elapsed: Duration) -> FrameReport {
        let quanta = self.accumulator.accumulate(elapsed);
        let report = self.run_ticks(quanta);
        self.stats.frames += 1;
        report
    }

    fn autosave_now(&mut self) -> bool {
        match self.store.save(&self.session.snapshot(), SaveKind::Autosave) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Autosaved");
                self.stats.autosaves += 1;
                self.last_save = Some(path);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Autosave failed");
                self.stats.autosave_failures += 1;
                false
            }
        }
    }

    /// Enable or disable autosaving.
    pub fn set_autosave(&mut self, enabled: bool) {
        self.autosave = enabled;
    }

    /// Whether a quit command has been applied.
    #[must_use]
    pub const fn should_quit(&self) -> bool {
        self.quit
    }

    /// Running totals.
    #[must_use]
    pub const fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Location of the most recent successful save or autosave.
    #[must_use]
    pub fn last_save(&self) -> Option<&Path> {
        self.last_save.as_deref()
    }

    /// The session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable session, for game actions.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The store.
    #[must_use]
    pub const fn store(&self) -> &P {
        &self.store
    }

    /// Mutable store.
    pub fn store_mut(&mut self) -> &mut P {
        &mut self.store
    }

    /// Give back the session and store.
    #[must_use]
    pub fn into_parts(self) -> (Session, P) {
        (self.session, self.store)
    }
}
