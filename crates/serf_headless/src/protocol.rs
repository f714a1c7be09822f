//! JSON protocol for headless sessions.
//!
//! The runner communicates via JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Commands from the controller
//! **Output (stdout):** Responses and state reports
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready",...}`
//! 2. Controller sends commands as JSON lines
//! 3. Every command gets at least one response line
//! 4. `quit` (or end of input) outputs `{"type":"bye",...}`
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0,"cols":64,"rows":64}
//! -> {"cmd":"tick","count":60}
//! <- {"type":"ticked","ticks":60,"redraw":true,"autosaves":0,"autosave_failures":0}
//! -> {"cmd":"speed","units":8}
//! <- {"type":"ack","cmd":"speed"}
//! -> {"cmd":"save"}
//! <- {"type":"saved","path":"saves/save-1760600000_7864320.save"}
//! -> {"cmd":"hash"}
//! <- {"type":"state_hash","tick":7864320,"hash":1234567890}
//! ```

use serde::{Deserialize, Serialize};
use serf_core::clock::{ClockState, GameSpeed};
use serf_core::driver::{DriverCommand, DriverStats, FrameReport};
use serf_core::session::{PopulationSummary, Session};

/// Protocol version reported in `ready`.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Input Commands (Controller -> Runner)
// ============================================================================

/// Commands accepted by the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Simulate N quanta back to back (default: 1).
    Tick {
        /// Quanta to simulate.
        #[serde(default = "default_count")]
        count: u32,
    },

    /// Simulate N frames of fixed wall-clock length.
    Frames {
        /// Frames to simulate.
        #[serde(default = "default_count")]
        count: u32,
        /// Length of each frame in milliseconds.
        #[serde(default = "default_frame_ms")]
        frame_ms: u64,
    },

    /// Report the current state without advancing time.
    Query,

    /// Report the state hash.
    Hash,

    /// Set the speed in whole units; zero pauses.
    Speed {
        /// Whole speed units.
        units: u16,
    },

    /// One unit faster.
    SpeedUp,

    /// One unit slower.
    SlowDown,

    /// Back to the default speed.
    ResetSpeed,

    /// Stop the clock.
    Pause,

    /// Restart the clock at the speed it had before pausing.
    Resume,

    /// Pause or resume.
    TogglePause,

    /// Write a manual save.
    Save,

    /// Replace the session with a save.
    Load {
        /// Save file path or bare name in the save directory.
        path: String,
    },

    /// Start an empty game.
    NewGame {
        /// Map size class.
        map_size: u32,
    },

    /// Turn autosaving on or off.
    Autosave {
        /// Whether wraparounds write autosaves.
        enabled: bool,
    },

    /// Stop the runner.
    Quit,
}

fn default_count() -> u32 {
    1
}

fn default_frame_ms() -> u64 {
    // One frame at 30 fps.
    33
}

impl Command {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get command name for acknowledgment.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tick { .. } => "tick",
            Self::Frames { .. } => "frames",
            Self::Query => "query",
            Self::Hash => "hash",
            Self::Speed { .. } => "speed",
            Self::SpeedUp => "speed_up",
            Self::SlowDown => "slow_down",
            Self::ResetSpeed => "reset_speed",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::TogglePause => "toggle_pause",
            Self::Save => "save",
            Self::Load { .. } => "load",
            Self::NewGame { .. } => "new_game",
            Self::Autosave { .. } => "autosave",
            Self::Quit => "quit",
        }
    }

    /// The driver command for clock and lifecycle commands.
    ///
    /// Commands the runner answers itself map to `None`.
    #[must_use]
    pub fn to_driver(&self) -> Option<DriverCommand> {
        match self {
            Self::Speed { units } => Some(DriverCommand::SetSpeed(GameSpeed::from_units(*units))),
            Self::SpeedUp => Some(DriverCommand::SpeedUp),
            Self::SlowDown => Some(DriverCommand::SlowDown),
            Self::ResetSpeed => Some(DriverCommand::ResetSpeed),
            Self::Pause => Some(DriverCommand::Pause),
            Self::Resume => Some(DriverCommand::Resume),
            Self::TogglePause => Some(DriverCommand::TogglePause),
            Self::NewGame { map_size } => Some(DriverCommand::NewGame(*map_size)),
            Self::Quit => Some(DriverCommand::Quit),
            Self::Tick { .. }
            | Self::Frames { .. }
            | Self::Query
            | Self::Hash
            | Self::Save
            | Self::Load { .. }
            | Self::Autosave { .. } => None,
        }
    }
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses sent from the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept commands.
    Ready {
        /// Protocol version.
        version: String,
        /// Current tick.
        tick: u32,
        /// Map columns.
        cols: u32,
        /// Map rows.
        rows: u32,
    },

    /// Acknowledgment of a command.
    Ack {
        /// Command name.
        cmd: String,
    },

    /// Error processing a command.
    Error {
        /// What went wrong.
        message: String,
        /// Command name, when the line parsed.
        cmd: Option<String>,
    },

    /// Quanta were simulated.
    Ticked {
        /// Quanta simulated.
        ticks: u32,
        /// Some quantum asked for a full redraw.
        redraw: bool,
        /// Autosaves written.
        autosaves: u32,
        /// Autosaves that failed.
        autosave_failures: u32,
    },

    /// Current session state.
    State(StateReport),

    /// A save was written.
    Saved {
        /// Where it went.
        path: String,
    },

    /// A save was loaded.
    Loaded {
        /// Where it came from.
        path: String,
        /// Tick of the restored session.
        tick: u32,
    },

    /// State hash for determinism verification.
    StateHash {
        /// Current tick.
        tick: u32,
        /// Session state hash.
        hash: u64,
    },

    /// Goodbye message before shutdown.
    Bye {
        /// Totals for the run.
        stats: DriverStats,
    },
}

/// Snapshot of the observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReport {
    /// Current tick.
    pub tick: u32,
    /// Animation phase.
    pub anim: u32,
    /// Raw 16.16 speed.
    pub speed_bits: u32,
    /// Whether the clock is stopped.
    pub paused: bool,
    /// Map columns.
    pub cols: u32,
    /// Map rows.
    pub rows: u32,
    /// Live entities per pool.
    pub population: PopulationSummary,
    /// Session state hash.
    pub hash: u64,
}

impl StateReport {
    /// Describe `session`.
    #[must_use]
    pub fn of(session: &Session) -> Self {
        let clock = session.clock();
        let geometry = session.geometry();
        Self {
            tick: clock.tick(),
            anim: clock.anim(),
            speed_bits: clock.speed().to_bits(),
            paused: clock.state() == ClockState::Paused,
            cols: geometry.cols(),
            rows: geometry.rows(),
            population: session.population(),
            hash: session.state_hash(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response.
    #[must_use]
    pub fn ready(session: &Session) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
            tick: session.clock().tick(),
            cols: session.geometry().cols(),
            rows: session.geometry().rows(),
        }
    }

    /// Create an acknowledgment.
    #[must_use]
    pub fn ack(cmd: &str) -> Self {
        Self::Ack {
            cmd: cmd.to_string(),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Report a frame or tick batch.
    #[must_use]
    pub const fn ticked(report: FrameReport) -> Self {
        Self::Ticked {
            ticks: report.ticks,
            redraw: report.redraw,
            autosaves: report.autosaves,
            autosave_failures: report.autosave_failures,
        }
    }

    /// Serialize to JSON line (with newline).
    #[must_use]
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"Serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}
