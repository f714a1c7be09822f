//! # Serf Core
//!
//! Deterministic simulation core for a settlement strategy game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No file IO
//! - No wall clock inside the simulation
//! - No floating-point math (rates are 16.16 fixed point)
//!
//! This separation enables:
//! - Headless runs and tooling
//! - Save/load with bit-identical resumption
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`map`] - Position codec for the toroidal hex map
//! - [`spiral`] - Spiral neighbour tables for outward tile scans
//! - [`pool`] - Fixed-capacity entity pools with typed handles
//! - [`entities`] - Serf, flag, building and inventory records
//! - [`clock`] - Fixed-step simulation clock
//! - [`session`] - Session context owning all mutable state
//! - [`persistence`] - Save/restore boundary
//! - [`driver`] - Frame-level driver applying commands and autosaves
//! - [`config`] - Session configuration
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod clock;
pub mod config;
pub mod driver;
pub mod entities;
pub mod error;
pub mod map;
pub mod math;
pub mod persistence;
pub mod pool;
pub mod session;
pub mod spiral;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{ClockState, GameSpeed, SimClock, TickReport, TICK_LENGTH};
    pub use crate::config::{PoolCapacities, SessionConfig};
    pub use crate::driver::{DriverCommand, FrameReport, SessionDriver};
    pub use crate::entities::{
        Building, BuildingType, EntityKind, Flag, Inventory, Serf, SerfState, SerfType,
    };
    pub use crate::error::{GameError, Result};
    pub use crate::map::{Direction, MapGeometry, MapPos};
    pub use crate::persistence::{MemoryStore, Persistence, SaveKind};
    pub use crate::pool::{EntityPool, Handle};
    pub use crate::session::{Session, SessionSnapshot};
    pub use crate::spiral::{spiral_pattern, SpiralPattern, SpiralPosTable};
}
