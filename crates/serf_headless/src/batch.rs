//! Parallel determinism verification.
//!
//! Runs the same seeded session many times with rayon and compares the
//! final state hashes. Every second run is saved and restored part way
//! through, so a passing batch also shows that a save round trip does not
//! perturb the simulation.

use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serf_core::clock::GameSpeed;
use serf_core::config::SessionConfig;
use serf_core::entities::{BuildingType, SerfType, RESOURCE_TYPES};
use serf_core::error::{GameError, PersistOp};
use serf_core::map::Direction;
use serf_core::persistence::SaveFile;
use serf_core::session::{PopulationSummary, Session};
use tracing::{debug, info, warn};

/// Configuration for a verification batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Session settings shared by every run.
    pub session: SessionConfig,
    /// Number of runs.
    pub runs: u32,
    /// Quanta simulated per run.
    pub ticks: u32,
    /// Serfs seeded around the castle.
    pub serfs: u32,
    /// Speeds (whole units) cycled through, one segment each.
    pub speeds: Vec<u16>,
    /// Maximum parallel runs (0 = use rayon default).
    pub parallel: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            runs: 8,
            ticks: 5000,
            serfs: 64,
            speeds: vec![2, 1, 0, 8],
            parallel: 0,
        }
    }
}

impl VerifyConfig {
    /// Tick at which round-trip runs save and restore.
    #[must_use]
    pub const fn roundtrip_tick(&self) -> u32 {
        self.ticks / 2
    }

    /// Speed in effect at quantum `tick`.
    fn speed_at(&self, tick: u32) -> GameSpeed {
        if self.speeds.is_empty() {
            return self.session.initial_speed();
        }
        let segment = (self.ticks / self.speeds.len() as u32).max(1);
        let index = ((tick / segment) as usize).min(self.speeds.len() - 1);
        GameSpeed::from_units(self.speeds[index])
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Run index.
    pub run: u32,
    /// Whether the run went through a save round trip.
    pub roundtrip: bool,
    /// Final state hash.
    pub hash: u64,
    /// Final clock tick.
    pub tick: u32,
    /// Final population.
    pub population: PopulationSummary,
}

/// Error during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    /// Run index.
    pub run: u32,
    /// Error message.
    pub message: String,
}

/// Results of a verification batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResults {
    /// Configuration used.
    pub config: VerifyConfig,
    /// Completed runs, in run order.
    pub runs: Vec<RunResult>,
    /// Runs that failed.
    pub errors: Vec<RunError>,
    /// Whether every completed run ended in the same state.
    pub deterministic: bool,
    /// Total runtime.
    pub duration_seconds: f64,
}

impl VerifyResults {
    /// Whether the batch passed: no errors and a single final hash.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.deterministic && !self.runs.is_empty()
    }

    /// Distinct final hashes, sorted.
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut hashes: Vec<u64> = self.runs.iter().map(|r| r.hash).collect();
        hashes.sort_unstable();
        hashes.dedup();
        hashes
    }

    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Starting stock of every resource in the seeded castle.
const CASTLE_STOCK: u16 = 16;

/// Put a stocked castle in the middle of the map and `serfs` walking serfs
/// on the tiles spiralling out from it.
///
/// Serfs that do not fit the pool or the spiral are skipped.
pub fn seed_session(session: &mut Session, serfs: u32) -> Result<(), GameError> {
    let geometry = session.geometry();
    let center = geometry.encode((geometry.cols() / 2) as i32, (geometry.rows() / 2) as i32);
    let castle = session.spawn_building(0, center, BuildingType::Castle)?;
    let inventory = session.buildings().get(castle).inventory;
    if let Some(stock) = session.inventories_mut().try_get_mut(inventory) {
        for resource in 0..RESOURCE_TYPES {
            stock.store(resource, CASTLE_STOCK);
        }
    }

    let spots: Vec<_> = session
        .spiral_positions()
        .around(center)
        .skip(1)
        .take(serfs as usize)
        .collect();
    for (i, pos) in spots.into_iter().enumerate() {
        let serf = match session.spawn_serf(0, SerfType::Transporter, Some(pos)) {
            Ok(serf) => serf,
            Err(GameError::ResourceExhausted { .. }) => break,
            Err(e) => return Err(e),
        };
        let dir = Direction::ALL[i % Direction::ALL.len()];
        session.start_walk(serf, dir, 8 + (i as i32 * 5) % 64)?;
    }
    Ok(())
}

/// Simulate one run.
pub fn run_once(config: &VerifyConfig, run: u32) -> Result<RunResult, GameError> {
    let mut session = Session::new(&config.session)?;
    seed_session(&mut session, config.serfs)?;

    let roundtrip = run % 2 == 1;
    for tick in 0..config.ticks {
        if roundtrip && tick == config.roundtrip_tick() {
            let bytes = SaveFile::new(session.snapshot()).encode(PersistOp::Save)?;
            let mut restored = Session::new(&config.session)?;
            restored.restore(SaveFile::decode(&bytes)?.snapshot)?;
            session = restored;
        }
        session.clock_mut().set_speed(config.speed_at(tick));
        session.tick();
    }

    debug!(run, hash = session.state_hash(), "Run complete");
    Ok(RunResult {
        run,
        roundtrip,
        hash: session.state_hash(),
        tick: session.clock().tick(),
        population: session.population(),
    })
}

/// Run a verification batch.
pub fn run_verify(config: VerifyConfig) -> VerifyResults {
    let start = Instant::now();
    info!(
        runs = config.runs,
        ticks = config.ticks,
        serfs = config.serfs,
        "Starting determinism verification"
    );

    // Configure thread pool if specified
    if config.parallel > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel as usize)
            .build_global()
            .ok(); // Ignore if already set
    }

    let results: Vec<Result<RunResult, RunError>> = (0..config.runs)
        .into_par_iter()
        .map(|run| {
            run_once(&config, run).map_err(|e| {
                warn!(run, error = %e, "Run failed");
                RunError {
                    run,
                    message: e.to_string(),
                }
            })
        })
        .collect();

    let (runs, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let runs: Vec<RunResult> = runs.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<RunError> = errors.into_iter().filter_map(Result::err).collect();

    let deterministic = runs.windows(2).all(|w| w[0].hash == w[1].hash);
    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        completed = runs.len(),
        failed = errors.len(),
        deterministic,
        "Verification complete in {duration_seconds:.2}s"
    );

    VerifyResults {
        config,
        runs,
        errors,
        deterministic,
        duration_seconds,
    }
}
