//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Save/load and replays only work if a session is a pure function of its
//! starting state and the commands applied to it. Sources of
//! non-determinism include:
//!
//! - **Wall-clock time**: Only the frame driver may look at elapsed time,
//!   and it only turns it into a count of fixed quanta.
//!
//! - **Floating-point math**: Speeds are 16.16 fixed point via
//!   [`serf_core::math::Fixed16`].
//!
//! - **HashMap iteration order**: Pools are always walked in slot order.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Clock and pool behaviour in isolation
//! 2. **Property tests**: Random speed schedules and pool operations
//! 3. **Integration tests**: Full sessions are reproducible
//! 4. **Parallel tests**: Running N sessions on separate threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use serf_core::persistence::SaveFile;
use serf_core::session::Session;

/// Result of a determinism check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether every run ended with the same hash.
    pub is_deterministic: bool,
    /// Final hash of each run.
    pub hashes: Vec<u64>,
    /// Ticks simulated per run.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Distinct hashes, sorted.
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Panic with details if the runs diverged.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run `setup` → `step` × `ticks` → `hash` several times and compare.
///
/// Generic over the state so it also covers clocks and pools on their own.
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Tick two sessions from `setup_fn` and compare their hashes.
pub fn verify_session_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Session,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |session| {
            session.tick();
        },
        Session::state_hash,
    );
    result.is_deterministic
}

/// Run `num_sessions` sessions on scoped threads and collect final hashes.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_sessions<F>(setup_fn: F, num_sessions: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Session + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sessions)
            .map(|_| {
                s.spawn(|| {
                    let mut session = setup_fn();
                    for _ in 0..num_ticks {
                        session.tick();
                    }
                    session.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("session thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Find the first tick at which two sessions from `setup_fn` differ.
///
/// Returns `Some(0)` if they already differ before the first tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Session,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        first.tick();
        second.tick();

        if first.state_hash() != second.state_hash() {
            tracing::debug!(tick, "Sessions diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that a save round trip preserves session state exactly, and that
/// the restored session keeps evolving identically.
///
/// The snapshot goes through the full [`SaveFile`] encoding and is restored
/// into a fresh session from `setup_fn`.
pub fn verify_snapshot_roundtrip<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Session,
{
    let mut session = setup_fn();
    for _ in 0..num_ticks {
        session.tick();
    }

    let Ok(bytes) = SaveFile::new(session.snapshot()).encode(serf_core::error::PersistOp::Save)
    else {
        return false;
    };
    let Ok(file) = SaveFile::decode(&bytes) else {
        return false;
    };

    let mut restored = setup_fn();
    if restored.restore(file.snapshot).is_err() {
        return false;
    }
    if restored.state_hash() != session.state_hash() {
        return false;
    }

    for _ in 0..num_ticks {
        session.tick();
        restored.tick();
    }
    restored.state_hash() == session.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of simulation determinism.
pub mod strategies {
    use proptest::prelude::*;
    use serf_core::clock::GameSpeed;
    use serf_core::map::{Direction, MAX_MAP_SIZE};

    /// Generate a game speed, including paused, up to 8 units.
    pub fn arb_speed() -> impl Strategy<Value = GameSpeed> {
        prop_oneof![
            1 => Just(GameSpeed::PAUSED),
            4 => (1u32..0x8_0000).prop_map(GameSpeed::from_bits),
        ]
    }

    /// Generate a speed schedule of `(speed, ticks)` segments.
    pub fn arb_speed_schedule(max_segments: usize) -> impl Strategy<Value = Vec<(GameSpeed, u32)>> {
        proptest::collection::vec((arb_speed(), 1u32..200), 1..max_segments)
    }

    /// Generate a map size class.
    pub fn arb_map_size() -> impl Strategy<Value = u32> {
        0u32..=MAX_MAP_SIZE
    }

    /// Generate a hex direction.
    pub fn arb_direction() -> impl Strategy<Value = Direction> {
        proptest::sample::select(Direction::ALL.to_vec())
    }

    /// Generate a map coordinate, deliberately beyond the map on both sides.
    pub fn arb_coordinate() -> impl Strategy<Value = i32> {
        -4096i32..4096
    }

    /// One pool operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PoolOp {
        /// Allocate the next free slot.
        Allocate,
        /// Free the slot with this index (may be invalid).
        Deallocate(u32),
    }

    /// Generate a pool operation against a pool of `capacity` slots.
    ///
    /// Deallocation indices sometimes fall outside the pool.
    pub fn arb_pool_op(capacity: u32) -> impl Strategy<Value = PoolOp> {
        prop_oneof![
            3 => Just(PoolOp::Allocate),
            2 => (0..capacity + 4).prop_map(PoolOp::Deallocate),
        ]
    }

    /// Generate a sequence of pool operations.
    pub fn arb_pool_ops(capacity: u32, max_len: usize) -> impl Strategy<Value = Vec<PoolOp>> {
        proptest::collection::vec(arb_pool_op(capacity), 0..max_len)
    }
}
