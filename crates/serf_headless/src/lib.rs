//! Headless session runner for scripting and CI verification.
//!
//! This crate wraps the simulation core in a process that can be driven
//! by JSON commands on stdin, with responses on stdout. This enables:
//!
//! - **Scripted play**: Command files replayed without wall-clock pacing
//! - **Save tooling**: Saves written to disk and inspected offline
//! - **CI verification**: Parallel determinism and save round-trip checks
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Commands from the controller (tick, speed, save, etc.)
//! - **stdout**: Responses and state reports (JSON)
//! - **stderr**: Debug logs (human-readable)
//!
//! See [`protocol`] module for the full command/response format.
//!
//! # Example
//!
//! ```bash
//! # Run interactively
//! echo '{"cmd":"tick","count":60}' | cargo run -p serf_headless -- run
//!
//! # Verify determinism
//! cargo run -p serf_headless -- verify --runs 8
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod protocol;
pub mod runner;
pub mod store;

pub use batch::{run_verify, VerifyConfig, VerifyResults};
pub use config::HeadlessConfig;
pub use error::HeadlessError;
pub use protocol::{Command, Response, StateReport};
pub use runner::HeadlessRunner;
pub use store::FileStore;
