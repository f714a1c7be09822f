//! Error types for the settlement simulation core.

use thiserror::Error;

use crate::entities::EntityKind;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Which side of the persistence boundary failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistOp {
    /// Writing a manual save.
    Save,
    /// Writing a periodic autosave.
    Autosave,
    /// Reading a save back into a session.
    Load,
}

impl std::fmt::Display for PersistOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Save => "save",
            Self::Autosave => "autosave",
            Self::Load => "load",
        };
        f.write_str(name)
    }
}

/// Top-level error type for all simulation core errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// No free slot left in an entity pool.
    ///
    /// Fatal to the requested game action, never to the process.
    #[error("{kind} pool exhausted (capacity {capacity})")]
    ResourceExhausted {
        /// Pool that ran out of slots.
        kind: EntityKind,
        /// Fixed capacity of that pool, sentinel included.
        capacity: u32,
    },

    /// A handle that does not refer to a live record.
    #[error("Invalid {kind} handle: {index}")]
    InvalidHandle {
        /// Pool the handle belongs to.
        kind: EntityKind,
        /// Raw slot index.
        index: u32,
    },

    /// A pool capacity that cannot hold the sentinel record.
    #[error("Invalid {kind} pool capacity: {capacity}")]
    InvalidCapacity {
        /// Pool being created.
        kind: EntityKind,
        /// Requested capacity.
        capacity: u32,
    },

    /// Map size class outside the supported range.
    #[error("Invalid map size class: {0}")]
    InvalidMapSize(u32),

    /// Save or load failed at the persistence boundary.
    #[error("Persistence failure during {operation}: {message}")]
    PersistenceFailure {
        /// Operation that failed.
        operation: PersistOp,
        /// Error message.
        message: String,
    },

    /// Save file written by an incompatible format version.
    #[error("Save version mismatch: expected {expected}, found {found}")]
    SaveVersionMismatch {
        /// Version this build reads and writes.
        expected: u32,
        /// Version recorded in the file.
        found: u32,
    },

    /// Configuration file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}

impl GameError {
    /// Build a persistence failure from any displayable cause.
    pub fn persistence(operation: PersistOp, cause: impl std::fmt::Display) -> Self {
        Self::PersistenceFailure {
            operation,
            message: cause.to_string(),
        }
    }

    /// Whether this error came from the persistence boundary.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::PersistenceFailure { .. } | Self::SaveVersionMismatch { .. }
        )
    }
}
