//! Save/restore boundary.
//!
//! The core hands a [`SessionSnapshot`] to a [`Persistence`] implementation
//! and gets one back on load. Where bytes end up is the implementation's
//! business; [`SaveFile`] fixes the versioned envelope every store writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GameError, PersistOp, Result};
use crate::session::SessionSnapshot;

/// Save format version for compatibility.
pub const SAVE_VERSION: u32 = 1;

/// Extension of save files.
pub const SAVE_EXTENSION: &str = "save";

/// Why a save is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveKind {
    /// Requested by the player.
    Manual,
    /// Triggered by the clock.
    Autosave,
}

impl SaveKind {
    /// Operation reported when this save fails.
    #[must_use]
    pub const fn operation(self) -> PersistOp {
        match self {
            Self::Manual => PersistOp::Save,
            Self::Autosave => PersistOp::Autosave,
        }
    }

    const fn prefix(self) -> &'static str {
        match self {
            Self::Manual => "save",
            Self::Autosave => "autosave",
        }
    }
}

/// Storage for session snapshots.
pub trait Persistence {
    /// Store a snapshot and return where it went.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::PersistenceFailure`] when the snapshot could not
    /// be written.
    fn save(&mut self, snapshot: &SessionSnapshot, kind: SaveKind) -> Result<PathBuf>;

    /// Read a snapshot back.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::PersistenceFailure`] or
    /// [`GameError::SaveVersionMismatch`] when the source is unreadable.
    fn load(&mut self, source: &Path) -> Result<SessionSnapshot>;
}

/// On-disk envelope: format version followed by the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFile {
    /// Save format version.
    pub version: u32,
    /// Session contents.
    pub snapshot: SessionSnapshot,
}

impl SaveFile {
    /// Wrap a snapshot at the current format version.
    #[must_use]
    pub const fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            version: SAVE_VERSION,
            snapshot,
        }
    }

    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns a persistence failure if serialization fails.
    pub fn encode(&self, operation: PersistOp) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GameError::persistence(operation, e))
    }

    /// Decode bytes written by [`encode`](Self::encode).
    ///
    /// The version is checked before the body is parsed.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::SaveVersionMismatch`] for another format version
    /// and a persistence failure for corrupt data, including map dimensions
    /// that [`MapGeometry::new`](crate::map::MapGeometry::new) rejects.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let version: u32 =
            bincode::deserialize(bytes).map_err(|e| GameError::persistence(PersistOp::Load, e))?;
        if version != SAVE_VERSION {
            return Err(GameError::SaveVersionMismatch {
                expected: SAVE_VERSION,
                found: version,
            });
        }
        bincode::deserialize(bytes).map_err(|e| GameError::persistence(PersistOp::Load, e))
    }
}

/// Replace characters that are unsafe in file names with `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            c => c,
        })
        .collect()
}

/// File name for a save of `kind` labelled `stamp`.
#[must_use]
pub fn save_file_name(kind: SaveKind, stamp: &str) -> String {
    sanitize_file_name(&format!("{}-{stamp}.{SAVE_EXTENSION}", kind.prefix()))
}

/// In-process store keyed by save name.
///
/// Useful for tests and for tools that never touch the disk. Can be told
/// to fail writes to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saves: BTreeMap<PathBuf, Vec<u8>>,
    fail_saves: bool,
    writes: u64,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }

    /// Stored save names.
    pub fn names(&self) -> impl Iterator<Item = &Path> {
        self.saves.keys().map(PathBuf::as_path)
    }

    /// Raw bytes of a stored save.
    #[must_use]
    pub fn bytes(&self, name: &Path) -> Option<&[u8]> {
        self.saves.get(name).map(Vec::as_slice)
    }

    /// Overwrite the bytes of a save, e.g. to simulate corruption.
    pub fn insert_bytes(&mut self, name: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.saves.insert(name.into(), bytes);
    }

    /// Number of successful writes.
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.writes
    }
}

impl Persistence for MemoryStore {
    fn save(&mut self, snapshot: &SessionSnapshot, kind: SaveKind) -> Result<PathBuf> {
        if self.fail_saves {
            return Err(GameError::persistence(kind.operation(), "store is read-only"));
        }
        let bytes = SaveFile::new(snapshot.clone()).encode(kind.operation())?;
        let stamp = format!("{}-{}", snapshot.clock.tick, self.writes);
        let name = PathBuf::from(save_file_name(kind, &stamp));
        self.saves.insert(name.clone(), bytes);
        self.writes += 1;
        Ok(name)
    }

    fn load(&mut self, source: &Path) -> Result<SessionSnapshot> {
        let bytes = self.saves.get(source).ok_or_else(|| {
            GameError::persistence(
                PersistOp::Load,
                format!("no save named '{}'", source.display()),
            )
        })?;
        Ok(SaveFile::decode(bytes)?.snapshot)
    }
}
