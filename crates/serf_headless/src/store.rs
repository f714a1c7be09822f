//! Save files on disk.
//!
//! Each save is one bincode [`SaveFile`] named after its kind, the
//! configured label and the wall-clock time it was written.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serf_core::error::{GameError, PersistOp, Result};
use serf_core::persistence::{save_file_name, Persistence, SaveFile, SaveKind, SAVE_EXTENSION};
use serf_core::session::SessionSnapshot;

/// Directory-backed [`Persistence`].
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    label: String,
}

impl FileStore {
    /// Store writing into `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            label: String::new(),
        }
    }

    /// Put `label` in front of the timestamp of every save name.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Save directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save files in the directory, oldest name first.
    ///
    /// A missing directory has no saves.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GameError::persistence(PersistOp::Load, e)),
        };
        let mut saves = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| GameError::persistence(PersistOp::Load, e))?
                .path();
            if path.extension().is_some_and(|ext| ext == SAVE_EXTENSION) {
                saves.push(path);
            }
        }
        saves.sort();
        Ok(saves)
    }

    /// Where a save of `kind` for `tick` would go, skipping names in use.
    fn next_path(&self, kind: SaveKind, tick: u32) -> PathBuf {
        let base = match self.label.as_str() {
            "" => format!("{} {tick}", unix_seconds()),
            label => format!("{label} {} {tick}", unix_seconds()),
        };
        let mut path = self.dir.join(save_file_name(kind, &base));
        let mut attempt = 1;
        while path.exists() {
            path = self
                .dir
                .join(save_file_name(kind, &format!("{base} {attempt}")));
            attempt += 1;
        }
        path
    }

    /// Relative names are looked up in the save directory first.
    fn resolve(&self, source: &Path) -> PathBuf {
        if source.is_relative() && !source.exists() {
            self.dir.join(source)
        } else {
            source.to_path_buf()
        }
    }
}

impl Persistence for FileStore {
    fn save(&mut self, snapshot: &SessionSnapshot, kind: SaveKind) -> Result<PathBuf> {
        let op = kind.operation();
        fs::create_dir_all(&self.dir).map_err(|e| GameError::persistence(op, e))?;

        let bytes = SaveFile::new(snapshot.clone()).encode(op)?;
        let path = self.next_path(kind, snapshot.clock.tick);

        // Write beside the target and rename so a crash never leaves half a save.
        let partial = path.with_extension("partial");
        fs::write(&partial, &bytes).map_err(|e| GameError::persistence(op, e))?;
        fs::rename(&partial, &path).map_err(|e| GameError::persistence(op, e))?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Save written");
        Ok(path)
    }

    fn load(&mut self, source: &Path) -> Result<SessionSnapshot> {
        let path = self.resolve(source);
        let bytes = fs::read(&path).map_err(|e| {
            GameError::persistence(PersistOp::Load, format!("{}: {e}", path.display()))
        })?;
        Ok(SaveFile::decode(&bytes)?.snapshot)
    }
}

/// Read and decode a save file without a store.
pub fn read_save(path: &Path) -> Result<SaveFile> {
    let bytes = fs::read(path).map_err(|e| {
        GameError::persistence(PersistOp::Load, format!("{}: {e}", path.display()))
    })?;
    SaveFile::decode(&bytes)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serf_core::persistence::SAVE_VERSION;
    use serf_test_utils::fixtures::populated_session;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("saves")).with_label("My Game: 1");
        let snapshot = populated_session().snapshot();

        let path = store.save(&snapshot, SaveKind::Manual).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("save-My_Game__1_"), "{name}");
        assert!(name.ends_with(".save"));
        assert_eq!(store.load(&path).unwrap(), snapshot);

        // Bare names resolve inside the save directory.
        assert_eq!(store.load(Path::new(&name)).unwrap(), snapshot);
        assert_eq!(read_save(&path).unwrap().version, SAVE_VERSION);
    }

    #[test]
    fn test_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let snapshot = populated_session().snapshot();

        let first = store.save(&snapshot, SaveKind::Autosave).unwrap();
        let second = store.save(&snapshot, SaveKind::Autosave).unwrap();
        let manual = store.save(&snapshot, SaveKind::Manual).unwrap();
        assert_ne!(first, second);

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.contains(&manual));
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("autosave-"));
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());

        let err = store.load(Path::new("missing.save")).unwrap_err();
        assert!(err.is_persistence());

        let corrupt = dir.path().join("corrupt.save");
        fs::write(&corrupt, [1, 0, 0, 0, 7, 7]).unwrap();
        assert!(store.load(&corrupt).unwrap_err().is_persistence());

        let future = dir.path().join("future.save");
        fs::write(&future, (SAVE_VERSION + 1).to_le_bytes()).unwrap();
        assert!(matches!(
            store.load(&future),
            Err(GameError::SaveVersionMismatch { .. })
        ));
    }

    #[test]
    fn test_inspecting_save_with_oversized_map_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let path = store
            .save(&populated_session().snapshot(), SaveKind::Manual)
            .unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&40u32.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        assert!(read_save(&path).unwrap_err().is_persistence());
        assert!(store.load(&path).unwrap_err().is_persistence());
    }

    #[test]
    fn test_unwritable_directory_fails_save() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();

        let mut store = FileStore::new(blocker.join("saves"));
        let err = store
            .save(&populated_session().snapshot(), SaveKind::Autosave)
            .unwrap_err();
        assert!(matches!(
            err,
            GameError::PersistenceFailure {
                operation: PersistOp::Autosave,
                ..
            }
        ));
    }
}
