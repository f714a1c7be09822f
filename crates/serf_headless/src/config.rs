//! Runner configuration.
//!
//! Loaded from a RON file. Every field has a default, so an empty
//! `HeadlessConfig()` is a valid document.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serf_core::config::SessionConfig;

use crate::error::{HeadlessError, Result};

/// Configuration for a headless run.
///
/// # Example RON
///
/// ```ron
/// HeadlessConfig(
///     session: SessionConfig(map_size: 4, initial_speed: 2),
///     save_dir: "saves",
///     save_label: "skirmish",
///     target_fps: 30,
///     max_duration_secs: Some(120),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeadlessConfig {
    /// Session settings.
    pub session: SessionConfig,
    /// Directory saves and autosaves are written to.
    pub save_dir: PathBuf,
    /// Text placed in every save name before the timestamp.
    pub save_label: String,
    /// Frames per second of the real-time loop.
    pub target_fps: u32,
    /// Stop the real-time loop after this many wall-clock seconds.
    pub max_duration_secs: Option<u64>,
    /// Emit a state line after every command and every frame that ticked.
    pub auto_state: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            save_dir: PathBuf::from("saves"),
            save_label: String::new(),
            target_fps: 30,
            max_duration_secs: None,
            auto_state: false,
        }
    }
}

impl HeadlessConfig {
    /// Load a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HeadlessError::ConfigNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse and validate a RON document.
    pub fn from_ron_str(ron_str: &str) -> Result<Self> {
        let config: Self = ron::from_str(ron_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the session settings and the frame rate.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        if self.target_fps == 0 {
            return Err(serf_core::error::GameError::InvalidState(
                "target_fps must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Wall-clock length of one frame.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }

    /// Wall-clock limit of the real-time loop, if any.
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = HeadlessConfig::from_ron_str("HeadlessConfig()").unwrap();
        assert_eq!(config, HeadlessConfig::default());
        assert_eq!(config.frame_duration(), Duration::from_nanos(33_333_333));
        assert_eq!(config.max_duration(), None);
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            HeadlessConfig(
                session: SessionConfig(map_size: 5, autosave: false),
                save_dir: "out/saves",
                save_label: "ci run",
                target_fps: 50,
                max_duration_secs: Some(3),
            )
        "#;
        let config = HeadlessConfig::from_ron_str(ron).unwrap();
        assert_eq!(config.session.map_size, 5);
        assert!(!config.session.autosave);
        assert_eq!(config.save_dir, PathBuf::from("out/saves"));
        assert_eq!(config.frame_duration(), Duration::from_millis(20));
        assert_eq!(config.max_duration(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            HeadlessConfig::from_ron_str("HeadlessConfig(target_fps: 0)"),
            Err(HeadlessError::Game(_))
        ));
        assert!(matches!(
            HeadlessConfig::from_ron_str("HeadlessConfig(session: SessionConfig(map_size: 11))"),
            Err(HeadlessError::Game(_))
        ));
        assert!(matches!(
            HeadlessConfig::from_ron_str("HeadlessConfig(bogus: 1)"),
            Err(HeadlessError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            HeadlessConfig::load(dir.path().join("nope.ron")),
            Err(HeadlessError::ConfigNotFound(_))
        ));

        let path = dir.path().join("run.ron");
        std::fs::write(&path, "HeadlessConfig(target_fps: 10)").unwrap();
        assert_eq!(HeadlessConfig::load(&path).unwrap().target_fps, 10);
    }
}
