//! Session configuration.
//!
//! Pure data deserialized from RON. Reading the file is the caller's job;
//! this module only parses and validates strings.

use serde::{Deserialize, Serialize};

use crate::clock::GameSpeed;
use crate::error::{GameError, Result};
use crate::map::{MapGeometry, MAX_MAP_SIZE};

/// Slot counts of the four entity pools, sentinels included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolCapacities {
    /// Serf pool size.
    pub serfs: u32,
    /// Flag pool size.
    pub flags: u32,
    /// Building pool size.
    pub buildings: u32,
    /// Inventory pool size.
    pub inventories: u32,
}

impl PoolCapacities {
    /// Capacities for a map size class.
    ///
    /// Each pool grows linearly with the tile count of the class.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMapSize`] above [`MAX_MAP_SIZE`].
    pub fn for_map_size(size: u32) -> Result<Self> {
        if size > MAX_MAP_SIZE {
            return Err(GameError::InvalidMapSize(size));
        }
        let scale = 1u64 << size;
        let ratio = |numerator: u64, denominator: u64| ((numerator * scale - 4) / denominator) as u32;
        Ok(Self {
            serfs: ratio(0x1f84, 0x81),
            flags: ratio(0x2314, 0x231),
            buildings: ratio(0x54c, 0x91),
            inventories: ratio(0x54c, 0x3c1),
        })
    }
}

/// Configuration for a simulation session.
///
/// # Example RON
///
/// ```ron
/// SessionConfig(
///     map_size: 3,
///     initial_speed: 2,
///     autosave: true,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Map size class of new games, `0..=10`.
    #[serde(default = "default_map_size")]
    pub map_size: u32,

    /// Size class the pools are sized for.
    ///
    /// Pools are created once and never resized, so this defaults to the
    /// largest class and any map fits.
    #[serde(default = "default_capacity_map_size")]
    pub capacity_map_size: u32,

    /// Explicit pool sizes, overriding `capacity_map_size`.
    #[serde(default)]
    pub capacities: Option<PoolCapacities>,

    /// Starting speed in whole units.
    #[serde(default = "default_initial_speed")]
    pub initial_speed: u16,

    /// Whether phase wraparounds trigger an autosave.
    #[serde(default = "default_autosave")]
    pub autosave: bool,
}

fn default_map_size() -> u32 {
    3
}

fn default_capacity_map_size() -> u32 {
    MAX_MAP_SIZE
}

fn default_initial_speed() -> u16 {
    2
}

fn default_autosave() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            map_size: default_map_size(),
            capacity_map_size: default_capacity_map_size(),
            capacities: None,
            initial_speed: default_initial_speed(),
            autosave: default_autosave(),
        }
    }
}

impl SessionConfig {
    /// Parse and validate a RON document.
    ///
    /// `origin` names the source in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] when the document is malformed
    /// or fails validation.
    pub fn from_ron_str(contents: &str, origin: &str) -> Result<Self> {
        let config: Self = ron::from_str(contents).map_err(|e| GameError::DataParseError {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate().map_err(|e| GameError::DataParseError {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.geometry()?;
        let capacities = self.capacities()?;
        if [
            capacities.serfs,
            capacities.flags,
            capacities.buildings,
            capacities.inventories,
        ]
        .contains(&0)
        {
            return Err(GameError::InvalidState(
                "Pool capacities must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Map geometry of new games.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMapSize`] for an unsupported class.
    pub fn geometry(&self) -> Result<MapGeometry> {
        MapGeometry::from_size_class(self.map_size)
    }

    /// Effective pool capacities.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMapSize`] when derived from an
    /// unsupported class.
    pub fn capacities(&self) -> Result<PoolCapacities> {
        match self.capacities {
            Some(capacities) => Ok(capacities),
            None => PoolCapacities::for_map_size(self.capacity_map_size),
        }
    }

    /// Starting speed.
    #[must_use]
    pub const fn initial_speed(&self) -> GameSpeed {
        GameSpeed::from_units(self.initial_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacities_for_largest_map() {
        let caps = PoolCapacities::for_map_size(10).unwrap();
        assert_eq!(
            caps,
            PoolCapacities {
                serfs: 64_043,
                flags: 16_391,
                buildings: 9_576,
                inventories: 1_444,
            }
        );
    }

    #[test]
    fn test_capacities_for_smallest_map() {
        let caps = PoolCapacities::for_map_size(0).unwrap();
        assert_eq!(
            (caps.serfs, caps.flags, caps.buildings, caps.inventories),
            (62, 16, 9, 1)
        );
    }

    #[test]
    fn test_capacities_grow_with_size() {
        let mut previous = PoolCapacities::for_map_size(0).unwrap();
        for size in 1..=MAX_MAP_SIZE {
            let caps = PoolCapacities::for_map_size(size).unwrap();
            assert!(caps.serfs > previous.serfs);
            assert!(caps.flags > previous.flags);
            assert!(caps.buildings > previous.buildings);
            assert!(caps.inventories >= previous.inventories);
            previous = caps;
        }
        assert!(PoolCapacities::for_map_size(11).is_err());
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = SessionConfig::from_ron_str("SessionConfig(map_size: 2)", "inline").unwrap();
        assert_eq!(config.map_size, 2);
        assert_eq!(config.capacity_map_size, MAX_MAP_SIZE);
        assert_eq!(config.initial_speed(), GameSpeed::DEFAULT);
        assert!(config.autosave);
    }

    #[test]
    fn test_parse_explicit_capacities() {
        let source = r#"
            SessionConfig(
                map_size: 0,
                capacities: Some(PoolCapacities(serfs: 10, flags: 10, buildings: 5, inventories: 2)),
                initial_speed: 1,
                autosave: false,
            )
        "#;
        let config = SessionConfig::from_ron_str(source, "inline").unwrap();
        assert_eq!(config.capacities().unwrap().serfs, 10);
        assert_eq!(config.initial_speed(), GameSpeed::from_units(1));
        assert!(!config.autosave);
    }

    #[test]
    fn test_parse_errors_name_origin() {
        let err = SessionConfig::from_ron_str("SessionConfig(map_size: 42)", "game.ron")
            .unwrap_err();
        match err {
            GameError::DataParseError { path, .. } => assert_eq!(path, "game.ron"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(SessionConfig::from_ron_str("not ron at all", "x.ron").is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SessionConfig {
            capacities: Some(PoolCapacities {
                serfs: 0,
                flags: 1,
                buildings: 1,
                inventories: 1,
            }),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
