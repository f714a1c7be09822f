//! Entity records stored in the four pools.
//!
//! Records are plain data. Identity lives in the pool slot, so records
//! refer to each other through typed [`Handle`]s rather than references.

use serde::{Deserialize, Serialize};

use crate::map::{Direction, MapPos};
use crate::pool::Handle;

/// The four pooled entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Settlers.
    Serf,
    /// Road junction flags.
    Flag,
    /// Buildings of any type.
    Building,
    /// Storage attached to castles and warehouses.
    Inventory,
}

impl EntityKind {
    /// All kinds, in save order.
    pub const ALL: [Self; 4] = [Self::Serf, Self::Flag, Self::Building, Self::Inventory];

    /// Lowercase name used in logs and messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Serf => "serf",
            Self::Flag => "flag",
            Self::Building => "building",
            Self::Inventory => "inventory",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A record type that can live in an [`EntityPool`](crate::pool::EntityPool).
///
/// `Default` is the zeroed record written on allocation.
pub trait PoolRecord: Default + Clone {
    /// Kind reported in errors and logs.
    const KIND: EntityKind;

    /// Record stored in the reserved slot 0.
    ///
    /// Defaults to the zeroed record.
    fn sentinel() -> Self {
        Self::default()
    }
}

/// Player index, `0..4`.
pub type PlayerId = u8;

/// Serf behaviour state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SerfState {
    /// Not a real serf (sentinel or freshly allocated).
    #[default]
    Null,
    /// Standing still, waiting for work.
    Idle,
    /// Moving between tiles; the counter measures the remaining step.
    Walking,
    /// Carrying a resource along a road.
    Transporting,
    /// Working inside a building.
    Working,
}

/// Serf profession.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SerfType {
    /// Road carrier.
    #[default]
    Transporter,
    /// Building construction.
    Builder,
    /// Terrain flattening before construction.
    Digger,
    /// Fells trees.
    Lumberjack,
    /// Breaks stones.
    Stonecutter,
    /// Military unit.
    Knight,
    /// Any other profession, by its numeric type.
    Other(u8),
}

/// Animation selector of a serf walking in the first direction.
///
/// Walking in direction `n` (clockwise from [`Direction::Right`]) uses
/// `WALK_ANIMATION + n`.
pub const WALK_ANIMATION: u16 = 0x80;

/// A settler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Serf {
    /// Behaviour state.
    pub state: SerfState,
    /// Profession.
    pub serf_type: SerfType,
    /// Owning player.
    pub player: PlayerId,
    /// Current tile; `None` while inside a building or for the sentinel.
    pub pos: Option<MapPos>,
    /// Animation selector; 0 while standing.
    pub animation: u16,
    /// Countdown in animation phases until the current action finishes.
    pub counter: i32,
}

impl Serf {
    /// Start walking onto `to`, arriving after `duration` animation phases.
    pub fn walk(&mut self, to: MapPos, dir: Direction, duration: i32) {
        self.pos = Some(to);
        self.state = SerfState::Walking;
        self.animation = WALK_ANIMATION + dir as u16;
        self.counter = duration.max(1);
    }

    /// Advance the per-serf countdown by `anim_delta` phases.
    ///
    /// A walking serf whose countdown has run out stops and becomes idle.
    pub fn advance(&mut self, anim_delta: u32) {
        if self.counter > 0 {
            let delta = i32::try_from(anim_delta).unwrap_or(i32::MAX);
            self.counter = self.counter.saturating_sub(delta).max(0);
            if self.counter == 0 && self.state == SerfState::Walking {
                self.state = SerfState::Idle;
                self.animation = 0;
            }
        }
    }
}

impl PoolRecord for Serf {
    const KIND: EntityKind = EntityKind::Serf;
}

/// A road flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Flag {
    /// Owning player.
    pub player: PlayerId,
    /// Tile the flag stands on.
    pub pos: MapPos,
}

impl PoolRecord for Flag {
    const KIND: EntityKind = EntityKind::Flag;
}

/// Building type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildingType {
    /// No building.
    #[default]
    None,
    /// Player headquarters; owns an inventory.
    Castle,
    /// Storage building; owns an inventory.
    Stock,
    /// Wood cutter's hut.
    Lumberjack,
    /// Stone cutter's hut.
    Stonecutter,
    /// Military hut.
    Hut,
}

impl BuildingType {
    /// Whether buildings of this type carry an inventory.
    #[must_use]
    pub const fn has_inventory(self) -> bool {
        matches!(self, Self::Castle | Self::Stock)
    }
}

/// A building.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Building {
    /// Owning player.
    pub player: PlayerId,
    /// Tile the building occupies.
    pub pos: MapPos,
    /// Building type.
    pub building_type: BuildingType,
    /// Flag in front of the building.
    pub flag: Handle<Flag>,
    /// Inventory for castles and stocks, otherwise `NULL`.
    pub inventory: Handle<Inventory>,
}

impl PoolRecord for Building {
    const KIND: EntityKind = EntityKind::Building;
}

/// Number of resource types tracked by an inventory.
pub const RESOURCE_TYPES: usize = 26;

/// Resource storage of a castle or stock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// Owning player.
    pub player: PlayerId,
    /// Building holding this inventory.
    pub building: Handle<Building>,
    /// Flag of that building.
    pub flag: Handle<Flag>,
    /// Stored amount per resource type.
    pub resources: [u16; RESOURCE_TYPES],
}

impl Inventory {
    /// Stored amount of `resource`; 0 for unknown types.
    #[must_use]
    pub fn count(&self, resource: usize) -> u16 {
        self.resources.get(resource).copied().unwrap_or(0)
    }

    /// Add `amount` of `resource`, saturating at `u16::MAX`.
    ///
    /// Returns `false` for unknown resource types.
    pub fn store(&mut self, resource: usize, amount: u16) -> bool {
        match self.resources.get_mut(resource) {
            Some(stored) => {
                *stored = stored.saturating_add(amount);
                true
            }
            None => false,
        }
    }

    /// Remove `amount` of `resource` if that much is in stock.
    pub fn take(&mut self, resource: usize, amount: u16) -> bool {
        match self.resources.get_mut(resource) {
            Some(stored) if *stored >= amount => {
                *stored -= amount;
                true
            }
            _ => false,
        }
    }
}

impl PoolRecord for Inventory {
    const KIND: EntityKind = EntityKind::Inventory;
}
