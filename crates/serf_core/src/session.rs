//! The session context.
//!
//! A [`Session`] owns every piece of mutable simulation state: the map
//! geometry, the spiral position table derived from it, the four entity
//! pools and the clock. Nothing lives in statics apart from the immutable
//! spiral pattern.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::clock::{ClockSnapshot, SimClock, TickReport};
use crate::config::{PoolCapacities, SessionConfig};
use crate::entities::{
    Building, BuildingType, Flag, Inventory, PlayerId, PoolRecord, Serf, SerfState, SerfType,
};
use crate::error::{GameError, Result};
use crate::map::{hex_distance, Direction, MapGeometry, MapPos};
use crate::pool::{EntityPool, Handle, PoolSnapshot};
use crate::spiral::{spiral_pattern, SpiralPosTable};

/// Everything a save needs to recreate a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Map dimensions.
    pub geometry: MapGeometry,
    /// Clock state.
    pub clock: ClockSnapshot,
    /// Live serfs.
    pub serfs: PoolSnapshot<Serf>,
    /// Live flags.
    pub flags: PoolSnapshot<Flag>,
    /// Live buildings.
    pub buildings: PoolSnapshot<Building>,
    /// Live inventories.
    pub inventories: PoolSnapshot<Inventory>,
}

/// Live counts per pool, sentinels excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PopulationSummary {
    /// Live serfs.
    pub serfs: u32,
    /// Live flags.
    pub flags: u32,
    /// Live buildings.
    pub buildings: u32,
    /// Live inventories.
    pub inventories: u32,
}

/// One running game.
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
    capacities: PoolCapacities,
    geometry: MapGeometry,
    spiral: SpiralPosTable,
    serfs: EntityPool<Serf>,
    flags: EntityPool<Flag>,
    buildings: EntityPool<Building>,
    inventories: EntityPool<Inventory>,
    clock: SimClock,
}

impl Session {
    /// Create pools and tables for `config` and start an empty game.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let capacities = config.capacities()?;
        let geometry = config.geometry()?;

        let session = Self {
            config: config.clone(),
            capacities,
            geometry,
            spiral: SpiralPosTable::new(spiral_pattern(), geometry),
            serfs: EntityPool::new(capacities.serfs)?,
            flags: EntityPool::new(capacities.flags)?,
            buildings: EntityPool::new(capacities.buildings)?,
            inventories: EntityPool::new(capacities.inventories)?,
            clock: SimClock::new(config.initial_speed()),
        };

        tracing::info!(
            cols = geometry.cols(),
            rows = geometry.rows(),
            serf_capacity = capacities.serfs,
            "Session created"
        );
        Ok(session)
    }

    /// Discard the current game and start an empty one on a map of class
    /// `map_size`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMapSize`] for an unsupported class; the
    /// current game is kept in that case.
    pub fn new_game(&mut self, map_size: u32) -> Result<()> {
        let geometry = MapGeometry::from_size_class(map_size)?;
        self.geometry = geometry;
        self.spiral.regenerate(geometry);
        self.serfs.reset();
        self.flags.reset();
        self.buildings.reset();
        self.inventories.reset();
        self.clock = SimClock::new(self.config.initial_speed());

        tracing::info!(map_size, cols = geometry.cols(), rows = geometry.rows(), "New game");
        Ok(())
    }

    /// Advance the clock one quantum and run the per-serf sweep.
    pub fn tick(&mut self) -> TickReport {
        let report = self.clock.advance();
        if report.anim_delta > 0 {
            let delta = report.anim_delta;
            self.serfs.sweep(|pool, serf| pool.get_mut(serf).advance(delta));
        }
        report
    }

    fn check_pos(&self, pos: MapPos) -> Result<()> {
        if self.geometry.contains(pos) {
            Ok(())
        } else {
            Err(GameError::InvalidState(format!(
                "Position {pos} outside {}x{} map",
                self.geometry.cols(),
                self.geometry.rows()
            )))
        }
    }

    fn check_live<T: PoolRecord>(pool: &EntityPool<T>, handle: Handle<T>) -> Result<()> {
        if pool.contains(handle) {
            Ok(())
        } else {
            Err(GameError::InvalidHandle {
                kind: T::KIND,
                index: handle.index(),
            })
        }
    }

    /// Place a flag.
    ///
    /// # Errors
    ///
    /// Fails when the position is off the map or the flag pool is full.
    pub fn spawn_flag(&mut self, player: PlayerId, pos: MapPos) -> Result<Handle<Flag>> {
        self.check_pos(pos)?;
        let (handle, flag) = self.flags.allocate()?;
        flag.player = player;
        flag.pos = pos;
        tracing::debug!(%handle, player, %pos, "Flag placed");
        Ok(handle)
    }

    /// Place a building at `pos` with its flag one step down-right.
    ///
    /// Castles and stocks also get an inventory. Nothing is allocated when
    /// any of the pools involved is full.
    ///
    /// # Errors
    ///
    /// Fails when the position is off the map or a pool is exhausted.
    pub fn spawn_building(
        &mut self,
        player: PlayerId,
        pos: MapPos,
        building_type: BuildingType,
    ) -> Result<Handle<Building>> {
        self.check_pos(pos)?;
        let flag_pos = self.geometry.move_in(pos, Direction::DownRight);
        let flag = self.spawn_flag(player, flag_pos)?;

        let building = match self.buildings.allocate() {
            Ok((handle, record)) => {
                *record = Building {
                    player,
                    pos,
                    building_type,
                    flag,
                    inventory: Handle::NULL,
                };
                handle
            }
            Err(e) => {
                self.flags.deallocate(flag)?;
                return Err(e);
            }
        };

        if building_type.has_inventory() {
            if let Err(e) = self.spawn_inventory(building) {
                self.buildings.deallocate(building)?;
                self.flags.deallocate(flag)?;
                return Err(e);
            }
        }

        tracing::debug!(%building, ?building_type, player, %pos, "Building placed");
        Ok(building)
    }

    /// Attach a new inventory to a live building.
    ///
    /// # Errors
    ///
    /// Fails for a dead building handle or a full inventory pool.
    pub fn spawn_inventory(&mut self, building: Handle<Building>) -> Result<Handle<Inventory>> {
        Self::check_live(&self.buildings, building)?;
        let owner = self.buildings.get(building).clone();
        let (handle, inventory) = self.inventories.allocate()?;
        inventory.player = owner.player;
        inventory.building = building;
        inventory.flag = owner.flag;
        self.buildings.get_mut(building).inventory = handle;
        Ok(handle)
    }

    /// Create an idle serf.
    ///
    /// # Errors
    ///
    /// Fails when the position is off the map or the serf pool is full.
    pub fn spawn_serf(
        &mut self,
        player: PlayerId,
        serf_type: SerfType,
        pos: Option<MapPos>,
    ) -> Result<Handle<Serf>> {
        if let Some(pos) = pos {
            self.check_pos(pos)?;
        }
        let (handle, serf) = self.serfs.allocate()?;
        serf.player = player;
        serf.serf_type = serf_type;
        serf.pos = pos;
        serf.state = SerfState::Idle;
        Ok(handle)
    }

    /// Send a serf one tile in `dir`, taking `duration` animation phases.
    ///
    /// # Errors
    ///
    /// Fails for a dead handle or a serf that is not on the map.
    pub fn start_walk(&mut self, serf: Handle<Serf>, dir: Direction, duration: i32) -> Result<()> {
        Self::check_live(&self.serfs, serf)?;
        let geometry = self.geometry;
        let record = self.serfs.get_mut(serf);
        let Some(pos) = record.pos else {
            return Err(GameError::InvalidState(format!(
                "Serf {serf} is not on the map"
            )));
        };
        record.walk(geometry.move_in(pos, dir), dir, duration);
        Ok(())
    }

    /// Remove a serf.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidHandle`] for a dead handle.
    pub fn despawn_serf(&mut self, serf: Handle<Serf>) -> Result<()> {
        self.serfs.deallocate(serf)
    }

    /// Remove a flag.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidHandle`] for a dead handle.
    pub fn despawn_flag(&mut self, flag: Handle<Flag>) -> Result<()> {
        self.flags.deallocate(flag)
    }

    /// Remove a building and its inventory. The flag stays.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidHandle`] for a dead handle.
    pub fn despawn_building(&mut self, building: Handle<Building>) -> Result<()> {
        Self::check_live(&self.buildings, building)?;
        let inventory = self.buildings.get(building).inventory;
        if self.inventories.contains(inventory) {
            self.inventories.deallocate(inventory)?;
        }
        self.buildings.deallocate(building)
    }

    /// Remove an inventory and unlink it from its building.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidHandle`] for a dead handle.
    pub fn despawn_inventory(&mut self, inventory: Handle<Inventory>) -> Result<()> {
        let building = self
            .inventories
            .try_get(inventory)
            .map(|record| record.building);
        self.inventories.deallocate(inventory)?;
        if let Some(building) = building {
            if let Some(record) = self.buildings.try_get_mut(building) {
                if record.inventory == inventory {
                    record.inventory = Handle::NULL;
                }
            }
        }
        Ok(())
    }

    /// First tile in spiral order around `center`, at most `radius` steps
    /// away, accepted by `predicate`.
    pub fn spiral_search<F>(&self, center: MapPos, radius: u32, mut predicate: F) -> Option<MapPos>
    where
        F: FnMut(MapPos) -> bool,
    {
        let count = spiral_pattern().entries_within(radius);
        self.spiral
            .around(center)
            .take(count)
            .find(|&pos| predicate(pos))
    }

    /// Nearest tile to `center` without a flag, within `radius` steps.
    #[must_use]
    pub fn nearest_free_flag_spot(&self, center: MapPos, radius: u32) -> Option<MapPos> {
        let taken: HashSet<MapPos> = self.flags.iter().map(|(_, flag)| flag.pos).collect();
        self.spiral_search(center, radius, |pos| !taken.contains(&pos))
    }

    /// Ring distance between two tiles, taking wraparound into account.
    #[must_use]
    pub fn distance(&self, from: MapPos, to: MapPos) -> u32 {
        let wrap = |a: u32, b: u32, size: u32| {
            let d = b.wrapping_sub(a) & (size - 1);
            if d > size / 2 {
                d as i32 - size as i32
            } else {
                d as i32
            }
        };
        let (fc, fr) = self.geometry.decode(from);
        let (tc, tr) = self.geometry.decode(to);
        hex_distance(
            wrap(fc, tc, self.geometry.cols()),
            wrap(fr, tr, self.geometry.rows()),
        )
    }

    /// Configuration the session was created with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Pool sizes.
    #[must_use]
    pub const fn capacities(&self) -> PoolCapacities {
        self.capacities
    }

    /// Current map geometry.
    #[must_use]
    pub const fn geometry(&self) -> MapGeometry {
        self.geometry
    }

    /// Spiral table for the current geometry.
    #[must_use]
    pub const fn spiral_positions(&self) -> &SpiralPosTable {
        &self.spiral
    }

    /// The clock.
    #[must_use]
    pub const fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Mutable clock, for speed commands.
    pub fn clock_mut(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    /// Serf pool.
    #[must_use]
    pub const fn serfs(&self) -> &EntityPool<Serf> {
        &self.serfs
    }

    /// Mutable serf pool.
    pub fn serfs_mut(&mut self) -> &mut EntityPool<Serf> {
        &mut self.serfs
    }

    /// Flag pool.
    #[must_use]
    pub const fn flags(&self) -> &EntityPool<Flag> {
        &self.flags
    }

    /// Mutable flag pool.
    pub fn flags_mut(&mut self) -> &mut EntityPool<Flag> {
        &mut self.flags
    }

    /// Building pool.
    #[must_use]
    pub const fn buildings(&self) -> &EntityPool<Building> {
        &self.buildings
    }

    /// Mutable building pool.
    pub fn buildings_mut(&mut self) -> &mut EntityPool<Building> {
        &mut self.buildings
    }

    /// Inventory pool.
    #[must_use]
    pub const fn inventories(&self) -> &EntityPool<Inventory> {
        &self.inventories
    }

    /// Mutable inventory pool.
    pub fn inventories_mut(&mut self) -> &mut EntityPool<Inventory> {
        &mut self.inventories
    }

    /// Live counts per pool.
    #[must_use]
    pub const fn population(&self) -> PopulationSummary {
        PopulationSummary {
            serfs: self.serfs.len(),
            flags: self.flags.len(),
            buildings: self.buildings.len(),
            inventories: self.inventories.len(),
        }
    }

    /// Capture everything needed to restore this game.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            geometry: self.geometry,
            clock: self.clock.snapshot(),
            serfs: self.serfs.snapshot(),
            flags: self.flags.snapshot(),
            buildings: self.buildings.snapshot(),
            inventories: self.inventories.snapshot(),
        }
    }

    /// Replace the game with a snapshot.
    ///
    /// The new pools and spiral table are built completely before anything
    /// is swapped in, so on error the session is exactly as before.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot does not fit this session's pool
    /// capacities or holds positions outside its own map.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Result<()> {
        let geometry = snapshot.geometry;
        if let Some(bad) = snapshot
            .flags
            .records
            .iter()
            .map(|(_, flag)| flag.pos)
            .chain(snapshot.buildings.records.iter().map(|(_, b)| b.pos))
            .chain(snapshot.serfs.records.iter().filter_map(|(_, s)| s.pos))
            .find(|&pos| !geometry.contains(pos))
        {
            return Err(GameError::InvalidState(format!(
                "Saved position {bad} outside {}x{} map",
                geometry.cols(),
                geometry.rows()
            )));
        }

        let serfs = EntityPool::from_snapshot(self.capacities.serfs, snapshot.serfs)?;
        let flags = EntityPool::from_snapshot(self.capacities.flags, snapshot.flags)?;
        let buildings = EntityPool::from_snapshot(self.capacities.buildings, snapshot.buildings)?;
        let inventories =
            EntityPool::from_snapshot(self.capacities.inventories, snapshot.inventories)?;
        let mut spiral = self.spiral.clone();
        spiral.regenerate(geometry);

        self.geometry = geometry;
        self.spiral = spiral;
        self.serfs = serfs;
        self.flags = flags;
        self.buildings = buildings;
        self.inventories = inventories;
        self.clock.restore(snapshot.clock);

        tracing::info!(
            tick = self.clock.tick(),
            serfs = self.serfs.len(),
            buildings = self.buildings.len(),
            "Session restored"
        );
        Ok(())
    }

    /// Hash of the full simulation state for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.geometry.hash(&mut hasher);
        self.clock.snapshot().hash(&mut hasher);

        hash_pool(&self.serfs, &mut hasher);
        hash_pool(&self.flags, &mut hasher);
        hash_pool(&self.buildings, &mut hasher);
        hash_pool(&self.inventories, &mut hasher);

        hasher.finish()
    }
}

fn hash_pool<T: PoolRecord + Hash>(pool: &EntityPool<T>, hasher: &mut DefaultHasher) {
    pool.len().hash(hasher);
    pool.max_ever_index().hash(hasher);
    pool.for_each_allocated(|handle, record| {
        handle.hash(hasher);
        record.hash(hasher);
    });
}
