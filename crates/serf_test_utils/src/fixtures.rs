//! Test fixtures and helpers.
//!
//! Pre-built sessions and configurations for consistent testing.

use serf_core::clock::GameSpeed;
use serf_core::config::{PoolCapacities, SessionConfig};
use serf_core::entities::{BuildingType, SerfType};
use serf_core::map::Direction;
use serf_core::session::Session;

/// Pool sizes small enough to exhaust in a test.
#[must_use]
pub const fn small_capacities() -> PoolCapacities {
    PoolCapacities {
        serfs: 64,
        flags: 32,
        buildings: 16,
        inventories: 4,
    }
}

/// A 64x64 map with small pools.
#[must_use]
pub fn small_config() -> SessionConfig {
    SessionConfig {
        map_size: 3,
        capacities: Some(small_capacities()),
        ..SessionConfig::default()
    }
}

/// Empty session built from [`small_config`].
///
/// # Panics
///
/// Panics if the fixture configuration is rejected.
#[must_use]
pub fn small_session() -> Session {
    Session::new(&small_config()).expect("fixture config is valid")
}

/// A session with a castle, a few huts and serfs walking around.
///
/// Serfs have varied countdowns so ticks keep changing state for a while.
///
/// # Panics
///
/// Panics if the fixture does not fit the small pools.
#[must_use]
pub fn populated_session() -> Session {
    let mut session = small_session();
    let geo = session.geometry();

    session
        .spawn_building(0, geo.encode(10, 10), BuildingType::Castle)
        .expect("castle fits");
    for i in 0..4 {
        session
            .spawn_building(0, geo.encode(14 + 3 * i, 8), BuildingType::Hut)
            .expect("hut fits");
    }

    for i in 0..20 {
        let pos = geo.encode(5 + i, 20 - i);
        let serf = session
            .spawn_serf(0, SerfType::Transporter, Some(pos))
            .expect("serf fits");
        let dir = Direction::ALL[i as usize % Direction::ALL.len()];
        session
            .start_walk(serf, dir, 10 + 7 * i)
            .expect("serf is on the map");
    }
    session
}

/// A speed schedule: `(speed, ticks)` segments applied in order.
pub type SpeedSchedule = Vec<(GameSpeed, u32)>;

/// Tick `session` through every segment of `schedule`.
pub fn run_schedule(session: &mut Session, schedule: &[(GameSpeed, u32)]) {
    for &(speed, ticks) in schedule {
        session.clock_mut().set_speed(speed);
        for _ in 0..ticks {
            session.tick();
        }
    }
}

/// A schedule mixing normal play, a pause and a fast-forward.
#[must_use]
pub fn mixed_schedule() -> SpeedSchedule {
    vec![
        (GameSpeed::DEFAULT, 100),
        (GameSpeed::PAUSED, 30),
        (GameSpeed::from_units(1), 50),
        (GameSpeed::from_bits(0x1_8000), 70),
        (GameSpeed::from_units(12), 40),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_populated_session_contents() {
        let session = populated_session();
        let population = session.population();
        assert_eq!(population.buildings, 5);
        assert_eq!(population.flags, 5);
        assert_eq!(population.inventories, 1);
        assert_eq!(population.serfs, 20);
    }

    #[test]
    fn test_run_schedule_advances_clock() {
        let mut session = small_session();
        run_schedule(&mut session, &mixed_schedule());
        let expected = 100 * 0x2_0000 + 50 * 0x1_0000 + 70 * 0x1_8000 + 40 * 0xc_0000;
        assert_eq!(session.clock().tick(), expected);
    }
}
