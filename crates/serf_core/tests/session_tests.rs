//! Integration tests for sessions, pools and the driver.

use std::path::Path;
use std::time::Duration;

use proptest::prelude::*;
use serf_core::config::SessionConfig;
use serf_core::driver::{DriverCommand, SessionDriver};
use serf_core::entities::{EntityKind, Flag, Serf, SerfType};
use serf_core::error::{GameError, PersistOp};
use serf_core::map::{MapGeometry, MapPos};
use serf_core::persistence::{MemoryStore, SaveFile};
use serf_core::pool::{EntityPool, Handle, PoolSnapshot};
use serf_core::session::Session;
use serf_core::spiral::SPIRAL_LEN;
use serf_test_utils::determinism::strategies::{
    arb_coordinate, arb_direction, arb_map_size, arb_pool_ops, arb_speed_schedule, PoolOp,
};
use serf_test_utils::determinism::{verify_snapshot_roundtrip, DeterminismResult};
use serf_test_utils::fixtures::{populated_session, run_schedule, small_config, small_session};

#[test]
fn test_exhaust_then_reuse_scenario() {
    let mut pool: EntityPool<Serf> = EntityPool::new(10).unwrap();
    let handles: Vec<Handle<Serf>> = (0..9).map(|_| pool.allocate().unwrap().0).collect();
    assert_eq!(
        handles.iter().map(|h| h.index()).collect::<Vec<_>>(),
        (1..=9).collect::<Vec<_>>()
    );

    let err = pool.allocate().unwrap_err();
    assert!(matches!(err, GameError::ResourceExhausted { capacity: 10, .. }));

    pool.deallocate(handles[4]).unwrap();
    let (reused, _) = pool.allocate().unwrap();
    assert_eq!(reused.index(), 5);
    assert_eq!(pool.max_ever_index(), 9);
}

#[test]
fn test_pool_exhaustion_is_not_fatal_to_session() {
    let mut session = small_session();
    let capacity = session.capacities().serfs;
    for _ in 1..capacity {
        session.spawn_serf(0, SerfType::Transporter, None).unwrap();
    }
    assert!(matches!(
        session.spawn_serf(0, SerfType::Transporter, None),
        Err(GameError::ResourceExhausted {
            kind: EntityKind::Serf,
            ..
        })
    ));

    // Other pools and the clock keep working.
    session.spawn_flag(0, MapPos::ORIGIN).unwrap();
    session.tick();
    assert_eq!(session.population().serfs, capacity - 1);
}

#[test]
fn test_driver_full_cycle() {
    let session = populated_session();
    let mut driver = SessionDriver::new(session, MemoryStore::new());

    for _ in 0..50 {
        driver.advance_frame(Duration::from_millis(33));
    }
    assert_eq!(driver.stats().frames, 50);
    assert_eq!(driver.stats().ticks, 82);

    let saved_hash = driver.session().state_hash();
    let path = driver.save_now().unwrap();

    driver.handle(DriverCommand::NewGame(5)).unwrap();
    assert_eq!(driver.session().population().serfs, 0);

    driver.handle(DriverCommand::Load(path)).unwrap();
    assert_eq!(driver.session().state_hash(), saved_hash);
    assert_eq!(driver.session().geometry().cols(), 64);
}

#[test]
fn test_autosave_cadence_over_long_run() {
    let mut config = small_config();
    config.initial_speed = 64;
    let mut driver = SessionDriver::new(Session::new(&config).unwrap(), MemoryStore::new());

    // 64 phases per tick wrap the 16-bit phase every 1024 ticks.
    let report = driver.run_ticks(4096);
    assert_eq!(report.autosaves, 4);

    driver.handle(DriverCommand::Pause).unwrap();
    assert_eq!(driver.run_ticks(4096).autosaves, 0);
    driver.handle(DriverCommand::Resume).unwrap();
    assert_eq!(driver.run_ticks(1024).autosaves, 1);
    assert_eq!(driver.store().writes(), 5);
}

#[test]
fn test_spiral_table_follows_loaded_geometry() {
    let mut big = Session::new(&SessionConfig {
        map_size: 6,
        ..small_config()
    })
    .unwrap();
    big.spawn_flag(1, big.geometry().encode(200, 3)).unwrap();
    let snapshot = big.snapshot();

    let mut session = small_session();
    assert_eq!(session.geometry().cols(), 64);
    session.restore(snapshot).unwrap();
    assert_eq!(session.geometry().cols(), 256);
    assert_eq!(session.spiral_positions().geometry(), session.geometry());
    assert_eq!(session.spiral_positions().positions().len(), SPIRAL_LEN);

    let center = session.geometry().encode(255, 0);
    let first_ring: Vec<MapPos> = session
        .spiral_positions()
        .around(center)
        .skip(1)
        .take(6)
        .collect();
    assert_eq!(first_ring[0], session.geometry().encode(0, 0));
}

#[test]
fn test_snapshot_bytes_are_stable() {
    let bytes = |session: &Session| {
        serf_core::persistence::SaveFile::new(session.snapshot())
            .encode(serf_core::error::PersistOp::Save)
            .unwrap()
    };
    let mut a = populated_session();
    let mut b = populated_session();
    for _ in 0..120 {
        a.tick();
        b.tick();
    }
    assert_eq!(bytes(&a), bytes(&b));
    assert!(verify_snapshot_roundtrip(populated_session, 120));
}

#[test]
fn test_corrupt_snapshot_rejected_without_side_effects() {
    let mut session = populated_session();
    let before = session.state_hash();
    let mut snapshot = session.snapshot();
    snapshot.serfs = PoolSnapshot {
        max_ever_index: 3,
        records: vec![(3, Serf::default()), (1, Serf::default())],
    };
    assert!(session.restore(snapshot).is_err());
    assert_eq!(session.state_hash(), before);
}

#[test]
fn test_save_with_bad_map_dimensions_rejected() {
    let mut driver = SessionDriver::new(populated_session(), MemoryStore::new());
    let saved = driver.save_now().unwrap();
    let before = driver.session().state_hash();

    // Bytes 4..12 hold the column and row bit widths after the version.
    let good = driver.store().bytes(&saved).unwrap().to_vec();
    for (col_bits, row_bits) in [(40u32, 6u32), (0, 20), (20, 20)] {
        let mut bytes = good.clone();
        bytes[4..8].copy_from_slice(&col_bits.to_le_bytes());
        bytes[8..12].copy_from_slice(&row_bits.to_le_bytes());
        assert!(matches!(
            SaveFile::decode(&bytes),
            Err(GameError::PersistenceFailure {
                operation: PersistOp::Load,
                ..
            })
        ));

        driver.store_mut().insert_bytes("bad.save", bytes);
        let err = driver.load(Path::new("bad.save")).unwrap_err();
        assert!(err.is_persistence(), "{col_bits}x{row_bits}: {err}");
        assert_eq!(driver.session().state_hash(), before);
    }

    driver.load(&saved).unwrap();
    assert_eq!(driver.session().state_hash(), before);
}

proptest! {
    #[test]
    fn prop_pool_invariants(ops in arb_pool_ops(24, 200)) {
        let mut pool: EntityPool<Flag> = EntityPool::new(24).unwrap();
        let mut returned = Vec::new();
        for op in ops {
            match op {
                PoolOp::Allocate => {
                    let before = (pool.bitmap().to_vec(), pool.max_ever_index());
                    match pool.allocate().map(|(handle, _)| handle) {
                        Ok(handle) => returned.push(handle.index()),
                        Err(_) => {
                            prop_assert_eq!(
                                (pool.bitmap().to_vec(), pool.max_ever_index()),
                                before
                            );
                        }
                    }
                }
                PoolOp::Deallocate(index) => {
                    if pool.contains(Handle::from_raw(index)) {
                        pool.deallocate(Handle::from_raw(index)).unwrap();
                    }
                }
            }
            prop_assert_eq!(pool.occupied_slots(), pool.len() + 1);
            prop_assert!(pool.is_allocated(0));
            prop_assert!(returned.iter().all(|&i| i != 0 && i <= pool.max_ever_index()));
        }
    }

    #[test]
    fn prop_encode_wraps_on_every_map(
        size in arb_map_size(),
        x in arb_coordinate(),
        y in arb_coordinate(),
        dir in arb_direction(),
    ) {
        let geo = MapGeometry::from_size_class(size).unwrap();
        let pos = geo.encode(x, y);
        let (dx, dy) = dir.offset();
        prop_assert_eq!(geo.move_in(pos, dir), geo.encode(x + dx, y + dy));
        prop_assert_eq!(geo.move_in(geo.move_in(pos, dir), dir.reverse()), pos);
    }

    #[test]
    fn prop_schedules_reproducible_and_restorable(schedule in arb_speed_schedule(6)) {
        let run = || {
            let mut session = populated_session();
            run_schedule(&mut session, &schedule);
            session
        };
        let first = run();
        let second = run();
        let result = DeterminismResult {
            is_deterministic: first.state_hash() == second.state_hash(),
            hashes: vec![first.state_hash(), second.state_hash()],
            ticks: schedule.iter().map(|&(_, ticks)| u64::from(ticks)).sum(),
        };
        prop_assert!(result.is_deterministic, "{:?}", result);

        let mut restored = small_session();
        restored.restore(first.snapshot()).unwrap();
        prop_assert_eq!(restored.state_hash(), first.state_hash());
    }
}
