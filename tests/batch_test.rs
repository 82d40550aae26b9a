//! Batch Atomicity Tests
//!
//! Tests the invariants around batches:
//! - Rollback restores the row set and the id counter
//! - Commit makes every handle created in the batch queryable
//! - The scoped guard rolls back unless committed
//! - Operations inside a batch see each other's effects

mod common;

use spatialcalc::{Coord, Handle};

#[test]
fn rollback_restores_pre_batch_state() {
    let mut ws = common::memory_workspace();
    let before: Vec<Handle> = (0..3)
        .map(|i| ws.create_point(&Coord::xy(i as f64, 0.0)).unwrap())
        .collect();
    let count = ws.geometry_count().unwrap();

    ws.begin_batch().unwrap();
    assert!(ws.is_batching());
    let inside: Vec<Handle> = (0..10)
        .map(|i| ws.create_point(&Coord::xy(i as f64, 1.0)).unwrap())
        .collect();
    assert_eq!(ws.geometry_count().unwrap(), count + 10);
    ws.end_batch(false).unwrap();

    assert!(!ws.is_batching());
    assert_eq!(ws.geometry_count().unwrap(), count);
    for &h in &before {
        assert!(ws.geometry(h).unwrap().is_some());
    }
    for &h in &inside {
        assert_eq!(ws.geometry(h).unwrap(), None);
    }

    // The id counter was rolled back with the rows.
    let next = ws.create_point(&Coord::xy(0.0, 0.0)).unwrap();
    assert_eq!(next, inside[0]);
}

#[test]
fn commit_keeps_every_handle() {
    let mut ws = common::memory_workspace();

    ws.begin_batch().unwrap();
    let inside: Vec<Handle> = (0..10)
        .map(|i| ws.create_point(&Coord::xy(i as f64, 1.0)).unwrap())
        .collect();
    ws.end_batch(true).unwrap();

    assert_eq!(ws.geometry_count().unwrap(), 10);
    for (i, &h) in inside.iter().enumerate() {
        assert_eq!(
            ws.geometry(h).unwrap(),
            Some(spatialcalc::Geometry::Point(Coord::xy(i as f64, 1.0)))
        );
    }
}

#[test]
fn rollback_undoes_updates_and_deletes() {
    let mut ws = common::memory_workspace();
    let a = common::unit_square(&mut ws, 0.0, 0.0);
    let b = common::unit_square(&mut ws, 0.5, 0.5);
    let a_blob = ws.geometry_blob(a).unwrap();

    ws.begin_batch().unwrap();
    ws.union_into(a, b, a).unwrap();
    ws.delete_geometry(b).unwrap();
    ws.end_batch(false).unwrap();

    assert_eq!(ws.geometry_blob(a).unwrap(), a_blob);
    assert!(ws.geometry(b).unwrap().is_some());
}

#[test]
fn rollback_undoes_clear() {
    let mut ws = common::memory_workspace();
    let h = ws.create_point(&Coord::xy(1.0, 1.0)).unwrap();

    ws.begin_batch().unwrap();
    ws.clear().unwrap();
    assert_eq!(ws.geometry(h).unwrap(), None);
    ws.end_batch(false).unwrap();

    assert!(ws.geometry(h).unwrap().is_some());
}

#[test]
fn operations_in_a_batch_see_earlier_ones() {
    let mut ws = common::memory_workspace();

    let mut batch = ws.batch().unwrap();
    let a = common::unit_square(&mut batch, 0.0, 0.0);
    let b = common::unit_square(&mut batch, 0.5, 0.5);
    assert!(batch.intersects(a, b).unwrap());
    let i = batch.intersection(a, b).unwrap();
    common::assert_close(common::area_of(&mut batch, i), 0.25);
    batch.commit().unwrap();

    assert!(!ws.is_batching());
    assert_eq!(ws.geometry_count().unwrap(), 3);
}

#[test]
fn dropped_guard_rolls_back() {
    let mut ws = common::memory_workspace();

    {
        let mut batch = ws.batch().unwrap();
        batch.create_point(&Coord::xy(1.0, 1.0)).unwrap();
        batch.create_point(&Coord::xy(2.0, 2.0)).unwrap();
    }

    assert!(!ws.is_batching());
    assert_eq!(ws.geometry_count().unwrap(), 0);
}

#[test]
fn explicit_guard_rollback() {
    let mut ws = common::memory_workspace();
    ws.create_point(&Coord::xy(0.0, 0.0)).unwrap();

    let mut batch = ws.batch().unwrap();
    batch.create_point(&Coord::xy(1.0, 1.0)).unwrap();
    batch.rollback().unwrap();

    assert_eq!(ws.geometry_count().unwrap(), 1);
}

#[test]
fn batch_guard_propagates_errors_and_rolls_back() {
    fn load(ws: &mut spatialcalc::Workspace) -> spatialcalc::Result<()> {
        let mut batch = ws.batch()?;
        batch.create_point(&Coord::xy(1.0, 1.0))?;
        batch.create_geometry_from_wkt("NOT WKT")?;
        batch.commit()
    }

    let mut ws = common::memory_workspace();
    assert!(matches!(load(&mut ws), Err(spatialcalc::Error::Parse(_))));
    assert_eq!(ws.geometry_count().unwrap(), 0);
}

#[test]
fn batches_can_follow_each_other() {
    let mut ws = common::memory_workspace();
    for round in 0..3 {
        ws.begin_batch().unwrap();
        ws.create_point(&Coord::xy(round as f64, 0.0)).unwrap();
        ws.end_batch(round % 2 == 0).unwrap();
    }
    assert_eq!(ws.geometry_count().unwrap(), 2);
}

#[test]
fn file_backed_batches() {
    let (_dir, root) = common::isolated_root();
    let mut ws = common::file_workspace(&root);

    ws.begin_batch().unwrap();
    for i in 0..100 {
        ws.create_point(&Coord::xy(i as f64, i as f64)).unwrap();
    }
    ws.end_batch(true).unwrap();
    assert_eq!(ws.geometry_count().unwrap(), 100);

    ws.begin_batch().unwrap();
    ws.clear().unwrap();
    ws.end_batch(false).unwrap();
    assert_eq!(ws.geometry_count().unwrap(), 100);

    ws.dispose().unwrap();
}

#[test]
#[should_panic(expected = "already open")]
fn nested_begin_is_a_usage_error() {
    let mut ws = common::memory_workspace();
    ws.begin_batch().unwrap();
    let _ = ws.begin_batch();
}

#[test]
#[should_panic(expected = "without an open batch")]
fn end_without_begin_is_a_usage_error() {
    let mut ws = common::memory_workspace();
    let _ = ws.end_batch(true);
}
