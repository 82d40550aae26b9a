#![allow(dead_code)]

use std::sync::Arc;

use geo::Area;
use spatialcalc::{Coord, Geometry, Handle, TempRoot, Workspace, WorkspaceBuilder};

pub fn memory_workspace() -> Workspace {
    WorkspaceBuilder::new()
        .in_memory()
        .build()
        .expect("open in-memory workspace")
}

pub fn memory_workspace_3d() -> Workspace {
    WorkspaceBuilder::new()
        .in_memory()
        .include_point_z_dimension()
        .build()
        .expect("open in-memory 3D workspace")
}

/// A temp root in its own directory, so tests never touch the shared one.
pub fn isolated_root() -> (tempfile::TempDir, Arc<TempRoot>) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let root = TempRoot::new(dir.path());
    (dir, root)
}

pub fn file_workspace(root: &Arc<TempRoot>) -> Workspace {
    WorkspaceBuilder::new()
        .temp_root(Arc::clone(root))
        .build()
        .expect("open file-backed workspace")
}

/// Corners of the unit square with its lower-left corner at `(x, y)`.
pub fn unit_square_corners(x: f64, y: f64) -> [Coord; 4] {
    [
        Coord::xy(x, y),
        Coord::xy(x + 1.0, y),
        Coord::xy(x + 1.0, y + 1.0),
        Coord::xy(x, y + 1.0),
    ]
}

pub fn unit_square(ws: &mut Workspace, x: f64, y: f64) -> Handle {
    let [a, b, c, d] = unit_square_corners(x, y);
    ws.create_quad(&a, &b, &c, &d).expect("create unit square")
}

pub fn area(geometry: &Geometry) -> f64 {
    geo::Geometry::from(geometry).unsigned_area()
}

pub fn area_of(ws: &mut Workspace, handle: Handle) -> f64 {
    let geometry = ws
        .geometry(handle)
        .expect("query geometry")
        .expect("handle should resolve");
    area(&geometry)
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// Little-endian WKB for a 2D point.
pub fn wkb_point(x: f64, y: f64) -> Vec<u8> {
    let mut wkb = vec![0x01];
    wkb.extend_from_slice(&1u32.to_le_bytes());
    wkb.extend_from_slice(&x.to_le_bytes());
    wkb.extend_from_slice(&y.to_le_bytes());
    wkb
}

/// Little-endian ISO WKB for a point with Z (type 1001).
pub fn wkb_point_z(x: f64, y: f64, z: f64) -> Vec<u8> {
    let mut wkb = vec![0x01];
    wkb.extend_from_slice(&1001u32.to_le_bytes());
    for v in [x, y, z] {
        wkb.extend_from_slice(&v.to_le_bytes());
    }
    wkb
}
