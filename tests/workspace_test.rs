//! Workspace Creation and Query Tests
//!
//! Covers the handle lifecycle through the public API:
//! - Every constructor stores exactly one row and reads back what it stored
//! - Dimension handling for points and ingested geometries
//! - Missing handles answer with sentinels, not errors
//! - `clear()` invalidates every handle and ids keep counting up

mod common;

use spatialcalc::codec;
use spatialcalc::{
    Coord, Dimension, Error, GeoCoordinate, Geometry, GeometryType, Handle, LineString, Polygon,
};

/// A coordinate type that is not one of the crate's own.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fix {
    lat: f64,
    lng: f64,
    alt: Option<f64>,
}

impl GeoCoordinate for Fix {
    fn latitude(&self) -> f64 {
        self.lat
    }
    fn longitude(&self) -> f64 {
        self.lng
    }
    fn altitude(&self) -> Option<f64> {
        self.alt
    }
    fn from_lat_lng(lat: f64, lng: f64, alt: Option<f64>) -> Self {
        Fix { lat, lng, alt }
    }
}

#[test]
fn point_z_passes_through_in_3d() {
    let mut ws = common::memory_workspace_3d();
    let h = ws.create_point(&Coord::xyz(1.0, 2.0, 3.0)).unwrap();

    assert_eq!(ws.geometry_type(h).unwrap(), Some(GeometryType::Point));
    assert_eq!(
        ws.geometry(h).unwrap(),
        Some(Geometry::Point(Coord::xyz(1.0, 2.0, 3.0)))
    );

    let blob = ws.geometry_blob(h).unwrap().unwrap();
    let fix: Fix = codec::parse_point(&blob).unwrap();
    assert_eq!(fix, Fix { lat: 2.0, lng: 1.0, alt: Some(3.0) });
}

#[test]
fn nan_altitude_becomes_zero() {
    let mut ws = common::memory_workspace_3d();
    let h = ws
        .create_point(&Fix { lat: 2.0, lng: 1.0, alt: Some(f64::NAN) })
        .unwrap();
    assert_eq!(
        ws.geometry(h).unwrap(),
        Some(Geometry::Point(Coord::xyz(1.0, 2.0, 0.0)))
    );
}

#[test]
fn z_is_dropped_in_2d() {
    let mut ws = common::memory_workspace();
    let h = ws.create_point(&Coord::xyz(1.0, 2.0, 3.0)).unwrap();

    let blob = ws.geometry_blob(h).unwrap().unwrap();
    assert_eq!(codec::decode_header(&blob).unwrap().dimension, Dimension::Xy);
    let fix: Fix = codec::parse_point(&blob).unwrap();
    assert_eq!(fix.alt, None);
    assert_eq!(ws.geometry(h).unwrap(), Some(Geometry::Point(Coord::xy(1.0, 2.0))));
}

#[test]
fn geo_types_are_accepted() {
    let mut ws = common::memory_workspace();
    let h = ws.create_point(&geo::Point::new(10.0, 20.0)).unwrap();
    let blob = ws.geometry_blob(h).unwrap().unwrap();
    let p: geo::Point<f64> = codec::parse_point(&blob).unwrap();
    assert_eq!(p, geo::Point::new(10.0, 20.0));
}

#[test]
fn line_string_round_trip() {
    let mut ws = common::memory_workspace();
    let points = [Coord::xy(0.0, 0.0), Coord::xy(1.0, 1.0), Coord::xy(2.0, 0.5)];
    let h = ws.create_line_string(&points).unwrap();

    assert_eq!(ws.geometry_type(h).unwrap(), Some(GeometryType::LineString));
    let blob = ws.geometry_blob(h).unwrap().unwrap();
    let back: Vec<Coord> = codec::parse_line_string(&blob).unwrap();
    assert_eq!(back, points);

    // Asking for the wrong shape is a decode error.
    assert!(matches!(
        codec::parse_polygon::<Coord>(&blob),
        Err(Error::Decode(_))
    ));
}

#[test]
fn polygon_with_hole_round_trip() {
    let mut ws = common::memory_workspace();
    let exterior = [
        Coord::xy(0.0, 0.0),
        Coord::xy(10.0, 0.0),
        Coord::xy(10.0, 10.0),
        Coord::xy(0.0, 10.0),
        Coord::xy(0.0, 0.0),
    ];
    let hole = vec![
        Coord::xy(2.0, 2.0),
        Coord::xy(4.0, 2.0),
        Coord::xy(4.0, 4.0),
        Coord::xy(2.0, 2.0),
    ];
    let h = ws.create_polygon_with_rings(&exterior, &[hole.clone()]).unwrap();

    let blob = ws.geometry_blob(h).unwrap().unwrap();
    let rings: Vec<Vec<Coord>> = codec::parse_polygon(&blob).unwrap();
    assert_eq!(rings, vec![exterior.to_vec(), hole]);
}

#[test]
fn degenerate_geometries_are_stored() {
    let mut ws = common::memory_workspace();
    let h = ws.create_line_string(&[Coord::xy(1.0, 1.0)]).unwrap();
    assert_eq!(ws.geometry_type(h).unwrap(), Some(GeometryType::LineString));
}

#[test]
fn each_create_allocates_one_row() {
    let mut ws = common::memory_workspace();
    let a = ws.create_point(&Coord::xy(0.0, 0.0)).unwrap();
    let b = ws.create_geometry_from_wkt("LINESTRING(0 0, 1 1)").unwrap();
    let c = common::unit_square(&mut ws, 0.0, 0.0);

    assert_eq!(ws.geometry_count().unwrap(), 3);
    assert!(a < b && b < c);
}

#[test]
fn geometry_values_round_trip_in_both_dimensions() {
    let samples = |z: f64| {
        vec![
            Geometry::Point(Coord::xyz(1.0, 2.0, z)),
            Geometry::LineString(LineString::new(vec![
                Coord::xyz(0.0, 0.0, z),
                Coord::xyz(3.0, 4.0, z),
            ])),
            Geometry::Polygon(Polygon::new(
                LineString::new(vec![
                    Coord::xyz(0.0, 0.0, z),
                    Coord::xyz(1.0, 0.0, z),
                    Coord::xyz(0.0, 1.0, z),
                    Coord::xyz(0.0, 0.0, z),
                ]),
                vec![],
            )),
            Geometry::MultiPoint(vec![Coord::xyz(1.0, 1.0, z), Coord::xyz(2.0, 2.0, z)]),
            Geometry::Collection(vec![
                Geometry::Point(Coord::xyz(5.0, 5.0, z)),
                Geometry::LineString(LineString::new(vec![
                    Coord::xyz(0.0, 0.0, z),
                    Coord::xyz(1.0, 1.0, z),
                ])),
            ]),
        ]
    };

    let mut ws = common::memory_workspace_3d();
    for g in samples(7.0) {
        let h = ws.create_geometry(&g).unwrap();
        assert_eq!(ws.geometry(h).unwrap(), Some(g));
    }

    let mut ws = common::memory_workspace();
    for g in samples(0.0) {
        let h = ws.create_geometry(&g).unwrap();
        assert_eq!(ws.geometry(h).unwrap(), Some(g));
    }
}

#[test]
fn nested_collections_are_flattened() {
    let mut ws = common::memory_workspace();
    let inner = Geometry::Collection(vec![
        Geometry::Point(Coord::xy(1.0, 1.0)),
        Geometry::Point(Coord::xy(2.0, 2.0)),
    ]);
    let h = ws.create_geometry(&Geometry::Collection(vec![inner])).unwrap();
    assert_eq!(
        ws.geometry(h).unwrap(),
        Some(Geometry::Collection(vec![
            Geometry::Point(Coord::xy(1.0, 1.0)),
            Geometry::Point(Coord::xy(2.0, 2.0)),
        ]))
    );
}

#[test]
fn wkt_and_wkb_ingestion() {
    let mut ws = common::memory_workspace();

    let h = ws
        .create_geometry_from_wkt("POLYGON((0 0, 2 0, 2 2, 0 2, 0 0))")
        .unwrap();
    assert_eq!(ws.geometry_type(h).unwrap(), Some(GeometryType::Polygon));
    common::assert_close(common::area_of(&mut ws, h), 4.0);
    let text = ws.geometry_wkt(h).unwrap().unwrap();
    assert!(text.starts_with("POLYGON"), "unexpected WKT {text}");

    let h = ws.create_geometry_from_wkb(&common::wkb_point(3.0, 4.0)).unwrap();
    assert_eq!(ws.geometry(h).unwrap(), Some(Geometry::Point(Coord::xy(3.0, 4.0))));
}

#[test]
fn wkt_round_trips_in_3d() {
    let mut ws = common::memory_workspace_3d();

    let h = ws
        .create_geometry_from_wkt("LINESTRING Z (1 2 3, 4 5 6)")
        .unwrap();
    let text = ws.geometry_wkt(h).unwrap().unwrap();
    assert_eq!(text, "LINESTRING Z (1 2 3,4 5 6)");

    let again = ws.create_geometry_from_wkt(&text).unwrap();
    assert_eq!(ws.geometry(again).unwrap(), ws.geometry(h).unwrap());
    assert_eq!(
        ws.geometry(again).unwrap(),
        Some(Geometry::LineString(LineString::new(vec![
            Coord::xyz(1.0, 2.0, 3.0),
            Coord::xyz(4.0, 5.0, 6.0),
        ])))
    );

    let square = common::unit_square(&mut ws, 0.0, 0.0);
    let text = ws.geometry_wkt(square).unwrap().unwrap();
    assert!(text.starts_with("POLYGON Z ("), "unexpected WKT {text}");
    let copy = ws.create_geometry_from_wkt(&text).unwrap();
    assert_eq!(ws.geometry_blob(copy).unwrap(), ws.geometry_blob(square).unwrap());
}

#[test]
fn wkb_keeps_z_in_3d() {
    let mut ws = common::memory_workspace_3d();

    let h = ws
        .create_geometry_from_wkb(&common::wkb_point_z(1.0, 2.0, 3.0))
        .unwrap();
    assert_eq!(ws.geometry(h).unwrap(), Some(Geometry::Point(Coord::xyz(1.0, 2.0, 3.0))));

    // 2D input in a 3D workspace gets Z = 0.
    let h = ws.create_geometry_from_wkb(&common::wkb_point(3.0, 4.0)).unwrap();
    assert_eq!(ws.geometry(h).unwrap(), Some(Geometry::Point(Coord::xyz(3.0, 4.0, 0.0))));
}

#[test]
fn malformed_text_and_binary_are_parse_errors() {
    let mut ws = common::memory_workspace();

    let err = ws.create_geometry_from_wkt("POLYGON((0 0, 1").unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "got {err:?}");

    let err = ws.create_geometry_from_wkb(&[0x01, 0x02, 0x03]).unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "got {err:?}");

    assert_eq!(ws.geometry_count().unwrap(), 0);
}

#[test]
fn blob_ingestion_keeps_bytes() {
    let mut ws = common::memory_workspace();
    let source = common::unit_square(&mut ws, 0.0, 0.0);
    let blob = ws.geometry_blob(source).unwrap().unwrap();

    let copy = ws.create_geometry_from_blob(&blob).unwrap();
    assert_ne!(copy, source);
    assert_eq!(ws.geometry_blob(copy).unwrap(), Some(blob));
}

#[test]
fn updates_rewrite_in_place() {
    let mut ws = common::memory_workspace();
    let h = ws.create_point(&Coord::xy(0.0, 0.0)).unwrap();

    let [a, b, c, d] = common::unit_square_corners(5.0, 5.0);
    ws.update_quad(h, &a, &b, &c, &d).unwrap();
    assert_eq!(ws.geometry_type(h).unwrap(), Some(GeometryType::Polygon));

    ws.update_polygon(h, &[a, b, c, a], &[]).unwrap();
    common::assert_close(common::area_of(&mut ws, h), 0.5);

    ws.update_geometry(h, &Geometry::Point(Coord::xy(9.0, 9.0))).unwrap();
    assert_eq!(ws.geometry(h).unwrap(), Some(Geometry::Point(Coord::xy(9.0, 9.0))));
    assert_eq!(ws.geometry_count().unwrap(), 1);
}

#[test]
fn delete_removes_only_that_handle() {
    let mut ws = common::memory_workspace();
    let keep = ws.create_point(&Coord::xy(0.0, 0.0)).unwrap();
    let gone = ws.create_point(&Coord::xy(1.0, 1.0)).unwrap();

    ws.delete_geometry(gone).unwrap();

    assert_eq!(ws.geometry(gone).unwrap(), None);
    assert!(ws.geometry(keep).unwrap().is_some());
    assert_eq!(ws.geometry_count().unwrap(), 1);
}

#[test]
fn predicates() {
    let mut ws = common::memory_workspace();
    let big = ws
        .create_geometry_from_wkt("POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))")
        .unwrap();
    let small = common::unit_square(&mut ws, 2.0, 2.0);
    let far = common::unit_square(&mut ws, 20.0, 20.0);

    assert!(ws.intersects(big, small).unwrap());
    assert!(ws.contains(big, small).unwrap());
    assert!(!ws.contains(small, big).unwrap());
    assert!(!ws.intersects(big, far).unwrap());
}

#[test]
fn missing_handles_answer_with_sentinels() {
    let mut ws = common::memory_workspace();
    let live = ws.create_point(&Coord::xy(0.0, 0.0)).unwrap();
    let missing = Handle::from_raw(9_999);

    assert_eq!(ws.geometry_type(missing).unwrap(), None);
    assert_eq!(ws.geometry_blob(missing).unwrap(), None);
    assert_eq!(ws.geometry_wkt(missing).unwrap(), None);
    assert_eq!(ws.geometry(missing).unwrap(), None);
    assert!(!ws.intersects(live, missing).unwrap());
    assert!(!ws.contains(missing, live).unwrap());
}

#[test]
fn clear_invalidates_every_handle() {
    let mut ws = common::memory_workspace();
    let handles: Vec<Handle> = (0..5)
        .map(|i| ws.create_point(&Coord::xy(i as f64, 0.0)).unwrap())
        .collect();
    let square = common::unit_square(&mut ws, 0.0, 0.0);

    ws.clear().unwrap();

    assert_eq!(ws.geometry_count().unwrap(), 0);
    for &h in handles.iter().chain([&square]) {
        assert_eq!(ws.geometry_type(h).unwrap(), None);
        assert_eq!(ws.geometry(h).unwrap(), None);
        assert_eq!(ws.geometry_wkt(h).unwrap(), None);
        assert!(!ws.intersects(h, h).unwrap());
    }

    let fresh = ws.create_point(&Coord::xy(0.0, 0.0)).unwrap();
    assert!(fresh > square, "{fresh} should not reuse an old id");
    assert_eq!(ws.geometry_count().unwrap(), 1);
}

#[test]
fn clear_cache_keeps_data() {
    let mut ws = common::memory_workspace();
    let h = ws.create_point(&Coord::xy(1.0, 2.0)).unwrap();
    assert!(!ws.cached_operations().is_empty());

    ws.clear_cache();
    assert!(ws.cached_operations().is_empty());
    assert_eq!(ws.geometry(h).unwrap(), Some(Geometry::Point(Coord::xy(1.0, 2.0))));
}
