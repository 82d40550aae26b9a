//! # Spatial SQL Functions
//!
//! The workspace talks to its store exclusively through SQL. This module
//! extends a plain SQLite connection with the spatial operators those
//! statements call, so no native spatial extension has to be loaded.
//!
//! ## Function Table
//!
//! ```text
//! MakePoint(x, y, srid)            MakePointZ(x, y, z, srid)
//! GeomFromText(wkt, srid)          GeomFromWkb(wkb, srid)
//! AsText(g)                        GeometryType(g)          -> 1..7
//! Intersects(a, b)                 Contains(a, b)           -> 1 / 0
//! Intersection(a, b)               Difference(a, b)
//! GUnion(a, b)                     GUnion(g)                -> aggregate
//! UnaryUnion(g)                    Buffer(g, distance)
//! Simplify(g, tol)                 SimplifyPreserveTopology(g, tol)
//! ```
//!
//! Every function returns NULL when a geometry operand is NULL. That is what
//! makes lookups against a missing handle come back as "not found" instead of
//! an error.
//!
//! ## Computation
//!
//! Predicates, boolean algebra and buffering run on `geo`, which is 2D: Z does
//! not survive those operations and comes back as 0. Simplification also runs
//! on `geo`, but only picks which of our vertices to keep, so Z survives on
//! every retained vertex.
//!
//! Results are encoded with the workspace's dimension and SRID. An empty
//! result is an empty GEOMETRYCOLLECTION.
//!
//! ## Errors
//!
//! Failures inside a function (bad WKT, a corrupt blob) are raised as
//! `UserFunctionError` wrapping a crate [`Error`]. SQLite carries only the
//! message back to the caller; [`Error::from_engine`] turns it into the
//! original variant again.

use std::str::FromStr;

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BooleanOps, Buffer, Contains, Intersects, SimplifyIdx, SimplifyVwPreserve};
use geozero::error::GeozeroError;
use geozero::wkb::{Ewkb, Wkb};
use geozero::{CoordDimensions, GeomProcessor, GeozeroGeometry};
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;
use wkt::Wkt;

use crate::codec;
use crate::error::{Error, Result};
use crate::geometry::{Coord, Geometry, LineString, Polygon};
use crate::types::{Dimension, Srid};

// =============================================================================
// Registration
// =============================================================================

/// Encoding parameters applied to every geometry a function returns.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EngineConfig {
    pub dimension: Dimension,
    pub srid: Srid,
}

impl EngineConfig {
    fn encode(&self, geometry: &Geometry) -> Vec<u8> {
        codec::encode(geometry, self.dimension, self.srid)
    }
}

type GeoGeometry = geo::Geometry<f64>;

/// Registers every spatial function on `conn`.
pub(crate) fn register(conn: &Connection, config: EngineConfig) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    // Constructors
    conn.create_scalar_function("MakePoint", 3, flags, move |ctx| {
        let srid = Srid::new(ctx.get::<i32>(2)?);
        let point = Geometry::Point(Coord::xy(ctx.get(0)?, ctx.get(1)?));
        Ok(codec::encode(&point, config.dimension, srid))
    })?;
    conn.create_scalar_function("MakePointZ", 4, flags, move |ctx| {
        let srid = Srid::new(ctx.get::<i32>(3)?);
        let point = Geometry::Point(Coord::xyz(ctx.get(0)?, ctx.get(1)?, ctx.get(2)?));
        Ok(codec::encode(&point, config.dimension, srid))
    })?;
    conn.create_scalar_function("GeomFromText", 2, flags, move |ctx| {
        let Some(text) = ctx.get::<Option<String>>(0)? else {
            return Ok(None);
        };
        let srid = Srid::new(ctx.get::<i32>(1)?);
        let geometry = geometry_from_wkt(&text).map_err(Error::into_engine)?;
        Ok(Some(codec::encode(&geometry, config.dimension, srid)))
    })?;
    conn.create_scalar_function("GeomFromWkb", 2, flags, move |ctx| {
        let Some(bytes) = ctx.get::<Option<Vec<u8>>>(0)? else {
            return Ok(None);
        };
        let srid = Srid::new(ctx.get::<i32>(1)?);
        let geometry = geometry_from_wkb(&bytes).map_err(Error::into_engine)?;
        Ok(Some(codec::encode(&geometry, config.dimension, srid)))
    })?;

    // Introspection
    conn.create_scalar_function("AsText", 1, flags, move |ctx| {
        let header = match ctx.get_raw(0) {
            ValueRef::Blob(bytes) => codec::decode_header(bytes).map_err(Error::into_engine)?,
            _ => return Ok(None),
        };
        Ok(geometry_arg(ctx, 0)?.map(|g| geometry_to_wkt(&g, header.dimension)))
    })?;
    conn.create_scalar_function("GeometryType", 1, flags, move |ctx| {
        match ctx.get_raw(0) {
            ValueRef::Blob(bytes) => codec::decode_header(bytes)
                .map(|h| Some(h.geometry_type.code()))
                .map_err(Error::into_engine),
            _ => Ok(None),
        }
    })?;

    // Predicates
    register_predicate(conn, flags, "Intersects", |a, b| a.intersects(b))?;
    register_predicate(conn, flags, "Contains", |a, b| a.contains(b))?;

    // Algebra
    register_binary(conn, flags, config, "Intersection", intersection)?;
    register_binary(conn, flags, config, "Difference", difference)?;
    register_binary(conn, flags, config, "GUnion", union)?;
    conn.create_aggregate_function("GUnion", 1, flags, UnionAggregate { config })?;
    conn.create_scalar_function("UnaryUnion", 1, flags, move |ctx| {
        Ok(geometry_arg(ctx, 0)?.map(|g| config.encode(&unary_union(&GeoGeometry::from(&g)))))
    })?;
    conn.create_scalar_function("Buffer", 2, flags, move |ctx| {
        let distance: f64 = ctx.get(1)?;
        Ok(geometry_arg(ctx, 0)?.map(|g| config.encode(&buffer(&GeoGeometry::from(&g), distance))))
    })?;
    conn.create_scalar_function("Simplify", 2, flags, move |ctx| {
        let tolerance: f64 = ctx.get(1)?;
        Ok(geometry_arg(ctx, 0)?.map(|g| config.encode(&simplify(&g, tolerance, false))))
    })?;
    conn.create_scalar_function("SimplifyPreserveTopology", 2, flags, move |ctx| {
        let tolerance: f64 = ctx.get(1)?;
        Ok(geometry_arg(ctx, 0)?.map(|g| config.encode(&simplify(&g, tolerance, true))))
    })?;

    debug!(dimension = %config.dimension, srid = %config.srid, "registered spatial functions");
    Ok(())
}

/// Decodes argument `idx` as a geometry blob. NULL maps to `None`.
fn geometry_arg(ctx: &Context<'_>, idx: usize) -> rusqlite::Result<Option<Geometry>> {
    match ctx.get_raw(idx) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(bytes) => codec::decode(bytes).map(Some).map_err(Error::into_engine),
        other => Err(Error::Decode(format!(
            "expected a geometry blob, found {}",
            other.data_type()
        ))
        .into_engine()),
    }
}

fn register_predicate(
    conn: &Connection,
    flags: FunctionFlags,
    name: &str,
    predicate: fn(&GeoGeometry, &GeoGeometry) -> bool,
) -> rusqlite::Result<()> {
    conn.create_scalar_function(name, 2, flags, move |ctx| {
        let (Some(a), Some(b)) = (geometry_arg(ctx, 0)?, geometry_arg(ctx, 1)?) else {
            return Ok(None);
        };
        Ok(Some(predicate(&(&a).into(), &(&b).into())))
    })
}

fn register_binary(
    conn: &Connection,
    flags: FunctionFlags,
    config: EngineConfig,
    name: &str,
    op: fn(&GeoGeometry, &GeoGeometry) -> Geometry,
) -> rusqlite::Result<()> {
    conn.create_scalar_function(name, 2, flags, move |ctx| {
        let (Some(a), Some(b)) = (geometry_arg(ctx, 0)?, geometry_arg(ctx, 1)?) else {
            return Ok(None);
        };
        Ok(Some(config.encode(&op(&(&a).into(), &(&b).into()))))
    })
}

/// `GUnion(geom)` over a set of rows. No rows, or only NULLs, yields NULL.
struct UnionAggregate {
    config: EngineConfig,
}

impl Aggregate<Vec<Geometry>, Option<Vec<u8>>> for UnionAggregate {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<Vec<Geometry>> {
        Ok(Vec::new())
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut Vec<Geometry>) -> rusqlite::Result<()> {
        if let Some(g) = geometry_arg(ctx, 0)? {
            acc.push(g);
        }
        Ok(())
    }

    fn finalize(
        &self,
        _ctx: &mut Context<'_>,
        acc: Option<Vec<Geometry>>,
    ) -> rusqlite::Result<Option<Vec<u8>>> {
        let Some(geometries) = acc.filter(|gs| !gs.is_empty()) else {
            return Ok(None);
        };
        let mut parts = Parts::default();
        for g in &geometries {
            parts.collect(&GeoGeometry::from(g));
        }
        Ok(Some(self.config.encode(&parts.dissolve())))
    }
}

// =============================================================================
// Text and Binary Interchange
// =============================================================================

/// Parses WKT. Z values are kept when present.
pub(crate) fn geometry_from_wkt(text: &str) -> Result<Geometry> {
    let parsed = Wkt::<f64>::from_str(text).map_err(|e| Error::Parse(e.to_string()))?;
    Ok(from_wkt(&parsed))
}

/// Parses ISO WKB or PostGIS EWKB. Z values are kept when present.
pub(crate) fn geometry_from_wkb(bytes: &[u8]) -> Result<Geometry> {
    let mut builder = GeometryBuilder::default();
    let processed = if is_ewkb(bytes) {
        Ewkb(bytes).process_geom(&mut builder)
    } else {
        Wkb(bytes).process_geom(&mut builder)
    };
    processed.map_err(|e| Error::Parse(e.to_string()))?;
    builder
        .finished
        .ok_or_else(|| Error::Parse("WKB holds no geometry".to_string()))
}

/// EWKB marks Z, M and an embedded SRID in the high bits of the type word.
fn is_ewkb(bytes: &[u8]) -> bool {
    let Some(word) = bytes.get(1..5) else {
        return false;
    };
    let word = [word[0], word[1], word[2], word[3]];
    let type_id = if bytes[0] == 0 {
        u32::from_be_bytes(word)
    } else {
        u32::from_le_bytes(word)
    };
    type_id & 0xE000_0000 != 0
}

/// Collects geozero's event stream into a [`Geometry`].
///
/// Rings and member lines arrive untagged, so `in_polygon` tells them apart.
/// Open collections stack up; a finished geometry goes into the innermost
/// one, or becomes the result.
#[derive(Default)]
struct GeometryBuilder {
    coords: Vec<Coord>,
    rings: Vec<LineString>,
    lines: Vec<LineString>,
    polygons: Vec<Polygon>,
    in_polygon: bool,
    collections: Vec<Vec<Geometry>>,
    finished: Option<Geometry>,
}

impl GeometryBuilder {
    fn finish(&mut self, geometry: Geometry) {
        match self.collections.last_mut() {
            Some(members) => members.push(geometry),
            None => self.finished = Some(geometry),
        }
    }

    fn unsupported(kind: &str) -> geozero::error::Result<()> {
        Err(GeozeroError::Geometry(format!("unsupported WKB geometry: {kind}")))
    }
}

impl GeomProcessor for GeometryBuilder {
    fn dimensions(&self) -> CoordDimensions {
        CoordDimensions::xyz()
    }

    fn xy(&mut self, x: f64, y: f64, _idx: usize) -> geozero::error::Result<()> {
        self.coords.push(Coord::xy(x, y));
        Ok(())
    }

    fn coordinate(
        &mut self,
        x: f64,
        y: f64,
        z: Option<f64>,
        _m: Option<f64>,
        _t: Option<f64>,
        _tm: Option<u64>,
        _idx: usize,
    ) -> geozero::error::Result<()> {
        self.coords.push(Coord::xyz(x, y, z.unwrap_or(0.0)));
        Ok(())
    }

    fn empty_point(&mut self, _idx: usize) -> geozero::error::Result<()> {
        self.finish(Geometry::empty());
        Ok(())
    }

    fn point_begin(&mut self, _idx: usize) -> geozero::error::Result<()> {
        self.coords.clear();
        Ok(())
    }

    fn point_end(&mut self, _idx: usize) -> geozero::error::Result<()> {
        match self.coords.pop() {
            Some(c) => self.finish(Geometry::Point(c)),
            None => self.finish(Geometry::empty()),
        }
        Ok(())
    }

    fn multipoint_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        self.coords.clear();
        Ok(())
    }

    fn multipoint_end(&mut self, _idx: usize) -> geozero::error::Result<()> {
        let points = std::mem::take(&mut self.coords);
        self.finish(Geometry::MultiPoint(points));
        Ok(())
    }

    fn linestring_begin(&mut self, _tagged: bool, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        self.coords.clear();
        Ok(())
    }

    fn linestring_end(&mut self, tagged: bool, _idx: usize) -> geozero::error::Result<()> {
        let line = LineString::new(std::mem::take(&mut self.coords));
        if tagged {
            self.finish(Geometry::LineString(line));
        } else if self.in_polygon {
            self.rings.push(line);
        } else {
            self.lines.push(line);
        }
        Ok(())
    }

    fn multilinestring_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        self.lines.clear();
        Ok(())
    }

    fn multilinestring_end(&mut self, _idx: usize) -> geozero::error::Result<()> {
        let lines = std::mem::take(&mut self.lines);
        self.finish(Geometry::MultiLineString(lines));
        Ok(())
    }

    fn polygon_begin(&mut self, _tagged: bool, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        self.rings.clear();
        self.in_polygon = true;
        Ok(())
    }

    fn polygon_end(&mut self, tagged: bool, _idx: usize) -> geozero::error::Result<()> {
        self.in_polygon = false;
        let polygon = Polygon {
            rings: std::mem::take(&mut self.rings),
        };
        if tagged {
            self.finish(Geometry::Polygon(polygon));
        } else {
            self.polygons.push(polygon);
        }
        Ok(())
    }

    fn multipolygon_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        self.polygons.clear();
        Ok(())
    }

    fn multipolygon_end(&mut self, _idx: usize) -> geozero::error::Result<()> {
        let polygons = std::mem::take(&mut self.polygons);
        self.finish(Geometry::MultiPolygon(polygons));
        Ok(())
    }

    fn geometrycollection_begin(&mut self, size: usize, _idx: usize) -> geozero::error::Result<()> {
        self.collections.push(Vec::with_capacity(size));
        Ok(())
    }

    fn geometrycollection_end(&mut self, _idx: usize) -> geozero::error::Result<()> {
        let members = self.collections.pop().unwrap_or_default();
        self.finish(Geometry::Collection(members));
        Ok(())
    }

    // Curved and surface types have no counterpart in the blob format.

    fn circularstring_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        Self::unsupported("CIRCULARSTRING")
    }

    fn compoundcurve_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        Self::unsupported("COMPOUNDCURVE")
    }

    fn curvepolygon_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        Self::unsupported("CURVEPOLYGON")
    }

    fn multicurve_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        Self::unsupported("MULTICURVE")
    }

    fn multisurface_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        Self::unsupported("MULTISURFACE")
    }

    fn triangle_begin(&mut self, _tagged: bool, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        Self::unsupported("TRIANGLE")
    }

    fn polyhedralsurface_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        Self::unsupported("POLYHEDRALSURFACE")
    }

    fn tin_begin(&mut self, _size: usize, _idx: usize) -> geozero::error::Result<()> {
        Self::unsupported("TIN")
    }
}

/// Formats a geometry as WKT.
///
/// In 3D every geometry keyword carries the `Z` tag, so the text parses back
/// with its Z values. Coordinates are printed by `wkt`.
pub(crate) fn geometry_to_wkt(geometry: &Geometry, dimension: Dimension) -> String {
    let mut out = String::new();
    write_wkt(&mut out, geometry, dimension);
    out
}

fn write_wkt(out: &mut String, geometry: &Geometry, dimension: Dimension) {
    out.push_str(geometry.geometry_type().wkt_keyword());
    if dimension == Dimension::Xyz {
        out.push_str(" Z");
    }
    if geometry.is_empty() {
        out.push_str(" EMPTY");
        return;
    }
    out.push(' ');

    let point = |out: &mut String, c: &Coord| {
        write_list(out, std::slice::from_ref(c), |out, c| write_coord(out, c, dimension))
    };
    match geometry {
        Geometry::Point(c) => point(out, c),
        Geometry::LineString(ls) => write_line(out, ls, dimension),
        Geometry::Polygon(p) => write_polygon(out, p, dimension),
        Geometry::MultiPoint(pts) => write_list(out, pts, point),
        Geometry::MultiLineString(lines) => {
            write_list(out, lines, |out, ls| write_line(out, ls, dimension))
        }
        Geometry::MultiPolygon(polys) => {
            write_list(out, polys, |out, p| write_polygon(out, p, dimension))
        }
        Geometry::Collection(children) => {
            write_list(out, children, |out, g| write_wkt(out, g, dimension))
        }
    }
}

/// Writes `(a,b,..)`, or `EMPTY` when there are no items.
fn write_list<T>(out: &mut String, items: &[T], mut item: impl FnMut(&mut String, &T)) {
    if items.is_empty() {
        out.push_str("EMPTY");
        return;
    }
    out.push('(');
    for (i, x) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        item(out, x);
    }
    out.push(')');
}

fn write_line(out: &mut String, ls: &LineString, dimension: Dimension) {
    write_list(out, &ls.points, |out, c| write_coord(out, c, dimension));
}

fn write_polygon(out: &mut String, p: &Polygon, dimension: Dimension) {
    write_list(out, &p.rings, |out, ring| write_line(out, ring, dimension));
}

fn write_coord(out: &mut String, c: &Coord, dimension: Dimension) {
    let c = wkt::types::Coord {
        x: c.x,
        y: c.y,
        z: (dimension == Dimension::Xyz).then_some(c.z),
        m: None,
    };
    out.push_str(&c.to_string());
}

fn wkt_coord(c: &wkt::types::Coord<f64>) -> Coord {
    Coord::xyz(c.x, c.y, c.z.filter(|z| z.is_finite()).unwrap_or(0.0))
}

fn wkt_line(ls: &wkt::types::LineString<f64>) -> LineString {
    LineString::new(ls.0.iter().map(wkt_coord).collect())
}

fn wkt_polygon(p: &wkt::types::Polygon<f64>) -> Polygon {
    Polygon {
        rings: p.0.iter().map(wkt_line).collect(),
    }
}

fn from_wkt(w: &Wkt<f64>) -> Geometry {
    match w {
        Wkt::Point(p) => p
            .0
            .as_ref()
            .map(|c| Geometry::Point(wkt_coord(c)))
            .unwrap_or_else(Geometry::empty),
        Wkt::LineString(ls) => Geometry::LineString(wkt_line(ls)),
        Wkt::Polygon(p) => Geometry::Polygon(wkt_polygon(p)),
        Wkt::MultiPoint(mp) => {
            Geometry::MultiPoint(mp.0.iter().filter_map(|p| p.0.as_ref().map(wkt_coord)).collect())
        }
        Wkt::MultiLineString(mls) => Geometry::MultiLineString(mls.0.iter().map(wkt_line).collect()),
        Wkt::MultiPolygon(mp) => Geometry::MultiPolygon(mp.0.iter().map(wkt_polygon).collect()),
        Wkt::GeometryCollection(gc) => Geometry::Collection(gc.0.iter().map(from_wkt).collect()),
    }
}

// =============================================================================
// Algebra
// =============================================================================
//
// `geo` boolean operations work on polygons only, so every operand is split
// into areal, linear and puntal parts. Areal parts go through BooleanOps,
// lines are clipped against areas and intersected with each other, points are
// filtered by predicate. The pieces are reassembled into the simplest shape
// that holds them.

#[derive(Default)]
struct Parts {
    polygons: Vec<geo::Polygon<f64>>,
    lines: Vec<geo::LineString<f64>>,
    points: Vec<geo::Point<f64>>,
}

impl Parts {
    fn of(g: &GeoGeometry) -> Self {
        let mut parts = Parts::default();
        parts.collect(g);
        parts
    }

    fn collect(&mut self, g: &GeoGeometry) {
        match g {
            GeoGeometry::Point(p) => self.points.push(*p),
            GeoGeometry::Line(l) => self.lines.push(geo::LineString::new(vec![l.start, l.end])),
            GeoGeometry::LineString(ls) => self.lines.push(ls.clone()),
            GeoGeometry::Polygon(p) => self.polygons.push(p.clone()),
            GeoGeometry::MultiPoint(mp) => self.points.extend(mp.0.iter().copied()),
            GeoGeometry::MultiLineString(mls) => self.lines.extend(mls.0.iter().cloned()),
            GeoGeometry::MultiPolygon(mp) => self.polygons.extend(mp.0.iter().cloned()),
            GeoGeometry::GeometryCollection(gc) => {
                for child in &gc.0 {
                    self.collect(child);
                }
            }
            GeoGeometry::Rect(r) => self.polygons.push(r.to_polygon()),
            GeoGeometry::Triangle(t) => self.polygons.push(t.to_polygon()),
        }
    }

    /// Union of all areal parts.
    fn area(&self) -> geo::MultiPolygon<f64> {
        self.polygons
            .iter()
            .fold(geo::MultiPolygon::new(vec![]), |acc, p| acc.union(p))
    }

    /// Merges everything into one geometry: areas are unioned, lines keep only
    /// what lies outside the areas, points keep only what lies on nothing else.
    fn dissolve(self) -> Geometry {
        let area = self.area();
        let lines = clip(&area, self.lines, true);
        let covered = geo::MultiLineString::new(lines.clone());
        let points = dedup(self.points)
            .into_iter()
            .filter(|p| !area.intersects(p) && !covered.intersects(p))
            .collect();
        assemble(area, lines, points)
    }
}

/// Lines inside (`invert = false`) or outside (`invert = true`) `area`.
fn clip(
    area: &geo::MultiPolygon<f64>,
    lines: Vec<geo::LineString<f64>>,
    invert: bool,
) -> Vec<geo::LineString<f64>> {
    if lines.is_empty() {
        return lines;
    }
    if area.0.is_empty() {
        return if invert { lines } else { Vec::new() };
    }
    area.clip(&geo::MultiLineString::new(lines), invert).0
}

fn dedup(points: Vec<geo::Point<f64>>) -> Vec<geo::Point<f64>> {
    let mut out: Vec<geo::Point<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

/// Builds the simplest geometry holding the given parts.
fn assemble(
    area: geo::MultiPolygon<f64>,
    lines: Vec<geo::LineString<f64>>,
    points: Vec<geo::Point<f64>>,
) -> Geometry {
    let mut polygons: Vec<Polygon> = area
        .0
        .iter()
        .map(Polygon::from)
        .filter(|p| !p.rings.is_empty())
        .collect();
    let mut lines: Vec<LineString> = lines
        .iter()
        .filter(|l| l.0.len() >= 2)
        .map(LineString::from)
        .collect();
    let mut points: Vec<Coord> = points.iter().map(|p| Coord::from(p.0)).collect();

    let kinds = [polygons.len(), lines.len(), points.len()]
        .iter()
        .filter(|n| **n > 0)
        .count();
    if kinds > 1 {
        let children = polygons
            .into_iter()
            .map(Geometry::Polygon)
            .chain(lines.into_iter().map(Geometry::LineString))
            .chain(points.into_iter().map(Geometry::Point))
            .collect();
        return Geometry::Collection(children);
    }

    match (polygons.len(), lines.len(), points.len()) {
        (1, _, _) => Geometry::Polygon(polygons.remove(0)),
        (n, _, _) if n > 1 => Geometry::MultiPolygon(polygons),
        (_, 1, _) => Geometry::LineString(lines.remove(0)),
        (_, n, _) if n > 1 => Geometry::MultiLineString(lines),
        (_, _, 1) => Geometry::Point(points.remove(0)),
        (_, _, n) if n > 1 => Geometry::MultiPoint(points),
        _ => Geometry::empty(),
    }
}

fn intersection(a: &GeoGeometry, b: &GeoGeometry) -> Geometry {
    let (pa, pb) = (Parts::of(a), Parts::of(b));
    let (area_a, area_b) = (pa.area(), pb.area());

    let area = area_a.intersection(&area_b);
    let mut lines = clip(&area_b, pa.lines.clone(), false);
    lines.extend(clip(&area_a, pb.lines.clone(), false));

    let mut points = Vec::new();
    for la in &pa.lines {
        for lb in &pb.lines {
            for (sa, sb) in la.lines().flat_map(|sa| lb.lines().map(move |sb| (sa, sb))) {
                match line_intersection(sa, sb) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => {
                        points.push(geo::Point(intersection))
                    }
                    Some(LineIntersection::Collinear { intersection }) => {
                        lines.push(geo::LineString::new(vec![intersection.start, intersection.end]))
                    }
                    None => {}
                }
            }
        }
    }
    points.extend(pa.points.iter().filter(|p| b.intersects(*p)));
    points.extend(pb.points.iter().filter(|p| a.intersects(*p)));

    let covered = geo::MultiLineString::new(lines.clone());
    let points = dedup(points)
        .into_iter()
        .filter(|p| !area.intersects(p) && !covered.intersects(p))
        .collect();
    assemble(area, lines, points)
}

fn union(a: &GeoGeometry, b: &GeoGeometry) -> Geometry {
    let mut parts = Parts::of(a);
    parts.collect(b);
    parts.dissolve()
}

fn difference(a: &GeoGeometry, b: &GeoGeometry) -> Geometry {
    let (pa, pb) = (Parts::of(a), Parts::of(b));
    let area_b = pb.area();

    let area = pa.area().difference(&area_b);
    let lines = clip(&area_b, pa.lines, true);
    let points = dedup(pa.points)
        .into_iter()
        .filter(|p| !b.intersects(p))
        .collect();
    assemble(area, lines, points)
}

fn unary_union(g: &GeoGeometry) -> Geometry {
    Parts::of(g).dissolve()
}

fn buffer(g: &GeoGeometry, distance: f64) -> Geometry {
    assemble(g.buffer(distance), Vec::new(), Vec::new())
}

// =============================================================================
// Simplification
// =============================================================================

/// Simplifies every line and ring.
///
/// The plain form is Douglas-Peucker with `tolerance` as the distance. A ring
/// that collapses below four points is dropped, and so is a polygon whose
/// exterior collapses.
///
/// With `preserve_topology` lines and polygons go through Visvalingam-Whyatt
/// with `tolerance²` as the area threshold. A vertex is only removed when that
/// does not make the geometry cross itself, and no ring drops below four
/// points.
///
/// A tolerance that is not positive leaves the geometry unchanged.
pub(crate) fn simplify(geometry: &Geometry, tolerance: f64, preserve_topology: bool) -> Geometry {
    if tolerance.is_nan() || tolerance <= 0.0 {
        return geometry.clone();
    }
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => geometry.clone(),
        Geometry::LineString(ls) => {
            Geometry::LineString(simplify_line(ls, tolerance, preserve_topology))
        }
        Geometry::Polygon(p) => simplify_polygon(p, tolerance, preserve_topology)
            .map(Geometry::Polygon)
            .unwrap_or_else(Geometry::empty),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(
            lines
                .iter()
                .map(|l| simplify_line(l, tolerance, preserve_topology))
                .collect(),
        ),
        Geometry::MultiPolygon(polys) => Geometry::MultiPolygon(
            polys
                .iter()
                .filter_map(|p| simplify_polygon(p, tolerance, preserve_topology))
                .collect(),
        ),
        Geometry::Collection(children) => Geometry::Collection(
            children
                .iter()
                .map(|c| simplify(c, tolerance, preserve_topology))
                .filter(|c| !c.is_empty())
                .collect(),
        ),
    }
}

/// Simplifies one line. Retained vertices keep their Z.
fn simplify_line(ls: &LineString, tolerance: f64, preserve_topology: bool) -> LineString {
    let line = geo::LineString::from(ls);
    if preserve_topology {
        let simplified = line.simplify_vw_preserve(tolerance * tolerance);
        return LineString::new(retained(&ls.points, &simplified));
    }
    let kept = line.simplify_idx(tolerance);
    LineString::new(kept.into_iter().map(|i| ls.points[i]).collect())
}

fn simplify_polygon(p: &Polygon, tolerance: f64, preserve_topology: bool) -> Option<Polygon> {
    if preserve_topology {
        if p.rings.is_empty() {
            return Some(p.clone());
        }
        let simplified = geo::Polygon::from(p).simplify_vw_preserve(tolerance * tolerance);
        let geo_rings = std::iter::once(simplified.exterior()).chain(simplified.interiors());
        let rings = p
            .rings
            .iter()
            .zip(geo_rings)
            .map(|(original, ring)| LineString::new(retained(&original.points, ring)))
            .collect();
        return Some(Polygon { rings });
    }

    let mut rings = Vec::with_capacity(p.rings.len());
    for (i, ring) in p.rings.iter().enumerate() {
        let simplified = simplify_line(ring, tolerance, false);
        if simplified.points.len() >= 4 {
            rings.push(simplified);
        } else if i == 0 {
            return None;
        }
    }
    Some(Polygon { rings })
}

/// Maps a simplified line back onto the original vertices, which carry Z.
/// The simplified coordinates are an ordered subset of the original ones.
fn retained(original: &[Coord], simplified: &geo::LineString<f64>) -> Vec<Coord> {
    let mut source = original.iter();
    simplified
        .0
        .iter()
        .filter_map(|c| source.find(|o| o.x == c.x && o.y == c.y).copied())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
