//! # In-Memory Geometry Values
//!
//! The codec decodes blobs into these values and the workspace constructors
//! accept them. They are deliberately plain data: vectors of coordinates, no
//! caching of envelopes, no validation. Degenerate geometries (a one-point
//! line, an unclosed ring) are representable because the store persists them.
//!
//! ## Shape Hierarchy
//!
//! ```text
//! Geometry
//! ├── Point(Coord)
//! ├── LineString(LineString)            points
//! ├── Polygon(Polygon)                  rings[0] = exterior, rest = holes
//! ├── MultiPoint(Vec<Coord>)
//! ├── MultiLineString(Vec<LineString>)
//! ├── MultiPolygon(Vec<Polygon>)
//! └── Collection(Vec<Geometry>)         heterogeneous
//! ```
//!
//! ## Coordinate Capability
//!
//! Callers hold points in many shapes (`geo::Point`, `geo::Coord`, their own
//! lat/lng structs). Instead of one constructor per point type, every
//! creation and parsing routine is written once against [`GeoCoordinate`].

use crate::types::GeometryType;

// =============================================================================
// Coordinates
// =============================================================================

/// A single position. `x` is longitude, `y` is latitude, `z` is altitude.
///
/// In a 2D workspace `z` is ignored on encode and decodes as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    /// Creates a 2D coordinate with `z = 0`.
    pub const fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Creates a 3D coordinate.
    pub const fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Converts any [`GeoCoordinate`], defaulting a missing or non-finite
    /// altitude to `0`.
    pub fn from_geo_coordinate<C: GeoCoordinate>(c: &C) -> Self {
        let z = c.altitude().filter(|z| z.is_finite()).unwrap_or(0.0);
        Self {
            x: c.longitude(),
            y: c.latitude(),
            z,
        }
    }

    /// Returns this coordinate with `z` zeroed.
    pub const fn without_z(self) -> Self {
        Self::xy(self.x, self.y)
    }
}

/// Accessor/constructor capability shared by every point representation the
/// workspace accepts or produces.
///
/// # Rust Pattern: One Generic Instead of N Overloads
///
/// `create_line_string`, `parse_polygon` and friends take `C: GeoCoordinate`
/// so there is exactly one implementation of each routine regardless of the
/// caller's point type.
///
/// # Example
///
/// ```rust
/// use spatialcalc::GeoCoordinate;
///
/// struct LatLng { lat: f64, lng: f64 }
///
/// impl GeoCoordinate for LatLng {
///     fn latitude(&self) -> f64 { self.lat }
///     fn longitude(&self) -> f64 { self.lng }
///     fn altitude(&self) -> Option<f64> { None }
///     fn from_lat_lng(lat: f64, lng: f64, _alt: Option<f64>) -> Self {
///         LatLng { lat, lng }
///     }
/// }
/// ```
pub trait GeoCoordinate: Sized {
    fn latitude(&self) -> f64;
    fn longitude(&self) -> f64;
    /// `None` when the point carries no altitude.
    fn altitude(&self) -> Option<f64>;
    fn from_lat_lng(latitude: f64, longitude: f64, altitude: Option<f64>) -> Self;
}

impl GeoCoordinate for Coord {
    fn latitude(&self) -> f64 {
        self.y
    }

    fn longitude(&self) -> f64 {
        self.x
    }

    fn altitude(&self) -> Option<f64> {
        Some(self.z)
    }

    fn from_lat_lng(latitude: f64, longitude: f64, altitude: Option<f64>) -> Self {
        Coord::xyz(longitude, latitude, altitude.unwrap_or(0.0))
    }
}

impl GeoCoordinate for geo::Point<f64> {
    fn latitude(&self) -> f64 {
        self.y()
    }

    fn longitude(&self) -> f64 {
        self.x()
    }

    fn altitude(&self) -> Option<f64> {
        None
    }

    fn from_lat_lng(latitude: f64, longitude: f64, _altitude: Option<f64>) -> Self {
        geo::Point::new(longitude, latitude)
    }
}

impl GeoCoordinate for geo::Coord<f64> {
    fn latitude(&self) -> f64 {
        self.y
    }

    fn longitude(&self) -> f64 {
        self.x
    }

    fn altitude(&self) -> Option<f64> {
        None
    }

    fn from_lat_lng(latitude: f64, longitude: f64, _altitude: Option<f64>) -> Self {
        geo::coord! { x: longitude, y: latitude }
    }
}

// =============================================================================
// Shapes
// =============================================================================

/// An ordered sequence of positions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineString {
    pub points: Vec<Coord>,
}

impl LineString {
    pub fn new(points: Vec<Coord>) -> Self {
        Self { points }
    }

    /// Builds a line string from any coordinate type.
    pub fn from_coordinates<C: GeoCoordinate>(points: &[C]) -> Self {
        Self::new(points.iter().map(Coord::from_geo_coordinate).collect())
    }

    /// Returns a copy whose last point equals its first.
    ///
    /// Already-closed and empty sequences are returned unchanged.
    pub fn closed(mut self) -> Self {
        if let (Some(first), Some(last)) = (self.points.first(), self.points.last()) {
            if first != last {
                let first = *first;
                self.points.push(first);
            }
        }
        self
    }
}

/// A polygon as a list of rings; `rings[0]` is the exterior, the rest are holes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub rings: Vec<LineString>,
}

impl Polygon {
    pub fn new(exterior: LineString, interiors: Vec<LineString>) -> Self {
        let mut rings = Vec::with_capacity(1 + interiors.len());
        rings.push(exterior);
        rings.extend(interiors);
        Self { rings }
    }

    pub fn exterior(&self) -> Option<&LineString> {
        self.rings.first()
    }

    pub fn interiors(&self) -> &[LineString] {
        self.rings.get(1..).unwrap_or(&[])
    }
}

/// A geometry value.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(LineString),
    Polygon(Polygon),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<LineString>),
    MultiPolygon(Vec<Polygon>),
    Collection(Vec<Geometry>),
}

impl Geometry {
    /// An empty collection, the encoding of an empty algebra result.
    pub const fn empty() -> Self {
        Geometry::Collection(Vec::new())
    }

    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::Collection(_) => GeometryType::GeometryCollection,
        }
    }

    /// True when the geometry has no coordinates at all.
    pub fn is_empty(&self) -> bool {
        let mut any = false;
        self.visit_coords(&mut |_| any = true);
        !any
    }

    /// Calls `f` for every coordinate in document order.
    pub fn visit_coords(&self, f: &mut impl FnMut(&Coord)) {
        match self {
            Geometry::Point(c) => f(c),
            Geometry::LineString(ls) => ls.points.iter().for_each(f),
            Geometry::Polygon(p) => p.rings.iter().flat_map(|r| &r.points).for_each(f),
            Geometry::MultiPoint(pts) => pts.iter().for_each(f),
            Geometry::MultiLineString(lines) => lines.iter().flat_map(|l| &l.points).for_each(f),
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .flat_map(|p| &p.rings)
                .flat_map(|r| &r.points)
                .for_each(f),
            Geometry::Collection(children) => {
                for child in children {
                    child.visit_coords(f);
                }
            }
        }
    }

    /// Applies `f` to every coordinate in place.
    pub fn map_coords(&mut self, f: &mut impl FnMut(&mut Coord)) {
        match self {
            Geometry::Point(c) => f(c),
            Geometry::LineString(ls) => ls.points.iter_mut().for_each(f),
            Geometry::Polygon(p) => p.rings.iter_mut().flat_map(|r| &mut r.points).for_each(f),
            Geometry::MultiPoint(pts) => pts.iter_mut().for_each(f),
            Geometry::MultiLineString(lines) => {
                lines.iter_mut().flat_map(|l| &mut l.points).for_each(f)
            }
            Geometry::MultiPolygon(polys) => polys
                .iter_mut()
                .flat_map(|p| &mut p.rings)
                .flat_map(|r| &mut r.points)
                .for_each(f),
            Geometry::Collection(children) => {
                for child in children {
                    child.map_coords(f);
                }
            }
        }
    }

    /// Returns the geometry with every `z` set to zero.
    pub fn without_z(mut self) -> Self {
        self.map_coords(&mut |c| c.z = 0.0);
        self
    }

    /// Axis-aligned bounding rectangle over x/y. `None` when empty.
    pub fn envelope(&self) -> Option<Envelope> {
        let mut env: Option<Envelope> = None;
        self.visit_coords(&mut |c| match env.as_mut() {
            Some(e) => e.expand(c),
            None => env = Some(Envelope::at(c)),
        });
        env
    }

    /// Flattens nested collections and multi-geometries inside a collection
    /// into a single level of points, line strings and polygons.
    ///
    /// Non-collection geometries are returned unchanged.
    pub fn flattened(self) -> Self {
        match self {
            Geometry::Collection(children) => {
                let mut leaves = Vec::with_capacity(children.len());
                for child in children {
                    push_leaves(child, &mut leaves);
                }
                Geometry::Collection(leaves)
            }
            other => other,
        }
    }
}

fn push_leaves(geometry: Geometry, out: &mut Vec<Geometry>) {
    match geometry {
        Geometry::MultiPoint(pts) => out.extend(pts.into_iter().map(Geometry::Point)),
        Geometry::MultiLineString(lines) => out.extend(lines.into_iter().map(Geometry::LineString)),
        Geometry::MultiPolygon(polys) => out.extend(polys.into_iter().map(Geometry::Polygon)),
        Geometry::Collection(children) => {
            for child in children {
                push_leaves(child, out);
            }
        }
        leaf => out.push(leaf),
    }
}

// =============================================================================
// Envelope (MBR)
// =============================================================================

/// Minimum bounding rectangle stored in every blob header.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Bounds of a coordinate sequence. `None` when empty.
    pub(crate) fn of_coords<'a>(coords: impl IntoIterator<Item = &'a Coord>) -> Option<Self> {
        let mut coords = coords.into_iter();
        let mut env = Self::at(coords.next()?);
        coords.for_each(|c| env.expand(c));
        Some(env)
    }

    fn at(c: &Coord) -> Self {
        Self {
            min_x: c.x,
            min_y: c.y,
            max_x: c.x,
            max_y: c.y,
        }
    }

    fn expand(&mut self, c: &Coord) {
        self.min_x = self.min_x.min(c.x);
        self.min_y = self.min_y.min(c.y);
        self.max_x = self.max_x.max(c.x);
        self.max_y = self.max_y.max(c.y);
    }
}

// =============================================================================
// geo-types Interop
// =============================================================================
//
// The engine functions compute with `geo`, which is 2D only. Converting to
// geo drops z; converting back yields z = 0.

impl From<&Coord> for geo::Coord<f64> {
    fn from(c: &Coord) -> Self {
        geo::coord! { x: c.x, y: c.y }
    }
}

impl From<geo::Coord<f64>> for Coord {
    fn from(c: geo::Coord<f64>) -> Self {
        Coord::xy(c.x, c.y)
    }
}

impl From<&LineString> for geo::LineString<f64> {
    fn from(ls: &LineString) -> Self {
        geo::LineString::new(ls.points.iter().map(geo::Coord::from).collect())
    }
}

impl From<&geo::LineString<f64>> for LineString {
    fn from(ls: &geo::LineString<f64>) -> Self {
        LineString::new(ls.0.iter().map(|c| Coord::from(*c)).collect())
    }
}

impl From<&Polygon> for geo::Polygon<f64> {
    fn from(p: &Polygon) -> Self {
        let exterior = p
            .exterior()
            .map(geo::LineString::from)
            .unwrap_or_else(|| geo::LineString::new(vec![]));
        let interiors = p.interiors().iter().map(geo::LineString::from).collect();
        geo::Polygon::new(exterior, interiors)
    }
}

impl From<&geo::Polygon<f64>> for Polygon {
    fn from(p: &geo::Polygon<f64>) -> Self {
        if p.exterior().0.is_empty() {
            return Polygon::default();
        }
        Polygon::new(
            LineString::from(p.exterior()),
            p.interiors().iter().map(LineString::from).collect(),
        )
    }
}

impl From<&Geometry> for geo::Geometry<f64> {
    fn from(g: &Geometry) -> Self {
        match g {
            Geometry::Point(c) => geo::Geometry::Point(geo::Point(c.into())),
            Geometry::LineString(ls) => geo::Geometry::LineString(ls.into()),
            Geometry::Polygon(p) => geo::Geometry::Polygon(p.into()),
            Geometry::MultiPoint(pts) => geo::Geometry::MultiPoint(geo::MultiPoint::new(
                pts.iter().map(|c| geo::Point(c.into())).collect(),
            )),
            Geometry::MultiLineString(lines) => geo::Geometry::MultiLineString(
                geo::MultiLineString::new(lines.iter().map(geo::LineString::from).collect()),
            ),
            Geometry::MultiPolygon(polys) => geo::Geometry::MultiPolygon(geo::MultiPolygon::new(
                polys.iter().map(geo::Polygon::from).collect(),
            )),
            Geometry::Collection(children) => geo::Geometry::GeometryCollection(geo::GeometryCollection(
                children.iter().map(geo::Geometry::from).collect(),
            )),
        }
    }
}

impl From<&geo::Geometry<f64>> for Geometry {
    fn from(g: &geo::Geometry<f64>) -> Self {
        match g {
            geo::Geometry::Point(p) => Geometry::Point(p.0.into()),
            geo::Geometry::Line(l) => {
                Geometry::LineString(LineString::new(vec![l.start.into(), l.end.into()]))
            }
            geo::Geometry::LineString(ls) => Geometry::LineString(ls.into()),
            geo::Geometry::Polygon(p) => Geometry::Polygon(p.into()),
            geo::Geometry::MultiPoint(mp) => {
                Geometry::MultiPoint(mp.0.iter().map(|p| p.0.into()).collect())
            }
            geo::Geometry::MultiLineString(mls) => {
                Geometry::MultiLineString(mls.0.iter().map(LineString::from).collect())
            }
            geo::Geometry::MultiPolygon(mp) => {
                Geometry::MultiPolygon(mp.0.iter().map(Polygon::from).collect())
            }
            geo::Geometry::GeometryCollection(gc) => {
                Geometry::Collection(gc.0.iter().map(Geometry::from).collect())
            }
            geo::Geometry::Rect(r) => Geometry::Polygon((&r.to_polygon()).into()),
            geo::Geometry::Triangle(t) => Geometry::Polygon((&t.to_polygon()).into()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
