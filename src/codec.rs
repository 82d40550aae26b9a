//! # Geometry Blob Encoding and Decoding
//!
//! This module converts between [`Geometry`] values and the SQLite spatial
//! blob layout stored in the `Calculator.geom` column. It is pure: no I/O, no
//! shared state.
//!
//! ## Blob Format
//!
//! ```text
//! offset 0   : 0x00                      block marker
//! offset 1   : 0x00 big | 0x01 little    byte order of everything that follows
//! offset 2   : i32 srid
//! offset 6   : f64 minX, minY, maxX, maxY
//! offset 38  : 0x7C                      MBR terminator
//! offset 39  : i32 class type            (+1000 when XYZ)
//! offset 43  : payload
//! last byte  : 0xFE                      geometry terminator
//! ```
//!
//! Payloads:
//!
//! ```text
//! Point       : x y [z]
//! LineString  : i32 n, n points
//! Polygon     : i32 rings, each ring as a LineString payload
//! Multi*/Coll : i32 n, n × (0x69, i32 child class, child payload)
//! ```
//!
//! ## Byte Order
//!
//! Encoding always writes platform-native order and sets the marker to match.
//! Decoding honours whichever marker it finds.
//!
//! ## Dimension
//!
//! The encoder never promotes or demotes: in an `Xy` workspace `z` is simply
//! not written, in `Xyz` it always is. Decoding reads the dimension from the
//! class type of each geometry.

use crate::error::{Error, Result};
use crate::geometry::{Coord, Envelope, GeoCoordinate, Geometry, LineString, Polygon};
use crate::types::{Dimension, GeometryType, Srid};

// =============================================================================
// Format Constants
// =============================================================================

pub const BLOCK_START: u8 = 0x00;
pub const BIG_ENDIAN: u8 = 0x00;
pub const LITTLE_ENDIAN: u8 = 0x01;
pub const MBR_END: u8 = 0x7C;
pub const CHILD_MARKER: u8 = 0x69;
pub const BLOCK_END: u8 = 0xFE;

/// Bytes before the class-specific payload.
pub const HEADER_SIZE: usize = 43;

/// Smallest possible blob: header, an empty count, terminator.
pub const MIN_BLOB_SIZE: usize = HEADER_SIZE + 4 + 1;

/// The marker matching `to_ne_bytes`.
pub const fn native_endian_marker() -> u8 {
    if cfg!(target_endian = "little") {
        LITTLE_ENDIAN
    } else {
        BIG_ENDIAN
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes a geometry into a blob.
///
/// The MBR is computed over every coordinate; an empty geometry gets an MBR of
/// zeros. Collections are flattened first so their children are always points,
/// line strings or polygons.
///
/// # Example
///
/// ```rust
/// use spatialcalc::codec::{decode, encode};
/// use spatialcalc::{Coord, Dimension, Geometry, Srid};
///
/// let point = Geometry::Point(Coord::xy(-77.0, 38.9));
/// let blob = encode(&point, Dimension::Xy, Srid::WGS84);
/// assert_eq!(blob.len(), 60);
/// assert_eq!(decode(&blob)?, point);
/// # Ok::<(), spatialcalc::Error>(())
/// ```
pub fn encode(geometry: &Geometry, dimension: Dimension, srid: Srid) -> Vec<u8> {
    let flat;
    let geometry = match geometry {
        Geometry::Collection(children) if children.iter().any(needs_flattening) => {
            flat = geometry.clone().flattened();
            &flat
        }
        other => other,
    };

    let envelope = geometry.envelope().unwrap_or_default();
    let mut writer = Writer::with_capacity(HEADER_SIZE + payload_size(geometry, dimension) + 1);

    writer.header(srid, &envelope, class_type(geometry.geometry_type(), dimension));
    writer.payload(geometry, dimension);
    writer.u8(BLOCK_END);

    writer.finish()
}

fn needs_flattening(child: &Geometry) -> bool {
    !matches!(
        child,
        Geometry::Point(_) | Geometry::LineString(_) | Geometry::Polygon(_)
    )
}

/// Class type integer for a geometry type in a given dimension.
pub fn class_type(kind: GeometryType, dimension: Dimension) -> i32 {
    kind.code() + dimension.class_offset()
}

/// Payload size in bytes, excluding header and terminator.
fn payload_size(geometry: &Geometry, dimension: Dimension) -> usize {
    let point = dimension.point_size();
    let line = |ls: &LineString| 4 + ls.points.len() * point;
    let polygon = |p: &Polygon| 4 + p.rings.iter().map(line).sum::<usize>();
    // 0x69 marker + child class type
    const CHILD: usize = 5;

    match geometry {
        Geometry::Point(_) => point,
        Geometry::LineString(ls) => line(ls),
        Geometry::Polygon(p) => polygon(p),
        Geometry::MultiPoint(pts) => 4 + pts.len() * (CHILD + point),
        Geometry::MultiLineString(lines) => {
            4 + lines.iter().map(|l| CHILD + line(l)).sum::<usize>()
        }
        Geometry::MultiPolygon(polys) => {
            4 + polys.iter().map(|p| CHILD + polygon(p)).sum::<usize>()
        }
        Geometry::Collection(children) => {
            4 + children
                .iter()
                .map(|c| CHILD + payload_size(c, dimension))
                .sum::<usize>()
        }
    }
}

/// Native-order byte writer. Crate-visible so the quad encoder can share it.
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(crate) fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub(crate) fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    fn count(&mut self, n: usize) {
        // Counts beyond i32 cannot be represented in the format.
        self.i32(n as i32);
    }

    pub(crate) fn header(&mut self, srid: Srid, mbr: &Envelope, class: i32) {
        self.u8(BLOCK_START);
        self.u8(native_endian_marker());
        self.i32(srid.as_raw());
        self.f64(mbr.min_x);
        self.f64(mbr.min_y);
        self.f64(mbr.max_x);
        self.f64(mbr.max_y);
        self.u8(MBR_END);
        self.i32(class);
    }

    pub(crate) fn coord(&mut self, c: &Coord, dimension: Dimension) {
        self.f64(c.x);
        self.f64(c.y);
        if dimension == Dimension::Xyz {
            self.f64(c.z);
        }
    }

    fn line(&mut self, ls: &LineString, dimension: Dimension) {
        self.count(ls.points.len());
        for c in &ls.points {
            self.coord(c, dimension);
        }
    }

    fn polygon(&mut self, p: &Polygon, dimension: Dimension) {
        self.count(p.rings.len());
        for ring in &p.rings {
            self.line(ring, dimension);
        }
    }

    fn child(&mut self, kind: GeometryType, dimension: Dimension) {
        self.u8(CHILD_MARKER);
        self.i32(class_type(kind, dimension));
    }

    fn payload(&mut self, geometry: &Geometry, dimension: Dimension) {
        match geometry {
            Geometry::Point(c) => self.coord(c, dimension),
            Geometry::LineString(ls) => self.line(ls, dimension),
            Geometry::Polygon(p) => self.polygon(p, dimension),
            Geometry::MultiPoint(pts) => {
                self.count(pts.len());
                for c in pts {
                    self.child(GeometryType::Point, dimension);
                    self.coord(c, dimension);
                }
            }
            Geometry::MultiLineString(lines) => {
                self.count(lines.len());
                for l in lines {
                    self.child(GeometryType::LineString, dimension);
                    self.line(l, dimension);
                }
            }
            Geometry::MultiPolygon(polys) => {
                self.count(polys.len());
                for p in polys {
                    self.child(GeometryType::Polygon, dimension);
                    self.polygon(p, dimension);
                }
            }
            Geometry::Collection(children) => {
                self.count(children.len());
                for c in children {
                    self.child(c.geometry_type(), dimension);
                    self.payload(c, dimension);
                }
            }
        }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Header fields readable without decoding the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobHeader {
    pub srid: Srid,
    pub envelope: Envelope,
    pub geometry_type: GeometryType,
    pub dimension: Dimension,
}

/// Reads and validates the fixed 43-byte header.
pub fn decode_header(bytes: &[u8]) -> Result<BlobHeader> {
    let mut reader = Reader::new(bytes)?;
    reader.header()
}

/// Decodes a blob into a geometry.
///
/// # Errors
///
/// `Error::Decode` for a bad marker, an unknown class type, a child whose
/// class does not belong in its parent, a truncated blob or trailing bytes.
pub fn decode(bytes: &[u8]) -> Result<Geometry> {
    let mut reader = Reader::new(bytes)?;
    let header = reader.header()?;
    let geometry = reader.payload(header.geometry_type, header.dimension)?;

    let end = reader.u8()?;
    if end != BLOCK_END {
        return Err(Error::Decode(format!(
            "expected geometry terminator 0xFE, found {end:#04x}"
        )));
    }
    if reader.remaining() != 0 {
        return Err(Error::Decode(format!(
            "{} trailing bytes after geometry terminator",
            reader.remaining()
        )));
    }
    Ok(geometry)
}

fn parse_class(class: i32) -> Result<(GeometryType, Dimension)> {
    let dimension = match class / 1000 {
        0 => Dimension::Xy,
        1 => Dimension::Xyz,
        _ => return Err(Error::Decode(format!("unsupported class type {class}"))),
    };
    let kind = GeometryType::from_code(class)
        .ok_or_else(|| Error::Decode(format!("unknown class type {class}")))?;
    Ok((kind, dimension))
}

/// Cursor over a blob honouring its endianness marker.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Decode(format!(
                "blob too short: {} bytes, header needs {HEADER_SIZE}",
                buf.len()
            )));
        }
        if buf[0] != BLOCK_START {
            return Err(Error::Decode(format!(
                "expected block marker 0x00, found {:#04x}",
                buf[0]
            )));
        }
        let big_endian = match buf[1] {
            BIG_ENDIAN => true,
            LITTLE_ENDIAN => false,
            other => {
                return Err(Error::Decode(format!(
                    "invalid endianness marker {other:#04x}"
                )))
            }
        };
        Ok(Self {
            buf,
            pos: 2,
            big_endian,
        })
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| {
            Error::Decode(format!("truncated blob at offset {}", self.pos))
        })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take::<4>()?;
        Ok(if self.big_endian {
            i32::from_be_bytes(b)
        } else {
            i32::from_le_bytes(b)
        })
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.take::<8>()?;
        Ok(if self.big_endian {
            f64::from_be_bytes(b)
        } else {
            f64::from_le_bytes(b)
        })
    }

    /// Reads a count and checks it against the bytes left.
    fn count(&mut self, min_item_size: usize) -> Result<usize> {
        let n = self.i32()?;
        let n = usize::try_from(n)
            .map_err(|_| Error::Decode(format!("negative element count {n}")))?;
        if n.saturating_mul(min_item_size) > self.remaining() {
            return Err(Error::Decode(format!(
                "element count {n} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(n)
    }

    fn header(&mut self) -> Result<BlobHeader> {
        let srid = Srid::new(self.i32()?);
        let envelope = Envelope {
            min_x: self.f64()?,
            min_y: self.f64()?,
            max_x: self.f64()?,
            max_y: self.f64()?,
        };
        let mbr_end = self.u8()?;
        if mbr_end != MBR_END {
            return Err(Error::Decode(format!(
                "expected MBR terminator 0x7C, found {mbr_end:#04x}"
            )));
        }
        let (geometry_type, dimension) = parse_class(self.i32()?)?;
        Ok(BlobHeader {
            srid,
            envelope,
            geometry_type,
            dimension,
        })
    }

    fn coord(&mut self, dimension: Dimension) -> Result<Coord> {
        let x = self.f64()?;
        let y = self.f64()?;
        let z = match dimension {
            Dimension::Xy => 0.0,
            Dimension::Xyz => self.f64()?,
        };
        Ok(Coord { x, y, z })
    }

    fn line(&mut self, dimension: Dimension) -> Result<LineString> {
        let n = self.count(dimension.point_size())?;
        let points = (0..n)
            .map(|_| self.coord(dimension))
            .collect::<Result<Vec<_>>>()?;
        Ok(LineString::new(points))
    }

    fn polygon(&mut self, dimension: Dimension) -> Result<Polygon> {
        let n = self.count(4)?;
        let rings = (0..n)
            .map(|_| self.line(dimension))
            .collect::<Result<Vec<_>>>()?;
        Ok(Polygon { rings })
    }

    /// Reads a `0x69` child header, returning its class.
    fn child(&mut self) -> Result<(GeometryType, Dimension)> {
        let marker = self.u8()?;
        if marker != CHILD_MARKER {
            return Err(Error::Decode(format!(
                "expected child marker 0x69, found {marker:#04x}"
            )));
        }
        parse_class(self.i32()?)
    }

    fn child_of(&mut self, expected: GeometryType) -> Result<Dimension> {
        let (kind, dimension) = self.child()?;
        if kind != expected {
            return Err(Error::Decode(format!(
                "expected {expected} child, found {kind}"
            )));
        }
        Ok(dimension)
    }

    fn payload(&mut self, kind: GeometryType, dimension: Dimension) -> Result<Geometry> {
        // 0x69 marker + class type
        const CHILD: usize = 5;

        Ok(match kind {
            GeometryType::Point => Geometry::Point(self.coord(dimension)?),
            GeometryType::LineString => Geometry::LineString(self.line(dimension)?),
            GeometryType::Polygon => Geometry::Polygon(self.polygon(dimension)?),
            GeometryType::MultiPoint => {
                let n = self.count(CHILD)?;
                let mut pts = Vec::with_capacity(n);
                for _ in 0..n {
                    let d = self.child_of(GeometryType::Point)?;
                    pts.push(self.coord(d)?);
                }
                Geometry::MultiPoint(pts)
            }
            GeometryType::MultiLineString => {
                let n = self.count(CHILD)?;
                let mut lines = Vec::with_capacity(n);
                for _ in 0..n {
                    let d = self.child_of(GeometryType::LineString)?;
                    lines.push(self.line(d)?);
                }
                Geometry::MultiLineString(lines)
            }
            GeometryType::MultiPolygon => {
                let n = self.count(CHILD)?;
                let mut polys = Vec::with_capacity(n);
                for _ in 0..n {
                    let d = self.child_of(GeometryType::Polygon)?;
                    polys.push(self.polygon(d)?);
                }
                Geometry::MultiPolygon(polys)
            }
            GeometryType::GeometryCollection => {
                let n = self.count(CHILD)?;
                let mut children = Vec::with_capacity(n);
                for _ in 0..n {
                    let (child, d) = self.child()?;
                    if !matches!(
                        child,
                        GeometryType::Point | GeometryType::LineString | GeometryType::Polygon
                    ) {
                        return Err(Error::Decode(format!(
                            "{child} cannot be nested in a collection blob"
                        )));
                    }
                    children.push(self.payload(child, d)?);
                }
                Geometry::Collection(children)
            }
        })
    }
}

// =============================================================================
// Shape-Specific Parsers
// =============================================================================
//
// Each parser decodes the blob and insists on one class type. They are
// generic over the caller's point type so there is one routine per shape.

fn mismatch(expected: GeometryType, found: &Geometry) -> Error {
    Error::Decode(format!(
        "expected {expected}, found {}",
        found.geometry_type()
    ))
}

fn to_point<C: GeoCoordinate>(c: &Coord, dimension: Dimension) -> C {
    let altitude = match dimension {
        Dimension::Xy => None,
        Dimension::Xyz => Some(c.z),
    };
    C::from_lat_lng(c.y, c.x, altitude)
}

fn to_points<C: GeoCoordinate>(ls: &LineString, dimension: Dimension) -> Vec<C> {
    ls.points.iter().map(|c| to_point(c, dimension)).collect()
}

fn to_rings<C: GeoCoordinate>(p: &Polygon, dimension: Dimension) -> Vec<Vec<C>> {
    p.rings.iter().map(|r| to_points(r, dimension)).collect()
}

/// Decodes a `Point` blob.
pub fn parse_point<C: GeoCoordinate>(blob: &[u8]) -> Result<C> {
    let dimension = decode_header(blob)?.dimension;
    match decode(blob)? {
        Geometry::Point(c) => Ok(to_point(&c, dimension)),
        other => Err(mismatch(GeometryType::Point, &other)),
    }
}

/// Decodes a `LineString` blob into its points.
pub fn parse_line_string<C: GeoCoordinate>(blob: &[u8]) -> Result<Vec<C>> {
    let dimension = decode_header(blob)?.dimension;
    match decode(blob)? {
        Geometry::LineString(ls) => Ok(to_points(&ls, dimension)),
        other => Err(mismatch(GeometryType::LineString, &other)),
    }
}

/// Decodes a `Polygon` blob into its rings, exterior first.
pub fn parse_polygon<C: GeoCoordinate>(blob: &[u8]) -> Result<Vec<Vec<C>>> {
    let dimension = decode_header(blob)?.dimension;
    match decode(blob)? {
        Geometry::Polygon(p) => Ok(to_rings(&p, dimension)),
        other => Err(mismatch(GeometryType::Polygon, &other)),
    }
}

/// Decodes a `MultiLineString` blob.
pub fn parse_multi_line_string<C: GeoCoordinate>(blob: &[u8]) -> Result<Vec<Vec<C>>> {
    let dimension = decode_header(blob)?.dimension;
    match decode(blob)? {
        Geometry::MultiLineString(lines) => {
            Ok(lines.iter().map(|l| to_points(l, dimension)).collect())
        }
        other => Err(mismatch(GeometryType::MultiLineString, &other)),
    }
}

/// Decodes a `MultiPolygon` blob, one ring list per polygon.
pub fn parse_multi_polygon<C: GeoCoordinate>(blob: &[u8]) -> Result<Vec<Vec<Vec<C>>>> {
    let dimension = decode_header(blob)?.dimension;
    match decode(blob)? {
        Geometry::MultiPolygon(polys) => {
            Ok(polys.iter().map(|p| to_rings(p, dimension)).collect())
        }
        other => Err(mismatch(GeometryType::MultiPolygon, &other)),
    }
}

// =============================================================================
// Tests
// =============================================================================
