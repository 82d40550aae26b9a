//! # Domain Types for spatialcalc
//!
//! This module defines the small value types used throughout the workspace:
//! geometry handles, the dimension mode, geometry type codes and spatial
//! reference ids.
//!
//! ## Design Philosophy: Newtypes for Safety
//!
//! A handle is "just" an `i64` row id, and an SRID is "just" an `i32`. Wrapping
//! them in single-field structs means a handle can never be passed where a
//! type code or SRID is expected, and the invalidation rules can live on the
//! type itself where callers will read them.

use std::fmt;

// =============================================================================
// Geometry Handle
// =============================================================================

/// An opaque reference to a geometry stored in a workspace.
///
/// # Arena and Index
///
/// The workspace's backing table is an arena and the handle is an index into
/// it: the value is the auto-increment primary key (`id`) of the row holding
/// the geometry blob. The row itself is never exposed, only this integer.
///
/// # Invalidation Rules
///
/// A handle is valid only while:
///
/// 1. the workspace that issued it has not been disposed, and
/// 2. its row has not been removed by `clear()` or `delete_geometry()`.
///
/// `clear()` invalidates **all** previously issued handles atomically. Rolling
/// back a batch invalidates every handle issued inside that batch.
///
/// There is no liveness tracking, so using a stale handle is unspecified.
/// Today lookups against a removed row return `None`/`false` and in-place
/// operations targeting one write nothing. Ids are not reissued, except that a
/// rolled-back batch gives its ids out again. Callers must not rely on any of
/// this.
///
/// # Example
///
/// ```rust
/// use spatialcalc::{Coord, WorkspaceBuilder};
///
/// let mut ws = WorkspaceBuilder::new().in_memory().build()?;
/// let handle = ws.create_point(&Coord::xy(1.0, 2.0))?;
/// assert!(ws.geometry(handle)?.is_some());
///
/// ws.clear()?;
/// assert!(ws.geometry(handle)?.is_none());
/// # Ok::<(), spatialcalc::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(i64);

impl Handle {
    /// Creates a handle from a raw row id.
    ///
    /// Intended for callers that persisted a handle as an integer. The
    /// invalidation rules above still apply.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw row id.
    pub fn as_raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Dimension Mode
// =============================================================================

/// Workspace-wide coordinate dimension mode.
///
/// Fixed at construction. Governs whether points carry a Z coordinate when
/// encoded: `Xy` writes two doubles per point, `Xyz` writes three and adds
/// 1000 to every class type in the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dimension {
    /// Two-dimensional points (x, y).
    #[default]
    Xy,
    /// Three-dimensional points (x, y, z).
    Xyz,
}

impl Dimension {
    /// Number of doubles written per point.
    pub const fn coordinate_count(self) -> usize {
        match self {
            Dimension::Xy => 2,
            Dimension::Xyz => 3,
        }
    }

    /// Encoded size of one point in bytes.
    pub const fn point_size(self) -> usize {
        self.coordinate_count() * 8
    }

    /// Offset added to class types in the geometry blob.
    pub const fn class_offset(self) -> i32 {
        match self {
            Dimension::Xy => 0,
            Dimension::Xyz => 1000,
        }
    }

    /// Name of the dimension model recorded in the geometry column metadata.
    pub const fn model_name(self) -> &'static str {
        match self {
            Dimension::Xy => "XY",
            Dimension::Xyz => "XYZ",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

// =============================================================================
// Geometry Type Codes
// =============================================================================

/// Geometry type as reported by `geometry_type()`.
///
/// The numeric codes are part of the public contract: point=1 through
/// collection=7. A missing handle is reported as `None` (code 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum GeometryType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
}

impl GeometryType {
    /// Returns the numeric type code.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Parses a numeric type code, ignoring any dimension offset.
    ///
    /// Returns `None` for 0 and for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code % 1000 {
            1 => Some(GeometryType::Point),
            2 => Some(GeometryType::LineString),
            3 => Some(GeometryType::Polygon),
            4 => Some(GeometryType::MultiPoint),
            5 => Some(GeometryType::MultiLineString),
            6 => Some(GeometryType::MultiPolygon),
            7 => Some(GeometryType::GeometryCollection),
            _ => None,
        }
    }

    /// Upper-case WKT keyword for this type.
    pub const fn wkt_keyword(self) -> &'static str {
        match self {
            GeometryType::Point => "POINT",
            GeometryType::LineString => "LINESTRING",
            GeometryType::Polygon => "POLYGON",
            GeometryType::MultiPoint => "MULTIPOINT",
            GeometryType::MultiLineString => "MULTILINESTRING",
            GeometryType::MultiPolygon => "MULTIPOLYGON",
            GeometryType::GeometryCollection => "GEOMETRYCOLLECTION",
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wkt_keyword())
    }
}

// =============================================================================
// Spatial Reference Id
// =============================================================================

/// Spatial reference id written into every blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Srid(i32);

impl Srid {
    /// WGS84 geographic coordinates.
    pub const WGS84: Srid = Srid(4326);

    /// Creates an SRID from its numeric value.
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    pub const fn as_raw(&self) -> i32 {
        self.0
    }
}

impl Default for Srid {
    fn default() -> Self {
        Srid::WGS84
    }
}

impl fmt::Display for Srid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
