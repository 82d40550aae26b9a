//! # spatialcalc - Handle-Based Geometry Workspace
//!
//! spatialcalc stores 2D/3D vector geometries in an embedded SQLite database
//! and lets callers create, query and combine them through opaque handles:
//!
//! - **Binary codec**: a SpatiaLite-compatible geometry blob format
//! - **Geometry algebra**: intersection, union, difference, buffer, simplify
//! - **Batches**: all-or-nothing groups of operations with rollback
//! - **Temp-file lifecycle**: per-process backing files and stale-file sweeps
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Workspace                              │
//! │          (create / query / combine / delete / clear)            │
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │  Operation   │  │    Batch     │  │  Codec + QuadEncoder  │  │
//! │  │    Cache     │  │  Controller  │  │   (geometry ⇄ blob)   │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  SQLite + spatial SQL functions                 │
//! │      Calculator(id, geom) · geometry_columns · spatial_ref_sys  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            Backing file under a TempRoot (or memory)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use spatialcalc::{Coord, WorkspaceBuilder};
//!
//! # fn main() -> spatialcalc::Result<()> {
//! let mut ws = WorkspaceBuilder::new().in_memory().build()?;
//!
//! let a = ws.create_quad(
//!     &Coord::xy(0.0, 0.0),
//!     &Coord::xy(1.0, 0.0),
//!     &Coord::xy(1.0, 1.0),
//!     &Coord::xy(0.0, 1.0),
//! )?;
//! let b = ws.create_geometry_from_wkt("POLYGON((0.5 0.5, 1.5 0.5, 1.5 1.5, 0.5 1.5, 0.5 0.5))")?;
//!
//! assert!(ws.intersects(a, b)?);
//! let overlap = ws.intersection(a, b)?;
//! println!("{:?}", ws.geometry_wkt(overlap)?);
//!
//! ws.dispose()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Invariants
//!
//! 1. **Handles are row ids**: never reissued after delete or clear
//! 2. **One dimension per workspace**: every stored blob matches it
//! 3. **Batches are atomic**: rollback restores rows and id allocation
//!
//! ## Module Organization
//!
//! - [`error`]: Error type for all failure modes
//! - [`types`]: Handles, dimensions, geometry type codes, SRIDs
//! - [`geometry`]: In-memory geometry values
//! - [`codec`]: Blob encoding and decoding
//! - [`quad`]: Fast path for four-corner polygons
//! - [`lifecycle`]: Temp roots and stale-file cleanup

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for workspace operations.
pub mod error;

/// Newtypes shared across the crate.
pub mod types;

/// Geometry values and the coordinate capability the creation API is generic over.
pub mod geometry;

/// SpatiaLite-compatible geometry blobs.
///
/// Pure functions, no I/O. Encoding always writes platform-native byte order;
/// decoding accepts either.
pub mod codec;

/// Byte-identical fast path for single-ring four-corner polygons.
pub mod quad;

/// Spatial SQL functions registered on each store connection.
mod engine;

/// SQLite connection, DDL and spatial metadata.
mod store;

/// Lazily compiled statements keyed by operation kind.
mod cache;

/// Transaction state machine and the scoped batch guard.
mod batch;

/// Backing-file allocation and background cleanup of stale files.
pub mod lifecycle;

/// The handle-based façade.
mod workspace;

// =============================================================================
// Re-exports
// =============================================================================

pub use batch::Batch;
pub use cache::OpKind;
pub use codec::BlobHeader;
pub use error::{Error, Result};
pub use geometry::{Coord, Envelope, GeoCoordinate, Geometry, LineString, Polygon};
pub use lifecycle::{CleanupReport, CleanupTask, TempRoot};
pub use quad::QuadEncoder;
pub use types::{Dimension, GeometryType, Handle, Srid};
pub use workspace::{Workspace, WorkspaceBuilder, WorkspaceConfig};
