//! # Workspace
//!
//! The handle-based façade over the backing store.
//!
//! ```text
//!  caller ──► Workspace ──► OperationCache ──► SQLite (+ spatial functions)
//!              │  │                                 ▲
//!              │  └── codec / QuadEncoder ── blob ──┘
//!              └───── BatchController (BEGIN / COMMIT / ROLLBACK)
//! ```
//!
//! Geometries live in the store's `Calculator` table; callers only ever hold
//! [`Handle`]s. Every operation is a single cached statement, and all
//! geometric computation happens inside the store's SQL functions.
//!
//! ## Allocate and In-Place Forms
//!
//! Each algebra operation comes in two forms:
//!
//! - `op(a, b)` inserts the result as a new row and returns its handle.
//! - `op_into(a, b, result)` overwrites the existing row `result`, which may
//!   be one of the operands.
//!
//! ## Disposal
//!
//! [`Workspace::dispose`] is the primary release path: it drops the compiled
//! statements, closes the connection and deletes the backing file, reporting
//! any error. `Drop` does the same as a safety net and can only log.

use std::path::Path;
use std::sync::Arc;

use rusqlite::types::FromSql;
use rusqlite::{params, CachedStatement, OptionalExtension, Params};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::batch::{Batch, BatchController};
use crate::cache::{OpKind, OperationCache};
use crate::codec;
use crate::geometry::{Coord, GeoCoordinate, Geometry, LineString, Polygon};
use crate::lifecycle::TempRoot;
use crate::quad::QuadEncoder;
use crate::store::Store;
use crate::types::{Dimension, GeometryType, Handle, Srid};
use crate::{Error, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Settings fixed for the lifetime of a workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Keep the store in memory instead of a temporary backing file.
    pub in_memory: bool,
    pub dimension: Dimension,
    /// SRID stamped on every geometry the workspace creates.
    pub srid: Srid,
    /// Where backing files go. `None` means [`TempRoot::shared`].
    pub temp_root: Option<Arc<TempRoot>>,
    /// Start a detached sweep of `temp_root` when the workspace opens.
    pub cleanup_temp_root: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            in_memory: false,
            dimension: Dimension::Xy,
            srid: Srid::WGS84,
            temp_root: None,
            cleanup_temp_root: false,
        }
    }
}

/// Builder for [`Workspace`].
///
/// ```no_run
/// use spatialcalc::{Srid, WorkspaceBuilder};
///
/// # fn main() -> spatialcalc::Result<()> {
/// let ws = WorkspaceBuilder::new()
///     .include_point_z_dimension()
///     .srid(Srid::new(3857))
///     .build()?;
/// assert!(ws.backing_path().is_some());
/// ws.dispose()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorkspaceBuilder {
    config: WorkspaceConfig,
}

impl WorkspaceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_memory(mut self) -> Self {
        self.config.in_memory = true;
        self
    }

    /// Switches to 3D: points carry a Z coordinate.
    pub fn include_point_z_dimension(self) -> Self {
        self.dimension(Dimension::Xyz)
    }

    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.config.dimension = dimension;
        self
    }

    pub fn srid(mut self, srid: Srid) -> Self {
        self.config.srid = srid;
        self
    }

    /// Places backing files under `root` instead of the shared root.
    ///
    /// Only the shared root sweeps leftovers on its own. A root passed here
    /// is never swept unless [`cleanup_on_build`](Self::cleanup_on_build) is
    /// set or [`TempRoot::spawn_cleanup`] is called.
    pub fn temp_root(mut self, root: Arc<TempRoot>) -> Self {
        self.config.temp_root = Some(root);
        self
    }

    /// Sweeps stale files under the temp root in the background when the
    /// workspace is built. Live workspaces' files are never touched.
    pub fn cleanup_on_build(mut self) -> Self {
        self.config.cleanup_temp_root = true;
        self
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn build(self) -> Result<Workspace> {
        Workspace::open(self.config)
    }
}

// =============================================================================
// Workspace
// =============================================================================

/// A store of geometries addressed by [`Handle`].
///
/// Not thread-safe: a workspace is meant to be used from one thread. While a
/// batch is open that is a hard requirement.
#[derive(Debug)]
pub struct Workspace {
    /// `None` only once released.
    store: Option<Store>,
    cache: OperationCache,
    batch: BatchController,
    quad: QuadEncoder,
    dimension: Dimension,
    srid: Srid,
    backing: Option<TempPath>,
}

fn live(store: &Option<Store>) -> &Store {
    match store {
        Some(store) => store,
        None => unreachable!("workspace used after release"),
    }
}

impl Workspace {
    /// Opens a workspace with `config`.
    ///
    /// If a backing file cannot be allocated the workspace falls back to
    /// memory. A store that fails to open or initialize is an `Error::Init`.
    pub fn open(config: WorkspaceConfig) -> Result<Self> {
        let WorkspaceConfig {
            in_memory,
            dimension,
            srid,
            temp_root,
            cleanup_temp_root,
        } = config;

        let (store, backing) = if in_memory {
            (Store::open_in_memory(dimension, srid)?, None)
        } else {
            let root = temp_root.unwrap_or_else(TempRoot::shared);
            if cleanup_temp_root {
                match root.spawn_cleanup() {
                    Ok(task) => task.detach(),
                    Err(e) => warn!(error = %e, "could not start temp cleanup"),
                }
            }
            match root.allocate_backing_file() {
                Ok(path) => {
                    debug!(path = %path.display(), "allocated backing file");
                    (Store::open(&path, dimension, srid)?, Some(path))
                }
                Err(e) => {
                    warn!(error = %e, root = %root.path().display(), "no backing file, using memory");
                    (Store::open_in_memory(dimension, srid)?, None)
                }
            }
        };

        let cache = OperationCache::new(store.connection(), dimension);
        info!(
            %dimension,
            %srid,
            backing = ?backing.as_deref(),
            "opened workspace"
        );

        Ok(Self {
            store: Some(store),
            cache,
            batch: BatchController::new(),
            quad: QuadEncoder::new(dimension, srid),
            dimension,
            srid,
            backing,
        })
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn srid(&self) -> Srid {
        self.srid
    }

    /// Path of the backing file, or `None` for a memory-only workspace.
    pub fn backing_path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    // =========================================================================
    // Statement Plumbing
    // =========================================================================

    fn statement(&mut self, kind: OpKind) -> Result<CachedStatement<'_>> {
        self.batch.check_affinity();
        self.cache.statement(live(&self.store).connection(), kind)
    }

    fn insert(&mut self, kind: OpKind, params: impl Params) -> Result<Handle> {
        let mut stmt = self.statement(kind)?;
        let id = stmt.insert(params).map_err(Error::from_engine)?;
        Ok(Handle::from_raw(id))
    }

    fn execute(&mut self, kind: OpKind, params: impl Params) -> Result<usize> {
        let mut stmt = self.statement(kind)?;
        stmt.execute(params).map_err(Error::from_engine)
    }

    /// First column of the first row; `None` for no row or a NULL value.
    fn query_opt<T: FromSql>(&mut self, kind: OpKind, params: impl Params) -> Result<Option<T>> {
        let mut stmt = self.statement(kind)?;
        stmt.query_row(params, |row| row.get::<_, Option<T>>(0))
            .optional()
            .map(Option::flatten)
            .map_err(Error::from_engine)
    }

    fn blob_of(&self, geometry: &Geometry) -> Vec<u8> {
        codec::encode(geometry, self.dimension, self.srid)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    pub fn create_point<C: GeoCoordinate>(&mut self, coordinate: &C) -> Result<Handle> {
        let c = Coord::from_geo_coordinate(coordinate);
        let srid = self.srid.as_raw();
        match self.dimension {
            Dimension::Xy => self.insert(OpKind::InsertPoint, params![c.x, c.y, srid]),
            Dimension::Xyz => self.insert(OpKind::InsertPoint, params![c.x, c.y, c.z, srid]),
        }
    }

    /// Stores the points as a line string. Degenerate input is stored as is.
    pub fn create_line_string<C: GeoCoordinate>(&mut self, points: &[C]) -> Result<Handle> {
        self.create_geometry(&Geometry::LineString(LineString::from_coordinates(points)))
    }

    /// Stores a single-ring polygon. The ring is not closed for you.
    pub fn create_polygon<C: GeoCoordinate>(&mut self, exterior: &[C]) -> Result<Handle> {
        self.create_polygon_with_rings(exterior, &[])
    }

    pub fn create_polygon_with_rings<C: GeoCoordinate>(
        &mut self,
        exterior: &[C],
        interiors: &[Vec<C>],
    ) -> Result<Handle> {
        self.create_geometry(&polygon_of(exterior, interiors))
    }

    /// Stores the closed ring `a, b, c, d, a` through the quad fast path.
    pub fn create_quad<C: GeoCoordinate>(&mut self, a: &C, b: &C, c: &C, d: &C) -> Result<Handle> {
        let blob = self.quad.encode(&corners(a, b, c, d));
        self.insert(OpKind::InsertBlob, params![blob])
    }

    pub fn create_geometry(&mut self, geometry: &Geometry) -> Result<Handle> {
        let blob = self.blob_of(geometry);
        self.insert(OpKind::InsertBlob, params![blob])
    }

    /// Stores an encoded blob after validating it.
    ///
    /// A blob of the other dimension is re-encoded in this workspace's
    /// dimension; its SRID is kept.
    ///
    /// # Errors
    ///
    /// `Error::Decode` if the blob is malformed.
    pub fn create_geometry_from_blob(&mut self, blob: &[u8]) -> Result<Handle> {
        let header = codec::decode_header(blob)?;
        let geometry = codec::decode(blob)?;
        if header.dimension == self.dimension {
            self.insert(OpKind::InsertBlob, params![blob])
        } else {
            let blob = codec::encode(&geometry, self.dimension, header.srid);
            self.insert(OpKind::InsertBlob, params![blob])
        }
    }

    /// # Errors
    ///
    /// `Error::Parse` if `wkt` is malformed.
    pub fn create_geometry_from_wkt(&mut self, wkt: &str) -> Result<Handle> {
        let srid = self.srid.as_raw();
        self.insert(OpKind::InsertWkt, params![wkt, srid])
    }

    /// # Errors
    ///
    /// `Error::Parse` if `wkb` is malformed.
    pub fn create_geometry_from_wkb(&mut self, wkb: &[u8]) -> Result<Handle> {
        let srid = self.srid.as_raw();
        self.insert(OpKind::InsertWkb, params![wkb, srid])
    }

    // =========================================================================
    // Update and Removal
    // =========================================================================

    pub fn update_point<C: GeoCoordinate>(&mut self, handle: Handle, coordinate: &C) -> Result<()> {
        let c = Coord::from_geo_coordinate(coordinate);
        let srid = self.srid.as_raw();
        let id = handle.as_raw();
        match self.dimension {
            Dimension::Xy => self.execute(OpKind::UpdatePoint, params![c.x, c.y, srid, id]),
            Dimension::Xyz => self.execute(OpKind::UpdatePoint, params![c.x, c.y, c.z, srid, id]),
        }?;
        Ok(())
    }

    pub fn update_polygon<C: GeoCoordinate>(
        &mut self,
        handle: Handle,
        exterior: &[C],
        interiors: &[Vec<C>],
    ) -> Result<()> {
        self.update_geometry(handle, &polygon_of(exterior, interiors))
    }

    pub fn update_quad<C: GeoCoordinate>(
        &mut self,
        handle: Handle,
        a: &C,
        b: &C,
        c: &C,
        d: &C,
    ) -> Result<()> {
        let blob = self.quad.encode(&corners(a, b, c, d));
        self.execute(OpKind::UpdateBlob, params![blob, handle.as_raw()])?;
        Ok(())
    }

    pub fn update_geometry(&mut self, handle: Handle, geometry: &Geometry) -> Result<()> {
        let blob = self.blob_of(geometry);
        self.execute(OpKind::UpdateBlob, params![blob, handle.as_raw()])?;
        Ok(())
    }

    pub fn delete_geometry(&mut self, handle: Handle) -> Result<()> {
        self.execute(OpKind::Delete, params![handle.as_raw()])?;
        Ok(())
    }

    /// Removes every geometry. All previously issued handles become stale.
    ///
    /// Ids keep counting up afterwards; old handles never alias new rows.
    pub fn clear(&mut self) -> Result<()> {
        let removed = self.execute(OpKind::Clear, params![])?;
        debug!(removed, "cleared workspace");
        Ok(())
    }

    pub fn geometry_count(&mut self) -> Result<u64> {
        let count: Option<i64> = self.query_opt(OpKind::Count, params![])?;
        Ok(count.map_or(0, |n| n as u64))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The geometry's type, or `None` if the handle does not resolve.
    pub fn geometry_type(&mut self, handle: Handle) -> Result<Option<GeometryType>> {
        let code: Option<i32> = self.query_opt(OpKind::GeometryType, params![handle.as_raw()])?;
        Ok(code.and_then(GeometryType::from_code))
    }

    pub fn geometry_blob(&mut self, handle: Handle) -> Result<Option<Vec<u8>>> {
        self.query_opt(OpKind::SelectBlob, params![handle.as_raw()])
    }

    pub fn geometry_wkt(&mut self, handle: Handle) -> Result<Option<String>> {
        self.query_opt(OpKind::SelectWkt, params![handle.as_raw()])
    }

    /// Decodes the stored geometry.
    pub fn geometry(&mut self, handle: Handle) -> Result<Option<Geometry>> {
        self.geometry_blob(handle)?
            .map(|blob| codec::decode(&blob))
            .transpose()
    }

    /// `false` when either handle does not resolve.
    pub fn intersects(&mut self, a: Handle, b: Handle) -> Result<bool> {
        let hit: Option<bool> =
            self.query_opt(OpKind::Intersects, params![a.as_raw(), b.as_raw()])?;
        Ok(hit.unwrap_or(false))
    }

    /// Whether `a` contains `b`. `false` when either handle does not resolve.
    pub fn contains(&mut self, a: Handle, b: Handle) -> Result<bool> {
        let hit: Option<bool> = self.query_opt(OpKind::Contains, params![a.as_raw(), b.as_raw()])?;
        Ok(hit.unwrap_or(false))
    }

    // =========================================================================
    // Algebra
    // =========================================================================
    //
    // In-place forms bind the operands first and the result row last.

    pub fn intersection(&mut self, a: Handle, b: Handle) -> Result<Handle> {
        self.insert(OpKind::Intersection, params![a.as_raw(), b.as_raw()])
    }

    pub fn intersection_into(&mut self, a: Handle, b: Handle, result: Handle) -> Result<()> {
        self.execute(
            OpKind::IntersectionInto,
            params![a.as_raw(), b.as_raw(), result.as_raw()],
        )?;
        Ok(())
    }

    pub fn union(&mut self, a: Handle, b: Handle) -> Result<Handle> {
        self.insert(OpKind::Union, params![a.as_raw(), b.as_raw()])
    }

    pub fn union_into(&mut self, a: Handle, b: Handle, result: Handle) -> Result<()> {
        self.execute(OpKind::UnionInto, params![a.as_raw(), b.as_raw(), result.as_raw()])?;
        Ok(())
    }

    /// Union of `a` with `b` buffered by `distance`.
    pub fn union_with_buffer(&mut self, a: Handle, b: Handle, distance: f64) -> Result<Handle> {
        self.insert(
            OpKind::UnionWithBuffer,
            params![a.as_raw(), b.as_raw(), distance],
        )
    }

    pub fn union_with_buffer_into(
        &mut self,
        a: Handle,
        b: Handle,
        distance: f64,
        result: Handle,
    ) -> Result<()> {
        self.execute(
            OpKind::UnionWithBufferInto,
            params![a.as_raw(), b.as_raw(), distance, result.as_raw()],
        )?;
        Ok(())
    }

    /// Dissolves the members of one collection into their union.
    ///
    /// A single geometry comes back dissolved on its own.
    pub fn unary_union(&mut self, handle: Handle) -> Result<Handle> {
        self.insert(OpKind::UnaryUnion, params![handle.as_raw()])
    }

    pub fn unary_union_into(&mut self, handle: Handle, result: Handle) -> Result<()> {
        self.execute(OpKind::UnaryUnionInto, params![handle.as_raw(), result.as_raw()])?;
        Ok(())
    }

    /// `a` minus `b`.
    pub fn difference(&mut self, a: Handle, b: Handle) -> Result<Handle> {
        self.insert(OpKind::Difference, params![a.as_raw(), b.as_raw()])
    }

    pub fn difference_into(&mut self, a: Handle, b: Handle, result: Handle) -> Result<()> {
        self.execute(
            OpKind::DifferenceInto,
            params![a.as_raw(), b.as_raw(), result.as_raw()],
        )?;
        Ok(())
    }

    pub fn buffer(&mut self, handle: Handle, distance: f64) -> Result<Handle> {
        self.insert(OpKind::Buffer, params![handle.as_raw(), distance])
    }

    pub fn buffer_into(&mut self, handle: Handle, distance: f64, result: Handle) -> Result<()> {
        self.execute(
            OpKind::BufferInto,
            params![handle.as_raw(), distance, result.as_raw()],
        )?;
        Ok(())
    }

    pub fn simplify(
        &mut self,
        handle: Handle,
        tolerance: f64,
        preserve_topology: bool,
    ) -> Result<Handle> {
        let kind = if preserve_topology {
            OpKind::SimplifyPreserveTopology
        } else {
            OpKind::Simplify
        };
        self.insert(kind, params![handle.as_raw(), tolerance])
    }

    pub fn simplify_into(
        &mut self,
        handle: Handle,
        tolerance: f64,
        preserve_topology: bool,
        result: Handle,
    ) -> Result<()> {
        let kind = if preserve_topology {
            OpKind::SimplifyPreserveTopologyInto
        } else {
            OpKind::SimplifyInto
        };
        self.execute(kind, params![handle.as_raw(), tolerance, result.as_raw()])?;
        Ok(())
    }

    /// Simplifies a coordinate sequence as a line string.
    ///
    /// Goes through a temporary row that is removed again even on failure.
    pub fn simplify_points<C: GeoCoordinate>(
        &mut self,
        points: &[C],
        tolerance: f64,
        preserve_topology: bool,
    ) -> Result<Vec<C>> {
        let scratch = self.create_line_string(points)?;
        let simplified = self
            .simplify_into(scratch, tolerance, preserve_topology, scratch)
            .and_then(|()| self.geometry_blob(scratch));
        let removed = self.delete_geometry(scratch);

        let blob = simplified?;
        removed?;
        match blob {
            Some(blob) => codec::parse_line_string(&blob),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Cache and Batches
    // =========================================================================

    /// Drops every compiled statement. Geometries are untouched.
    pub fn clear_cache(&mut self) {
        self.cache.clear(live(&self.store).connection());
    }

    /// Operation kinds compiled since open or the last [`clear_cache`](Self::clear_cache).
    pub fn cached_operations(&self) -> Vec<OpKind> {
        self.cache.compiled()
    }

    /// Opens a batch. Prefer [`batch`](Self::batch), which cannot be left open.
    ///
    /// # Panics
    ///
    /// If a batch is already open.
    pub fn begin_batch(&mut self) -> Result<()> {
        self.batch.begin(live(&self.store))
    }

    /// Commits or rolls back the open batch.
    ///
    /// # Panics
    ///
    /// If no batch is open.
    pub fn end_batch(&mut self, commit: bool) -> Result<()> {
        self.batch.end(live(&self.store), commit)
    }

    pub fn is_batching(&self) -> bool {
        self.batch.is_batching()
    }

    /// Opens a batch that rolls back unless committed.
    pub fn batch(&mut self) -> Result<Batch<'_>> {
        self.begin_batch()?;
        Ok(Batch::new(self))
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Releases the workspace: compiled statements, connection, backing file.
    ///
    /// Both the close and the file removal are attempted; the first error is
    /// returned.
    pub fn dispose(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(store) = self.store.take() else {
            return Ok(());
        };
        self.cache.clear(store.connection());
        let closed = store.close();
        let removed = match self.backing.take() {
            Some(path) => path.close().map_err(Error::from),
            None => Ok(()),
        };
        info!(ok = closed.is_ok() && removed.is_ok(), "disposed workspace");
        closed.and(removed)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.store.is_none() {
            return;
        }
        warn!("workspace dropped without dispose");
        if let Err(e) = self.release() {
            warn!(error = %e, "disposal on drop failed");
        }
    }
}

fn corners<C: GeoCoordinate>(a: &C, b: &C, c: &C, d: &C) -> [Coord; 4] {
    [a, b, c, d].map(Coord::from_geo_coordinate)
}

fn polygon_of<C: GeoCoordinate>(exterior: &[C], interiors: &[Vec<C>]) -> Geometry {
    Geometry::Polygon(Polygon::new(
        LineString::from_coordinates(exterior),
        interiors
            .iter()
            .map(|ring| LineString::from_coordinates(ring))
            .collect(),
    ))
}

// =============================================================================
// Tests
// =============================================================================
