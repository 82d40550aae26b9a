//! # Operation Cache
//!
//! Every workspace operation is one SQL statement. This module names them
//! ([`OpKind`]), holds their SQL, and compiles each lazily on first use.
//!
//! ## Rust Pattern: Borrowing the Driver's Statement Cache
//!
//! rusqlite already keeps an LRU of prepared statements per connection
//! (`prepare_cached`). We size it to hold every operation kind, so each
//! statement is compiled once per workspace (or once per [`clear`]) and then
//! reused with fresh bindings.
//!
//! The returned `CachedStatement` is the scoped guard for bindings: when it
//! drops, the statement is reset, its bindings are cleared and it goes back
//! into the cache. A failure halfway through binding can therefore never leak
//! stale parameters into the next call.
//!
//! [`clear`]: OperationCache::clear

use std::collections::BTreeSet;

use rusqlite::{CachedStatement, Connection};
use tracing::debug;

use crate::types::Dimension;
use crate::Result;

// =============================================================================
// Operation Kinds
// =============================================================================

/// Every distinct statement a workspace issues.
///
/// `*Into` kinds are the in-place forms: they write the result into an
/// existing row (the last parameter) instead of inserting a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    InsertPoint,
    UpdatePoint,
    InsertBlob,
    UpdateBlob,
    InsertWkt,
    InsertWkb,
    Delete,
    Clear,
    Count,
    GeometryType,
    SelectBlob,
    SelectWkt,
    Intersects,
    Contains,
    Intersection,
    IntersectionInto,
    Union,
    UnionInto,
    UnionWithBuffer,
    UnionWithBufferInto,
    UnaryUnion,
    UnaryUnionInto,
    Difference,
    DifferenceInto,
    Buffer,
    BufferInto,
    Simplify,
    SimplifyInto,
    SimplifyPreserveTopology,
    SimplifyPreserveTopologyInto,
}

impl OpKind {
    pub const ALL: [OpKind; 30] = [
        OpKind::InsertPoint,
        OpKind::UpdatePoint,
        OpKind::InsertBlob,
        OpKind::UpdateBlob,
        OpKind::InsertWkt,
        OpKind::InsertWkb,
        OpKind::Delete,
        OpKind::Clear,
        OpKind::Count,
        OpKind::GeometryType,
        OpKind::SelectBlob,
        OpKind::SelectWkt,
        OpKind::Intersects,
        OpKind::Contains,
        OpKind::Intersection,
        OpKind::IntersectionInto,
        OpKind::Union,
        OpKind::UnionInto,
        OpKind::UnionWithBuffer,
        OpKind::UnionWithBufferInto,
        OpKind::UnaryUnion,
        OpKind::UnaryUnionInto,
        OpKind::Difference,
        OpKind::DifferenceInto,
        OpKind::Buffer,
        OpKind::BufferInto,
        OpKind::Simplify,
        OpKind::SimplifyInto,
        OpKind::SimplifyPreserveTopology,
        OpKind::SimplifyPreserveTopologyInto,
    ];

    /// SQL for this operation.
    ///
    /// Operands are always read through scalar subqueries so that a missing
    /// handle becomes NULL rather than an empty result set, and allocate forms
    /// insert exactly one row. Point statements depend on the dimension.
    pub fn sql(self, dimension: Dimension) -> &'static str {
        match (self, dimension) {
            (OpKind::InsertPoint, Dimension::Xy) => {
                "INSERT INTO Calculator (geom) VALUES (MakePoint(?1, ?2, ?3))"
            }
            (OpKind::InsertPoint, Dimension::Xyz) => {
                "INSERT INTO Calculator (geom) VALUES (MakePointZ(?1, ?2, ?3, ?4))"
            }
            (OpKind::UpdatePoint, Dimension::Xy) => {
                "UPDATE Calculator SET geom = MakePoint(?1, ?2, ?3) WHERE id = ?4"
            }
            (OpKind::UpdatePoint, Dimension::Xyz) => {
                "UPDATE Calculator SET geom = MakePointZ(?1, ?2, ?3, ?4) WHERE id = ?5"
            }
            (OpKind::InsertBlob, _) => "INSERT INTO Calculator (geom) VALUES (?1)",
            (OpKind::UpdateBlob, _) => "UPDATE Calculator SET geom = ?1 WHERE id = ?2",
            (OpKind::InsertWkt, _) => {
                "INSERT INTO Calculator (geom) VALUES (GeomFromText(?1, ?2))"
            }
            (OpKind::InsertWkb, _) => {
                "INSERT INTO Calculator (geom) VALUES (GeomFromWkb(?1, ?2))"
            }
            (OpKind::Delete, _) => "DELETE FROM Calculator WHERE id = ?1",
            (OpKind::Clear, _) => "DELETE FROM Calculator",
            (OpKind::Count, _) => "SELECT COUNT(*) FROM Calculator",
            (OpKind::GeometryType, _) => {
                "SELECT GeometryType(geom) FROM Calculator WHERE id = ?1"
            }
            (OpKind::SelectBlob, _) => "SELECT geom FROM Calculator WHERE id = ?1",
            (OpKind::SelectWkt, _) => "SELECT AsText(geom) FROM Calculator WHERE id = ?1",
            (OpKind::Intersects, _) => {
                "SELECT Intersects(\
                    (SELECT geom FROM Calculator WHERE id = ?1), \
                    (SELECT geom FROM Calculator WHERE id = ?2))"
            }
            (OpKind::Contains, _) => {
                "SELECT Contains(\
                    (SELECT geom FROM Calculator WHERE id = ?1), \
                    (SELECT geom FROM Calculator WHERE id = ?2))"
            }
            (OpKind::Intersection, _) => {
                "INSERT INTO Calculator (geom) VALUES (Intersection(\
                    (SELECT geom FROM Calculator WHERE id = ?1), \
                    (SELECT geom FROM Calculator WHERE id = ?2)))"
            }
            (OpKind::IntersectionInto, _) => {
                "UPDATE Calculator SET geom = Intersection(\
                    (SELECT geom FROM Calculator WHERE id = ?1), \
                    (SELECT geom FROM Calculator WHERE id = ?2)) \
                 WHERE id = ?3"
            }
            (OpKind::Union, _) => {
                "INSERT INTO Calculator (geom) VALUES (\
                    (SELECT GUnion(geom) FROM Calculator WHERE id IN (?1, ?2)))"
            }
            (OpKind::UnionInto, _) => {
                "UPDATE Calculator SET geom = \
                    (SELECT GUnion(geom) FROM Calculator WHERE id IN (?1, ?2)) \
                 WHERE id = ?3"
            }
            (OpKind::UnionWithBuffer, _) => {
                "INSERT INTO Calculator (geom) VALUES (GUnion(\
                    (SELECT geom FROM Calculator WHERE id = ?1), \
                    Buffer((SELECT geom FROM Calculator WHERE id = ?2), ?3)))"
            }
            (OpKind::UnionWithBufferInto, _) => {
                "UPDATE Calculator SET geom = GUnion(\
                    (SELECT geom FROM Calculator WHERE id = ?1), \
                    Buffer((SELECT geom FROM Calculator WHERE id = ?2), ?3)) \
                 WHERE id = ?4"
            }
            (OpKind::UnaryUnion, _) => {
                "INSERT INTO Calculator (geom) VALUES (UnaryUnion(\
                    (SELECT geom FROM Calculator WHERE id = ?1)))"
            }
            (OpKind::UnaryUnionInto, _) => {
                "UPDATE Calculator SET geom = UnaryUnion(\
                    (SELECT geom FROM Calculator WHERE id = ?1)) \
                 WHERE id = ?2"
            }
            (OpKind::Difference, _) => {
                "INSERT INTO Calculator (geom) VALUES (Difference(\
                    (SELECT geom FROM Calculator WHERE id = ?1), \
                    (SELECT geom FROM Calculator WHERE id = ?2)))"
            }
            (OpKind::DifferenceInto, _) => {
                "UPDATE Calculator SET geom = Difference(\
                    (SELECT geom FROM Calculator WHERE id = ?1), \
                    (SELECT geom FROM Calculator WHERE id = ?2)) \
                 WHERE id = ?3"
            }
            (OpKind::Buffer, _) => {
                "INSERT INTO Calculator (geom) VALUES (Buffer(\
                    (SELECT geom FROM Calculator WHERE id = ?1), ?2))"
            }
            (OpKind::BufferInto, _) => {
                "UPDATE Calculator SET geom = Buffer(\
                    (SELECT geom FROM Calculator WHERE id = ?1), ?2) \
                 WHERE id = ?3"
            }
            (OpKind::Simplify, _) => {
                "INSERT INTO Calculator (geom) VALUES (Simplify(\
                    (SELECT geom FROM Calculator WHERE id = ?1), ?2))"
            }
            (OpKind::SimplifyInto, _) => {
                "UPDATE Calculator SET geom = Simplify(\
                    (SELECT geom FROM Calculator WHERE id = ?1), ?2) \
                 WHERE id = ?3"
            }
            (OpKind::SimplifyPreserveTopology, _) => {
                "INSERT INTO Calculator (geom) VALUES (SimplifyPreserveTopology(\
                    (SELECT geom FROM Calculator WHERE id = ?1), ?2))"
            }
            (OpKind::SimplifyPreserveTopologyInto, _) => {
                "UPDATE Calculator SET geom = SimplifyPreserveTopology(\
                    (SELECT geom FROM Calculator WHERE id = ?1), ?2) \
                 WHERE id = ?3"
            }
        }
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Lazily compiled statements for one workspace connection.
///
/// Holds no statements itself; it tracks which kinds have been compiled so
/// the workspace can report them, and owns the policy of when to flush.
#[derive(Debug)]
pub(crate) struct OperationCache {
    dimension: Dimension,
    compiled: BTreeSet<OpKind>,
}

impl OperationCache {
    /// Creates an empty cache and sizes the connection's statement cache so
    /// no operation is ever evicted.
    pub fn new(conn: &Connection, dimension: Dimension) -> Self {
        conn.set_prepared_statement_cache_capacity(OpKind::ALL.len());
        Self {
            dimension,
            compiled: BTreeSet::new(),
        }
    }

    /// Returns the compiled statement for `kind`, compiling it on first use.
    ///
    /// Bindings are cleared when the returned statement is dropped.
    pub fn statement<'c>(
        &mut self,
        conn: &'c Connection,
        kind: OpKind,
    ) -> Result<CachedStatement<'c>> {
        let stmt = conn.prepare_cached(kind.sql(self.dimension))?;
        if self.compiled.insert(kind) {
            debug!(op = ?kind, "compiled operation");
        }
        Ok(stmt)
    }

    /// Releases every compiled statement. Geometry rows are untouched.
    pub fn clear(&mut self, conn: &Connection) {
        conn.flush_prepared_statement_cache();
        debug!(released = self.compiled.len(), "cleared operation cache");
        self.compiled.clear();
    }

    /// Kinds compiled since creation or the last [`clear`](Self::clear).
    pub fn compiled(&self) -> Vec<OpKind> {
        self.compiled.iter().copied().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
