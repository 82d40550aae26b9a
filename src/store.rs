//! # Backing Store
//!
//! This module owns the SQLite connection behind a workspace: it opens the
//! database, registers the spatial functions, creates the `Calculator` table
//! and the spatial metadata, and exposes the raw transaction primitives the
//! batch controller drives.
//!
//! ## Table Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                            Schema Overview                            │
//! ├───────────────────────────────────────────────────────────────────────┤
//! │                                                                       │
//! │  Calculator              geometry_columns          spatial_ref_sys    │
//! │  ┌────────────────┐      ┌────────────────────┐    ┌──────────────┐   │
//! │  │ id (PK, AUTO)  │      │ f_table_name       │    │ srid (PK)    │   │
//! │  │ geom BLOB      │◄─────│ f_geometry_column  │    │ auth_name    │   │
//! │  └────────────────┘      │ geometry_type      │    │ auth_srid    │   │
//! │                          │ coord_dimension    │    │ ref_sys_name │   │
//! │  spatialcalc_metadata    │ srid ──────────────┼───►│ proj4text    │   │
//! │  ┌────────────────┐      └────────────────────┘    └──────────────┘   │
//! │  │ key (PK)       │                                                   │
//! │  │ value          │                                                   │
//! │  └────────────────┘                                                   │
//! │                                                                       │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Handles Are Row Ids
//!
//! `Calculator.id` is `AUTOINCREMENT`, so ids are never reissued after a
//! `DELETE`. The sequence lives in `sqlite_sequence`, which is transactional:
//! rolling back a batch rewinds it along with the rows.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::engine::{self, EngineConfig};
use crate::types::{Dimension, Srid};
use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current schema version. Backing files are per-workspace and short lived,
/// so a mismatch is simply rejected.
const SCHEMA_VERSION: i32 = 1;

// =============================================================================
// DDL Statements
// =============================================================================

/// The geometry arena. `id` is the handle, `geom` the encoded blob.
///
/// `geom` is nullable: algebra against a missing operand yields NULL, which
/// lookups report as "not found".
const CREATE_CALCULATOR: &str = r#"
CREATE TABLE IF NOT EXISTS Calculator (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    geom BLOB
)
"#;

/// Spatial reference systems known to this store.
const CREATE_SPATIAL_REF_SYS: &str = r#"
CREATE TABLE IF NOT EXISTS spatial_ref_sys (
    srid         INTEGER PRIMARY KEY,
    auth_name    TEXT NOT NULL,
    auth_srid    INTEGER NOT NULL,
    ref_sys_name TEXT,
    proj4text    TEXT
)
"#;

const INSERT_WGS84: &str = r#"
INSERT OR IGNORE INTO spatial_ref_sys (srid, auth_name, auth_srid, ref_sys_name, proj4text)
VALUES (4326, 'epsg', 4326, 'WGS 84', '+proj=longlat +datum=WGS84 +no_defs')
"#;

/// One row per geometry column, describing its type, dimension and SRID.
const CREATE_GEOMETRY_COLUMNS: &str = r#"
CREATE TABLE IF NOT EXISTS geometry_columns (
    f_table_name      TEXT NOT NULL,
    f_geometry_column TEXT NOT NULL,
    geometry_type     TEXT NOT NULL,
    coord_dimension   TEXT NOT NULL,
    srid              INTEGER NOT NULL REFERENCES spatial_ref_sys (srid),
    PRIMARY KEY (f_table_name, f_geometry_column)
)
"#;

/// Key/value metadata: schema version, dimension and SRID of the store.
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS spatialcalc_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

// =============================================================================
// Store
// =============================================================================

/// A SQLite connection initialized with the spatial schema and functions.
///
/// # Ownership
///
/// `Store` owns its `Connection`. Dropping it closes the connection;
/// [`Store::close`] does the same but reports errors.
#[derive(Debug)]
pub(crate) struct Store {
    conn: Connection,
    dimension: Dimension,
    srid: Srid,
}

impl Store {
    /// Opens (or creates) a store backed by `path`.
    ///
    /// # Errors
    ///
    /// `Error::Init` if the file cannot be opened or the schema cannot be set up.
    pub fn open(path: impl AsRef<Path>, dimension: Dimension, srid: Srid) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| Error::Init(format!("open {}: {e}", path.display())))?;
        Self::initialize(conn, dimension, srid)
    }

    /// Opens a store that lives only in memory.
    pub fn open_in_memory(dimension: Dimension, srid: Srid) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Init(format!("open in-memory database: {e}")))?;
        Self::initialize(conn, dimension, srid)
    }

    fn initialize(conn: Connection, dimension: Dimension, srid: Srid) -> Result<Self> {
        let mut store = Self {
            conn,
            dimension,
            srid,
        };
        store.init_schema().map_err(|e| match e {
            Error::Init(_) => e,
            other => Error::Init(format!("spatial metadata: {other}")),
        })?;
        info!(%dimension, %srid, "opened spatial store");
        Ok(store)
    }

    fn init_schema(&mut self) -> Result<()> {
        // =====================================================================
        // Pragmas
        // =====================================================================
        // The store is scratch space: rollback must work, durability across
        // crashes does not matter.
        self.conn.execute_batch("PRAGMA journal_mode = MEMORY")?;
        self.conn.execute_batch("PRAGMA synchronous = OFF")?;

        engine::register(
            &self.conn,
            EngineConfig {
                dimension: self.dimension,
                srid: self.srid,
            },
        )?;

        // =====================================================================
        // Tables
        // =====================================================================

        self.conn.execute_batch(CREATE_METADATA)?;
        self.verify_or_set_metadata()?;

        self.conn.execute_batch(CREATE_SPATIAL_REF_SYS)?;
        self.conn.execute_batch(INSERT_WGS84)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO spatial_ref_sys (srid, auth_name, auth_srid) VALUES (?1, 'epsg', ?1)",
            [self.srid.as_raw()],
        )?;
        self.conn.execute_batch(CREATE_GEOMETRY_COLUMNS)?;
        self.conn.execute_batch(CREATE_CALCULATOR)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO geometry_columns \
             (f_table_name, f_geometry_column, geometry_type, coord_dimension, srid) \
             VALUES ('Calculator', 'geom', 'GEOMETRY', ?1, ?2)",
            params![self.dimension.model_name(), self.srid.as_raw()],
        )?;

        debug!("spatial metadata initialized");
        Ok(())
    }

    /// Records version, dimension and SRID, or checks them on an existing file.
    fn verify_or_set_metadata(&mut self) -> Result<()> {
        let expected = [
            ("schema_version", SCHEMA_VERSION.to_string()),
            ("dimension", self.dimension.model_name().to_string()),
            ("srid", self.srid.as_raw().to_string()),
        ];

        for (key, value) in expected {
            let existing: Option<String> = self
                .conn
                .query_row(
                    "SELECT value FROM spatialcalc_metadata WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                None => {
                    self.conn.execute(
                        "INSERT INTO spatialcalc_metadata (key, value) VALUES (?1, ?2)",
                        [key, value.as_str()],
                    )?;
                }
                Some(v) if v == value => {}
                Some(v) => {
                    return Err(Error::Init(format!(
                        "store has {key} {v}, workspace requires {value}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // =========================================================================
    // Transactions
    // =========================================================================
    //
    // Raw SQL rather than `rusqlite::Transaction`: a `Transaction` borrows the
    // connection, and the batch has to stay open across many workspace calls.

    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Closes the connection, reporting any error SQLite returns.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Sqlite(e))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(store: &Store) -> Vec<String> {
        let mut stmt = store
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .expect("should prepare");
        stmt.query_map([], |row| row.get(0))
            .expect("should query")
            .collect::<std::result::Result<Vec<_>, _>>()
            .expect("should collect")
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory(Dimension::Xy, Srid::WGS84).expect("should open store");
        assert_eq!(
            table_names(&store),
            vec!["Calculator", "geometry_columns", "spatial_ref_sys", "spatialcalc_metadata"]
        );
    }

    #[test]
    fn test_geometry_column_records_dimension() {
        let store = Store::open_in_memory(Dimension::Xyz, Srid::WGS84).expect("should open store");
        let (kind, dims, srid): (String, String, i32) = store
            .conn
            .query_row(
                "SELECT geometry_type, coord_dimension, srid FROM geometry_columns \
                 WHERE f_table_name = 'Calculator' AND f_geometry_column = 'geom'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .expect("should have geometry column row");
        assert_eq!(kind, "GEOMETRY");
        assert_eq!(dims, "XYZ");
        assert_eq!(srid, 4326);
    }

    #[test]
    fn test_custom_srid_registered() {
        let store = Store::open_in_memory(Dimension::Xy, Srid::new(3857)).expect("should open store");
        let count: i32 = store
            .conn
            .query_row("SELECT COUNT(*) FROM spatial_ref_sys WHERE srid IN (4326, 3857)", [], |row| {
                row.get(0)
            })
            .expect("should count");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_rollback_rewinds_ids() {
        let store = Store::open_in_memory(Dimension::Xy, Srid::WGS84).expect("should open store");
        let insert = "INSERT INTO Calculator (geom) VALUES (MakePoint(1, 2, 4326))";

        store.conn.execute(insert, []).expect("should insert");
        let before = store.conn.last_insert_rowid();

        store.begin().expect("should begin");
        store.conn.execute(insert, []).expect("should insert");
        store.rollback().expect("should roll back");

        store.conn.execute(insert, []).expect("should insert");
        assert_eq!(store.conn.last_insert_rowid(), before + 1);
    }

    #[test]
    fn test_reopen_checks_dimension() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("store.db");

        Store::open(&path, Dimension::Xy, Srid::WGS84)
            .expect("first open should work")
            .close()
            .expect("should close");
        Store::open(&path, Dimension::Xy, Srid::WGS84).expect("same settings should reopen");

        let err = Store::open(&path, Dimension::Xyz, Srid::WGS84).unwrap_err();
        assert!(matches!(err, Error::Init(_)));
    }

    #[test]
    fn test_unreadable_metadata_is_reported() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("store.db");

        let store = Store::open(&path, Dimension::Xy, Srid::WGS84).expect("first open should work");
        store
            .connection()
            .execute(
                "UPDATE spatialcalc_metadata SET value = X'00' WHERE key = 'schema_version'",
                [],
            )
            .expect("should overwrite version");
        store.close().expect("should close");

        // The read itself fails; it must not be mistaken for a missing row.
        let message = match Store::open(&path, Dimension::Xy, Srid::WGS84).unwrap_err() {
            Error::Init(message) => message,
            other => panic!("expected an init error, got {other:?}"),
        };
        assert!(!message.contains("UNIQUE"), "unexpected message {message}");
    }
}
