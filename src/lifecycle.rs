//! # Temporary Storage Lifecycle
//!
//! File-backed workspaces keep their SQLite database in a temporary file.
//! This module decides where those files go and cleans up after processes
//! that did not.
//!
//! ## Layout
//!
//! ```text
//! <root>/                           (the OS temp dir by default)
//! ├── spatialcalc3hF9a/             runtime dir of this process (lazy)
//! │   ├── spatialcalcQ2m1.tmp       backing file of one workspace
//! │   └── spatialcalcZ0xk.tmp
//! ├── spatialcalcK77b/              left behind by a crashed process ─┐
//! └── spatialcalc8dPq.tmp           left behind by a crashed process ─┴─ swept
//! ```
//!
//! Every entry starts with [`FILE_PREFIX`]. When the shared root is first
//! used, a background thread deletes every prefixed entry except this
//! process's own runtime directory. The sweep is best effort: entries that
//! cannot be removed are reported and skipped. Two processes starting at the
//! same moment under the same root may race; each only ever spares its own
//! runtime directory.
//!
//! ## Ownership
//!
//! ```text
//! TempRoot ──owns──► TempDir (runtime dir, removed when the root drops)
//! Workspace ──owns──► TempPath (backing file, removed on dispose)
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use tempfile::{NamedTempFile, TempDir, TempPath};
use tracing::{debug, info, warn};

use crate::Result;

/// Prefix of every file and directory this crate creates.
pub const FILE_PREFIX: &str = "spatialcalc";

const BACKING_SUFFIX: &str = ".tmp";

// =============================================================================
// Temp Root
// =============================================================================

/// A directory under which workspaces allocate their backing files.
#[derive(Debug)]
pub struct TempRoot {
    root: PathBuf,
    runtime: Mutex<Option<TempDir>>,
}

impl TempRoot {
    /// A root under `path`. Nothing is created until a backing file is
    /// allocated or a cleanup is started.
    pub fn new(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: path.into(),
            runtime: Mutex::new(None),
        })
    }

    /// The process-wide root in the OS temp dir.
    ///
    /// The first call starts a detached sweep of leftovers from earlier
    /// processes.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<TempRoot>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                let root = TempRoot::new(std::env::temp_dir());
                match root.spawn_cleanup() {
                    Ok(task) => task.detach(),
                    Err(e) => warn!(error = %e, "could not start temp cleanup"),
                }
                root
            })
            .clone()
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// This process's runtime directory, created on first use.
    pub fn runtime_dir(&self) -> Result<PathBuf> {
        let mut runtime = self.runtime.lock().expect("runtime dir mutex poisoned");
        if let Some(dir) = runtime.as_ref() {
            return Ok(dir.path().to_path_buf());
        }

        fs::create_dir_all(&self.root)?;
        let dir = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .tempdir_in(&self.root)?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "created runtime dir");
        *runtime = Some(dir);
        Ok(path)
    }

    /// Creates a uniquely named, empty backing file in the runtime dir.
    ///
    /// The file is deleted when the returned `TempPath` is dropped or closed.
    pub fn allocate_backing_file(&self) -> Result<TempPath> {
        let dir = self.runtime_dir()?;
        let file = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .suffix(BACKING_SUFFIX)
            .tempfile_in(dir)?;
        Ok(NamedTempFile::into_temp_path(file))
    }

    /// Starts a background sweep of stale prefixed entries under the root.
    ///
    /// The runtime dir is created first so the sweep can never remove it.
    pub fn spawn_cleanup(self: &Arc<Self>) -> Result<CleanupTask> {
        let keep = self.runtime_dir()?;
        let root = self.root.clone();

        let handle = thread::Builder::new()
            .name("spatialcalc-cleanup".to_string())
            .spawn(move || sweep(&root, &keep))?;

        Ok(CleanupTask {
            handle: Some(handle),
        })
    }
}

fn sweep(root: &Path, keep: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            report.failed.push((root.to_path_buf(), e.to_string()));
            return report;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let prefixed = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(FILE_PREFIX));
        if !prefixed || path == keep {
            continue;
        }

        let removed = match entry.file_type() {
            Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => report.removed.push(path),
            Err(e) => report.failed.push((path, e.to_string())),
        }
    }

    if report.removed.is_empty() && report.failed.is_empty() {
        debug!(root = %root.display(), "temp cleanup found nothing");
    } else {
        info!(
            root = %root.display(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "temp cleanup finished"
        );
    }
    report
}

// =============================================================================
// Cleanup Task
// =============================================================================

/// What a cleanup sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Handle to a running cleanup sweep.
///
/// Dropping the task detaches the thread; the sweep keeps running.
#[derive(Debug)]
pub struct CleanupTask {
    handle: Option<JoinHandle<CleanupReport>>,
}

impl CleanupTask {
    /// Blocks until the sweep finishes.
    pub fn wait(mut self) -> CleanupReport {
        let Some(handle) = self.handle.take() else {
            return CleanupReport::default();
        };
        handle.join().unwrap_or_else(|_| {
            warn!("cleanup thread panicked");
            CleanupReport::default()
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Lets the sweep run to completion on its own.
    pub fn detach(mut self) {
        self.handle.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backing_file_lives_in_runtime_dir() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let root = TempRoot::new(dir.path());

        let file = root.allocate_backing_file().expect("should allocate");
        let runtime = root.runtime_dir().expect("should have runtime dir");

        assert!(file.exists());
        assert_eq!(file.parent(), Some(runtime.as_path()));
        let name = file.file_name().and_then(|n| n.to_str()).expect("utf-8 name");
        assert!(name.starts_with(FILE_PREFIX));
        assert!(name.ends_with(".tmp"));

        let path = file.to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_backing_files_are_unique() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let root = TempRoot::new(dir.path());
        let a = root.allocate_backing_file().expect("should allocate");
        let b = root.allocate_backing_file().expect("should allocate");
        assert_ne!(a.to_path_buf(), b.to_path_buf());
    }

    #[test]
    fn test_runtime_dir_is_stable() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let root = TempRoot::new(dir.path());
        assert_eq!(
            root.runtime_dir().expect("should create"),
            root.runtime_dir().expect("should reuse")
        );
    }

    #[test]
    fn test_sweep_spares_own_runtime_and_foreign_entries() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let stale_dir = dir.path().join("spatialcalcOLD");
        let stale_file = dir.path().join("spatialcalcX.tmp");
        let foreign = dir.path().join("other.tmp");
        fs::create_dir(&stale_dir).expect("should create");
        fs::write(stale_dir.join("spatialcalcY.tmp"), b"x").expect("should write");
        fs::write(&stale_file, b"x").expect("should write");
        fs::write(&foreign, b"x").expect("should write");

        let root = TempRoot::new(dir.path());
        let live = root.allocate_backing_file().expect("should allocate");

        let report = root.spawn_cleanup().expect("should spawn").wait();

        assert!(report.failed.is_empty());
        assert_eq!(report.removed.len(), 2);
        assert!(!stale_dir.exists());
        assert!(!stale_file.exists());
        assert!(foreign.exists());
        assert!(live.exists());
    }

    #[test]
    fn test_sweep_of_missing_root_reports_failure() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let missing = dir.path().join("gone");
        let report = sweep(&missing, &missing.join("keep"));
        assert!(report.removed.is_empty());
        assert_eq!(report.failed.len(), 1);
    }
}
