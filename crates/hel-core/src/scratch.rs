//! Scoped scratch workspace for one run.
//!
//! Every intermediate artifact is written under a per-run directory and
//! registered here. [`ScratchSpace::release`] is the only code path that
//! deletes them.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{HelError, Result};
use crate::gridfile::{self, CellValue, GridReference};
use crate::raster::Grid;

fn scratch_error(path: &Path) -> impl FnOnce(io::Error) -> HelError {
    let path = path.to_path_buf();
    move |source| HelError::Scratch { path, source }
}

#[derive(Debug)]
pub struct ScratchSpace {
    root: PathBuf,
    /// Run directory; `None` once released.
    dir: Option<TempDir>,
    /// Registration order; released back to front.
    registered: Vec<PathBuf>,
}

impl ScratchSpace {
    /// Create a fresh run directory `<base>/<label>_<random>`.
    ///
    /// Fails with [`HelError::Scratch`] if `base` cannot be created or is not
    /// writable.
    pub fn create(base: &Path, label: &str) -> Result<Self> {
        fs::create_dir_all(base).map_err(scratch_error(base))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{label}_"))
            .tempdir_in(base)
            .map_err(scratch_error(base))?;
        let root = dir.path().to_path_buf();

        let marker = root.join(".write_check");
        fs::write(&marker, b"").map_err(scratch_error(&root))?;
        fs::remove_file(&marker).map_err(scratch_error(&root))?;

        info!(path = %root.display(), "scratch workspace created");
        Ok(Self { root, dir: Some(dir), registered: Vec::new() })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn registered(&self) -> &[PathBuf] {
        &self.registered
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    pub fn register(&mut self, path: PathBuf) {
        debug!(path = %path.display(), "scratch resource registered");
        self.registered.push(path);
    }

    /// Write `grid` as `<root>/<name>` and register both of its files.
    pub fn persist_grid<T: CellValue>(
        &mut self,
        name: &str,
        grid: &Grid<T>,
        reference: &GridReference,
    ) -> Result<PathBuf> {
        let stem = self.root.join(name);
        for path in gridfile::write(&stem, grid, reference)? {
            self.register(path);
        }
        Ok(stem)
    }

    /// Delete every registered resource, newest first, then the run
    /// directory. A failure is logged and the remaining resources are still
    /// attempted. Only the first call does anything; returns the number of
    /// failures.
    pub fn release(&mut self) -> usize {
        let Some(dir) = self.dir.take() else {
            return 0;
        };
        let mut failures = 0;
        let mut record = |path: &Path, removed: io::Result<()>| match removed {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                failures += 1;
                warn!(path = %path.display(), error = %e, "could not release scratch resource");
            }
        };
        for path in self.registered.drain(..).rev() {
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            record(&path, removed);
        }
        record(&self.root, dir.close());
        info!(path = %self.root.display(), failures, "scratch workspace released");
        failures
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn release_removes_everything_once() {
        let base = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::create(base.path(), "run").unwrap();
        let root = scratch.path().to_path_buf();
        assert!(root.file_name().unwrap().to_string_lossy().starts_with("run_"));
        let grid: Grid<u8> = Grid::new(2, 2, 0.0, 6.0, 3.0, 1);
        let stem = scratch.persist_grid("classes", &grid, &GridReference::default()).unwrap();
        assert!(stem.with_extension("bin").exists());
        assert_eq!(scratch.registered().len(), 2);

        // Missing resources do not count as failures.
        scratch.register(root.join("never_written.bin"));
        assert_eq!(scratch.release(), 0);
        assert!(!root.exists());
        assert!(scratch.is_released());
        assert!(scratch.registered().is_empty());
        assert_eq!(scratch.release(), 0);
    }

    #[test]
    fn drop_releases_run_directory() {
        let base = tempfile::tempdir().unwrap();
        let root = {
            let scratch = ScratchSpace::create(base.path(), "run").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!root.exists());
        assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn runs_get_distinct_directories() {
        let base = tempfile::tempdir().unwrap();
        let a = ScratchSpace::create(base.path(), "run").unwrap();
        let b = ScratchSpace::create(base.path(), "run").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn unusable_base_is_an_environment_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not_a_directory");
        fs::write(&file, b"plain file").unwrap();
        let err = ScratchSpace::create(&file, "run").unwrap_err();
        assert!(matches!(err, HelError::Scratch { .. }));
        assert_eq!(err.kind(), ErrorKind::Environment);
    }
}
