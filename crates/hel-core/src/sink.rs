//! Destinations for the artifacts of a successful run.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::gridfile::{self, GridReference};
use crate::model::{DelineationResult, FieldDetermination, InitialSummaryRow};
use crate::raster::Grid;

pub const FIELD_DETERMINATION: &str = "field_determination";
pub const INITIAL_HEL_SUMMARY: &str = "initial_hel_summary";
pub const FINAL_HEL_SUMMARY: &str = "final_hel_summary";
pub const LIDAR_HEL_SUMMARY: &str = "lidar_hel_summary";

/// Receives the outputs of one run. Called only after the run succeeded.
///
/// Artifacts are handed over one by one, then either `commit` or `rollback`
/// is called exactly once.
pub trait DeterminationSink {
    fn field_determination(&mut self, rows: &[FieldDetermination]) -> Result<()>;

    fn initial_summary(&mut self, rows: &[InitialSummaryRow]) -> Result<()>;

    /// Written only when terrain processing ran.
    fn final_summary(&mut self, rows: &[DelineationResult]) -> Result<()>;

    /// Binary HEL/NHEL grid; written only when terrain processing ran.
    fn lidar_summary(&mut self, classes: &Grid<u8>, reference: &GridReference) -> Result<()>;

    fn report(&mut self, _file_name: &str, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Make every artifact handed over since the last commit visible.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop artifacts handed over since the last commit.
    fn rollback(&mut self) {}
}

/// Writes each artifact as a file under one directory.
///
/// Files are staged in a hidden directory next to the outputs and renamed
/// into place on `commit`, so a failed publish leaves no partial set behind.
pub struct JsonDirectorySink {
    dir: PathBuf,
    staging: TempDir,
    staged: Vec<PathBuf>,
    written: Vec<PathBuf>,
}

impl JsonDirectorySink {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let staging = tempfile::Builder::new().prefix(".staging_").tempdir_in(dir)?;
        Ok(Self { dir: dir.to_path_buf(), staging, staged: Vec::new(), written: Vec::new() })
    }

    /// Committed files, in commit order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn stage(&mut self, path: PathBuf) {
        debug!(path = %path.display(), "output staged");
        self.staged.push(path);
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<()> {
        let path = self.staging.path().join(name).with_extension("json");
        fs::write(&path, serde_json::to_string_pretty(value)?)?;
        self.stage(path);
        Ok(())
    }
}

impl DeterminationSink for JsonDirectorySink {
    fn field_determination(&mut self, rows: &[FieldDetermination]) -> Result<()> {
        self.write_json(FIELD_DETERMINATION, rows)
    }

    fn initial_summary(&mut self, rows: &[InitialSummaryRow]) -> Result<()> {
        self.write_json(INITIAL_HEL_SUMMARY, rows)
    }

    fn final_summary(&mut self, rows: &[DelineationResult]) -> Result<()> {
        self.write_json(FINAL_HEL_SUMMARY, rows)
    }

    fn lidar_summary(&mut self, classes: &Grid<u8>, reference: &GridReference) -> Result<()> {
        let stem = self.staging.path().join(LIDAR_HEL_SUMMARY);
        for path in gridfile::write(&stem, classes, reference)? {
            self.stage(path);
        }
        Ok(())
    }

    fn report(&mut self, file_name: &str, text: &str) -> Result<()> {
        let path = self.staging.path().join(file_name);
        fs::write(&path, text)?;
        self.stage(path);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        for staged in self.staged.drain(..) {
            let Some(name) = staged.file_name() else {
                continue;
            };
            let path = self.dir.join(name);
            fs::rename(&staged, &path)?;
            info!(path = %path.display(), "output written");
            self.written.push(path);
        }
        Ok(())
    }

    fn rollback(&mut self) {
        for staged in self.staged.drain(..) {
            if let Err(e) = fs::remove_file(&staged) {
                warn!(path = %staged.display(), error = %e, "could not discard staged output");
            }
        }
    }
}

/// Keeps every artifact in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub field_determination: Option<Vec<FieldDetermination>>,
    pub initial_summary: Option<Vec<InitialSummaryRow>>,
    pub final_summary: Option<Vec<DelineationResult>>,
    pub lidar_summary: Option<Grid<u8>>,
    pub report: Option<(String, String)>,
}

impl MemorySink {
    pub fn is_empty(&self) -> bool {
        self.field_determination.is_none()
            && self.initial_summary.is_none()
            && self.final_summary.is_none()
            && self.lidar_summary.is_none()
            && self.report.is_none()
    }
}

impl DeterminationSink for MemorySink {
    fn field_determination(&mut self, rows: &[FieldDetermination]) -> Result<()> {
        self.field_determination = Some(rows.to_vec());
        Ok(())
    }

    fn initial_summary(&mut self, rows: &[InitialSummaryRow]) -> Result<()> {
        self.initial_summary = Some(rows.to_vec());
        Ok(())
    }

    fn final_summary(&mut self, rows: &[DelineationResult]) -> Result<()> {
        self.final_summary = Some(rows.to_vec());
        Ok(())
    }

    fn lidar_summary(&mut self, classes: &Grid<u8>, _reference: &GridReference) -> Result<()> {
        self.lidar_summary = Some(classes.clone());
        Ok(())
    }

    fn report(&mut self, file_name: &str, text: &str) -> Result<()> {
        self.report = Some((file_name.to_string(), text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HelCategory;

    #[test]
    fn directory_sink_writes_named_files_on_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        let mut sink = JsonDirectorySink::create(&dir).unwrap();
        let rows = vec![InitialSummaryRow {
            field_id: "1".into(),
            category: HelCategory::Phel,
            acres: 12.5,
            percent: 100.0,
        }];
        sink.initial_summary(&rows).unwrap();
        let grid: Grid<u8> = Grid::new(2, 1, 0.0, 3.0, 3.0, 2);
        sink.lidar_summary(&grid, &GridReference::default()).unwrap();
        sink.report("report.txt", "HEL Determination\n").unwrap();
        assert!(!dir.join("initial_hel_summary.json").exists());
        assert!(sink.written().is_empty());

        sink.commit().unwrap();
        let text = fs::read_to_string(dir.join("initial_hel_summary.json")).unwrap();
        let back: Vec<InitialSummaryRow> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rows);
        assert!(text.contains("\"PHEL\""));
        let (_, classes) = gridfile::read::<u8>(&dir.join(LIDAR_HEL_SUMMARY)).unwrap();
        assert_eq!(classes.data, vec![2, 2]);
        assert!(dir.join("report.txt").exists());
        assert_eq!(sink.written().len(), 4);
    }

    #[test]
    fn rollback_leaves_no_partial_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        let mut sink = JsonDirectorySink::create(&dir).unwrap();
        sink.initial_summary(&[]).unwrap();
        sink.final_summary(&[]).unwrap();
        sink.rollback();
        sink.commit().unwrap();
        assert!(sink.written().is_empty());
        drop(sink);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }
}
