//! Files a run leaves behind: the class index, the metrics log and the
//! best-epoch checkpoint.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::config::TrainConfig;
use crate::error::{Error, Result};

/// Class index to class name, ordered by index.
pub type ClassIndexMap = BTreeMap<usize, String>;

/// Builds the map from classes already in index order.
pub fn class_index_map(classes: &[String]) -> ClassIndexMap {
    classes.iter().cloned().enumerate().collect()
}

/// Writes `{"0": "a", "1": "b", ...}` with four-space indentation,
/// replacing any previous file.
pub fn write_class_indices(path: &Path, map: &ClassIndexMap) -> Result<()> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    map.serialize(&mut ser)?;
    std::fs::write(path, buf).map_err(|e| Error::io(path, e))
}

/// Where a run writes its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    pub class_indices: PathBuf,
    pub metrics: PathBuf,
    pub checkpoint: PathBuf,
}

impl RunArtifacts {
    pub fn from_config(config: &TrainConfig) -> RunArtifacts {
        RunArtifacts {
            class_indices: config.class_indices_path(),
            metrics: config.metrics_path(),
            checkpoint: config.checkpoint_path(),
        }
    }

    /// Creates the output directories and checks that every output file can
    /// be written. Any failure is a configuration error, raised before the
    /// first epoch. Existing files are left untouched.
    pub fn prepare(&self) -> Result<()> {
        for path in [&self.class_indices, &self.metrics, &self.checkpoint] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("cannot create output directory {}: {e}", parent.display()))
                })?;
            }
            check_writable(path)?;
        }
        Ok(())
    }

    /// Appends one line to the metrics log, creating it if needed.
    pub fn append_metrics(&self, line: &str) -> Result<()> {
        let mut file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.metrics)
            .map_err(|e| Error::io(&self.metrics, e))?;
        writeln!(file, "{line}").map_err(|e| Error::io(&self.metrics, e))
    }
}

/// An existing path must be a regular file we can open for writing. A
/// missing one is checked by creating and removing a sibling marker file,
/// so no empty output appears before the run writes it.
fn check_writable(path: &Path) -> Result<()> {
    let unwritable = |e: std::io::Error| {
        Error::Config(format!("output path {} is not writable: {e}", path.display()))
    };
    match std::fs::metadata(path) {
        Ok(meta) if !meta.is_file() => Err(Error::Config(format!(
            "output path {} exists and is not a regular file",
            path.display()
        ))),
        Ok(_) => OpenOptions::new().write(true).open(path).map(drop).map_err(unwritable),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let marker = path.with_file_name(format!(".{name}.write-check"));
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&marker)
                .map_err(unwritable)?;
            std::fs::remove_file(&marker).map_err(|e| Error::io(&marker, e))
        }
        Err(e) => Err(unwritable(e)),
    }
}
