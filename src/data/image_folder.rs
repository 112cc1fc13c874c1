//! Image-folder dataset: one subdirectory per class under a root directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: [&str; 9] = ["jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp"];

/// One labelled image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// Labelled images discovered under `root`.
///
/// Classes are the immediate subdirectories of `root`, sorted by name; a
/// class's index is its position in that order. Images are collected
/// recursively inside each class directory and sorted by path, so the sample
/// order is deterministic for a given tree.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<Sample>,
}

impl ImageFolder {
    pub fn open(root: impl AsRef<Path>) -> Result<ImageFolder> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "dataset root {} is not a readable directory",
                root.display()
            )));
        }

        let mut classes = Vec::new();
        for entry in fs::read_dir(root).map_err(|e| Error::io(root, e))? {
            let entry = entry.map_err(|e| {
                Error::Dataset(format!("failed to list {}: {e}", root.display()))
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().into_string().map_err(|name| {
                Error::Dataset(format!(
                    "class directory {:?} in {} is not valid UTF-8",
                    name,
                    root.display()
                ))
            })?;
            classes.push(name);
        }
        classes.sort();

        if classes.is_empty() {
            return Err(Error::Dataset(format!(
                "no class directories found in {}",
                root.display()
            )));
        }

        let mut samples = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let before = samples.len();
            for entry in WalkDir::new(root.join(class))
                .follow_links(true)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| {
                    Error::Dataset(format!("failed to scan {}: {e}", root.join(class).display()))
                })?;
                if entry.file_type().is_file() && has_image_extension(entry.path()) {
                    samples.push(Sample { path: entry.into_path(), label });
                }
            }
            if samples.len() == before {
                return Err(Error::Dataset(format!(
                    "found no valid image file for class '{class}' in {}",
                    root.display()
                )));
            }
        }

        debug!(root = %root.display(), classes = classes.len(), samples = samples.len(), "scanned image folder");

        Ok(ImageFolder { root: root.to_path_buf(), classes, samples })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Class names in index order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn class_to_idx(&self) -> BTreeMap<String, usize> {
        self.classes.iter().cloned().enumerate().map(|(i, c)| (c, i)).collect()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Opens and decodes the image at `index`.
    pub fn load(&self, index: usize) -> Result<(DynamicImage, usize)> {
        let sample = &self.samples[index];
        let image = image::open(&sample.path).map_err(|source| Error::Image {
            path: sample.path.clone(),
            source,
        })?;
        Ok((image, sample.label))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
