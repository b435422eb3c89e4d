use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::{
    dataset::scene::LabelSpec,
    errors::{GeotilesError, Result},
};

/// How images are paired with their labels inside a data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layout {
    /// Rasters anywhere under `image_dir`, each paired with the mask
    /// `label_dir/<label_prefix><idx>.<extension>`, `idx` being the
    /// last `_` separated token of the image file stem.
    IndexSubstitution {
        image_dir: PathBuf,
        label_dir: PathBuf,
        label_prefix: String,
        extension: String,
    },
    /// `<name>.SAFE` product directories, the image being the product's
    /// `metadata_file` and the label the vector file
    /// `<name>.<label_extension>` next to the product.
    SafeScenes {
        metadata_file: String,
        label_extension: String,
    },
    /// Masks with the same relative path under `label_dir` as the
    /// image under `image_dir`.
    SiblingDirs {
        image_dir: PathBuf,
        label_dir: PathBuf,
        extension: String,
    },
}

impl Default for Layout {
    fn default() -> Self {
        Self::IndexSubstitution {
            image_dir: "train_true_color".into(),
            label_dir: "train_mask".into(),
            label_prefix: "train_mask_".into(),
            extension: "tif".into(),
        }
    }
}

/// Kind of label a [ScenePaths] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Mask,
    Vector,
}

/// Image and label path of one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenePaths {
    pub image: PathBuf,
    pub label: PathBuf,
    pub kind: LabelKind,
}

impl ScenePaths {
    pub fn label_spec(&self) -> LabelSpec {
        match self.kind {
            LabelKind::Mask => LabelSpec::Mask(self.label.clone()),
            LabelKind::Vector => LabelSpec::Vector(self.label.clone()),
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
}

fn existing_dir(dir: PathBuf) -> Result<PathBuf> {
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )
        .into())
    }
}

/// Files with `extension` anywhere under `dir`, sorted by path.
fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() && has_extension(entry.path(), extension) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

impl Layout {
    /// Pairs found under `root`, in sorted discovery order.
    ///
    /// An unreadable `root` fails as a whole, an image that does not fit
    /// the naming convention only fails its own entry.
    pub fn discover(&self, root: &Path) -> Result<Vec<Result<ScenePaths>>> {
        match self {
            Layout::IndexSubstitution {
                image_dir,
                label_dir,
                label_prefix,
                extension,
            } => {
                let images = files_with_extension(&existing_dir(root.join(image_dir))?, extension)?;
                let label_dir = root.join(label_dir);
                Ok(images
                    .into_iter()
                    .map(|image| {
                        let idx = image
                            .file_stem()
                            .and_then(|stem| stem.to_str())
                            .and_then(|stem| stem.rsplit_once('_'))
                            .map(|(_, idx)| idx.to_string())
                            .ok_or_else(|| {
                                GeotilesError::configuration(format!(
                                    "{} has no `_<idx>` suffix",
                                    image.display()
                                ))
                            })?;
                        Ok(ScenePaths {
                            label: label_dir.join(format!("{label_prefix}{idx}.{extension}")),
                            image,
                            kind: LabelKind::Mask,
                        })
                    })
                    .collect())
            }
            Layout::SafeScenes {
                metadata_file,
                label_extension,
            } => {
                let mut products = std::fs::read_dir(existing_dir(root.to_path_buf())?)?
                    .map(|entry| entry.map(|entry| entry.path()))
                    .collect::<io::Result<Vec<_>>>()?;
                products.retain(|path| has_extension(path, "SAFE"));
                products.sort();
                Ok(products
                    .into_iter()
                    .map(|product| {
                        Ok(ScenePaths {
                            image: product.join(metadata_file),
                            label: product.with_extension(label_extension),
                            kind: LabelKind::Vector,
                        })
                    })
                    .collect())
            }
            Layout::SiblingDirs {
                image_dir,
                label_dir,
                extension,
            } => {
                let image_root = existing_dir(root.join(image_dir))?;
                let label_root = root.join(label_dir);
                Ok(files_with_extension(&image_root, extension)?
                    .into_iter()
                    .map(|image| {
                        let relative = image.strip_prefix(&image_root).map_err(|_| {
                            GeotilesError::configuration(format!(
                                "{} is outside {}",
                                image.display(),
                                image_root.display()
                            ))
                        })?;
                        Ok(ScenePaths {
                            label: label_root.join(relative),
                            image,
                            kind: LabelKind::Mask,
                        })
                    })
                    .collect())
            }
        }
    }
}
