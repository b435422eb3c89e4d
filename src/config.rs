//! JSON configuration of a [CollectionDataset].

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    components::{DataType, TileSize},
    dataset::{collection::DEFAULT_COVERAGE_THRESHOLD, ClassMap, CollectionDataset, Layout},
    errors::Result,
};

fn default_tile_size() -> TileSize {
    TileSize::square(512)
}

fn default_threshold() -> f64 {
    DEFAULT_COVERAGE_THRESHOLD
}

/// ```json
/// {
///     "data_root": "/data/clouds",
///     "tile_size": 512,
///     "label_coverage_threshold": 0.01,
///     "layout": {"type": "index_substitution", "image_dir": "train_true_color",
///                "label_dir": "train_mask", "label_prefix": "train_mask_", "extension": "tif"}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub data_root: PathBuf,
    #[serde(default = "default_tile_size")]
    pub tile_size: TileSize,
    #[serde(default = "default_threshold")]
    pub label_coverage_threshold: f64,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub metainfo: ClassMap,
}

impl DatasetConfig {
    /// Defaults for everything but the data root.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            tile_size: default_tile_size(),
            label_coverage_threshold: default_threshold(),
            layout: Layout::default(),
            metainfo: ClassMap::default(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let config = Self {
            metainfo: config.metainfo.validated()?,
            ..config
        };
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn build<T: DataType>(&self) -> Result<CollectionDataset<T>> {
        CollectionDataset::build_with(
            &self.data_root,
            self.tile_size,
            self.label_coverage_threshold,
            &self.layout,
            &self.metainfo,
        )
    }
}
