use std::{path::PathBuf, sync::Arc};

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::{
    components::{raster::GeometryMetadata, DataType, TileInfo},
    errors::{GeotilesError, Result},
};

/// Class names and their display colours, background first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    classes: Vec<String>,
    palette: Vec<[u8; 3]>,
}

impl Default for ClassMap {
    fn default() -> Self {
        Self {
            classes: vec!["background".into(), "cloud".into()],
            palette: vec![[0, 0, 0], [245, 66, 66]],
        }
    }
}

impl ClassMap {
    pub fn new(classes: Vec<String>, palette: Vec<[u8; 3]>) -> Result<Self> {
        Self { classes, palette }.validated()
    }

    /// Every class needs exactly one colour.
    pub fn validated(self) -> Result<Self> {
        if self.classes.is_empty() || self.classes.len() != self.palette.len() {
            return Err(GeotilesError::configuration(format!(
                "{} classes but {} palette colours",
                self.classes.len(),
                self.palette.len()
            )));
        }
        Ok(self)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn palette(&self) -> &[[u8; 3]] {
        &self.palette
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

/// One unit of training data.
#[derive(Debug, Clone)]
pub struct Sample<T: DataType> {
    /// (H, W, C)
    pub image_array: Array3<T>,
    /// (H, W) class indexes.
    pub label_array: Array2<u8>,
    pub image_path: PathBuf,
    /// `None` for label sources that are not backed by a file.
    pub label_path: Option<PathBuf>,
    /// (H, W) of the tile before any transform.
    pub original_shape: (usize, usize),
    pub image_geometry_metadata: GeometryMetadata,
    /// Colour of each class id.
    pub color_map: Arc<[[u8; 3]]>,
    pub tile: TileInfo,
}

/// Everything in a [Sample] but the arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMeta {
    pub image_path: PathBuf,
    pub label_path: Option<PathBuf>,
    pub original_shape: (usize, usize),
    pub image_shape: (usize, usize, usize),
    pub image_geometry_metadata: GeometryMetadata,
    pub color_map: Vec<[u8; 3]>,
    pub tile: TileInfo,
}

impl<T: DataType> Sample<T> {
    pub fn meta(&self) -> SampleMeta {
        SampleMeta {
            image_path: self.image_path.clone(),
            label_path: self.label_path.clone(),
            original_shape: self.original_shape,
            image_shape: self.image_array.dim(),
            image_geometry_metadata: self.image_geometry_metadata.clone(),
            color_map: self.color_map.to_vec(),
            tile: self.tile,
        }
    }
}

/// Hook run on every sample a scene assembles, in pipeline order.
pub trait SampleTransform<T: DataType>: Send + Sync {
    fn apply(&self, sample: Sample<T>) -> Result<Sample<T>>;
}
