use crate::components::PixelWindow;

pub type Result<T> = std::result::Result<T, GeotilesError>;

#[derive(thiserror::Error, Debug)]
pub enum GeotilesError {
    #[error(transparent)]
    ProjError(#[from] proj::ProjError),
    #[error(transparent)]
    ProjCreateError(#[from] proj::ProjCreateError),
    #[error(transparent)]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    NdarrayError(#[from] ndarray::ShapeError),
    #[error("{0} declares no raster bands and no sub-datasets")]
    MissingSubdataset(String),
    #[error("Vector source {path} is unusable: {reason}")]
    VectorLayer { path: String, reason: String },
    #[error("Window {window:?} is outside of raster of size {size:?}")]
    Range {
        window: PixelWindow,
        size: (usize, usize),
    },
    #[error("Index {index} is outside of [0, {len})")]
    Index { index: usize, len: usize },
    #[error("Scene {0} used before full initialization")]
    NotInitialized(String),
    #[error("Raster {0} has no coordinate reference system")]
    MissingCrs(String),
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("There is no intersection between geometries")]
    NoIntersection,
    #[error("Value could not be cast")]
    Uncastable,
}

impl GeotilesError {
    pub(crate) fn index(index: usize, len: usize) -> Self {
        Self::Index { index, len }
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}
