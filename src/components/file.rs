use std::{fmt::Debug, path::Path, sync::Arc};

use crate::{
    components::{reader::WindowReader, DataType, GeoTransform},
    errors::Result,
};

/// Raster file opened for its metadata.
pub trait File: Debug + Sized {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self>;
    /// Path the pixels are read from, which differs from the opened path
    /// when the file is a container of sub-datasets.
    fn raster_path(&self) -> &Path;
    /// (width, height)
    fn size(&self) -> (usize, usize);
    fn crs(&self) -> String;
    fn transform(&self) -> Result<GeoTransform>;
    fn num_bands(&self) -> usize;
    fn reader<T: DataType>(&self) -> Arc<dyn WindowReader<T>>;
}
