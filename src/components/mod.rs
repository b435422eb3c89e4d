pub mod bounds;
pub mod engines;
pub mod file;
pub mod indexer;
pub mod label;
pub mod raster;
pub mod reader;
pub mod transforms;

pub use bounds::{GeoBounds, PixelWindow};
pub use indexer::{TileIndexer, TileInfo, TileSize};
pub use raster::{Provenance, RasterHandle};
pub use transforms::{GeoTransform, Georeference};

use gdal::raster::GdalType;
use num::{Num, ToPrimitive};
use std::fmt::Debug;

/// Pixel types a [RasterHandle] can be read as.
pub trait DataType: Num + ToPrimitive + Clone + Copy + Send + Sync + Debug + GdalType + 'static {}

impl<T> DataType for T where T: Num + ToPrimitive + Clone + Copy + Send + Sync + Debug + GdalType + 'static {}
