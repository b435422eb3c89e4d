//! Tile large georeferenced rasters into randomly indexable
//! segmentation datasets.
//!
//! A [`RasterHandle`] wraps a raster and its georeference, a
//! [`TileIndexer`] lays a grid of fixed-size tiles over it, a
//! [`SceneDataset`] pairs an image with a label source and filters tiles
//! by label coverage, and a [`CollectionDataset`] concatenates scenes
//! under one global index with cached normalization statistics.

mod components;
pub mod config;
mod crs_geo;
pub mod dataset;
mod errors;
mod indexes;
mod intersection;

pub use components::{
    label::{LabelSource, RasterLabel, VectorLabel},
    DataType, GeoBounds, GeoTransform, Georeference, PixelWindow, Provenance, RasterHandle,
    TileIndexer, TileInfo, TileSize,
};
pub use crs_geo::CrsGeometry;
pub use dataset::{
    ClassMap, CollectionDataset, GeometryMetadata, LabelSpec, Layout, Sample, SampleMeta,
    SampleTransform, SceneDataset, Stats,
};
pub use errors::{GeotilesError, Result};
pub use indexes::Indexes;

use num::NumCast;

fn try_tuple_cast<TO: NumCast, TI: NumCast>(tuple: (TI, TI)) -> Result<(TO, TO)> {
    match (TO::from(tuple.0), TO::from(tuple.1)) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(GeotilesError::Uncastable),
    }
}
