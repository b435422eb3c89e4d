//! Scene and collection datasets built on top of tile indexers.

pub mod collection;
pub mod layout;
pub mod sample;
pub mod scene;
pub mod stats;

pub use crate::components::raster::GeometryMetadata;
pub use collection::CollectionDataset;
pub use layout::{LabelKind, Layout, ScenePaths};
pub use sample::{ClassMap, Sample, SampleMeta, SampleTransform};
pub use scene::{LabelSpec, SceneDataset};
pub use stats::{Moments, Stats};
