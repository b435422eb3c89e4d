use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{info, warn};
use rayon::prelude::*;

use crate::{
    components::{DataType, TileSize},
    dataset::{
        layout::ScenePaths,
        stats::{Moments, Stats},
        ClassMap, Layout, Sample, SceneDataset,
    },
    errors::{GeotilesError, Result},
    indexes::Indexes,
};

/// Coverage threshold used when none is given.
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 0.01;

/// Scenes concatenated under one global tile index.
///
/// Each scene contributes the tiles of its subset, in subset order.
/// Scenes whose subset is empty are kept and skipped by indexing.
pub struct CollectionDataset<T: DataType> {
    scenes: Vec<SceneDataset<T>>,
    subsets: Vec<Arc<[usize]>>,
    /// Exclusive cumulative end of each scene in the global index.
    ends: Vec<usize>,
    stats_path: Option<PathBuf>,
    stats: Option<Stats>,
}

impl<T: DataType> Debug for CollectionDataset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionDataset")
            .field("scenes", &self.scenes.len())
            .field("len", &self.len())
            .field("stats_path", &self.stats_path)
            .finish()
    }
}

impl<T: DataType> CollectionDataset<T> {
    /// Scenes under `root` in the default layout and class map.
    pub fn build(root: &Path, tile_size: impl Into<TileSize>, threshold: f64) -> Result<Self> {
        Self::build_with(
            root,
            tile_size,
            threshold,
            &Layout::default(),
            &ClassMap::default(),
        )
    }

    /// Discover, initialize and filter every scene under `root`.
    ///
    /// Scenes that fail to pair, open or filter are logged and skipped.
    pub fn build_with(
        root: &Path,
        tile_size: impl Into<TileSize>,
        threshold: f64,
        layout: &Layout,
        metainfo: &ClassMap,
    ) -> Result<Self> {
        let tile_size = tile_size.into();
        let metainfo = metainfo.clone().validated()?;
        let discovered = layout.discover(root)?;
        let total = discovered.len();
        let pairs: Vec<(usize, ScenePaths)> = discovered
            .into_iter()
            .enumerate()
            .filter_map(|(position, pair)| match pair {
                Ok(pair) => Some((position, pair)),
                Err(err) => {
                    warn!("skipping scene ({}/{total}): {err}", position + 1);
                    None
                }
            })
            .collect();

        let prepared: Vec<(SceneDataset<T>, Arc<[usize]>)> = pairs
            .into_par_iter()
            .filter_map(|(position, paths)| {
                let image = paths.image.display().to_string();
                match prepare_scene(paths, tile_size, threshold, &metainfo) {
                    Ok((scene, subset, len)) => {
                        info!(
                            "Prepared scene ({}/{total}) {image} filtered ({}/{len})",
                            position + 1,
                            subset.len()
                        );
                        Some((scene, subset))
                    }
                    Err(err) => {
                        warn!("skipping scene ({}/{total}) {image}: {err}", position + 1);
                        None
                    }
                }
            })
            .collect();

        let mut collection = Self::assemble(prepared);
        collection.stats_path = Some(Stats::sidecar_path(root));
        info!(
            "built collection of {} tiles from {}/{total} scenes under {}",
            collection.len(),
            collection.scenes.len(),
            root.display()
        );
        Ok(collection)
    }

    /// Initialize `scenes` and keep the tiles above `threshold`.
    ///
    /// Scenes that fail to initialize or filter are logged and skipped.
    pub fn from_scenes(scenes: Vec<SceneDataset<T>>, threshold: f64) -> Result<Self> {
        let total = scenes.len();
        let prepared: Vec<(SceneDataset<T>, Arc<[usize]>)> = scenes
            .into_par_iter()
            .enumerate()
            .filter_map(|(position, mut scene)| {
                let prepared = scene
                    .full_init()
                    .and_then(|_| scene.get_subset(threshold));
                match prepared {
                    Ok(subset) => Some((scene, Arc::from(subset))),
                    Err(err) => {
                        warn!(
                            "skipping scene ({}/{total}) {}: {err}",
                            position + 1,
                            scene.image_path().display()
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(Self::assemble(prepared))
    }

    /// Initialize `scenes`, each restricted to an explicit tile selection.
    pub fn from_subsets(scenes: Vec<(SceneDataset<T>, Indexes)>) -> Result<Self> {
        let prepared = scenes
            .into_iter()
            .map(|(mut scene, indexes)| {
                scene.full_init()?;
                let subset = indexes.indexes_from(scene.len()?);
                Ok((scene, subset))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::assemble(prepared))
    }

    fn assemble(prepared: Vec<(SceneDataset<T>, Arc<[usize]>)>) -> Self {
        let (scenes, subsets): (Vec<_>, Vec<_>) = prepared.into_iter().unzip();
        let ends = subsets
            .iter()
            .scan(0, |end, subset: &Arc<[usize]>| {
                *end += subset.len();
                Some(*end)
            })
            .collect();
        Self {
            scenes,
            subsets,
            ends,
            stats_path: None,
            stats: None,
        }
    }

    /// Cache statistics at `path` instead of the data root sidecar.
    pub fn with_stats_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_path = Some(path.into());
        self.stats = None;
        self
    }

    pub fn len(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scenes(&self) -> &[SceneDataset<T>] {
        &self.scenes
    }

    /// Selected tile indexes of each scene.
    pub fn subsets(&self) -> &[Arc<[usize]>] {
        &self.subsets
    }

    /// Class map shared by the scenes, `None` for an empty collection.
    pub fn metainfo(&self) -> Option<&ClassMap> {
        self.scenes.first().and_then(|scene| scene.metainfo().ok())
    }

    /// (scene, position within the scene subset)
    pub fn resolve_global_index(&self, index: usize) -> Result<(usize, usize)> {
        if index >= self.len() {
            return Err(GeotilesError::index(index, self.len()));
        }
        // First scene ending past `index`; empty scenes share their
        // predecessor's end and are passed over.
        let scene = self.ends.partition_point(|end| *end <= index);
        let start = scene.checked_sub(1).map_or(0, |previous| self.ends[previous]);
        Ok((scene, index - start))
    }

    pub fn global_index(&self, scene: usize, local: usize) -> Result<usize> {
        let subset = self
            .subsets
            .get(scene)
            .ok_or_else(|| GeotilesError::index(scene, self.scenes.len()))?;
        if local >= subset.len() {
            return Err(GeotilesError::index(local, subset.len()));
        }
        let start = scene.checked_sub(1).map_or(0, |previous| self.ends[previous]);
        Ok(start + local)
    }

    /// (scene, tile index in the scene grid)
    pub fn tile_index(&self, index: usize) -> Result<(usize, usize)> {
        let (scene, local) = self.resolve_global_index(index)?;
        Ok((scene, self.subsets[scene][local]))
    }

    pub fn get(&self, index: usize) -> Result<Sample<T>> {
        let (scene, tile) = self.tile_index(index)?;
        self.scenes[scene].get_sample(tile)
    }

    /// Per channel statistics over every scene.
    ///
    /// Cached values are reused unless `force` is set. Freshly computed
    /// values are written to the stats sidecar when there is one.
    pub fn get_stats(&mut self, force: bool) -> Result<&Stats> {
        if force {
            self.stats = None;
        } else if self.stats.is_none() {
            if let Some(path) = &self.stats_path {
                self.stats = Stats::load(path)?;
            }
        }
        if self.stats.is_none() {
            let moments = self
                .scenes
                .par_iter()
                .map(|scene| Moments::of(scene.indexer()?))
                .collect::<Result<Vec<_>>>()?;
            let stats = Stats::aggregate(&moments)?;
            if let Some(path) = &self.stats_path {
                stats.save(path)?;
            }
            self.stats = Some(stats);
        }
        self.stats
            .as_ref()
            .ok_or_else(|| GeotilesError::configuration("statistics unavailable"))
    }
}

fn prepare_scene<T: DataType>(
    paths: ScenePaths,
    tile_size: TileSize,
    threshold: f64,
    metainfo: &ClassMap,
) -> Result<(SceneDataset<T>, Arc<[usize]>, usize)> {
    if !paths.label.exists() {
        return Err(GeotilesError::configuration(format!(
            "missing label {}",
            paths.label.display()
        )));
    }
    let scene = SceneDataset::new(&paths.image, paths.label_spec(), tile_size)
        .with_metainfo(metainfo.clone())
        .initialized()?;
    let subset = Arc::from(scene.get_subset(threshold)?);
    let len = scene.len()?;
    Ok((scene, subset, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::scene::LabelSpec,
        test_utils::{ramp, write_geotiff},
    };
    use ndarray::{s, Array3};
    use rstest::rstest;

    /// Scene whose mask labels the first `labelled` tiles of a 2x2 grid
    /// of 10 px tiles.
    fn scene(dir: &Path, name: &str, labelled: usize) -> SceneDataset<u16> {
        let image = dir.join(format!("{name}.tif"));
        let label = dir.join(format!("{name}_mask.tif"));
        write_geotiff(&image, &ramp(2, 20, 20));
        let mut mask = Array3::<u8>::zeros((1, 20, 20));
        for tile in 0..labelled {
            let (top, left) = ((tile / 2) * 10, (tile % 2) * 10);
            mask.slice_mut(s![0, top..top + 10, left..left + 10]).fill(1);
        }
        write_geotiff(&label, &mask);
        SceneDataset::new(image, LabelSpec::Mask(label), 10)
    }

    fn collection(dir: &Path, labelled: &[usize]) -> CollectionDataset<u16> {
        let scenes = labelled
            .iter()
            .enumerate()
            .map(|(position, labelled)| scene(dir, &format!("scene_{position}"), *labelled))
            .collect();
        CollectionDataset::from_scenes(scenes, 0.5).unwrap()
    }

    #[test]
    fn length_is_sum_of_subsets() {
        let dir = tempfile::tempdir().unwrap();
        let collection = collection(dir.path(), &[3, 0, 2, 4]);
        assert_eq!(collection.scenes().len(), 4);
        assert_eq!(collection.len(), 9);
        assert!(collection.subsets()[1].is_empty());
        assert_eq!(collection.metainfo(), Some(&ClassMap::default()));
    }

    #[rstest]
    #[case(0, (0, 0))]
    #[case(2, (0, 2))]
    #[case(3, (2, 0))]
    #[case(4, (2, 1))]
    #[case(5, (3, 0))]
    #[case(8, (3, 3))]
    fn global_index_skips_empty_scenes(#[case] index: usize, #[case] expected: (usize, usize)) {
        let dir = tempfile::tempdir().unwrap();
        let collection = collection(dir.path(), &[3, 0, 2, 4]);
        assert_eq!(collection.resolve_global_index(index).unwrap(), expected);
        assert_eq!(
            collection.global_index(expected.0, expected.1).unwrap(),
            index
        );
    }

    #[test]
    fn global_index_round_trip_and_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let collection = collection(dir.path(), &[1, 4, 0, 2]);
        for index in 0..collection.len() {
            let (scene, local) = collection.resolve_global_index(index).unwrap();
            assert_eq!(collection.global_index(scene, local).unwrap(), index);
        }
        assert!(matches!(
            collection.resolve_global_index(collection.len()),
            Err(GeotilesError::Index { .. })
        ));
        assert!(collection.global_index(2, 0).is_err());
        assert!(collection.get(collection.len()).is_err());
    }

    #[test]
    fn get_maps_to_subset_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let collection = collection(dir.path(), &[0, 3]);
        assert_eq!(collection.tile_index(2).unwrap(), (1, 2));
        let sample = collection.get(2).unwrap();
        assert_eq!(sample.tile.index, 2);
        assert_eq!(sample.image_array.dim(), (10, 10, 2));
        assert!(sample.label_array.iter().all(|value| *value == 1));
    }

    #[test_log::test]
    fn from_scenes_skips_scenes_that_fail() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SceneDataset::new(
            dir.path().join("absent.tif"),
            LabelSpec::Mask(dir.path().join("absent_mask.tif")),
            10,
        );
        let scenes = vec![
            scene(dir.path(), "first", 2),
            missing,
            scene(dir.path(), "last", 1),
        ];
        let collection = CollectionDataset::from_scenes(scenes, 0.5).unwrap();
        assert_eq!(collection.scenes().len(), 2);
        assert_eq!(collection.len(), 3);
        assert_eq!(
            collection.scenes()[1].image_path(),
            dir.path().join("last.tif").as_path()
        );
        assert_eq!(collection.tile_index(2).unwrap(), (1, 0));
    }

    #[test]
    fn empty_collection() {
        let mut collection = CollectionDataset::<u16>::from_scenes(Vec::new(), 0.).unwrap();
        assert!(collection.is_empty());
        assert!(collection.metainfo().is_none());
        assert!(collection.resolve_global_index(0).is_err());
        assert!(matches!(
            collection.get_stats(false),
            Err(GeotilesError::Configuration(_))
        ));
    }

    #[test]
    fn explicit_subsets() {
        let dir = tempfile::tempdir().unwrap();
        let collection = CollectionDataset::from_subsets(vec![
            (scene(dir.path(), "a", 0), Indexes::from([3, 1, 7])),
            (scene(dir.path(), "b", 0), Indexes::all()),
        ])
        .unwrap();
        assert_eq!(collection.subsets()[0].as_ref(), &[1, 3]);
        assert_eq!(collection.len(), 6);
        assert_eq!(collection.tile_index(1).unwrap(), (0, 3));
    }

    #[test_log::test]
    fn stats_are_cached_in_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = Stats::sidecar_path(dir.path());
        let mut collection = collection(dir.path(), &[1, 2]).with_stats_path(&sidecar);
        let stats = collection.get_stats(false).unwrap().clone();
        assert_eq!(stats.mean.len(), 2);
        // Both scenes hold the same ramp.
        let expected = Moments::of(collection.scenes()[0].indexer().unwrap()).unwrap();
        assert_eq!(stats.mean, expected.mean);
        assert_eq!(Stats::load(&sidecar).unwrap(), Some(stats.clone()));

        let cached = Stats {
            mean: vec![1., 2.],
            std: vec![3., 4.],
        };
        cached.save(&sidecar).unwrap();
        let mut reloaded = collection.with_stats_path(&sidecar);
        assert_eq!(reloaded.get_stats(false).unwrap(), &cached);
        assert_eq!(reloaded.get_stats(true).unwrap(), &stats);
        assert_eq!(Stats::load(&sidecar).unwrap(), Some(stats));
    }
}
