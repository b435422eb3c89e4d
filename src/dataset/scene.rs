use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use log::{debug, info};
use rayon::prelude::*;

use crate::{
    components::{
        label::{LabelSource, RasterLabel, VectorLabel},
        DataType, RasterHandle, TileIndexer, TileSize,
    },
    dataset::{ClassMap, Sample, SampleTransform},
    errors::{GeotilesError, Result},
};

/// Log coverage progress every this many tiles.
const PROGRESS_EVERY: usize = 256;

/// Where the labels of a scene come from.
#[derive(Debug, Clone)]
pub enum LabelSpec {
    /// Single band raster co-registered with the image.
    Mask(PathBuf),
    /// Polygon layer, burnt into each tile.
    Vector(PathBuf),
    Source(Arc<dyn LabelSource>),
}

impl LabelSpec {
    pub fn path(&self) -> Option<&Path> {
        match self {
            LabelSpec::Mask(path) | LabelSpec::Vector(path) => Some(path.as_path()),
            LabelSpec::Source(source) => source.path(),
        }
    }
}

/// State available once a scene is fully initialized.
struct Resolved<T: DataType> {
    indexer: TileIndexer<T>,
    label: Arc<dyn LabelSource>,
    color_map: Arc<[[u8; 3]]>,
}

enum SceneState<T: DataType> {
    Constructed,
    Initialized(Box<Resolved<T>>),
}

/// One image paired with one label source, cut into tiles.
///
/// Construction only records paths. [SceneDataset::full_init] opens the
/// rasters, after which tiles, coverage and samples are available.
pub struct SceneDataset<T: DataType> {
    image_path: PathBuf,
    /// Image handed over already open.
    image: Option<RasterHandle<T>>,
    label: LabelSpec,
    tile_size: TileSize,
    metainfo: ClassMap,
    pipeline: Vec<Arc<dyn SampleTransform<T>>>,
    state: SceneState<T>,
}

impl<T: DataType> Debug for SceneDataset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneDataset")
            .field("image_path", &self.image_path)
            .field("label_path", &self.label.path())
            .field("tile_size", &self.tile_size)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl<T: DataType> SceneDataset<T> {
    pub fn new(
        image_path: impl Into<PathBuf>,
        label: LabelSpec,
        tile_size: impl Into<TileSize>,
    ) -> Self {
        Self {
            image_path: image_path.into(),
            image: None,
            label,
            tile_size: tile_size.into(),
            metainfo: ClassMap::default(),
            pipeline: Vec::new(),
            state: SceneState::Constructed,
        }
    }

    /// Scene over an image that is already open.
    ///
    /// Samples need a file backed image to carry geometry metadata.
    pub fn from_handle(
        image: RasterHandle<T>,
        label: LabelSpec,
        tile_size: impl Into<TileSize>,
    ) -> Self {
        let image_path = match image.provenance() {
            Some(provenance) => provenance.path,
            None => PathBuf::from(image.description()),
        };
        Self {
            image: Some(image),
            ..Self::new(image_path, label, tile_size)
        }
    }

    pub fn with_metainfo(mut self, metainfo: ClassMap) -> Self {
        self.metainfo = metainfo;
        self
    }

    pub fn with_pipeline(mut self, pipeline: Vec<Arc<dyn SampleTransform<T>>>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Open image and labels. Calling it again is a no-op.
    pub fn full_init(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let metainfo = self.metainfo.clone().validated()?;
        let image = match &self.image {
            Some(image) => image.clone(),
            None => RasterHandle::<T>::open(&self.image_path)?,
        };
        let label: Arc<dyn LabelSource> = match &self.label {
            LabelSpec::Mask(path) => {
                let mask = RasterLabel::open(path)?;
                if mask.raster().size() != image.size() {
                    return Err(GeotilesError::configuration(format!(
                        "mask {} is {:?} but image {} is {:?}",
                        path.display(),
                        mask.raster().size(),
                        self.image_path.display(),
                        image.size()
                    )));
                }
                Arc::new(mask)
            }
            LabelSpec::Vector(path) => Arc::new(VectorLabel::open(path)?.to_crs(image.crs())?),
            LabelSpec::Source(source) => Arc::clone(source),
        };
        let indexer = TileIndexer::new(image, self.tile_size)?;
        info!(
            "initialized {} with {} tiles ({}x{})",
            self.image_path.display(),
            indexer.len(),
            indexer.rows(),
            indexer.cols()
        );
        self.state = SceneState::Initialized(Box::new(Resolved {
            indexer,
            label,
            color_map: Arc::from(metainfo.palette()),
        }));
        self.metainfo = metainfo;
        Ok(())
    }

    /// [SceneDataset::full_init] in builder form.
    pub fn initialized(mut self) -> Result<Self> {
        self.full_init()?;
        Ok(self)
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, SceneState::Initialized(_))
    }

    fn resolved(&self) -> Result<&Resolved<T>> {
        match &self.state {
            SceneState::Initialized(resolved) => Ok(resolved),
            SceneState::Constructed => Err(GeotilesError::NotInitialized(
                self.image_path.display().to_string(),
            )),
        }
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn label_path(&self) -> Option<&Path> {
        self.label.path()
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    pub fn metainfo(&self) -> Result<&ClassMap> {
        self.resolved()?;
        Ok(&self.metainfo)
    }

    pub fn color_map(&self) -> Result<Arc<[[u8; 3]]>> {
        Ok(Arc::clone(&self.resolved()?.color_map))
    }

    pub fn indexer(&self) -> Result<&TileIndexer<T>> {
        Ok(&self.resolved()?.indexer)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.indexer()?.len())
    }

    pub fn get_image_tile(&self, index: usize) -> Result<RasterHandle<T>> {
        self.indexer()?.index_to_tile(index)
    }

    /// Label tile over the same pixel window as [SceneDataset::get_image_tile].
    pub fn get_label_tile(&self, index: usize) -> Result<RasterHandle<u8>> {
        let Resolved { indexer, label, .. } = self.resolved()?;
        let window = indexer.index_to_window(index)?;
        label.tile(indexer.raster().georeference(), &window)
    }

    /// Fraction of each tile's nominal area covered by labels.
    ///
    /// The denominator is the full tile area also for tiles clipped at
    /// the raster edge, so edge tiles read lower than their clipped
    /// fraction. Coverage thresholds are tuned against this.
    pub fn get_label_coverage(&self) -> Result<Vec<f64>> {
        let Resolved { indexer, label, .. } = self.resolved()?;
        let georeference = indexer.raster().georeference();
        let nominal_area = self.tile_size.area() as f64;
        let total = indexer.len();
        let done = AtomicUsize::new(0);
        (0..total)
            .into_par_iter()
            .map(|index| {
                let window = indexer.index_to_window(index)?;
                let labels = label.read_window(georeference, &window)?;
                let label_pixels: f64 = labels.iter().map(|value| f64::from(*value)).sum();
                let count = done.fetch_add(1, Ordering::Relaxed) + 1;
                if count % PROGRESS_EVERY == 0 || count == total {
                    debug!("coverage {}: {count}/{total}", self.image_path.display());
                }
                Ok(label_pixels / nominal_area)
            })
            .collect()
    }

    /// Tile indexes whose coverage is above `threshold`.
    ///
    /// A non positive threshold selects every tile without reading labels.
    pub fn get_subset(&self, threshold: f64) -> Result<Vec<usize>> {
        let len = self.len()?;
        if threshold <= 0. {
            return Ok((0..len).collect());
        }
        Ok(self
            .get_label_coverage()?
            .into_iter()
            .enumerate()
            .filter_map(|(index, coverage)| (coverage > threshold).then_some(index))
            .collect())
    }

    pub fn get_sample(&self, index: usize) -> Result<Sample<T>> {
        let Resolved {
            indexer,
            label,
            color_map,
        } = self.resolved()?;
        let tile = indexer.tile_info(index)?;
        let window = indexer.index_to_window(index)?;
        let image_tile = indexer.raster().crop(window)?;
        let image_geometry_metadata = image_tile.geometry_metadata().ok_or_else(|| {
            GeotilesError::configuration(format!(
                "{} is not backed by a file",
                image_tile.description()
            ))
        })?;
        let image_array = image_tile
            .read()?
            .permuted_axes([1, 2, 0])
            .as_standard_layout()
            .into_owned();
        let label_array = label.read_window(indexer.raster().georeference(), &window)?;
        let sample = Sample {
            image_array,
            label_array,
            image_path: self.image_path.clone(),
            label_path: self.label.path().map(Path::to_path_buf),
            original_shape: (window.height(), window.width()),
            image_geometry_metadata,
            color_map: Arc::clone(color_map),
            tile,
        };
        self.pipeline
            .iter()
            .try_fold(sample, |sample, transform| transform.apply(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{label::BURN_VALUE, Georeference, PixelWindow},
        test_utils::{georeference, ramp, write_geotiff, write_vector_layer, UTM_33N},
    };
    use gdal::spatial_ref::SpatialRef;
    use geo::{polygon, Geometry, Polygon};
    use ndarray::{s, Array2, Array3};

    /// Label source counting how many windows were read.
    #[derive(Debug)]
    struct CountingLabel {
        inner: RasterLabel,
        reads: AtomicUsize,
    }

    impl LabelSource for CountingLabel {
        fn read_window(
            &self,
            georeference: &Georeference,
            window: &PixelWindow,
        ) -> Result<Array2<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_window(georeference, window)
        }
    }

    /// 100x100 mask: top left 50x50 fully labelled, plus one labelled
    /// pixel in the bottom right corner.
    fn mask() -> Array3<u8> {
        let mut mask = Array3::zeros((1, 100, 100));
        mask.slice_mut(s![0, 0..50, 0..50]).fill(1);
        mask[[0, 99, 99]] = 1;
        mask
    }

    fn scene_files(dir: &Path) -> (PathBuf, PathBuf) {
        let image = dir.join("image_1.tif");
        let label = dir.join("mask_1.tif");
        write_geotiff(&image, &ramp(3, 100, 100));
        write_geotiff(&label, &mask());
        (image, label)
    }

    fn counting_scene(dir: &Path) -> (SceneDataset<u16>, Arc<CountingLabel>) {
        let (image, label) = scene_files(dir);
        let counting = Arc::new(CountingLabel {
            inner: RasterLabel::open(label).unwrap(),
            reads: AtomicUsize::new(0),
        });
        let scene = SceneDataset::new(image, LabelSpec::Source(counting.clone()), 40)
            .initialized()
            .unwrap();
        (scene, counting)
    }

    #[test]
    fn metadata_needs_full_init() {
        let dir = tempfile::tempdir().unwrap();
        let (image, label) = scene_files(dir.path());
        let mut scene = SceneDataset::<u16>::new(image, LabelSpec::Mask(label), 40);
        assert!(!scene.is_initialized());
        assert!(matches!(scene.len(), Err(GeotilesError::NotInitialized(_))));
        assert!(matches!(scene.metainfo(), Err(GeotilesError::NotInitialized(_))));
        assert!(scene.get_sample(0).is_err());

        scene.full_init().unwrap();
        assert!(scene.is_initialized());
        assert_eq!(scene.len().unwrap(), 9);
        assert_eq!(scene.metainfo().unwrap(), &ClassMap::default());
    }

    #[test]
    fn coverage_uses_nominal_tile_area() {
        let dir = tempfile::tempdir().unwrap();
        let (scene, _) = counting_scene(dir.path());
        let coverage = scene.get_label_coverage().unwrap();
        assert_eq!(coverage.len(), 9);
        // 40 px tiles over the 50x50 labelled block
        assert_eq!(coverage[0], 1.);
        assert_eq!(coverage[1], 10. * 40. / 1600.);
        assert_eq!(coverage[3], 40. * 10. / 1600.);
        assert_eq!(coverage[4], 100. / 1600.);
        // Edge tile is 20x20 and holds one labelled pixel: 1/1600, not 1/400.
        assert_eq!(coverage[8], 1. / 1600.);
        assert_eq!(coverage[2], 0.);
    }

    #[test]
    fn non_positive_threshold_skips_coverage() {
        let dir = tempfile::tempdir().unwrap();
        let (scene, counting) = counting_scene(dir.path());
        assert_eq!(scene.get_subset(0.).unwrap(), (0..9).collect::<Vec<_>>());
        assert_eq!(scene.get_subset(-1.).unwrap().len(), 9);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 0);

        scene.get_subset(0.01).unwrap();
        assert_eq!(counting.reads.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn subset_matches_coverage_and_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let (scene, _) = counting_scene(dir.path());
        let coverage = scene.get_label_coverage().unwrap();
        let mut previous = usize::MAX;
        for threshold in [0.0001, 0.01, 0.1, 0.25, 0.5, 0.99, 1.] {
            let subset = scene.get_subset(threshold).unwrap();
            let expected: Vec<usize> = (0..coverage.len())
                .filter(|index| coverage[*index] > threshold)
                .collect();
            assert_eq!(subset, expected, "threshold {threshold}");
            assert!(subset.len() <= previous);
            previous = subset.len();
        }
        assert_eq!(scene.get_subset(0.01).unwrap(), vec![0, 1, 3, 4]);
        assert!(scene.get_subset(1.).unwrap().is_empty());
    }

    #[test_log::test]
    fn sample_is_channel_last_and_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let (image, label) = scene_files(dir.path());
        let scene = SceneDataset::<u16>::new(&image, LabelSpec::Mask(label.clone()), 40)
            .initialized()
            .unwrap();
        let sample = scene.get_sample(5).unwrap();
        // row 1, col 2: 40..80 x 80..100
        assert_eq!(sample.original_shape, (40, 20));
        assert_eq!(sample.image_array.dim(), (40, 20, 3));
        assert_eq!(sample.label_array.dim(), (40, 20));
        let expected = ramp(3, 100, 100);
        assert_eq!(sample.image_array[[0, 0, 1]], expected[[1, 40, 80]]);
        assert_eq!(sample.image_array[[39, 19, 2]], expected[[2, 79, 99]]);
        assert_eq!(sample.image_path, image);
        assert_eq!(sample.label_path, Some(label));
        assert_eq!(sample.tile.row, 1);
        assert_eq!(sample.tile.col, 2);
        assert_eq!(sample.color_map.as_ref(), ClassMap::default().palette());

        let metadata = &sample.image_geometry_metadata;
        assert_eq!(metadata.window, PixelWindow::new(80, 40, 20, 40));
        let reread = metadata.open::<u16>().unwrap().read().unwrap();
        assert_eq!(
            reread.permuted_axes([1, 2, 0]),
            sample.image_array.view()
        );
    }

    #[test]
    fn image_and_label_tiles_share_window() {
        let dir = tempfile::tempdir().unwrap();
        let (scene, _) = counting_scene(dir.path());
        let image_tile = scene.get_image_tile(8).unwrap();
        let label_tile = scene.get_label_tile(8).unwrap();
        assert_eq!(image_tile.size(), (20, 20));
        assert_eq!(label_tile.size(), image_tile.size());
        assert_eq!(label_tile.source_window(), image_tile.source_window());
    }

    /// Square over image pixels [0, 20) x [0, 20).
    fn top_left_square() -> Polygon<f64> {
        let georeference = georeference();
        let transform = georeference.transform();
        let top_left = transform.pixel_to_geo(0., 0.);
        let bottom_right = transform.pixel_to_geo(20., 20.);
        polygon![
            (x: top_left.x, y: bottom_right.y),
            (x: bottom_right.x, y: bottom_right.y),
            (x: bottom_right.x, y: top_left.y),
            (x: top_left.x, y: top_left.y),
        ]
    }

    fn assert_top_left_square_burnt(scene: &SceneDataset<u16>) {
        let coverage = scene.get_label_coverage().unwrap();
        assert_eq!(coverage[0], 400. / 1600.);
        assert!(coverage[1..].iter().all(|coverage| *coverage == 0.));
        let sample = scene.get_sample(0).unwrap();
        assert_eq!(
            sample.label_array.iter().filter(|value| **value == BURN_VALUE).count(),
            400
        );
        assert!(sample
            .label_array
            .slice(s![..20, ..20])
            .iter()
            .all(|value| *value == BURN_VALUE));
    }

    #[test]
    fn vector_labels_are_burnt_per_tile() {
        let dir = tempfile::tempdir().unwrap();
        let (image, _) = scene_files(dir.path());
        let label = VectorLabel::new(UTM_33N, [Geometry::Polygon(top_left_square())]);
        let scene = SceneDataset::<u16>::new(image, LabelSpec::Source(Arc::new(label)), 40)
            .initialized()
            .unwrap();
        assert_top_left_square_burnt(&scene);
    }

    #[test_log::test]
    fn wgs84_geopackage_is_reprojected_onto_utm_image() {
        let dir = tempfile::tempdir().unwrap();
        let (image, _) = scene_files(dir.path());
        let proj = proj::Proj::new_known_crs(UTM_33N, "EPSG:4326", None).unwrap();
        let square = crate::crs_geo::project(&proj, &top_left_square()).unwrap();
        assert!((12.0..18.0).contains(&square.exterior()[0].x));
        let vector = dir.path().join("labels.gpkg");
        write_vector_layer(
            &vector,
            "GPKG",
            Some(&SpatialRef::from_epsg(4326).unwrap()),
            &[square],
        );

        let scene = SceneDataset::<u16>::new(image, LabelSpec::Vector(vector.clone()), 40)
            .initialized()
            .unwrap();
        assert_eq!(scene.label_path(), Some(vector.as_path()));
        assert_top_left_square_burnt(&scene);
    }

    #[test_log::test]
    fn vector_layer_without_crs_uses_image_crs() {
        let dir = tempfile::tempdir().unwrap();
        let (image, _) = scene_files(dir.path());
        let vector = dir.path().join("labels.shp");
        write_vector_layer(&vector, "ESRI Shapefile", None, &[top_left_square()]);

        let scene = SceneDataset::<u16>::new(image, LabelSpec::Vector(vector), 40)
            .initialized()
            .unwrap();
        assert_top_left_square_burnt(&scene);
    }

    #[test]
    fn open_handle_as_image() {
        let dir = tempfile::tempdir().unwrap();
        let (image, label) = scene_files(dir.path());
        let handle = RasterHandle::<u16>::open(&image)
            .unwrap()
            .crop(PixelWindow::new(0, 0, 100, 100))
            .unwrap();
        let scene = SceneDataset::from_handle(handle, LabelSpec::Mask(label), 50)
            .initialized()
            .unwrap();
        assert_eq!(scene.image_path(), image.as_path());
        assert_eq!(scene.get_subset(0.01).unwrap(), vec![0]);

        let memory = RasterHandle::from_array(ramp(3, 100, 100), georeference()).unwrap();
        let counting = Arc::new(CountingLabel {
            inner: RasterLabel::new(RasterHandle::from_array(mask(), georeference()).unwrap()),
            reads: AtomicUsize::new(0),
        });
        let scene = SceneDataset::from_handle(memory, LabelSpec::Source(counting), 50)
            .initialized()
            .unwrap();
        assert_eq!(scene.get_label_coverage().unwrap()[0], 1.);
        assert!(matches!(
            scene.get_sample(0),
            Err(GeotilesError::Configuration(_))
        ));
    }

    #[test]
    fn mismatched_mask_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("image.tif");
        let label = dir.path().join("mask.tif");
        write_geotiff(&image, &ramp(3, 100, 100));
        write_geotiff(&label, &Array3::<u8>::zeros((1, 50, 100)));
        let mut scene = SceneDataset::<u16>::new(image, LabelSpec::Mask(label), 40);
        assert!(matches!(
            scene.full_init(),
            Err(GeotilesError::Configuration(_))
        ));
        assert!(!scene.is_initialized());
    }

    #[test]
    fn pipeline_runs_in_order() {
        struct Scale(u16);
        impl SampleTransform<u16> for Scale {
            fn apply(&self, mut sample: Sample<u16>) -> Result<Sample<u16>> {
                sample.image_array.mapv_inplace(|value| value.wrapping_mul(self.0));
                Ok(sample)
            }
        }
        struct Clear;
        impl SampleTransform<u16> for Clear {
            fn apply(&self, mut sample: Sample<u16>) -> Result<Sample<u16>> {
                sample.label_array.fill(0);
                Ok(sample)
            }
        }

        let dir = tempfile::tempdir().unwrap();

        let (image, label) = scene_files(dir.path());
        let pipeline: Vec<Arc<dyn SampleTransform<u16>>> = vec![Arc::new(Scale(2)), Arc::new(Clear)];
        let scene = SceneDataset::<u16>::new(image, LabelSpec::Mask(label), 40)
            .with_pipeline(pipeline)
            .initialized()
            .unwrap();
        let sample = scene.get_sample(0).unwrap();
        assert_eq!(sample.image_array[[0, 1, 0]], 2);
        assert!(sample.label_array.iter().all(|value| *value == 0));
    }
}
