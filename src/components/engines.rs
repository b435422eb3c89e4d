use std::{path::Path, sync::Arc};

use log::{info, warn};

use crate::{
    components::{file::File, reader::WindowReader, DataType, GeoTransform, PixelWindow},
    errors::{GeotilesError, Result},
    try_tuple_cast,
};

/// Implementations for gdal
pub mod gdal_engine {
    use super::*;
    use gdal::{Dataset as GdalDataset, Metadata as GdalMetadata};
    use ndarray::{Array2, Array3};

    /// Transform gdal reports for rasters without georeferencing.
    const DEFAULT_GDAL_TRANSFORM: [f64; 6] = [0., 1., 0., 0., 0., 1.];

    /// Name of the last declared sub-dataset of `dataset`, if any.
    fn last_subdataset(dataset: &GdalDataset) -> Option<String> {
        (1..)
            .map(|sub_dataset_idx| {
                dataset.metadata_item(
                    format!("SUBDATASET_{sub_dataset_idx}_NAME").as_str(),
                    "SUBDATASETS",
                )
            })
            .take_while(Option::is_some)
            .flatten()
            .last()
    }

    #[derive(Debug)]
    pub struct GdalFile {
        path: Arc<Path>,
        dataset: GdalDataset,
    }

    impl File for GdalFile {
        fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            let dataset = GdalDataset::open(&path)?;
            if dataset.raster_count() > 0 {
                return Ok(GdalFile {
                    path: Arc::from(path.as_ref()),
                    dataset,
                });
            }
            let description = path.as_ref().display().to_string();
            let sub_dataset_path = last_subdataset(&dataset)
                .ok_or_else(|| GeotilesError::MissingSubdataset(description.clone()))?;
            info!("{description} is a container, reading {sub_dataset_path}");
            Ok(GdalFile {
                dataset: GdalDataset::open(&sub_dataset_path)?,
                path: Arc::from(Path::new(&sub_dataset_path)),
            })
        }
        fn raster_path(&self) -> &Path {
            &self.path
        }
        fn size(&self) -> (usize, usize) {
            self.dataset.raster_size()
        }
        fn crs(&self) -> String {
            self.dataset.projection()
        }
        fn transform(&self) -> Result<GeoTransform> {
            let gdal_transform = self.dataset.geo_transform().unwrap_or_else(|err| {
                warn!(
                    "{} has no geotransform ({err}), using pixel coordinates",
                    self.path.display()
                );
                DEFAULT_GDAL_TRANSFORM
            });
            Ok(GeoTransform::from_gdal(gdal_transform))
        }
        fn num_bands(&self) -> usize {
            self.dataset.raster_count()
        }
        fn reader<T: DataType>(&self) -> Arc<dyn WindowReader<T>> {
            Arc::new(GdalWindowReader {
                path: Arc::clone(&self.path),
                band_count: self.num_bands(),
            })
        }
    }

    /// Reads windows by opening the dataset at `path` on every call.
    #[derive(Debug)]
    struct GdalWindowReader {
        path: Arc<Path>,
        band_count: usize,
    }

    impl GdalWindowReader {
        fn read_band_into<T: DataType>(
            dataset: &GdalDataset,
            band_idx: usize,
            window: &PixelWindow,
            band_slice: &mut [T],
        ) -> Result<()> {
            let window_shape = window.shape();
            dataset.rasterband(band_idx + 1)?.read_into_slice::<T>(
                try_tuple_cast(window.offset())?,
                window_shape,
                window_shape,
                band_slice,
                None,
            )?;
            Ok(())
        }
    }

    impl<T: DataType> WindowReader<T> for GdalWindowReader {
        fn read_window(&self, window: &PixelWindow) -> Result<Array3<T>> {
            let dataset = GdalDataset::open(&self.path)?;
            let mut data = vec![T::zero(); self.band_count * window.size()];
            for (band_idx, band_slice) in data.chunks_mut(window.size()).enumerate() {
                Self::read_band_into(&dataset, band_idx, window, band_slice)?;
            }
            Ok(Array3::from_shape_vec(
                (self.band_count, window.height(), window.width()),
                data,
            )?)
        }

        fn read_band_window(&self, band: usize, window: &PixelWindow) -> Result<Array2<T>> {
            let dataset = GdalDataset::open(&self.path)?;
            let mut data = vec![T::zero(); window.size()];
            Self::read_band_into(&dataset, band, window, &mut data)?;
            Ok(Array2::from_shape_vec((window.height(), window.width()), data)?)
        }

        fn band_count(&self) -> usize {
            self.band_count
        }
    }
}
