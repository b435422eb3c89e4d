use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use geo::Polygon;
use log::debug;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::{
    components::{
        engines::gdal_engine::GdalFile,
        file::File,
        reader::{ArrayReader, WindowReader},
        DataType, GeoBounds, GeoTransform, Georeference, PixelWindow,
    },
    errors::{GeotilesError, Result},
    CrsGeometry,
};

/// Where the pixels of a [RasterHandle] come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub path: PathBuf,
    /// Window of `path` the handle was derived from, `None` for the full raster.
    pub window: Option<PixelWindow>,
}

/// Source path plus pixel window, enough to re-derive a tile
/// with a single windowed read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryMetadata {
    pub path: PathBuf,
    pub window: PixelWindow,
}

impl GeometryMetadata {
    pub fn open<T: DataType>(&self) -> Result<RasterHandle<T>> {
        RasterHandle::open_window(&self.path, self.window)
    }
}

/// Georeferenced raster, or a window of one.
///
/// Cropping never touches pixels: the derived handle shares the
/// path based reader and only narrows the window it reads.
#[derive(Clone)]
pub struct RasterHandle<T: DataType> {
    description: Arc<str>,
    /// Window of the source raster covered by this handle.
    window: PixelWindow,
    georeference: Georeference,
    source: Option<Arc<Path>>,
    derived: bool,
    reader: Arc<dyn WindowReader<T>>,
}

impl<T: DataType> Debug for RasterHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterHandle")
            .field("description", &self.description)
            .field("window", &self.window)
            .field("transform", self.georeference.transform())
            .field("bands", &self.band_count())
            .finish()
    }
}

impl<T: DataType> RasterHandle<T> {
    fn init(
        description: Arc<str>,
        size: (usize, usize),
        georeference: Georeference,
        source: Option<Arc<Path>>,
        reader: Arc<dyn WindowReader<T>>,
    ) -> Result<Self> {
        if size.0 == 0 || size.1 == 0 {
            return Err(GeotilesError::configuration(format!(
                "{description} has empty size {size:?}"
            )));
        }
        if georeference.transform().pixel_size_x() <= 0. {
            return Err(GeotilesError::configuration(format!(
                "{description} has non positive pixel width"
            )));
        }
        let handle = Self {
            description,
            window: PixelWindow::full(size),
            georeference,
            source,
            derived: false,
            reader,
        };
        debug!("new {handle:?}");
        Ok(handle)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file(GdalFile::open(path)?)
    }

    pub fn from_file<F: File>(file: F) -> Result<Self> {
        let georeference = Georeference::new(file.transform()?, file.crs().as_str());
        let source: Arc<Path> = Arc::from(file.raster_path());
        Self::init(
            Arc::from(source.display().to_string()),
            file.size(),
            georeference,
            Some(source),
            file.reader(),
        )
    }

    /// Handle over `window` of the raster at `path`, reading only that window.
    pub fn open_window<P: AsRef<Path>>(path: P, window: PixelWindow) -> Result<Self> {
        Self::open(path)?.crop(window)
    }

    /// Wrap a `(C, H, W)` array already in memory.
    pub fn from_array(array: Array3<T>, georeference: Georeference) -> Result<Self> {
        let (_, height, width) = array.dim();
        Self::init(
            Arc::from("in-memory"),
            (width, height),
            georeference,
            None,
            Arc::new(ArrayReader::new(array)),
        )
    }

    /// Handle over `window`, given in this handle's pixel space.
    pub fn crop(&self, window: PixelWindow) -> Result<Self> {
        if !window.fits_within(self.size()) {
            return Err(GeotilesError::Range {
                window,
                size: self.size(),
            });
        }
        Ok(Self {
            description: Arc::clone(&self.description),
            window: window.translate(self.window.offset()),
            georeference: self.georeference.rebased(&window),
            source: self.source.clone(),
            derived: true,
            reader: Arc::clone(&self.reader),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// (width, height)
    pub fn size(&self) -> (usize, usize) {
        self.window.shape()
    }

    pub fn width(&self) -> usize {
        self.window.width()
    }

    pub fn height(&self) -> usize {
        self.window.height()
    }

    pub fn band_count(&self) -> usize {
        self.reader.band_count()
    }

    pub fn georeference(&self) -> &Georeference {
        &self.georeference
    }

    pub fn transform(&self) -> &GeoTransform {
        self.georeference.transform()
    }

    pub fn crs(&self) -> &str {
        self.georeference.crs()
    }

    /// Window of the source raster this handle reads.
    pub fn source_window(&self) -> PixelWindow {
        self.window
    }

    pub fn provenance(&self) -> Option<Provenance> {
        self.source.as_ref().map(|path| Provenance {
            path: path.to_path_buf(),
            window: self.derived.then_some(self.window),
        })
    }

    /// `None` for in-memory handles.
    pub fn geometry_metadata(&self) -> Option<GeometryMetadata> {
        self.source.as_ref().map(|path| GeometryMetadata {
            path: path.to_path_buf(),
            window: self.window,
        })
    }

    /// (xmin, ymin, xmax, ymax) in the raster crs.
    pub fn bounds(&self) -> Result<GeoBounds> {
        self.georeference
            .window_bounds(&PixelWindow::full(self.size()), &self.description)
    }

    /// Footprint polygon in `crs`, the handle itself is left untouched.
    pub fn reproject_bbox_to(&self, crs: &str) -> Result<CrsGeometry<Polygon<f64>>> {
        self.bounds()?.to_polygon().with_crs(crs)
    }

    /// `(C, H, W)` array of the handle's window.
    pub fn read(&self) -> Result<Array3<T>> {
        debug!("reading {} {:?}", self.description, self.window);
        self.reader.read_window(&self.window)
    }

    /// `(H, W)` array of the zero based `band` over the handle's window.
    pub fn read_band(&self, band: usize) -> Result<Array2<T>> {
        if band >= self.band_count() {
            return Err(GeotilesError::index(band, self.band_count()));
        }
        debug!("reading band {band} of {} {:?}", self.description, self.window);
        self.reader.read_band_window(band, &self.window)
    }
}
