use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use geo::{BoundingRect, Contains, Coord, Geometry, MultiPolygon, Point, Rect};
use log::{debug, warn};
use ndarray::{Array2, Axis};
use proj::Proj;

use crate::{
    components::{Georeference, PixelWindow, RasterHandle},
    crs_geo::project,
    errors::{GeotilesError, Result},
    intersection::Intersection,
};

/// Value burnt into tiles for pixels covered by a vector label.
pub const BURN_VALUE: u8 = 1;
/// Value of pixels no vector label covers.
pub const BACKGROUND_VALUE: u8 = 0;

/// Anything that can produce a single band label for a pixel window
/// of the image it is paired with.
pub trait LabelSource: Send + Sync + Debug {
    /// Labels of `window`, a window in the pixel space of `georeference`.
    fn read_window(&self, georeference: &Georeference, window: &PixelWindow)
        -> Result<Array2<u8>>;

    /// Labels of `window` as a raster handle aligned with the image tile.
    fn tile(&self, georeference: &Georeference, window: &PixelWindow) -> Result<RasterHandle<u8>> {
        let labels = self.read_window(georeference, window)?;
        RasterHandle::from_array(labels.insert_axis(Axis(0)), georeference.rebased(window))
    }

    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Label mask co-registered with the image.
#[derive(Debug, Clone)]
pub struct RasterLabel {
    path: Option<PathBuf>,
    raster: RasterHandle<u8>,
}

impl RasterLabel {
    pub fn new(raster: RasterHandle<u8>) -> Self {
        let path = raster.provenance().map(|provenance| provenance.path);
        Self { path, raster }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(RasterHandle::open(path)?))
    }

    pub fn raster(&self) -> &RasterHandle<u8> {
        &self.raster
    }
}

impl LabelSource for RasterLabel {
    /// Only the first band is read, extra bands of the mask are ignored.
    fn read_window(&self, _: &Georeference, window: &PixelWindow) -> Result<Array2<u8>> {
        self.raster.crop(*window)?.read_band(0)
    }

    fn tile(&self, _: &Georeference, window: &PixelWindow) -> Result<RasterHandle<u8>> {
        self.raster.crop(*window)
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Polygon layer burnt into tiles on demand.
///
/// Pixels whose centre falls inside a polygon take [BURN_VALUE],
/// every other pixel [BACKGROUND_VALUE].
#[derive(Debug, Clone)]
pub struct VectorLabel {
    path: Option<PathBuf>,
    crs: Arc<str>,
    shapes: Vec<(Rect<f64>, MultiPolygon<f64>)>,
}

impl VectorLabel {
    /// Polygonal geometries are kept, anything else is dropped.
    pub fn new(crs: &str, geometries: impl IntoIterator<Item = Geometry<f64>>) -> Self {
        let shapes = geometries
            .into_iter()
            .filter_map(|geometry| match geometry {
                Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon])),
                Geometry::MultiPolygon(multi_polygon) => Some(multi_polygon),
                other => {
                    debug!("skipping non polygonal label {other:?}");
                    None
                }
            })
            .filter_map(|shape| shape.bounding_rect().map(|rect| (rect, shape)))
            .collect();
        Self {
            path: None,
            crs: Arc::from(crs),
            shapes,
        }
    }

    /// Read every feature of the first layer of the vector file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        use gdal::vector::LayerAccess;

        let path = path.as_ref();
        let dataset = gdal::Dataset::open(path)?;
        if dataset.layer_count() == 0 {
            return Err(GeotilesError::VectorLayer {
                path: path.display().to_string(),
                reason: "no layers".into(),
            });
        }
        let mut layer = dataset.layer(0)?;
        let crs = match layer.spatial_ref() {
            Some(spatial_ref) => spatial_ref.to_wkt()?,
            None => String::new(),
        };
        let geometries = layer
            .features()
            .filter_map(|feature| feature.geometry().map(|geometry| geometry.to_geo()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("read {} features from {}", geometries.len(), path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::new(&crs, geometries)
        })
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Reproject every shape to `crs`.
    ///
    /// A layer without crs is assumed to already be in `crs`.
    pub fn to_crs(self, crs: &str) -> Result<Self> {
        if self.crs.as_ref() == crs {
            return Ok(self);
        }
        if self.crs.trim().is_empty() {
            warn!("vector label has no crs, assuming {crs}");
            return Ok(Self {
                crs: Arc::from(crs),
                ..self
            });
        }
        let proj = Proj::new_known_crs(&self.crs, crs, None)?;
        let shapes = self
            .shapes
            .iter()
            .filter_map(|(_, shape)| match project(&proj, shape) {
                Ok(shape) => shape.bounding_rect().map(|rect| Ok((rect, shape))),
                Err(err) => Some(Err(err)),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            path: self.path,
            crs: Arc::from(crs),
            shapes,
        })
    }
}

impl LabelSource for VectorLabel {
    fn read_window(
        &self,
        georeference: &Georeference,
        window: &PixelWindow,
    ) -> Result<Array2<u8>> {
        let mut labels = Array2::from_elem((window.height(), window.width()), BACKGROUND_VALUE);
        let tile_bounds = georeference.window_bounds(window, "vector label tile")?;
        let transform = georeference.transform();
        let inverse = transform.inverse();
        for (rect, shape) in &self.shapes {
            let Ok(overlap) = tile_bounds.geometry().intersection(rect) else {
                continue;
            };
            let (cols, rows) = match inverse {
                Some(inverse) => pixel_ranges(&inverse, &overlap, window),
                None => (
                    window.left()..window.right(),
                    window.top()..window.bottom(),
                ),
            };
            for row in rows {
                for col in cols.clone() {
                    let centre = transform.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5);
                    if shape.contains(&Point::from(centre)) {
                        labels[[row - window.top(), col - window.left()]] = BURN_VALUE;
                    }
                }
            }
        }
        Ok(labels)
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Columns and rows of `window` whose pixels may overlap `rect`.
fn pixel_ranges(
    inverse: &geo::AffineTransform,
    rect: &Rect<f64>,
    window: &PixelWindow,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let corners: Vec<Coord<f64>> = rect
        .to_polygon()
        .exterior()
        .coords()
        .map(|coord| inverse.apply(*coord))
        .collect();
    let min_col = corners.iter().map(|c| c.x).fold(f64::INFINITY, f64::min);
    let max_col = corners.iter().map(|c| c.x).fold(f64::NEG_INFINITY, f64::max);
    let min_row = corners.iter().map(|c| c.y).fold(f64::INFINITY, f64::min);
    let max_row = corners.iter().map(|c| c.y).fold(f64::NEG_INFINITY, f64::max);
    let clamp = |value: f64, low: usize, high: usize| (value.max(0.) as usize).clamp(low, high);
    (
        clamp(min_col.floor(), window.left(), window.right())
            ..clamp(max_col.ceil(), window.left(), window.right()),
        clamp(min_row.floor(), window.top(), window.bottom())
            ..clamp(max_row.ceil(), window.top(), window.bottom()),
    )
}
