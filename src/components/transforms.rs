use std::sync::Arc;

use geo::{AffineTransform, Coord, Rect};
use shrinkwraprs::Shrinkwrap;

use crate::{
    components::{GeoBounds, PixelWindow},
    errors::{GeotilesError, Result},
    CrsGeometry,
};

/// Pixel to 'geospace' affine transform of a raster.
#[derive(Shrinkwrap, Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(AffineTransform);

impl GeoTransform {
    /// North up transform without rotation.
    pub fn new(origin_x: f64, pixel_size_x: f64, origin_y: f64, pixel_size_y: f64) -> Self {
        Self(AffineTransform::new(
            pixel_size_x,
            0.,
            origin_x,
            0.,
            pixel_size_y,
            origin_y,
        ))
    }

    pub fn from_gdal(gdal_transform: [f64; 6]) -> Self {
        Self(AffineTransform::new(
            gdal_transform[1],
            gdal_transform[2],
            gdal_transform[0],
            gdal_transform[4],
            gdal_transform[5],
            gdal_transform[3],
        ))
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.xoff(),
            self.a(),
            self.b(),
            self.yoff(),
            self.d(),
            self.e(),
        ]
    }

    pub fn origin_x(&self) -> f64 {
        self.xoff()
    }

    pub fn origin_y(&self) -> f64 {
        self.yoff()
    }

    pub fn pixel_size_x(&self) -> f64 {
        self.a()
    }

    pub fn pixel_size_y(&self) -> f64 {
        self.e()
    }

    /// 'Geospace' coords of pixel corner `(col, row)`.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> Coord<f64> {
        self.apply(Coord { x: col, y: row })
    }

    /// Transform whose pixel `(0, 0)` is pixel `offset` of this one.
    pub fn rebased(&self, offset: (usize, usize)) -> Self {
        let origin = self.pixel_to_geo(offset.0 as f64, offset.1 as f64);
        Self(AffineTransform::new(
            self.a(),
            self.b(),
            origin.x,
            self.d(),
            self.e(),
            origin.y,
        ))
    }
}

/// Transform plus coordinate reference system of a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Georeference {
    transform: GeoTransform,
    crs: Arc<str>,
}

impl Georeference {
    pub fn new(transform: GeoTransform, crs: &str) -> Self {
        Self {
            transform,
            crs: Arc::from(crs),
        }
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> &str {
        self.crs.as_ref()
    }

    pub fn has_crs(&self) -> bool {
        !self.crs.trim().is_empty()
    }

    /// Georeference of a window, its pixel `(0, 0)` at the window offset.
    pub fn rebased(&self, window: &PixelWindow) -> Self {
        Self {
            transform: self.transform.rebased(window.offset()),
            crs: Arc::clone(&self.crs),
        }
    }

    /// Bounds of `window` in 'geospace'.
    ///
    /// `description` names the raster in the error when there is no crs.
    pub fn window_bounds(&self, window: &PixelWindow, description: &str) -> Result<GeoBounds> {
        if !self.has_crs() {
            return Err(GeotilesError::MissingCrs(description.to_string()));
        }
        let top_left = self
            .transform
            .pixel_to_geo(window.left() as f64, window.top() as f64);
        let bottom_right = self
            .transform
            .pixel_to_geo(window.right() as f64, window.bottom() as f64);
        Ok(GeoBounds::from(CrsGeometry::new(
            Arc::clone(&self.crs),
            Rect::new(top_left, bottom_right),
        )))
    }
}
