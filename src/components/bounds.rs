use geo::{Polygon, Rect};
use serde::{Deserialize, Serialize};
use shrinkwraprs::Shrinkwrap;

use crate::CrsGeometry;

/// Pixel window into a raster.
///
/// Defined by:
///     - `left`, `top`: Coords of top left pixel of the window,
///         with origin at top left pixel of raster.
///     - `width`, `height`: columns and rows covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

impl PixelWindow {
    pub fn new(left: usize, top: usize, width: usize, height: usize) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Window covering a whole raster of `(width, height)`.
    pub fn full(size: (usize, usize)) -> Self {
        Self::new(0, 0, size.0, size.1)
    }

    pub fn left(&self) -> usize {
        self.left
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn right(&self) -> usize {
        self.left + self.width
    }

    pub fn bottom(&self) -> usize {
        self.top + self.height
    }

    /// (left, top)
    pub fn offset(&self) -> (usize, usize) {
        (self.left, self.top)
    }

    /// (width, height)
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Pixel area of the window.
    pub fn size(&self) -> usize {
        self.width * self.height
    }

    /// (left, top, width, height)
    pub fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (self.left, self.top, self.width, self.height)
    }

    /// Non empty and inside a raster of `(width, height)`.
    ///
    /// A window whose far edge overflows `usize` does not fit.
    pub fn fits_within(&self, size: (usize, usize)) -> bool {
        let (Some(right), Some(bottom)) = (
            self.left.checked_add(self.width),
            self.top.checked_add(self.height),
        ) else {
            return false;
        };
        self.width > 0 && self.height > 0 && right <= size.0 && bottom <= size.1
    }

    /// Same window expressed in the pixel space whose origin
    /// is at `offset` pixels before this one.
    pub fn translate(&self, offset: (usize, usize)) -> Self {
        Self::new(
            self.left + offset.0,
            self.top + offset.1,
            self.width,
            self.height,
        )
    }
}

impl From<(usize, usize, usize, usize)> for PixelWindow {
    fn from(value: (usize, usize, usize, usize)) -> Self {
        let (left, top, width, height) = value;
        Self::new(left, top, width, height)
    }
}

/// Bounds in 'geospace' with crs.
#[derive(Shrinkwrap, Clone, Debug, PartialEq)]
pub struct GeoBounds(CrsGeometry<Rect<f64>>);

impl From<CrsGeometry<Rect<f64>>> for GeoBounds {
    fn from(value: CrsGeometry<Rect<f64>>) -> Self {
        Self(value)
    }
}

impl GeoBounds {
    pub fn xmin(&self) -> f64 {
        self.geometry().min().x
    }

    pub fn ymin(&self) -> f64 {
        self.geometry().min().y
    }

    pub fn xmax(&self) -> f64 {
        self.geometry().max().x
    }

    pub fn ymax(&self) -> f64 {
        self.geometry().max().y
    }

    /// (xmin, ymin, xmax, ymax)
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.xmin(), self.ymin(), self.xmax(), self.ymax())
    }

    pub fn to_polygon(&self) -> CrsGeometry<Polygon<f64>> {
        CrsGeometry::new(self.0.crs().into(), self.geometry().to_polygon())
    }
}
