use geo::Polygon;
use serde::{Deserialize, Serialize};

use crate::{
    components::{DataType, GeoBounds, PixelWindow, RasterHandle},
    errors::{GeotilesError, Result},
    CrsGeometry,
};

/// Nominal tile size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TileSizeRepr", into = "TileSizeRepr")]
pub struct TileSize {
    pub width: usize,
    pub height: usize,
}

impl TileSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    /// Nominal pixel area, also for tiles clipped at the raster edge.
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl From<usize> for TileSize {
    fn from(value: usize) -> Self {
        Self::square(value)
    }
}

impl From<(usize, usize)> for TileSize {
    fn from(value: (usize, usize)) -> Self {
        Self::new(value.0, value.1)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TileSizeRepr {
    Square(usize),
    Sized { width: usize, height: usize },
}

impl From<TileSizeRepr> for TileSize {
    fn from(value: TileSizeRepr) -> Self {
        match value {
            TileSizeRepr::Square(size) => Self::square(size),
            TileSizeRepr::Sized { width, height } => Self::new(width, height),
        }
    }
}

impl From<TileSize> for TileSizeRepr {
    fn from(value: TileSize) -> Self {
        if value.width == value.height {
            Self::Square(value.width)
        } else {
            Self::Sized {
                width: value.width,
                height: value.height,
            }
        }
    }
}

/// Grid position of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileInfo {
    pub index: usize,
    pub row: usize,
    pub col: usize,
    pub offset_x: usize,
    pub offset_y: usize,
}

/// Row major grid of tiles over a raster.
///
/// Tiles on the last row and column are clipped to the raster, so
/// no window ever reaches outside of it.
#[derive(Debug, Clone)]
pub struct TileIndexer<T: DataType> {
    raster: RasterHandle<T>,
    tile_size: TileSize,
    rows: usize,
    cols: usize,
}

impl<T: DataType> TileIndexer<T> {
    pub fn new(raster: RasterHandle<T>, tile_size: impl Into<TileSize>) -> Result<Self> {
        let tile_size = tile_size.into();
        if tile_size.width == 0 || tile_size.height == 0 {
            return Err(GeotilesError::configuration(format!(
                "tile size must be positive, got {tile_size:?}"
            )));
        }
        let (width, height) = raster.size();
        Ok(Self {
            rows: height.div_ceil(tile_size.height),
            cols: width.div_ceil(tile_size.width),
            raster,
            tile_size,
        })
    }

    pub fn raster(&self) -> &RasterHandle<T> {
        &self.raster
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, index: usize) -> Result<usize> {
        if index < self.len() {
            Ok(index)
        } else {
            Err(GeotilesError::index(index, self.len()))
        }
    }

    pub fn index_to_row_col(&self, index: usize) -> Result<(usize, usize)> {
        let index = self.check(index)?;
        Ok((index / self.cols, index % self.cols))
    }

    pub fn row_col_to_index(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(GeotilesError::index(
                row.saturating_mul(self.cols).saturating_add(col),
                self.len(),
            ));
        }
        Ok(row * self.cols + col)
    }

    /// (top, left)
    pub fn index_to_offset(&self, index: usize) -> Result<(usize, usize)> {
        let (row, col) = self.index_to_row_col(index)?;
        Ok((row * self.tile_size.height, col * self.tile_size.width))
    }

    /// Pixel window of the tile, clipped to the raster.
    pub fn index_to_window(&self, index: usize) -> Result<PixelWindow> {
        let (top, left) = self.index_to_offset(index)?;
        let (width, height) = self.raster.size();
        Ok(PixelWindow::new(
            left,
            top,
            self.tile_size.width.min(width - left),
            self.tile_size.height.min(height - top),
        ))
    }

    pub fn index_to_bounds(&self, index: usize) -> Result<GeoBounds> {
        let window = self.index_to_window(index)?;
        self.raster
            .georeference()
            .window_bounds(&window, self.raster.description())
    }

    pub fn index_to_bbox(&self, index: usize) -> Result<CrsGeometry<Polygon<f64>>> {
        Ok(self.index_to_bounds(index)?.to_polygon())
    }

    pub fn index_to_tile(&self, index: usize) -> Result<RasterHandle<T>> {
        self.raster.crop(self.index_to_window(index)?)
    }

    pub fn tile_info(&self, index: usize) -> Result<TileInfo> {
        let (row, col) = self.index_to_row_col(index)?;
        let (offset_y, offset_x) = self.index_to_offset(index)?;
        Ok(TileInfo {
            index,
            row,
            col,
            offset_x,
            offset_y,
        })
    }
}
