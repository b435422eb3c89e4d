use std::{fmt::Debug, sync::Arc};

use ndarray::{s, Array2, Array3};

use crate::{components::{DataType, PixelWindow}, errors::Result};

/// Windowed access to the pixels of a raster source.
///
/// Implementations must not keep an open I/O resource shared between
/// calls, so one reader can serve many threads.
pub trait WindowReader<T: DataType>: Send + Sync + Debug {
    /// Read `window` of every band as `(C, H, W)`.
    fn read_window(&self, window: &PixelWindow) -> Result<Array3<T>>;

    /// Read `window` of the zero based `band` only, as `(H, W)`.
    fn read_band_window(&self, band: usize, window: &PixelWindow) -> Result<Array2<T>>;

    fn band_count(&self) -> usize;
}

/// Reader over an array already in memory.
#[derive(Debug)]
pub struct ArrayReader<T: DataType>(Arc<Array3<T>>);

impl<T: DataType> ArrayReader<T> {
    pub fn new(array: Array3<T>) -> Self {
        Self(Arc::new(array))
    }
}

impl<T: DataType> WindowReader<T> for ArrayReader<T> {
    fn read_window(&self, window: &PixelWindow) -> Result<Array3<T>> {
        Ok(self
            .0
            .slice(s![
                ..,
                window.top()..window.bottom(),
                window.left()..window.right()
            ])
            .to_owned())
    }

    fn read_band_window(&self, band: usize, window: &PixelWindow) -> Result<Array2<T>> {
        Ok(self
            .0
            .slice(s![
                band,
                window.top()..window.bottom(),
                window.left()..window.right()
            ])
            .to_owned())
    }

    fn band_count(&self) -> usize {
        self.0.dim().0
    }
}
