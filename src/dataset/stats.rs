use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use itertools::Itertools;
use log::{debug, info, warn};
use num::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::{
    components::{DataType, TileIndexer},
    errors::{GeotilesError, Result},
};

pub const STATS_FILE_NAME: &str = ".geotiles_stats.json";

/// Distinguishes temporary files of concurrent saves within a process.
static SAVE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Per channel normalization statistics of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// Per channel mean and population variance of one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
}

/// Running count, mean and sum of squared deviations of one channel.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Accumulator {
    /// Fold in a block of `count` values with its own `mean` and `m2`.
    fn merge(&mut self, count: usize, mean: f64, m2: f64) {
        if count == 0 {
            return;
        }
        if self.count == 0 {
            *self = Self { count, mean, m2 };
            return;
        }
        let total = self.count + count;
        let delta = mean - self.mean;
        let weight = count as f64 / total as f64;
        self.mean += delta * weight;
        self.m2 += m2 + delta * delta * self.count as f64 * weight;
        self.count = total;
    }
}

impl Moments {
    /// Moments over every pixel of the indexed raster, reading one
    /// tile at a time.
    pub fn of<T: DataType>(indexer: &TileIndexer<T>) -> Result<Self> {
        let raster = indexer.raster();
        let mut accumulators = vec![Accumulator::default(); raster.band_count()];
        for index in 0..indexer.len() {
            let tile = raster.crop(indexer.index_to_window(index)?)?.read()?;
            for (accumulator, band) in accumulators.iter_mut().zip(tile.outer_iter()) {
                let values = band
                    .iter()
                    .map(|value| value.to_f64().ok_or(GeotilesError::Uncastable))
                    .collect::<Result<Vec<_>>>()?;
                let count = values.len();
                let mean = values.iter().sum::<f64>() / count as f64;
                let m2 = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>();
                accumulator.merge(count, mean, m2);
            }
        }
        let (mean, var): (Vec<_>, Vec<_>) = accumulators
            .iter()
            .map(|accumulator| (accumulator.mean, accumulator.m2 / accumulator.count as f64))
            .unzip();
        debug!("moments of {}: mean {mean:?}", raster.description());
        Ok(Self { mean, var })
    }
}

impl Stats {
    /// Sidecar cache location for a data directory.
    pub fn sidecar_path(root: &Path) -> PathBuf {
        root.join(STATS_FILE_NAME)
    }

    /// Mean of scene means and square root of the mean scene variance.
    ///
    /// Scenes weigh the same whatever their size and the spread of the
    /// scene means is ignored, so this approximates the pooled values.
    pub fn aggregate(moments: &[Moments]) -> Result<Self> {
        if moments.is_empty() {
            return Err(GeotilesError::configuration(
                "statistics of an empty collection",
            ));
        }
        if !moments
            .iter()
            .flat_map(|moments| [moments.mean.len(), moments.var.len()])
            .all_equal()
        {
            return Err(GeotilesError::configuration(
                "scenes disagree on the number of channels",
            ));
        }
        let n = moments.len() as f64;
        let channels = moments[0].mean.len();
        let mut mean = vec![0.; channels];
        let mut var = vec![0.; channels];
        for scene in moments {
            for channel in 0..channels {
                mean[channel] += scene.mean[channel] / n;
                var[channel] += scene.var[channel] / n;
            }
        }
        Ok(Self {
            mean,
            std: var.into_iter().map(f64::sqrt).collect(),
        })
    }

    /// `None` when there is no file at `path`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write through a temporary file renamed over `path`.
    ///
    /// The temporary file is removed when either step fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        let mut temporary = path.as_os_str().to_owned();
        temporary.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            SAVE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let temporary = PathBuf::from(temporary);
        let written = fs::write(&temporary, content).and_then(|_| fs::rename(&temporary, path));
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&temporary) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("could not remove {}: {cleanup}", temporary.display());
                }
            }
            return Err(err.into());
        }
        info!("saved statistics to {}", path.display());
        Ok(())
    }
}
