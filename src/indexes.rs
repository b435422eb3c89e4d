use std::{collections::HashSet, sync::Arc};

use itertools::Itertools;

/// Selection of positions in a collection, either the listed
/// positions or every position except the listed ones.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Indexes {
    selection: Arc<[usize]>,
    drop: bool,
}

impl<const N: usize> From<([usize; N], bool)> for Indexes {
    fn from(value: ([usize; N], bool)) -> Self {
        let selection = Arc::from(value.0);
        let drop = value.1;
        Indexes { selection, drop }
    }
}

impl From<(std::ops::Range<usize>, bool)> for Indexes {
    fn from(value: (std::ops::Range<usize>, bool)) -> Self {
        let selection = value.0.collect();
        let drop = value.1;
        Indexes { selection, drop }
    }
}

impl<const N: usize> From<[usize; N]> for Indexes {
    fn from(value: [usize; N]) -> Self {
        let selection = Arc::from(value);
        Indexes {
            selection,
            drop: false,
        }
    }
}

impl From<Vec<usize>> for Indexes {
    fn from(value: Vec<usize>) -> Self {
        Indexes {
            selection: Arc::from(value),
            drop: false,
        }
    }
}

impl From<std::ops::Range<usize>> for Indexes {
    fn from(value: std::ops::Range<usize>) -> Self {
        let selection = value.collect();
        Indexes {
            selection,
            drop: false,
        }
    }
}

impl Indexes {
    /// Sorted positions selected out of a collection of `collection_len`.
    ///
    /// Positions past the end of the collection are ignored.
    pub fn indexes_from(&self, collection_len: usize) -> Arc<[usize]> {
        if self.drop {
            let drop_idxs: HashSet<usize> = self.selection.iter().copied().collect();
            (0..collection_len)
                .filter(|idx| !drop_idxs.contains(idx))
                .collect()
        } else {
            self.selection
                .iter()
                .copied()
                .filter(|idx| *idx < collection_len)
                .sorted()
                .dedup()
                .collect()
        }
    }

    pub fn all() -> Self {
        Self {
            selection: Arc::from([]),
            drop: true,
        }
    }
}
