//! Key-space regions: per-dimension ranges with inclusive minimums and
//! exclusive maximums.
//!
//! `None` bounds are unbounded, so the root partition's region is the whole
//! key space without needing per-type sentinel minimums.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::{Key, KeyValue};

/// A range over one key dimension: `min <= value < max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRange {
    /// Inclusive lower bound; `None` means unbounded below.
    pub min: Option<KeyValue>,
    /// Exclusive upper bound; `None` means unbounded above.
    pub max: Option<KeyValue>,
}

impl KeyRange {
    /// The unbounded range.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Creates a range with the given bounds.
    #[must_use]
    pub const fn new(min: Option<KeyValue>, max: Option<KeyValue>) -> Self {
        Self { min, max }
    }

    /// Returns true if the value falls inside this range.
    #[must_use]
    pub fn contains(&self, value: &KeyValue) -> bool {
        if let Some(min) = &self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = &self.max {
            if value >= max {
                return false;
            }
        }
        true
    }
}

/// A region of the key space: one [`KeyRange`] per row-key dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    ranges: Vec<KeyRange>,
}

impl Region {
    /// Creates a region from per-dimension ranges.
    #[must_use]
    pub fn new(ranges: Vec<KeyRange>) -> Self {
        Self { ranges }
    }

    /// The region covering the entire key space of `dimensions` dimensions.
    #[must_use]
    pub fn whole_key_space(dimensions: usize) -> Self {
        Self {
            ranges: vec![KeyRange::unbounded(); dimensions],
        }
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.ranges.len()
    }

    /// Returns the range for one dimension.
    #[must_use]
    pub fn range(&self, dimension: usize) -> Option<&KeyRange> {
        self.ranges.get(dimension)
    }

    /// Returns true if the key falls inside this region on every dimension.
    ///
    /// Keys with a different dimension count never match.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        if key.dimensions() != self.ranges.len() {
            return false;
        }
        self.ranges
            .iter()
            .zip(key.values())
            .all(|(range, value)| range.contains(value))
    }

    /// Splits this region at `point` along `dimension`.
    ///
    /// Returns `(left, right)` where `left` covers values strictly below the
    /// point and `right` covers the rest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the dimension is out of bounds or
    /// the point lies outside the region's range on that dimension.
    pub fn split_at(&self, dimension: usize, point: &KeyValue) -> Result<(Self, Self)> {
        let range = self.ranges.get(dimension).ok_or_else(|| {
            Error::InvalidInput(format!(
                "split dimension {dimension} out of bounds for {}-dimensional region",
                self.ranges.len()
            ))
        })?;
        if !range.contains(point) {
            return Err(Error::InvalidInput(format!(
                "split point {point} outside region range on dimension {dimension}"
            )));
        }
        // A split at the range minimum would produce an empty left region.
        if range.min.as_ref() == Some(point) {
            return Err(Error::InvalidInput(format!(
                "split point {point} equals region minimum on dimension {dimension}"
            )));
        }

        let mut left = self.ranges.clone();
        let mut right = self.ranges.clone();
        left[dimension] = KeyRange::new(range.min.clone(), Some(point.clone()));
        right[dimension] = KeyRange::new(Some(point.clone()), range.max.clone());
        Ok((Self::new(left), Self::new(right)))
    }
}
