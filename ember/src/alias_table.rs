use std::collections::VecDeque;

use crate::{gpu, Error, Result};

/// Alias table over the light population, built using Vose's method.
///
/// Lets the sampling pass pick a light proportionally to its weight in
/// constant time, no matter how many lights there are.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AliasTable {
    buckets: Vec<gpu::AliasBucket>,
}

impl AliasTable {
    /// Builds the table; weights don't have to be normalized.
    ///
    /// Empty input yields an empty table, while weights that are negative,
    /// non-finite or all zero are rejected with [`Error::InvalidWeights`].
    pub fn build(weights: &[f32]) -> Result<Self> {
        if weights.is_empty() {
            return Ok(Self::default());
        }

        if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return Err(Error::InvalidWeights);
        }

        let total: f64 = weights.iter().map(|&weight| weight as f64).sum();

        if !(total > 0.0) || !total.is_finite() {
            return Err(Error::InvalidWeights);
        }

        let len = weights.len();

        let mut scaled: Vec<f64> = weights
            .iter()
            .map(|&weight| weight as f64 * len as f64 / total)
            .collect();

        let mut buckets: Vec<_> = weights
            .iter()
            .map(|&weight| gpu::AliasBucket {
                probability: 0.0,
                alias: 0,
                original_probability: (weight as f64 / total) as f32,
                alias_original_probability: 0.0,
            })
            .collect();

        let mut heavy = VecDeque::new();
        let mut light = VecDeque::new();

        for (idx, &scaled) in scaled.iter().enumerate() {
            if scaled < 1.0 {
                light.push_back(idx);
            } else {
                heavy.push_back(idx);
            }
        }

        while let (Some(&l), Some(&h)) = (light.front(), heavy.front()) {
            light.pop_front();
            heavy.pop_front();

            buckets[l].probability = scaled[l].clamp(0.0, 1.0) as f32;
            buckets[l].alias = h as u32;

            scaled[h] -= 1.0 - scaled[l];

            if scaled[h] < 1.0 {
                light.push_back(h);
            } else {
                heavy.push_back(h);
            }
        }

        // Whatever's left is (up to rounding errors) exactly full
        for idx in heavy.into_iter().chain(light) {
            buckets[idx].probability = 1.0;
            buckets[idx].alias = idx as u32;
        }

        for idx in 0..len {
            let alias = buckets[idx].alias as usize;

            buckets[idx].alias_original_probability =
                buckets[alias].original_probability;
        }

        Ok(Self { buckets })
    }

    pub fn buckets(&self) -> &[gpu::AliasBucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn view(&self) -> gpu::AliasTableView<'_> {
        gpu::AliasTableView::new(&self.buckets)
    }
}
