use bytemuck::{Pod, Zeroable};

use crate::{LightId, WhiteNoise};

/// Single entry of an alias table, built using Vose's method.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AliasBucket {
    /// Probability of accepting this bucket's own index.
    pub probability: f32,

    /// Index chosen when this bucket's own index gets rejected.
    pub alias: u32,

    /// Normalized weight of the light at this bucket's index.
    pub original_probability: f32,

    /// Normalized weight of the light at `alias`; stored here so that the
    /// sampling probability is available without a second lookup.
    pub alias_original_probability: f32,
}

#[derive(Clone, Copy)]
pub struct AliasTableView<'a> {
    buckets: &'a [AliasBucket],
}

impl<'a> AliasTableView<'a> {
    pub fn new(buckets: &'a [AliasBucket]) -> Self {
        Self { buckets }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Picks a light proportionally to its weight, returning its id together
    /// with the probability of picking it.
    ///
    /// Consumes exactly two random numbers: one for the bucket and one for
    /// the accept-or-alias decision.
    pub fn sample(&self, wnoise: &mut WhiteNoise) -> Option<(LightId, f32)> {
        if self.buckets.is_empty() {
            return None;
        }

        let len = self.buckets.len();
        let idx = ((wnoise.sample() * len as f32) as usize).min(len - 1);
        let bucket = self.buckets[idx];

        debug_assert!((bucket.alias as usize) < len);

        if wnoise.sample() < bucket.probability {
            Some((LightId::new(idx as u32), bucket.original_probability))
        } else {
            Some((
                LightId::new(bucket.alias),
                bucket.alias_original_probability,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::UVec2;

    use super::*;

    #[test]
    fn empty() {
        let mut wnoise = WhiteNoise::new(0, UVec2::ZERO);

        assert_eq!(None, AliasTableView::new(&[]).sample(&mut wnoise));
    }

    #[test]
    fn redirects() {
        // Bucket 0 always redirects into bucket 1, which always accepts
        let buckets = [
            AliasBucket {
                probability: 0.0,
                alias: 1,
                original_probability: 0.0,
                alias_original_probability: 1.0,
            },
            AliasBucket {
                probability: 1.0,
                alias: 1,
                original_probability: 1.0,
                alias_original_probability: 1.0,
            },
        ];

        let target = AliasTableView::new(&buckets);
        let mut wnoise = WhiteNoise::new(123, UVec2::ZERO);

        for _ in 0..1000 {
            assert_eq!(
                Some((LightId::new(1), 1.0)),
                target.sample(&mut wnoise)
            );
        }
    }
}
