use crate::{Light, LightId};

#[derive(Clone, Copy)]
pub struct LightsView<'a> {
    items: &'a [Light],
}

impl<'a> LightsView<'a> {
    pub fn new(items: &'a [Light]) -> Self {
        Self { items }
    }

    /// Returns given light or `None` if the id doesn't point at any light
    /// (e.g. it comes from a stale reservoir).
    pub fn get(&self, id: LightId) -> Option<Light> {
        self.items.get(id.get() as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
