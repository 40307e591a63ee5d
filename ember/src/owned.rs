use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Something that hands out handles of type `H` and wants them back once
/// they're no longer used.
pub trait Release<H> {
    fn release(&self, handle: &H);
}

/// Resource handle that gets released back into its allocator when dropped.
pub struct Owned<H, A>
where
    A: Release<H>,
{
    handle: H,
    allocator: Arc<A>,
}

impl<H, A> Owned<H, A>
where
    A: Release<H>,
{
    pub fn new(allocator: Arc<A>, handle: H) -> Self {
        Self { handle, allocator }
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

impl<H, A> Deref for Owned<H, A>
where
    A: Release<H>,
{
    type Target = H;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<H, A> fmt::Debug for Owned<H, A>
where
    H: fmt::Debug,
    A: Release<H>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}

impl<H, A> Drop for Owned<H, A>
where
    A: Release<H>,
{
    fn drop(&mut self) {
        self.allocator.release(&self.handle);
    }
}
