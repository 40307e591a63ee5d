//! Common structs, algorithms etc. used by Ember's kernels and renderer.
//!
//! Everything that crosses the host / device boundary lives here as a
//! `#[repr(C)]` Pod struct, so that the very same layout can be uploaded into
//! a device buffer and read back by the kernels.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::manual_range_contains)]

mod alias_table;
mod camera;
mod gbuffer;
mod light;
mod lights;
mod noise;
mod passes;
mod ray;
mod reservoir;
mod surface;
mod utils;

pub use self::alias_table::*;
pub use self::camera::*;
pub use self::gbuffer::*;
pub use self::light::*;
pub use self::lights::*;
pub use self::noise::*;
pub use self::passes::*;
pub use self::ray::*;
pub use self::reservoir::*;
pub use self::surface::*;
pub use self::utils::*;

pub mod prelude {
    pub use core::f32::consts::PI;

    pub use glam::*;

    pub use crate::*;
}

/// Size of a single side of the workgroup used by every per-pixel pass.
pub const WORKGROUP_SIZE: u32 = 8;

/// Distance by which shadow rays are shortened and lifted off the surface, so
/// that they don't self-intersect the surface or the light they target.
pub const SHADOW_EPSILON: f32 = 0.001;
