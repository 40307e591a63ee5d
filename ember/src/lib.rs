//! Ember: spatiotemporal reservoir resampling (ReSTIR) of direct lighting.
//!
//! Each frame, every pixel draws a handful of light candidates out of an
//! alias table, keeps one of them in a reservoir, and then merges that
//! reservoir with the previous frame's reservoir (temporal reuse) and with
//! reservoirs of its neighbours (spatial reuse). The result is a single,
//! well-chosen light sample per pixel, ready to be shaded.
//!
//! The passes run on a [`Device`]: either [`WgpuDevice`], or
//! [`SoftwareDevice`], which runs the very same kernels on the CPU.

mod alias_table;
mod camera;
mod device;
mod error;
mod light;
mod lights;
mod occluder;
mod owned;
mod params;
mod pass;
mod renderer;
mod utils;

pub use ember_gpu as gpu;

pub use self::alias_table::*;
pub use self::camera::*;
pub use self::device::*;
pub use self::error::*;
pub use self::light::*;
pub use self::lights::*;
pub use self::occluder::*;
pub use self::owned::*;
pub use self::params::*;
pub use self::pass::*;
pub use self::renderer::*;
