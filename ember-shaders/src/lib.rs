//! Per-pixel kernels of the resampling pipeline.
//!
//! Each kernel processes a single pixel and writes exactly one reservoir;
//! whichever device runs them is responsible for invoking them once per pixel
//! and for keeping the buffers they read and write apart.

pub mod di_sampling;
pub mod di_spatial_resampling;
pub mod di_temporal_resampling;
