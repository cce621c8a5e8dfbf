pub mod raster;
pub mod sentinel_rgb;
pub mod viewer;
