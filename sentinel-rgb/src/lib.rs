pub mod collect;
pub mod commons;
pub mod config;
pub mod geo_core;
pub mod imagery;
