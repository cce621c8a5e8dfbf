pub mod basic_functions;
pub mod gis;
pub mod prompt;
