/// Default directory the composite is written to
pub const OUTPUT_PATH: &str = "./output";

/// Sentinel-2 surface reflectance, harmonized to the pre-2022 radiometric offset
pub const S2_SR_HARMONIZED: &str = "COPERNICUS/S2_SR_HARMONIZED";

/// Project that owns the public Earth Engine data catalog
pub const EE_PUBLIC_PROJECT: &str = "earthengine-public";

pub const EE_API_BASE: &str = "https://earthengine.googleapis.com/v1";

/// Pre-rendered true colour bands (8-bit)
pub const TCI_BANDS: [&str; 3] = ["TCI_R", "TCI_G", "TCI_B"];

/// Native resolution of the TCI bands in metres
pub const DEFAULT_SCALE: f64 = 10.0;

pub const PRODUCT_ID: &str = "PRODUCT_ID";
pub const CLOUDY_PIXEL_PERCENTAGE: &str = "CLOUDY_PIXEL_PERCENTAGE";
