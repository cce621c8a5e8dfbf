use anyhow::Result;
use sentinel_rgb::collect::ee::{Credentials, CustomFilters, EarthEngine, FilterOp};
use sentinel_rgb::collect::global_variables::{CLOUDY_PIXEL_PERCENTAGE, EE_API_BASE};
use sentinel_rgb::commons::basic_functions::DateRange;
use sentinel_rgb::commons::gis::{open_if_written, LaunchApp};
use sentinel_rgb::commons::prompt::{confirm, PromptMode};
use sentinel_rgb::geo_core::BoundingBox;
use sentinel_rgb::imagery::sentinel_rgb::{DownloadParams, PlotMethod, SentinelRgb};
use std::path::Path;

/// Example: Sentinel-2 true colour composite over western Bahia, Brazil
/// Needs EE_PROJECT and either EE_ACCESS_TOKEN or gcloud application-default credentials.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Example: Sentinel-2 RGB from Earth Engine ===\n");

    let cloud_project = std::env::var("EE_PROJECT").unwrap_or_default();
    let output_dir = Path::new("./output");

    let ee = EarthEngine::initialize(&cloud_project, &Credentials::resolve(None), EE_API_BASE)?;

    // Area of interest
    let aoi = BoundingBox::from_corners(
        (-46.9571818723517254, -14.8772245884183416),
        (-46.7816836599576504, -14.6975095089156795),
    )?;

    let date_rng = DateRange::parse("2025-01-01", "2025-01-30")?;

    let mut custom_filters = CustomFilters::new();
    custom_filters.add_filter(CLOUDY_PIXEL_PERCENTAGE, FilterOp::Lte, 30i64);

    let mut s2 = SentinelRgb::new(ee);
    s2.process_collection(&aoi, date_rng, Some(&custom_filters));

    let img = s2.get_first_image(Some(&aoi))?;
    let img_id = img.product_id();
    println!("First image: {}", img_id);

    let params = DownloadParams {
        region: Some(aoi),
        ..Default::default()
    };
    let res = s2.request_image(&img, &params)?;

    if confirm("Display the image?", PromptMode::Dialog)? {
        s2.show_image(&res, &img_id, PlotMethod::Multiband);
    }

    let file_path = SentinelRgb::<EarthEngine>::output_path_for(output_dir, &img_id);

    if confirm("Write the image to disk?", PromptMode::Dialog)? {
        s2.write_image(&res, &file_path)?;
        println!("  - GeoTIFF: {:?}", file_path);
    }

    if open_if_written(&LaunchApp::qgis(), &file_path, &img_id)? {
        println!("  - Opened in QGIS");
    }

    Ok(())
}
