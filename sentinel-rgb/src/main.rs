use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use sentinel_rgb::collect::ee::{Credentials, CustomFilters, EarthEngine, FileFormat};
use sentinel_rgb::commons::basic_functions::DateRange;
use sentinel_rgb::commons::gis::{open_if_written, LaunchApp};
use sentinel_rgb::commons::prompt::{confirm, PromptMode};
use sentinel_rgb::config::Settings;
use sentinel_rgb::geo_core::{BoundingBox, GeoCore};
use sentinel_rgb::imagery::sentinel_rgb::{DownloadParams, PlotMethod, SentinelRgb};

const DEFAULT_FILTER: &str = "CLOUDY_PIXEL_PERCENTAGE<=30";

#[derive(Parser, Debug)]
#[command(
    name = "sentinel-rgb",
    version,
    about = "Sentinel-2 true colour composites from Google Earth Engine"
)]
struct Cli {
    #[arg(long, global = true, help = "TOML settings file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Google Cloud project used for Earth Engine requests")]
    project: Option<String>,
    #[arg(long, global = true, help = "OAuth2 access token (default: EE_ACCESS_TOKEN or gcloud)")]
    token: Option<String>,
    #[arg(long, global = true, help = "Image collection id")]
    collection: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the first matching image, then display, write and open it
    Fetch(FetchArgs),
    /// List the images matching the filters
    List {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Area of interest as two opposite corners: x1,y1,x2,y2"
    )]
    bbox: String,
    #[arg(long, default_value_t = 4326, help = "EPSG code of the --bbox coordinates")]
    bbox_epsg: i32,
    #[arg(long, help = "First acquisition date (YYYY-MM-DD, inclusive)")]
    start: String,
    #[arg(long, help = "Last acquisition date (YYYY-MM-DD, exclusive)")]
    end: String,
    #[arg(
        long = "filter",
        default_values_t = [DEFAULT_FILTER.to_string()],
        help = "Property filter, e.g. CLOUDY_PIXEL_PERCENTAGE<=30 (repeatable)"
    )]
    filters: Vec<String>,
}

impl QueryArgs {
    /// AOI in EPSG:4326
    fn aoi(&self) -> Result<BoundingBox> {
        let values: Vec<f64> = self
            .bbox
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .with_context(|| format!("Invalid --bbox '{}'", self.bbox))?;

        if values.len() != 4 {
            anyhow::bail!("--bbox needs 4 comma separated numbers, got {}", values.len());
        }

        let mut geo_core = GeoCore::new(self.bbox_epsg);
        geo_core.set_bbox(Some(BoundingBox::from_corners(
            (values[0], values[1]),
            (values[2], values[3]),
        )?));
        geo_core
            .bbox_wgs84()?
            .context("Area of interest is required")
    }

    fn date_range(&self) -> Result<DateRange> {
        DateRange::parse(&self.start, &self.end)
    }

    fn custom_filters(&self) -> Result<CustomFilters> {
        let mut filters = CustomFilters::new();
        for expression in &self.filters {
            filters.add_expression(expression)?;
        }
        Ok(filters)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Choice {
    Yes,
    No,
    Ask,
}

impl Choice {
    fn mode(self, terminal: bool) -> PromptMode {
        match self {
            Choice::Yes => PromptMode::AssumeYes,
            Choice::No => PromptMode::AssumeNo,
            Choice::Ask if terminal => PromptMode::Terminal,
            Choice::Ask => PromptMode::Dialog,
        }
    }
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[command(flatten)]
    query: QueryArgs,
    #[arg(long, help = "Metres per pixel (default 10)")]
    scale: Option<f64>,
    #[arg(long, default_value = "GEO_TIFF")]
    format: String,
    #[arg(long, help = "Directory the GeoTIFF is written to")]
    output_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Choice::Ask, help = "Display the image")]
    plot: Choice,
    #[arg(long, value_enum, default_value_t = Choice::Ask, help = "Write the image to disk")]
    write: Choice,
    #[arg(long, help = "Ask on the terminal instead of dialog boxes")]
    terminal: bool,
    #[arg(long, help = "Also write a PNG quick-look next to the GeoTIFF")]
    preview_png: bool,
    #[arg(long, help = "Desktop GIS to open the written file with, e.g. qgis")]
    open_in: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(project) = cli.project {
        settings.project = Some(project);
    }
    if let Some(token) = cli.token {
        settings.access_token = Some(token);
    }
    if let Some(collection) = cli.collection {
        settings.collection = collection;
    }

    match cli.command {
        Commands::Fetch(args) => {
            if let Some(scale) = args.scale {
                settings.scale = scale;
            }
            if let Some(dir) = &args.output_dir {
                settings.output_dir = dir.clone();
            }
            if let Some(program) = &args.open_in {
                settings.gis_program = Some(program.clone());
            }
            run_fetch(&settings, &args)
        }
        Commands::List { query, limit } => run_list(&settings, &query, limit),
    }
}

fn initialize(settings: &Settings) -> Result<EarthEngine> {
    let credentials = Credentials::resolve(settings.access_token.clone());
    EarthEngine::initialize(settings.require_project()?, &credentials, &settings.api_base)
}

fn run_fetch(settings: &Settings, args: &FetchArgs) -> Result<()> {
    let aoi = args.query.aoi()?;
    let format: FileFormat = args.format.parse()?;

    let mut s2 = SentinelRgb::with_collection(initialize(settings)?, &settings.collection);
    s2.process_collection(
        &aoi,
        args.query.date_range()?,
        Some(&args.query.custom_filters()?),
    );

    let img = s2.get_first_image(Some(&aoi))?;
    let img_id = img.product_id();
    println!("Image: {}", img_id);

    let params = DownloadParams {
        region: Some(aoi),
        scale: settings.scale,
        format,
    };
    let res = s2.request_image(&img, &params)?;

    if confirm("Display the image?", args.plot.mode(args.terminal))? {
        s2.show_image(&res, &img_id, PlotMethod::Multiband);
    }

    let file_path = SentinelRgb::<EarthEngine>::output_path_for(&settings.output_dir, &img_id);

    if confirm("Write the image to disk?", args.write.mode(args.terminal))? {
        s2.write_image(&res, &file_path)?;
        println!("GeoTIFF: {}", file_path.display());
    }

    if args.preview_png {
        let preview = file_path.with_extension("png");
        s2.save_preview(&res, &preview)?;
        println!("Quick-look: {}", preview.display());
    }

    if let Some(program) = &settings.gis_program {
        open_if_written(&LaunchApp::new(program), &file_path, &img_id)?;
    }

    Ok(())
}

fn run_list(settings: &Settings, query: &QueryArgs, limit: usize) -> Result<()> {
    let aoi = query.aoi()?;

    let mut s2 = SentinelRgb::with_collection(initialize(settings)?, &settings.collection);
    s2.process_collection(&aoi, query.date_range()?, Some(&query.custom_filters()?));

    let images = s2.list_images(limit)?;
    if images.is_empty() {
        println!("No image in {} matches the filters", settings.collection);
        return Ok(());
    }

    for image in &images {
        println!(
            "{}\t{}\t{}",
            image.product_id(),
            image.start_time.as_deref().unwrap_or("-"),
            image
                .cloud_cover()
                .map(|c| format!("{:.1}% cloud", c))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!("{} image(s)", images.len());

    Ok(())
}
