use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, SecondsFormat};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::io::Read;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

use super::auth::Credentials;
use super::filters::CustomFilters;
use crate::collect::global_variables::{
    CLOUDY_PIXEL_PERCENTAGE, EE_PUBLIC_PROJECT, PRODUCT_ID,
};
use crate::commons::basic_functions::DateRange;
use crate::geo_core::{BoundingBox, PixelGrid};

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes:>10}/{total_bytes:10} {percent}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Failures reported by, or about, the Earth Engine service
#[derive(Debug, Error)]
pub enum EeError {
    #[error("Earth Engine API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("No image in {collection} matches the filters")]
    EmptyCollection { collection: String },
    #[error("A Google Cloud project id is required to initialize Earth Engine (set EE_PROJECT or --project)")]
    MissingProject,
    #[error("Earth Engine authentication failed: {0}")]
    Auth(String),
}

/// Error payload returned by Google APIs
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// Build an `EeError::Api` from a failed response, preferring the service's own message
/// An empty body falls back to the status reason phrase.
pub fn api_error(status: u16, body: &str) -> EeError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    let message = if message.is_empty() {
        StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("unknown error")
            .to_string()
    } else {
        message
    };

    EeError::Api { status, message }
}

/// Full asset name for a catalog id: `COPERNICUS/S2_SR_HARMONIZED` becomes
/// `projects/earthengine-public/assets/COPERNICUS/S2_SR_HARMONIZED`
pub fn asset_name(id: &str) -> String {
    if id.starts_with("projects/") {
        id.to_string()
    } else {
        format!("projects/{}/assets/{}", EE_PUBLIC_PROJECT, id)
    }
}

/// Spatial, temporal and attribute filters over an image collection
#[derive(Debug, Clone)]
pub struct CollectionQuery {
    pub collection: String,
    pub region: Option<BoundingBox>,
    pub date_range: Option<DateRange>,
    pub filters: CustomFilters,
}

impl CollectionQuery {
    pub fn new(collection: &str) -> Self {
        CollectionQuery {
            collection: collection.to_string(),
            region: None,
            date_range: None,
            filters: CustomFilters::new(),
        }
    }

    /// `filterBounds`
    pub fn filter_bounds(mut self, region: BoundingBox) -> Self {
        self.region = Some(region);
        self
    }

    /// `filterDate`, start inclusive and end exclusive
    pub fn filter_date(mut self, date_range: DateRange) -> Self {
        self.date_range = Some(date_range);
        self
    }

    pub fn filter(mut self, filters: &CustomFilters) -> Self {
        for f in filters.iter() {
            self.filters.add_filter(&f.property, f.op, f.value.clone());
        }
        self
    }

    /// Query parameters of a `listImages` call
    pub fn query_pairs(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Vec<(&'static str, String)>> {
        let mut pairs = Vec::new();

        if let Some(range) = &self.date_range {
            pairs.push(("startTime", rfc3339_midnight(range.start)));
            pairs.push(("endTime", rfc3339_midnight(range.end)));
        }

        if let Some(region) = &self.region {
            let geometry = serde_json::to_string(&region.to_geojson_polygon())
                .context("Failed to serialize region as GeoJSON")?;
            pairs.push(("region", geometry));
        }

        if let Some(filter) = self.filters.to_query() {
            pairs.push(("filter", filter));
        }

        pairs.push(("pageSize", page_size.to_string()));

        if let Some(token) = page_token {
            pairs.push(("pageToken", token.to_string()));
        }

        Ok(pairs)
    }
}

fn rfc3339_midnight(date: NaiveDate) -> String {
    date.and_time(NaiveTime::MIN)
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One image of a collection as returned by `listImages`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ImageRecord {
    /// Asset id, derived from the name when the service left it out
    pub fn asset_id(&self) -> &str {
        if !self.id.is_empty() {
            return &self.id;
        }
        let prefix = format!("projects/{}/assets/", EE_PUBLIC_PROJECT);
        self.name.strip_prefix(prefix.as_str()).unwrap_or(&self.name)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// `PRODUCT_ID`, falling back to the last segment of the asset id
    pub fn product_id(&self) -> String {
        self.property(PRODUCT_ID)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.asset_id()
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
    }

    pub fn cloud_cover(&self) -> Option<f64> {
        self.property(CLOUDY_PIXEL_PERCENTAGE).and_then(Value::as_f64)
    }
}

/// One page of `listImages`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePage {
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    GeoTiff,
    Png,
    Jpeg,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::GeoTiff => "GEO_TIFF",
            FileFormat::Png => "PNG",
            FileFormat::Jpeg => "JPEG",
        }
    }
}

impl FromStr for FileFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "GEO_TIFF" | "GEOTIFF" | "TIFF" => Ok(FileFormat::GeoTiff),
            "PNG" => Ok(FileFormat::Png),
            "JPEG" | "JPG" => Ok(FileFormat::Jpeg),
            other => anyhow::bail!("Unsupported download format: {}", other),
        }
    }
}

/// Body of a `getPixels` call
#[derive(Debug, Clone, PartialEq)]
pub struct PixelRequest {
    pub band_ids: Vec<String>,
    pub grid: PixelGrid,
    pub file_format: FileFormat,
}

impl PixelRequest {
    pub fn to_body(&self) -> Value {
        let [translate_x, scale_x, shear_x, translate_y, shear_y, scale_y] = self.grid.affine;
        json!({
            "fileFormat": self.file_format.as_str(),
            "bandIds": self.band_ids,
            "grid": {
                "crsCode": self.grid.crs_code,
                "affineTransform": {
                    "scaleX": scale_x,
                    "shearX": shear_x,
                    "translateX": translate_x,
                    "shearY": shear_y,
                    "scaleY": scale_y,
                    "translateY": translate_y,
                },
                "dimensions": {
                    "width": self.grid.width,
                    "height": self.grid.height,
                },
            },
        })
    }
}

/// Source of Sentinel-2 records and pixels
pub trait ImageCatalog {
    fn list_images(
        &self,
        query: &CollectionQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ImagePage>;

    fn get_pixels(&self, image_name: &str, request: &PixelRequest) -> Result<Vec<u8>>;
}

/// Client for the Earth Engine REST API
/// Replaces `ee.Initialize(project=...)`: requests are billed to `project`
pub struct EarthEngine {
    client: Client,
    project: String,
    token: String,
    api_base: String,
}

impl EarthEngine {
    pub fn initialize(project: &str, credentials: &Credentials, api_base: &str) -> Result<Self> {
        if project.trim().is_empty() {
            return Err(EeError::MissingProject.into());
        }

        let token = credentials.access_token()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        log::info!("Earth Engine initialized for project {}", project);

        Ok(EarthEngine {
            client,
            project: project.trim().to_string(),
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// `{api_base}/{asset}:{method}`
    fn method_url(&self, asset: &str, method: &str) -> Result<Url> {
        let raw = format!("{}/{}:{}", self.api_base, asset, method);
        Url::parse(&raw).with_context(|| format!("Invalid Earth Engine URL: {}", raw))
    }

    pub fn list_images_url(
        &self,
        query: &CollectionQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Url> {
        let mut url = self.method_url(&asset_name(&query.collection), "listImages")?;
        url.query_pairs_mut()
            .extend_pairs(query.query_pairs(page_size, page_token)?);
        Ok(url)
    }

    fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.text() {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Failed to read error response body: {}", e);
                String::new()
            }
        };
        Err(api_error(status.as_u16(), &body).into())
    }

    /// Read the whole body, with a progress bar when its length is known
    fn read_body(mut response: Response) -> Result<Vec<u8>> {
        #[cfg(feature = "indicatif")]
        let download_pb = response.content_length().map(|len| {
            let pb = ProgressBar::new(len);
            pb.set_style(progress_style());
            pb.set_message("Downloading");
            pb
        });

        let mut data = Vec::new();
        let mut buffer = [0u8; 8192];
        loop {
            let n = response
                .read(&mut buffer)
                .context("Failed to read image bytes")?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buffer[..n]);
            #[cfg(feature = "indicatif")]
            if let Some(ref pb) = download_pb {
                pb.inc(n as u64);
            }
        }

        #[cfg(feature = "indicatif")]
        if let Some(pb) = download_pb {
            pb.finish_with_message("Downloaded");
        }

        Ok(data)
    }
}

impl ImageCatalog for EarthEngine {
    fn list_images(
        &self,
        query: &CollectionQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ImagePage> {
        let url = self.list_images_url(query, page_size, page_token)?;
        log::debug!("Request URL listImages: {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("x-goog-user-project", &self.project)
            .send()
            .context("Failed to send listImages request to Earth Engine")?;

        Self::check(response)?
            .json::<ImagePage>()
            .context("Failed to parse listImages response")
    }

    fn get_pixels(&self, image_name: &str, request: &PixelRequest) -> Result<Vec<u8>> {
        let url = self.method_url(image_name, "getPixels")?;
        let body = request.to_body();
        log::debug!("Request URL getPixels: {} body: {}", url, body);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header("x-goog-user-project", &self.project)
            .json(&body)
            .send()
            .context("Failed to send getPixels request to Earth Engine")?;

        Self::read_body(Self::check(response)?)
    }
}
