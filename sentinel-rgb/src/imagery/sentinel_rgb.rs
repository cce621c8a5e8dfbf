use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::raster::{MemRaster, RasterProfile};
use super::viewer;
use crate::collect::ee::{
    CollectionQuery, CustomFilters, EeError, FileFormat, ImageCatalog, ImageRecord, PixelRequest,
};
use crate::collect::global_variables::{DEFAULT_SCALE, S2_SR_HARMONIZED, TCI_BANDS};
use crate::commons::basic_functions::{sanitize_file_stem, DateRange};
use crate::geo_core::{BoundingBox, PixelGrid};

/// Largest page the catalog hands out in one `listImages` call
const MAX_PAGE_SIZE: usize = 1000;

/// Image picked from the filtered collection, with its band selection and clip
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedImage {
    pub record: ImageRecord,
    pub bands: Vec<String>,
    pub clip: Option<BoundingBox>,
}

impl SelectedImage {
    pub fn product_id(&self) -> String {
        self.record.product_id()
    }
}

/// How the composite is rendered by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadParams {
    /// Defaults to the image clip
    pub region: Option<BoundingBox>,
    /// Metres per pixel
    pub scale: f64,
    pub format: FileFormat,
}

impl Default for DownloadParams {
    fn default() -> Self {
        DownloadParams {
            region: None,
            scale: DEFAULT_SCALE,
            format: FileFormat::GeoTiff,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlotMethod {
    /// Bands 1, 2, 3 as red, green, blue
    #[default]
    Multiband,
}

/// Sentinel-2 true colour composite from Earth Engine
/// Filters the surface reflectance collection, picks the first matching scene
/// and downloads its TCI bands clipped to the area of interest.
pub struct SentinelRgb<C: ImageCatalog> {
    catalog: C,
    collection: CollectionQuery,
}

impl<C: ImageCatalog> SentinelRgb<C> {
    pub fn new(catalog: C) -> Self {
        Self::with_collection(catalog, S2_SR_HARMONIZED)
    }

    pub fn with_collection(catalog: C, collection: &str) -> Self {
        SentinelRgb {
            catalog,
            collection: CollectionQuery::new(collection),
        }
    }

    pub fn collection(&self) -> &CollectionQuery {
        &self.collection
    }

    /// Apply the spatial, temporal and attribute filters
    /// Calling it again replaces the previous filters.
    pub fn process_collection(
        &mut self,
        aoi: &BoundingBox,
        date_range: DateRange,
        custom_filters: Option<&CustomFilters>,
    ) {
        let mut collection = CollectionQuery::new(&self.collection.collection)
            .filter_bounds(*aoi)
            .filter_date(date_range);

        if let Some(filters) = custom_filters {
            collection = collection.filter(filters);
        }

        log::info!(
            "Collection {} filtered: {} to {}, filter: {}",
            collection.collection,
            date_range.start,
            date_range.end,
            collection.filters.to_query().unwrap_or_else(|| "none".to_string())
        );

        self.collection = collection;
    }

    /// First image of the filtered collection, TCI bands, clipped to `aoi`
    pub fn get_first_image(&self, aoi: Option<&BoundingBox>) -> Result<SelectedImage> {
        let page = self.catalog.list_images(&self.collection, 1, None)?;

        let record = page
            .images
            .into_iter()
            .next()
            .ok_or_else(|| EeError::EmptyCollection {
                collection: self.collection.collection.clone(),
            })?;

        log::info!("Selected image {}", record.asset_id());

        Ok(SelectedImage {
            record,
            bands: TCI_BANDS.iter().map(|b| b.to_string()).collect(),
            clip: aoi.copied(),
        })
    }

    /// Up to `limit` images of the filtered collection, in catalog order
    pub fn list_images(&self, limit: usize) -> Result<Vec<ImageRecord>> {
        let mut images = Vec::new();
        let mut page_token: Option<String> = None;

        while images.len() < limit {
            let remaining = limit - images.len();
            let page = self.catalog.list_images(
                &self.collection,
                remaining.min(MAX_PAGE_SIZE) as u32,
                page_token.as_deref(),
            )?;

            let received = page.images.len();
            images.extend(page.images.into_iter().take(remaining));

            match page.next_page_token {
                Some(token) if received > 0 && !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(images)
    }

    /// Download the rendered image; returns the response body
    pub fn request_image(&self, image: &SelectedImage, params: &DownloadParams) -> Result<Vec<u8>> {
        let region = params
            .region
            .or(image.clip)
            .context("A download region is required when the image is not clipped")?;

        let request = PixelRequest {
            band_ids: image.bands.clone(),
            grid: PixelGrid::for_bbox(&region, params.scale)?,
            file_format: params.format,
        };

        log::info!(
            "Requesting {} ({}x{} px at {} m, {})",
            image.product_id(),
            request.grid.width,
            request.grid.height,
            params.scale,
            request.grid.crs_code
        );

        let bytes = self.catalog.get_pixels(&image.record.name, &request)?;
        log::info!("Received {} bytes", bytes.len());
        Ok(bytes)
    }

    /// Decode the response and show it in a window titled `img_id`
    pub fn plot_image(&self, response: &[u8], img_id: &str, method: PlotMethod) -> Result<()> {
        match method {
            PlotMethod::Multiband => {
                let raster = MemRaster::from_bytes(response)?;
                let rgb = raster.read_rgb()?;
                viewer::show_rgb(img_id, &rgb)
            }
        }
    }

    /// Like `plot_image`, but a display failure only logs a warning so the
    /// download can still be written; returns whether the window was shown
    pub fn show_image(&self, response: &[u8], img_id: &str, method: PlotMethod) -> bool {
        match self.plot_image(response, img_id, method) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not display {}: {:#}", img_id, e);
                false
            }
        }
    }

    /// Write the response as a GeoTIFF with its original profile
    pub fn write_image(&self, response: &[u8], output_path: &Path) -> Result<RasterProfile> {
        let raster = MemRaster::from_bytes(response)?;
        raster.write_to(output_path)
    }

    /// Quick-look PNG of the response
    pub fn save_preview(&self, response: &[u8], output_path: &Path) -> Result<()> {
        let raster = MemRaster::from_bytes(response)?;
        raster.read_rgb()?.save_png(output_path)
    }

    /// `<dir>/<PRODUCT_ID>.tiff`
    pub fn output_path_for(output_dir: &Path, product_id: &str) -> PathBuf {
        output_dir.join(format!("{}.tiff", sanitize_file_stem(product_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::ee::{FilterOp, ImagePage};
    use crate::imagery::raster::tests::sample_geotiff;
    use serde_json::{json, Map, Value};
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeCatalog {
        images: Vec<ImageRecord>,
        page_limit: usize,
        list_calls: RefCell<Vec<(u32, Option<String>, Option<String>)>>,
        pixel_calls: RefCell<Vec<(String, PixelRequest)>>,
    }

    impl ImageCatalog for FakeCatalog {
        fn list_images(
            &self,
            query: &CollectionQuery,
            page_size: u32,
            page_token: Option<&str>,
        ) -> Result<ImagePage> {
            self.list_calls.borrow_mut().push((
                page_size,
                page_token.map(str::to_string),
                query.filters.to_query(),
            ));

            let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let size = (page_size as usize).min(self.page_limit.max(1));
            let end = (start + size).min(self.images.len());
            let next = if end < self.images.len() {
                Some(end.to_string())
            } else {
                None
            };

            Ok(ImagePage {
                images: self.images[start.min(end)..end].to_vec(),
                next_page_token: next,
            })
        }

        fn get_pixels(&self, image_name: &str, request: &PixelRequest) -> Result<Vec<u8>> {
            self.pixel_calls
                .borrow_mut()
                .push((image_name.to_string(), request.clone()));
            Ok(sample_geotiff(4, 3, 3))
        }
    }

    fn record(n: usize) -> ImageRecord {
        let properties: Map<String, Value> = json!({
            "PRODUCT_ID": format!("S2B_MSIL2A_2025010{}T131251_N0511_R138_T23LKG", n),
            "CLOUDY_PIXEL_PERCENTAGE": 10.0 + n as f64,
        })
        .as_object()
        .unwrap()
        .clone();

        ImageRecord {
            name: format!(
                "projects/earthengine-public/assets/COPERNICUS/S2_SR_HARMONIZED/2025010{}_T23LKG",
                n
            ),
            id: format!("COPERNICUS/S2_SR_HARMONIZED/2025010{}_T23LKG", n),
            start_time: Some(format!("2025-01-0{}T13:18:07Z", n)),
            properties,
        }
    }

    fn catalog(count: usize, page_limit: usize) -> FakeCatalog {
        FakeCatalog {
            images: (1..=count).map(record).collect(),
            page_limit,
            ..Default::default()
        }
    }

    fn aoi() -> BoundingBox {
        BoundingBox::from_corners(
            (-46.9571818723517254, -14.8772245884183416),
            (-46.7816836599576504, -14.6975095089156795),
        )
        .unwrap()
    }

    fn filtered(catalog: FakeCatalog) -> SentinelRgb<FakeCatalog> {
        let mut filters = CustomFilters::new();
        filters.add_filter("CLOUDY_PIXEL_PERCENTAGE", FilterOp::Lte, 30i64);

        let mut s2 = SentinelRgb::new(catalog);
        s2.process_collection(
            &aoi(),
            DateRange::parse("2025-01-01", "2025-01-30").unwrap(),
            Some(&filters),
        );
        s2
    }

    #[test]
    fn test_process_collection_sets_query() {
        let s2 = filtered(catalog(0, 10));
        let query = s2.collection();
        assert_eq!(query.collection, S2_SR_HARMONIZED);
        assert_eq!(query.region, Some(aoi()));
        assert_eq!(
            query.filters.to_query().as_deref(),
            Some("properties.CLOUDY_PIXEL_PERCENTAGE <= 30")
        );
    }

    #[test]
    fn test_process_collection_replaces_filters() {
        let mut s2 = filtered(catalog(0, 10));
        s2.process_collection(
            &aoi(),
            DateRange::parse("2025-02-01", "2025-02-10").unwrap(),
            None,
        );
        assert!(s2.collection().filters.is_empty());
        assert_eq!(
            s2.collection().date_range.unwrap().start.to_string(),
            "2025-02-01"
        );
    }

    #[test]
    fn test_get_first_image() {
        let s2 = filtered(catalog(3, 10));
        let image = s2.get_first_image(Some(&aoi())).unwrap();

        assert_eq!(
            image.product_id(),
            "S2B_MSIL2A_20250101T131251_N0511_R138_T23LKG"
        );
        assert_eq!(image.bands, vec!["TCI_R", "TCI_G", "TCI_B"]);
        assert_eq!(image.clip, Some(aoi()));

        let calls = s2.catalog.list_calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 1);
        assert_eq!(
            calls[0].2.as_deref(),
            Some("properties.CLOUDY_PIXEL_PERCENTAGE <= 30")
        );
    }

    #[test]
    fn test_empty_collection() {
        let s2 = filtered(catalog(0, 10));
        let err = s2.get_first_image(Some(&aoi())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EeError>(),
            Some(EeError::EmptyCollection { .. })
        ));
    }

    #[test]
    fn test_list_images_follows_pages() {
        let s2 = filtered(catalog(5, 2));
        let images = s2.list_images(4).unwrap();
        assert_eq!(images.len(), 4);
        assert_eq!(images[3], record(4));

        let calls = s2.catalog.list_calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, None);
        assert_eq!(calls[1].1.as_deref(), Some("2"));
    }

    #[test]
    fn test_list_images_stops_at_end() {
        let s2 = filtered(catalog(3, 2));
        assert_eq!(s2.list_images(50).unwrap().len(), 3);
        assert_eq!(s2.list_images(0).unwrap().len(), 0);
    }

    #[test]
    fn test_request_image_uses_clip_grid() {
        let s2 = filtered(catalog(1, 10));
        let image = s2.get_first_image(Some(&aoi())).unwrap();
        let bytes = s2.request_image(&image, &DownloadParams::default()).unwrap();
        assert!(!bytes.is_empty());

        let calls = s2.catalog.pixel_calls.borrow();
        let (name, request) = &calls[0];
        assert_eq!(name, &image.record.name);
        assert_eq!(request.band_ids, vec!["TCI_R", "TCI_G", "TCI_B"]);
        assert_eq!(request.file_format, FileFormat::GeoTiff);
        assert_eq!(request.grid.crs_code, "EPSG:32723");
        assert_eq!(request.grid.affine[1], 10.0);
        assert_eq!(request.grid.affine[5], -10.0);
        // ~0.175 deg x ~0.18 deg at 10 m
        assert!(request.grid.width > 1500 && request.grid.width < 2100);
        assert!(request.grid.height > 1800 && request.grid.height < 2100);
    }

    #[test]
    fn test_request_image_needs_region() {
        let s2 = filtered(catalog(1, 10));
        let image = s2.get_first_image(None).unwrap();
        assert!(s2.request_image(&image, &DownloadParams::default()).is_err());
    }

    #[test]
    fn test_display_failure_does_not_stop_write() {
        let dir = tempfile::tempdir().unwrap();
        let s2 = filtered(catalog(1, 10));
        let image = s2.get_first_image(Some(&aoi())).unwrap();
        let bytes = s2.request_image(&image, &DownloadParams::default()).unwrap();

        // undecodable body: display fails, nothing is shown
        assert!(!s2.show_image(b"<html>quota exceeded</html>", "broken", PlotMethod::Multiband));

        let output_path = SentinelRgb::<FakeCatalog>::output_path_for(dir.path(), &image.product_id());
        s2.write_image(&bytes, &output_path).unwrap();
        assert!(output_path.is_file());
    }

    #[cfg(not(feature = "viewer"))]
    #[test]
    fn test_show_image_without_viewer_reports_false() {
        let s2 = filtered(catalog(1, 10));
        let image = s2.get_first_image(Some(&aoi())).unwrap();
        let bytes = s2.request_image(&image, &DownloadParams::default()).unwrap();

        assert!(s2.plot_image(&bytes, "scene", PlotMethod::Multiband).is_err());
        assert!(!s2.show_image(&bytes, "scene", PlotMethod::Multiband));
    }

    #[test]
    fn test_write_image_to_product_path() {
        let dir = tempfile::tempdir().unwrap();
        let s2 = filtered(catalog(1, 10));
        let image = s2.get_first_image(Some(&aoi())).unwrap();
        let bytes = s2.request_image(&image, &DownloadParams::default()).unwrap();

        let output_path =
            SentinelRgb::<FakeCatalog>::output_path_for(&dir.path().join("out"), &image.product_id());
        assert_eq!(
            output_path.file_name().unwrap(),
            "S2B_MSIL2A_20250101T131251_N0511_R138_T23LKG.tiff"
        );

        let profile = s2.write_image(&bytes, &output_path).unwrap();
        assert!(output_path.is_file());
        assert_eq!((profile.width, profile.height, profile.band_count), (4, 3, 3));

        let preview = dir.path().join("out").join("preview.png");
        s2.save_preview(&bytes, &preview).unwrap();
        assert!(preview.is_file());
    }
}
