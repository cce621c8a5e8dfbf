use anyhow::{Context, Result};
use geo::{coord, Rect};
use proj::Proj;

/// EPSG code of the catalog's native coordinates (WGS84 lon/lat)
pub const WGS84: i32 = 4326;

/// Base struct for geospatial operations
/// Handles the CRS the area of interest is expressed in and the area itself
#[derive(Debug, Clone)]
pub struct GeoCore {
    /// EPSG code of the AOI coordinates
    pub epsg: i32,
    /// Area of interest
    pub bbox: Option<BoundingBox>,
}

impl Default for GeoCore {
    fn default() -> Self {
        GeoCore::new(WGS84)
    }
}

impl GeoCore {
    pub fn new(epsg: i32) -> Self {
        GeoCore {
            epsg,
            bbox: None,
        }
    }

    pub fn get_epsg(&self) -> i32 {
        self.epsg
    }

    pub fn set_epsg(&mut self, epsg: i32) {
        self.epsg = epsg;
    }

    pub fn get_bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    pub fn set_bbox(&mut self, bbox: Option<BoundingBox>) {
        self.bbox = bbox;
    }

    /// AOI in EPSG:4326, reprojected when it was given in another CRS
    pub fn bbox_wgs84(&self) -> Result<Option<BoundingBox>> {
        match self.bbox {
            Some(bbox) if self.epsg != WGS84 => Ok(Some(bbox.transform(self.epsg, WGS84)?)),
            other => Ok(other),
        }
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build a rectangle from two opposite corners given in any order
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Result<Self> {
        let bbox = BoundingBox::new(a.0.min(b.0), a.1.min(b.1), a.0.max(b.0), a.1.max(b.1));

        if !(bbox.width() > 0.0 && bbox.height() > 0.0) {
            anyhow::bail!(
                "Area of interest has no extent: corners {:?} and {:?}",
                a,
                b
            );
        }

        Ok(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Transform bounding box to another CRS
    /// All four corners are reprojected and the envelope of the result is returned,
    /// so the box still covers the original area after rotation.
    pub fn transform(&self, from_epsg: i32, to_epsg: i32) -> Result<Self> {
        let proj = Proj::new_known_crs(
            &format!("EPSG:{}", from_epsg),
            &format!("EPSG:{}", to_epsg),
            None,
        )
        .context("Failed to create Proj transformation")?;

        let corners = [
            (self.min_x, self.min_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
            (self.min_x, self.max_y),
        ];

        let mut out = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for corner in corners {
            let (x, y) = proj.convert(corner).with_context(|| {
                format!(
                    "Failed to transform {:?} from EPSG:{} to EPSG:{}",
                    corner, from_epsg, to_epsg
                )
            })?;
            out.min_x = out.min_x.min(x);
            out.min_y = out.min_y.min(y);
            out.max_x = out.max_x.max(x);
            out.max_y = out.max_y.max(y);
        }

        Ok(out)
    }

    /// Rectangle as a GeoJSON polygon (counter-clockwise, closed ring)
    pub fn to_geojson_polygon(&self) -> geojson::Geometry {
        let rect = Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        );
        let polygon = rect.to_polygon();
        geojson::Geometry::new(geojson::Value::from(&polygon))
    }
}

/// UTM zone EPSG code (WGS84 / UTM) containing a lon/lat position
pub fn utm_epsg_for(lon: f64, lat: f64) -> i32 {
    let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60);
    if lat >= 0.0 {
        32600 + zone
    } else {
        32700 + zone
    }
}

/// Pixel grid of a download, in GDAL geotransform order
/// `[origin_x, pixel_width, 0, origin_y, 0, -pixel_height]`
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    pub crs_code: String,
    pub affine: [f64; 6],
    pub width: u32,
    pub height: u32,
}

impl PixelGrid {
    /// Grid at `scale` metres covering a WGS84 AOI, in the UTM zone of its centre
    /// The origin is snapped to multiples of the scale so pixels line up with the
    /// Sentinel-2 10 m grid.
    pub fn for_bbox(bbox: &BoundingBox, scale: f64) -> Result<Self> {
        if !(scale > 0.0) {
            anyhow::bail!("Scale must be positive, got {}", scale);
        }

        let (lon, lat) = bbox.center();
        let epsg = utm_epsg_for(lon, lat);
        let utm = bbox.transform(WGS84, epsg)?;

        Ok(Self::for_projected_bbox(&utm, epsg, scale))
    }

    /// Grid over a bbox that is already expressed in metres in `epsg`
    pub fn for_projected_bbox(bbox: &BoundingBox, epsg: i32, scale: f64) -> Self {
        let origin_x = (bbox.min_x / scale).floor() * scale;
        let origin_y = (bbox.max_y / scale).ceil() * scale;
        let width = ((bbox.max_x - origin_x) / scale).ceil().max(1.0) as u32;
        let height = ((origin_y - bbox.min_y) / scale).ceil().max(1.0) as u32;

        PixelGrid {
            crs_code: format!("EPSG:{}", epsg),
            affine: [origin_x, scale, 0.0, origin_y, 0.0, -scale],
            width,
            height,
        }
    }
}
