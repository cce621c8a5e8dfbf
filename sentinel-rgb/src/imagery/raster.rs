use anyhow::{Context, Result};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{vsi, Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

static MEM_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Raster properties needed to write an identical copy
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub data_type: GdalDataType,
    pub geo_transform: Option<[f64; 6]>,
    pub projection_wkt: String,
    pub nodata: Option<f64>,
}

/// Downloaded raster held in a GDAL `/vsimem/` file
/// The memory file lives exactly as long as this value.
pub struct MemRaster {
    path: PathBuf,
    dataset: Option<Dataset>,
}

impl MemRaster {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            anyhow::bail!("Cannot decode an empty image response");
        }

        let n = MEM_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = PathBuf::from(format!(
            "/vsimem/sentinel_rgb_{}_{}.tif",
            std::process::id(),
            n
        ));

        vsi::create_mem_file(&path, bytes.to_vec())
            .context("Failed to create in-memory raster file")?;

        // From here on Drop cleans up the memory file, also on open failure
        let mut raster = MemRaster {
            path,
            dataset: None,
        };
        let dataset = Dataset::open_ex(
            &raster.path,
            DatasetOptions {
                open_flags: GdalOpenFlags::GDAL_OF_RASTER | GdalOpenFlags::GDAL_OF_READONLY,
                ..Default::default()
            },
        )
        .context("Failed to decode image: response is not a raster GDAL can read")?;
        raster.dataset = Some(dataset);

        Ok(raster)
    }

    fn dataset(&self) -> Result<&Dataset> {
        self.dataset.as_ref().context("Raster dataset is closed")
    }

    pub fn profile(&self) -> Result<RasterProfile> {
        let dataset = self.dataset()?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();
        if band_count == 0 {
            anyhow::bail!("Raster has no bands");
        }

        let first = dataset.rasterband(1).context("Failed to get band 1")?;

        Ok(RasterProfile {
            width,
            height,
            band_count,
            data_type: first.band_type(),
            geo_transform: dataset.geo_transform().ok(),
            projection_wkt: dataset.projection(),
            nodata: first.no_data_value(),
        })
    }

    /// Read bands 1, 2 and 3 as an interleaved RGB image
    pub fn read_rgb(&self) -> Result<RgbImage> {
        let dataset = self.dataset()?;
        let (width, height) = dataset.raster_size();

        if dataset.raster_count() < 3 {
            anyhow::bail!(
                "Image must have at least 3 bands (R, G, B), found {}",
                dataset.raster_count()
            );
        }

        let mut planes = Vec::with_capacity(3);
        for index in 1..=3 {
            let band = dataset
                .rasterband(index)
                .with_context(|| format!("Failed to get band {}", index))?;
            if band.band_type() != GdalDataType::UInt8 {
                anyhow::bail!(
                    "Band {} is {:?}; only 8-bit true colour bands can be displayed",
                    index,
                    band.band_type()
                );
            }
            let buffer = band
                .read_as::<u8>((0, 0), (width, height), (width, height), None)
                .with_context(|| format!("Failed to read band {}", index))?;
            planes.push(buffer.into_shape_and_vec().1);
        }

        Ok(RgbImage {
            width,
            height,
            pixels: interleave(&planes[0], &planes[1], &planes[2]),
        })
    }

    /// Write every band to a GeoTIFF with the same profile
    pub fn write_to(&self, output_path: &Path) -> Result<RasterProfile> {
        let profile = self.profile()?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create output directory: {:?}", parent))?;
            }
        }

        match profile.data_type {
            GdalDataType::UInt8 => self.write_typed::<u8>(output_path, &profile)?,
            GdalDataType::UInt16 => self.write_typed::<u16>(output_path, &profile)?,
            GdalDataType::Int16 => self.write_typed::<i16>(output_path, &profile)?,
            GdalDataType::UInt32 => self.write_typed::<u32>(output_path, &profile)?,
            GdalDataType::Int32 => self.write_typed::<i32>(output_path, &profile)?,
            GdalDataType::Float32 => self.write_typed::<f32>(output_path, &profile)?,
            GdalDataType::Float64 => self.write_typed::<f64>(output_path, &profile)?,
            other => anyhow::bail!("Unsupported raster data type: {:?}", other),
        }

        log::info!("GeoTIFF saved to: {:?}", output_path);
        Ok(profile)
    }

    fn write_typed<T: GdalType + Copy>(
        &self,
        output_path: &Path,
        profile: &RasterProfile,
    ) -> Result<()> {
        let source = self.dataset()?;
        let (width, height) = (profile.width, profile.height);

        let driver =
            DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;

        let mut output_dataset = driver
            .create_with_band_type::<T, _>(output_path, width, height, profile.band_count)
            .context(format!("Failed to create GeoTIFF dataset: {:?}", output_path))?;

        if let Some(geo_transform) = profile.geo_transform {
            output_dataset
                .set_geo_transform(&geo_transform)
                .context("Failed to set geotransform")?;
        }
        if !profile.projection_wkt.is_empty() {
            output_dataset
                .set_projection(&profile.projection_wkt)
                .context("Failed to set projection")?;
        }

        for index in 1..=profile.band_count {
            let source_band = source
                .rasterband(index)
                .with_context(|| format!("Failed to get source band {}", index))?;
            let mut buffer: Buffer<T> = source_band
                .read_as::<T>((0, 0), (width, height), (width, height), None)
                .with_context(|| format!("Failed to read band {}", index))?;

            let mut band = output_dataset
                .rasterband(index)
                .with_context(|| format!("Failed to get output band {}", index))?;
            band.write((0, 0), (width, height), &mut buffer)
                .with_context(|| format!("Failed to write band {}", index))?;
            if let Some(nodata) = profile.nodata {
                band.set_no_data_value(Some(nodata))
                    .context("Failed to set no data value")?;
            }
        }

        Ok(())
    }
}

impl Drop for MemRaster {
    fn drop(&mut self) {
        // Close the dataset before releasing the memory it reads from
        self.dataset.take();
        if let Err(e) = vsi::unlink_mem_file(&self.path) {
            log::warn!("Failed to release {:?}: {}", self.path, e);
        }
    }
}

/// 8-bit RGB pixels, row-major, `[r, g, b, r, g, b, ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl RgbImage {
    /// Quick-look PNG
    pub fn save_png(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {:?}", parent))?;
            }
        }

        let img = image::RgbImage::from_raw(
            self.width as u32,
            self.height as u32,
            self.pixels.clone(),
        )
        .context("Pixel buffer does not match image dimensions")?;

        img.save_with_format(path, image::ImageFormat::Png)
            .context(format!("Failed to write PNG: {:?}", path))?;

        log::info!("Quick-look saved to: {:?}", path);
        Ok(())
    }
}

/// Band-sequential planes to pixel-interleaved RGB
/// (a `(3, h, w)` array transposed to `(h, w, 3)`)
pub fn interleave(red: &[u8], green: &[u8], blue: &[u8]) -> Vec<u8> {
    red.iter()
        .zip(green)
        .zip(blue)
        .flat_map(|((r, g), b)| [*r, *g, *b])
        .collect()
}
