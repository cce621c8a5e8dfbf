use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::collect::ee::auth::ACCESS_TOKEN_ENV;
use crate::collect::ee::EeError;
use crate::collect::global_variables::{DEFAULT_SCALE, EE_API_BASE, OUTPUT_PATH, S2_SR_HARMONIZED};

pub const PROJECT_ENV: &str = "EE_PROJECT";
pub const OUTPUT_DIR_ENV: &str = "SENTINEL_RGB_OUTPUT_DIR";
pub const SCALE_ENV: &str = "SENTINEL_RGB_SCALE";
pub const GIS_ENV: &str = "SENTINEL_RGB_GIS";
pub const API_BASE_ENV: &str = "EE_API_BASE";

/// Runtime settings
/// Built from defaults, then an optional TOML file, then environment variables;
/// command line flags are applied last by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Google Cloud project Earth Engine requests are billed to
    pub project: Option<String>,
    pub output_dir: PathBuf,
    /// Metres per pixel of the download
    pub scale: f64,
    pub collection: String,
    pub api_base: String,
    /// Desktop GIS launched with the written file, e.g. `qgis`
    pub gis_program: Option<String>,
    pub access_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            project: None,
            output_dir: PathBuf::from(OUTPUT_PATH),
            scale: DEFAULT_SCALE,
            collection: S2_SR_HARMONIZED.to_string(),
            api_base: EE_API_BASE.to_string(),
            gis_program: None,
            access_token: None,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML settings")
    }

    /// Override with environment values; `lookup` returns the variable if set
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(project) = get(PROJECT_ENV) {
            self.project = Some(project);
        }
        if let Some(dir) = get(OUTPUT_DIR_ENV) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(scale) = get(SCALE_ENV) {
            self.scale = scale
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number, got '{}'", SCALE_ENV, scale))?;
        }
        if let Some(gis) = get(GIS_ENV) {
            self.gis_program = Some(gis);
        }
        if let Some(base) = get(API_BASE_ENV) {
            self.api_base = base;
        }
        if let Some(token) = get(ACCESS_TOKEN_ENV) {
            self.access_token = Some(token);
        }
        Ok(())
    }

    pub fn require_project(&self) -> Result<&str> {
        self.project
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| EeError::MissingProject.into())
    }
}
