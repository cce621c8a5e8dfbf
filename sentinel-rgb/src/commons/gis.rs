use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Desktop GIS that can load a raster as a layer
pub trait GisHook {
    fn open_layer(&self, path: &Path, layer_name: &str) -> Result<()>;
}

/// Launch an external GIS application with the raster as argument (e.g. `qgis file.tiff`)
/// The application is started in the background and not waited for.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchApp {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchApp {
    pub fn new(program: &str) -> Self {
        LaunchApp {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn qgis() -> Self {
        Self::new("qgis")
    }

    pub fn command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(path);
        command
    }
}

impl GisHook for LaunchApp {
    fn open_layer(&self, path: &Path, layer_name: &str) -> Result<()> {
        if !path.is_file() {
            anyhow::bail!("Raster {:?} does not exist, nothing to open", path);
        }

        self.command(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.program))?;

        log::info!("Opened layer {} in {}", layer_name, self.program);
        Ok(())
    }
}

/// Hand the written raster to the GIS, only if it was actually written
pub fn open_if_written(hook: &dyn GisHook, path: &Path, layer_name: &str) -> Result<bool> {
    if !path.is_file() {
        log::debug!("{:?} not written, skipping GIS", path);
        return Ok(false);
    }
    hook.open_layer(path, layer_name)?;
    Ok(true)
}
