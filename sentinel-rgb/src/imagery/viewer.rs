use anyhow::Result;

use super::raster::RgbImage;

/// Longest window side when opening the viewer
const MAX_WINDOW_SIDE: f32 = 1000.0;

/// Initial window size keeping the image aspect ratio
pub fn window_size(width: usize, height: usize) -> [f32; 2] {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let factor = (MAX_WINDOW_SIDE / w.max(h)).min(1.0);
    // room for the title line
    [(w * factor).max(200.0), (h * factor).max(200.0) + 30.0]
}

#[cfg(feature = "viewer")]
mod native {
    use anyhow::Result;
    use eframe::egui;

    use super::{window_size, RgbImage};

    struct RgbViewer {
        title: String,
        texture: egui::TextureHandle,
    }

    impl eframe::App for RgbViewer {
        fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.label(egui::RichText::new(&self.title).size(12.0));
                    ui.add(egui::Image::new(&self.texture).shrink_to_fit());
                });
            });
        }
    }

    /// Blocks until the window is closed
    pub fn show_rgb(title: &str, image: &RgbImage) -> Result<()> {
        let color_image =
            egui::ColorImage::from_rgb([image.width, image.height], &image.pixels);

        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size(window_size(image.width, image.height))
                .with_min_inner_size([200.0, 200.0]),
            ..Default::default()
        };

        let app_name = title.to_string();
        let title = title.to_string();
        eframe::run_native(
            &app_name,
            options,
            Box::new(move |cc| {
                let texture = cc.egui_ctx.load_texture(
                    "composite",
                    color_image,
                    egui::TextureOptions::LINEAR,
                );
                Ok(Box::new(RgbViewer { title, texture }))
            }),
        )
        .map_err(|e| anyhow::anyhow!("Image viewer failed: {}", e))
    }
}

/// Show the composite in a native window, titled with the product id
#[cfg(feature = "viewer")]
pub fn show_rgb(title: &str, image: &RgbImage) -> Result<()> {
    log::info!("Opening viewer for {}", title);
    native::show_rgb(title, image)
}

#[cfg(not(feature = "viewer"))]
pub fn show_rgb(title: &str, _image: &RgbImage) -> Result<()> {
    anyhow::bail!(
        "Cannot display {}: built without the `viewer` feature (use --preview-png instead)",
        title
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_keeps_aspect() {
        let [w, h] = window_size(2000, 1000);
        assert_eq!(w, 1000.0);
        assert_eq!(h, 500.0 + 30.0);
    }

    #[test]
    fn test_small_images_not_upscaled() {
        assert_eq!(window_size(300, 250), [300.0, 280.0]);
        assert_eq!(window_size(10, 10), [200.0, 230.0]);
    }
}
