//! # Render Module
//!
//! Turns tile pairs into side-by-side comparison images and collects them
//! into a single HTML report.
//!
//! ## Panels
//! - **Overlay**: the marker replaces the red channel of an RGB reference,
//!   otherwise the two tiles are blended 50/50
//! - **Difference**: absolute intensity difference on a hot colour ramp,
//!   only for single-channel pairs
//!
//! Display conversion is 8-bit: single-channel tiles are min-max stretched,
//! colour tiles are shown as stored (16-bit samples are shifted down).

mod report;

pub use report::{HtmlReportSink, ReportPage, ReportWriter};

use crate::core::pixels::{BitDepth, ChannelLayout, PixelArray};
use crate::error::ReportError;
use image::{imageops, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// White gutter between composite panels
const PANEL_GAP: u32 = 8;

/// Third panel of a comparison image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPanel {
    Overlay,
    Difference,
    None,
}

/// Destination for comparison images and report pages
pub trait ArtifactSink {
    /// Store a comparison image under `file_name`, returning where it went
    fn save_image(&mut self, file_name: &str, image: &RgbImage) -> Result<PathBuf, ReportError>;

    /// Append one page to the consolidated report
    fn add_page(&mut self, page: ReportPage) -> Result<(), ReportError>;
}

fn is_color(array: &PixelArray) -> bool {
    array.channels() >= 3
}

/// Convert a pixel array to an 8-bit RGB image for display
pub fn to_display_rgb(array: &PixelArray) -> RgbImage {
    let (height, width) = (array.height() as u32, array.width() as u32);

    if is_color(array) {
        let shift = match array.depth() {
            BitDepth::Eight => 0,
            BitDepth::Sixteen => 8,
        };
        return RgbImage::from_fn(width, height, |x, y| {
            let (y, x) = (y as usize, x as usize);
            Rgb([0usize, 1, 2].map(|c| (array.sample(y, x, c) >> shift) as u8))
        });
    }

    let gray = stretch_to_u8(&array.intensity());
    RgbImage::from_fn(width, height, |x, y| {
        let v = gray[y as usize * array.width() + x as usize];
        Rgb([v, v, v])
    })
}

/// Min-max stretch to 0..=255; a flat input maps to zero
fn stretch_to_u8(values: &[f64]) -> Vec<u8> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|v| {
            if range > 0.0 {
                ((v - min) / range * 255.0).round() as u8
            } else {
                0
            }
        })
        .collect()
}

/// Overlay the marker on the reference
pub fn overlay(reference: &PixelArray, marker: &PixelArray) -> RgbImage {
    let base = to_display_rgb(reference);

    if is_color(reference) && marker.layout() == ChannelLayout::Grayscale {
        let red = stretch_to_u8(&marker.intensity());
        let width = marker.width();
        return RgbImage::from_fn(base.width(), base.height(), |x, y| {
            let Rgb([_, g, b]) = *base.get_pixel(x, y);
            Rgb([red[y as usize * width + x as usize], g, b])
        });
    }

    let top = to_display_rgb(marker);
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let a = base.get_pixel(x, y).0;
        let b = top.get_pixel(x, y).0;
        Rgb([0usize, 1, 2].map(|c| ((a[c] as u16 + b[c] as u16) / 2) as u8))
    })
}

/// Absolute intensity difference on a black-red-yellow-white ramp
pub fn difference(a: &PixelArray, b: &PixelArray) -> RgbImage {
    let diff: Vec<f64> = a
        .intensity()
        .iter()
        .zip(b.intensity())
        .map(|(x, y)| (x - y).abs())
        .collect();
    let scaled = stretch_to_u8(&diff);

    RgbImage::from_fn(a.width() as u32, a.height() as u32, |x, y| {
        hot(scaled[y as usize * a.width() + x as usize])
    })
}

fn hot(value: u8) -> Rgb<u8> {
    let t = value as f64 / 255.0;
    let channel = |offset: f64| ((3.0 * t - offset).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([channel(0.0), channel(1.0), channel(2.0)])
}

/// Lay out reference, marker and the analysis panel side by side
pub fn compose(reference: &PixelArray, marker: &PixelArray, analysis: AnalysisPanel) -> RgbImage {
    let mut panels = vec![to_display_rgb(reference), to_display_rgb(marker)];

    let same_extent =
        reference.height() == marker.height() && reference.width() == marker.width();
    if !same_extent && analysis != AnalysisPanel::None {
        tracing::warn!(
            reference = %reference.shape(),
            marker = %marker.shape(),
            "Tiles differ in size; omitting analysis panel"
        );
        return side_by_side(&panels);
    }

    match analysis {
        AnalysisPanel::Overlay => panels.push(overlay(reference, marker)),
        AnalysisPanel::Difference if !is_color(reference) && !is_color(marker) => {
            panels.push(difference(reference, marker))
        }
        AnalysisPanel::Difference => {
            tracing::debug!("Skipping difference panel for colour tiles");
        }
        AnalysisPanel::None => {}
    }

    side_by_side(&panels)
}

/// Concatenate images horizontally on a white background
pub fn side_by_side(panels: &[RgbImage]) -> RgbImage {
    let height = panels.iter().map(|p| p.height()).max().unwrap_or(0);
    let width = panels.iter().map(|p| p.width()).sum::<u32>()
        + PANEL_GAP * panels.len().saturating_sub(1) as u32;

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut x = 0i64;
    for panel in panels {
        imageops::replace(&mut canvas, panel, x, 0);
        x += (panel.width() + PANEL_GAP) as i64;
    }
    canvas
}

/// Encode `image` as PNG at `path`
pub fn write_png(image: &RgbImage, path: &Path) -> Result<(), ReportError> {
    image.save(path).map_err(|e| ReportError::Encode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(size: usize) -> PixelArray {
        PixelArray::gray_from_fn(size, size, |y, x| ((x + y) * 10) as u8)
    }

    fn colour(size: usize) -> PixelArray {
        PixelArray::rgb_from_fn(size, size, |_, x| [200, (x * 20) as u8, 50])
    }

    #[test]
    fn grayscale_display_is_stretched() {
        let image = to_display_rgb(&gradient(4));

        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(3, 3), &Rgb([255, 255, 255]));
    }

    #[test]
    fn colour_display_keeps_samples() {
        let image = to_display_rgb(&colour(4));
        assert_eq!(image.get_pixel(2, 1), &Rgb([200, 40, 50]));
    }

    #[test]
    fn overlay_replaces_red_channel_for_colour_reference() {
        let image = overlay(&colour(4), &gradient(4));

        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 50]));
        assert_eq!(image.get_pixel(3, 3), &Rgb([255, 60, 50]));
    }

    #[test]
    fn overlay_blends_otherwise() {
        let white = PixelArray::gray_from_fn(2, 2, |y, _| if y == 0 { 255 } else { 0 });
        let image = overlay(&white, &PixelArray::gray_from_fn(2, 2, |_, _| 7));

        // flat marker stretches to zero
        assert_eq!(image.get_pixel(0, 0), &Rgb([127, 127, 127]));
        assert_eq!(image.get_pixel(0, 1), &Rgb([0, 0, 0]));
    }

    #[test]
    fn difference_of_identical_tiles_is_black() {
        let image = difference(&gradient(4), &gradient(4));
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn hot_ramp_endpoints() {
        assert_eq!(hot(0), Rgb([0, 0, 0]));
        assert_eq!(hot(255), Rgb([255, 255, 255]));
    }

    #[test]
    fn composite_width_includes_gutters() {
        let image = compose(&gradient(10), &gradient(10), AnalysisPanel::Difference);
        assert_eq!(image.dimensions(), (30 + 2 * PANEL_GAP, 10));

        let image = compose(&colour(10), &colour(10), AnalysisPanel::Difference);
        assert_eq!(image.dimensions(), (20 + PANEL_GAP, 10));

        let image = compose(&colour(10), &gradient(10), AnalysisPanel::None);
        assert_eq!(image.dimensions(), (20 + PANEL_GAP, 10));
    }

    #[test]
    fn side_by_side_pads_shorter_panels_with_white() {
        let tall = RgbImage::from_pixel(2, 4, Rgb([0, 0, 0]));
        let short = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        let image = side_by_side(&[tall, short]);

        assert_eq!(image.get_pixel(2 + PANEL_GAP, 3), &Rgb([255, 255, 255]));
        assert_eq!(image.get_pixel(2 + PANEL_GAP, 1), &Rgb([0, 0, 0]));
    }

    #[test]
    fn write_png_round_trips_dimensions() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("tile_0_comparison.png");
        write_png(&side_by_side(&[RgbImage::new(3, 2)]), &path).unwrap();

        assert_eq!(image::image_dimensions(&path).unwrap(), (3, 2));
    }
}
