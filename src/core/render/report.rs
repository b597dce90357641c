//! Consolidated HTML report.
//!
//! The report is streamed into a hidden temporary file next to its final
//! location and only renamed into place by [`ReportWriter::finish`]. A
//! writer dropped before `finish` removes the temporary file, so a failed
//! run never leaves a half-written report behind.

use super::{write_png, ArtifactSink};
use crate::error::ReportError;
use image::RgbImage;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One section of the report: an optional image plus labelled values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPage {
    pub title: String,
    /// Image file name relative to the report
    pub image: Option<String>,
    pub metrics: Vec<(String, String)>,
    pub notes: Vec<String>,
}

impl ReportPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, file_name: impl Into<String>) -> Self {
        self.image = Some(file_name.into());
        self
    }

    pub fn with_metric(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.metrics.push((label.into(), value.into()));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Streams report pages into a temporary file
pub struct ReportWriter {
    file: Option<NamedTempFile>,
    destination: PathBuf,
    pages: usize,
}

impl ReportWriter {
    /// Start a report at `dir/file_name`, creating `dir` if needed
    pub fn create(dir: &Path, file_name: &str, title: &str) -> Result<Self, ReportError> {
        fs::create_dir_all(dir).map_err(|e| ReportError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let destination = dir.join(file_name);
        let file = tempfile::Builder::new()
            .prefix(".report-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| ReportError::Write {
                path: destination.clone(),
                source: e,
            })?;

        let mut writer = Self {
            file: Some(file),
            destination,
            pages: 0,
        };
        writer.write_str(&header(title))?;
        Ok(writer)
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    /// Append a page
    pub fn write_page(&mut self, page: &ReportPage) -> Result<(), ReportError> {
        self.pages += 1;
        self.write_str(&render_page(page))
    }

    /// Close the document and move it into place
    pub fn finish(mut self) -> Result<PathBuf, ReportError> {
        self.write_str(&footer())?;

        let destination = self.destination.clone();
        let Some(file) = self.file.take() else {
            return Ok(destination);
        };

        file.persist(&destination).map_err(|e| ReportError::Write {
            path: destination.clone(),
            source: e.error,
        })?;

        tracing::info!(path = %destination.display(), pages = self.pages, "Wrote report");
        Ok(destination)
    }

    fn write_str(&mut self, text: &str) -> Result<(), ReportError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.write_all(text.as_bytes()).map_err(|e| ReportError::Write {
            path: self.destination.clone(),
            source: e,
        })
    }
}

impl Drop for ReportWriter {
    fn drop(&mut self) {
        if self.file.is_some() {
            tracing::warn!(
                path = %self.destination.display(),
                pages = self.pages,
                "Report abandoned before completion"
            );
        }
    }
}

/// Writes comparison PNGs and report pages into one output directory
pub struct HtmlReportSink {
    output_dir: PathBuf,
    report: ReportWriter,
}

impl HtmlReportSink {
    pub fn create(output_dir: &Path, report_name: &str, title: &str) -> Result<Self, ReportError> {
        let report = ReportWriter::create(output_dir, report_name, title)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            report,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn finish(self) -> Result<PathBuf, ReportError> {
        self.report.finish()
    }
}

impl ArtifactSink for HtmlReportSink {
    fn save_image(&mut self, file_name: &str, image: &RgbImage) -> Result<PathBuf, ReportError> {
        let path = self.output_dir.join(file_name);
        write_png(image, &path)?;
        tracing::debug!(path = %path.display(), "Saved comparison image");
        Ok(path)
    }

    fn add_page(&mut self, page: ReportPage) -> Result<(), ReportError> {
        self.report.write_page(&page)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn header(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{ font-family: sans-serif; margin: 2rem auto; max-width: 1200px; color: #222; }}
        h1 {{ margin-bottom: 0.25rem; }}
        .generated {{ color: #666; font-size: 0.875rem; }}
        .note {{ color: #666; font-size: 0.875rem; word-break: break-all; }}
        .page {{ border-top: 1px solid #ccc; padding: 1rem 0; page-break-after: always; }}
        .page-header {{ font-weight: 600; margin-bottom: 0.5rem; }}
        .page img {{ display: block; max-width: 100%; }}
        .metrics {{ display: flex; flex-wrap: wrap; gap: 1.5rem; margin: 0.75rem 0; }}
        .stat-value {{ font-family: monospace; font-size: 1.25rem; }}
        .stat-label {{ color: #666; font-size: 0.75rem; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <p class="generated">Generated {timestamp}</p>
"#,
        title = escape(title),
        timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
    )
}

fn render_page(page: &ReportPage) -> String {
    let mut html = format!(
        "        <section class=\"page\">\n            <div class=\"page-header\">{}</div>\n",
        escape(&page.title)
    );

    if let Some(image) = &page.image {
        html.push_str(&format!(
            "            <img src=\"{}\" alt=\"{}\">\n",
            escape(image),
            escape(&page.title)
        ));
    }

    if !page.metrics.is_empty() {
        html.push_str("            <div class=\"metrics\">\n");
        for (label, value) in &page.metrics {
            html.push_str(&format!(
                "                <div><div class=\"stat-value\">{}</div><div class=\"stat-label\">{}</div></div>\n",
                escape(value),
                escape(label)
            ));
        }
        html.push_str("            </div>\n");
    }

    for note in &page.notes {
        html.push_str(&format!("            <p class=\"note\">{}</p>\n", escape(note)));
    }

    html.push_str("        </section>\n");
    html
}

fn footer() -> String {
    r#"    <p class="note">Report generated by reg-qc</p>
</body>
</html>
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".report-"))
            .count()
    }

    #[test]
    fn finish_persists_complete_document() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer =
            ReportWriter::create(temp_dir.path(), "registration_validation.html", "Validation").unwrap();
        writer
            .write_page(
                &ReportPage::new("Tile 1")
                    .with_image("tile_1_comparison.png")
                    .with_metric("SSIM", "0.912")
                    .with_note("Position: (256, 256)"),
            )
            .unwrap();

        let path = writer.finish().unwrap();
        let html = fs::read_to_string(&path).unwrap();

        assert_eq!(path, temp_dir.path().join("registration_validation.html"));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("tile_1_comparison.png"));
        assert!(html.contains("0.912"));
        assert!(html.trim_end().ends_with("</html>"));
        assert_eq!(leftover_temp_files(temp_dir.path()), 0);
    }

    #[test]
    fn dropped_writer_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut writer = ReportWriter::create(temp_dir.path(), "report.html", "Abandoned").unwrap();
            writer.write_page(&ReportPage::new("Tile 1")).unwrap();
            assert_eq!(leftover_temp_files(temp_dir.path()), 1);
        }

        assert!(!temp_dir.path().join("report.html").exists());
        assert_eq!(leftover_temp_files(temp_dir.path()), 0);
    }

    #[test]
    fn create_makes_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("validation_results");

        let writer = ReportWriter::create(&nested, "report.html", "Report").unwrap();
        assert!(nested.is_dir());
        writer.finish().unwrap();
    }

    #[test]
    fn stylesheet_covers_only_emitted_classes() {
        let page = render_page(
            &ReportPage::new("Tile 1")
                .with_image("tile_1_comparison.png")
                .with_metric("SSIM", "0.9")
                .with_note("note"),
        );
        let document = format!("{}{}{}", header("Report"), page, footer());

        for class in ["generated", "note", "page", "page-header", "metrics", "stat-value", "stat-label"] {
            assert!(document.contains(&format!(".{} ", class)), "missing style for {}", class);
            assert!(document.contains(&format!("class=\"{}\"", class)), "unused style {}", class);
        }
    }

    #[test]
    fn text_is_escaped() {
        let html = render_page(&ReportPage::new("H&E <tile>"));
        assert!(html.contains("H&amp;E &lt;tile&gt;"));
    }

    #[test]
    fn sink_saves_images_beside_report() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = HtmlReportSink::create(temp_dir.path(), "tile_pairs.html", "Pairs").unwrap();

        let saved = sink
            .save_image("tile_comparison_0.png", &RgbImage::new(4, 4))
            .unwrap();
        sink.add_page(ReportPage::new("Pair 0").with_image("tile_comparison_0.png"))
            .unwrap();
        let report = sink.finish().unwrap();

        assert!(saved.exists());
        assert!(report.exists());
    }
}
