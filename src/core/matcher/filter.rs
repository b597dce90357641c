//! File filtering for tile image listings.

use std::collections::HashSet;
use std::path::Path;

/// Accepts tile image files by extension
pub struct TileImageFilter {
    /// Lower-case extensions to include
    extensions: HashSet<String>,
    /// Whether to include hidden files
    include_hidden: bool,
}

impl TileImageFilter {
    /// Filter accepting PNG and JPEG tiles
    pub fn new() -> Self {
        Self {
            extensions: ["png", "jpg", "jpeg"].iter().map(|e| e.to_string()).collect(),
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Override the list of extensions to accept
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Check if a file should be included
    pub fn should_include(&self, path: &Path) -> bool {
        if !self.include_hidden {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    return false;
                }
            }
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

impl Default for TileImageFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_includes_png_and_jpeg() {
        let filter = TileImageFilter::new();
        assert!(filter.should_include(Path::new("/tiles/001.png")));
        assert!(filter.should_include(Path::new("/tiles/001.JPG")));
        assert!(filter.should_include(Path::new("/tiles/001.jpeg")));
    }

    #[test]
    fn filter_excludes_other_files() {
        let filter = TileImageFilter::new();
        assert!(!filter.should_include(Path::new("/tiles/metrics.csv")));
        assert!(!filter.should_include(Path::new("/tiles/slide.tiff")));
        assert!(!filter.should_include(Path::new("/tiles/no_extension")));
    }

    #[test]
    fn filter_excludes_hidden_by_default() {
        let filter = TileImageFilter::new();
        assert!(!filter.should_include(Path::new("/tiles/.001.png")));
        assert!(TileImageFilter::new()
            .with_hidden(true)
            .should_include(Path::new("/tiles/.001.png")));
    }

    #[test]
    fn custom_extensions_are_case_insensitive() {
        let filter = TileImageFilter::new().with_extensions(vec!["TIF".to_string()]);
        assert!(filter.should_include(Path::new("/tiles/a.tif")));
        assert!(!filter.should_include(Path::new("/tiles/a.png")));
    }
}
