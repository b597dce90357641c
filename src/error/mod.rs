//! # Error Module
//!
//! Error taxonomy for registration quality checks.
//!
//! ## Design Principles
//! - **Fatal vs. recoverable** - only missing inputs and unreadable slides stop a run;
//!   out-of-bounds tiles, mismatched extents, degenerate metrics and malformed tree
//!   nodes are recovered where they occur and logged as warnings
//! - **Include context** - paths, coordinates, shapes
//! - **Never panic** on user data - return errors instead

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum QcError {
    #[error("{0}")]
    Locate(#[from] LocateError),

    #[error("Slide loading error: {0}")]
    Load(#[from] LoadError),

    #[error("Tile extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Metrics table error: {0}")]
    Table(#[from] TableError),

    #[error("Report generation error: {0}")]
    Report(#[from] ReportError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QcError {
    /// Whether this error means a required input is missing or could not be determined
    pub fn is_path_not_found(&self) -> bool {
        matches!(
            self,
            QcError::Locate(LocateError::PathNotFound { .. } | LocateError::Unresolved(_))
                | QcError::Load(LoadError::PathNotFound { .. })
                | QcError::Table(TableError::PathNotFound { .. })
        )
    }
}

/// Errors that occur while resolving slide and tile locations
#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Required {what} not found: {path}")]
    PathNotFound { what: &'static str, path: PathBuf },

    #[error("Unable to determine slide paths: {0}")]
    Unresolved(String),

    #[error("Failed to read file tree {path}: {source}")]
    ReadTree {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File tree {path} is not valid JSON: {reason}")]
    TreeParse { path: PathBuf, reason: String },

    #[error("Pair index {index} out of range. Found {available} pairs.")]
    PairIndexOutOfRange { index: usize, available: usize },

    #[error("Failed to list directory {path}: {reason}")]
    ReadDirectory { path: PathBuf, reason: String },
}

/// Errors that occur while loading a slide into memory
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Slide not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("Failed to decode slide {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Slide {path} has no pixels")]
    Empty { path: PathBuf },

    #[error("Pixel buffer of {actual} samples does not match shape {height}x{width}x{channels}")]
    ShapeMismatch {
        height: usize,
        width: usize,
        channels: usize,
        actual: usize,
    },

    #[error("Downsample factor must be at least 1")]
    InvalidDownsample,
}

/// Errors that occur while extracting tiles
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error(
        "Tile at ({x}, {y}) with size {size} exceeds image bounds {width}x{height}"
    )]
    OutOfBounds {
        x: usize,
        y: usize,
        size: usize,
        width: usize,
        height: usize,
    },

    #[error("Tile size must be positive")]
    InvalidTileSize,

    #[error(
        "Tile size {size} exceeds the {width}x{height} slide at downsample factor {downsample_factor}"
    )]
    TileExceedsSlide {
        size: usize,
        width: usize,
        height: usize,
        downsample_factor: usize,
    },
}

/// Reasons a similarity metric could not be computed.
///
/// These never reach [`QcError`]: the similarity engine maps every variant
/// to the fixed degenerate scores and logs a warning.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("Tile shapes differ: {a_height}x{a_width} vs {b_height}x{b_width}")]
    ShapeMismatch {
        a_height: usize,
        a_width: usize,
        b_height: usize,
        b_width: usize,
    },

    #[error("Tile has zero intensity range")]
    ZeroRange,

    #[error("Tile has zero variance")]
    ZeroVariance,

    #[error("Tile {height}x{width} is smaller than the {window}x{window} SSIM window")]
    TooSmall {
        height: usize,
        width: usize,
        window: usize,
    },

    #[error("Metric {metric} is not finite")]
    NonFinite { metric: &'static str },
}

/// Errors that occur while reading a metrics table
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Metrics table not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("Failed to read metrics table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metrics table is missing required column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("Invalid value '{value}' in column '{column}' on line {line}")]
    InvalidValue {
        line: usize,
        column: String,
        value: String,
    },

    #[error("Line {line} has {found} fields but the header has {expected}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Failed to parse metrics table: {0}")]
    Parse(String),

    #[error("Grid width must be positive")]
    ZeroGridWidth,
}

/// Errors that occur during report and artifact generation
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode image {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
}

/// Errors raised by an external registration engine
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Registration engine failed: {0}")]
    Engine(String),

    #[error("Failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, QcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_not_found_names_resource() {
        let error = LocateError::PathNotFound {
            what: "file tree",
            path: PathBuf::from("/data/wasabi_file_tree.json"),
        };
        let message = error.to_string();
        assert!(message.contains("file tree"));
        assert!(message.contains("/data/wasabi_file_tree.json"));
    }

    #[test]
    fn out_of_bounds_includes_geometry() {
        let error = ExtractError::OutOfBounds {
            x: 900,
            y: 10,
            size: 512,
            width: 1024,
            height: 1024,
        };
        let message = error.to_string();
        assert!(message.contains("(900, 10)"));
        assert!(message.contains("1024x1024"));
    }

    #[test]
    fn pair_index_error_reports_available_count() {
        let error = LocateError::PairIndexOutOfRange {
            index: 7,
            available: 3,
        };
        assert!(error.to_string().contains("Found 3 pairs"));
    }

    #[test]
    fn path_not_found_is_detected_across_areas() {
        let locate: QcError = LocateError::PathNotFound {
            what: "slide",
            path: PathBuf::from("/x"),
        }
        .into();
        let load: QcError = LoadError::PathNotFound {
            path: PathBuf::from("/x"),
        }
        .into();
        let config = QcError::Config("tile size must be at least 1".to_string());

        assert!(locate.is_path_not_found());
        assert!(load.is_path_not_found());
        assert!(!config.is_path_not_found());
    }
}
