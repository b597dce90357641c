//! # Core Module
//!
//! The presentation-agnostic quality-check engine.
//!
//! ## Modules
//! - `pixels` - Pixel arrays, slide loading and extent alignment
//! - `tile` - Bounds-checked tile extraction and grid geometry
//! - `similarity` - SSIM, MSE, NCC and Pearson between tile pairs
//! - `locator` - Finds slide pairs in a file tree and on disk
//! - `matcher` - Pairs pre-tiled images from two directories
//! - `sampler` - Metrics tables and best/worst/typical sampling
//! - `transform` - Reads registration transform artifacts
//! - `render` - Comparison composites and the HTML report
//! - `pipeline` - Orchestrates the workflows

pub mod locator;
pub mod matcher;
pub mod pipeline;
pub mod pixels;
pub mod render;
pub mod sampler;
pub mod similarity;
pub mod tile;
pub mod transform;

// Re-export commonly used types
pub use locator::{RegistrationLocation, SlidePair};
pub use pixels::{ChannelLayout, PixelArray};
pub use sampler::{MetricRecord, MetricsTable};
pub use similarity::{MetricScores, SimilarityEngine};
pub use tile::{TileCoordinate, TileOrigin};
