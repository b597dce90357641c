//! # Pipeline Module
//!
//! Orchestrates the quality-check workflows.
//!
//! ## Workflows
//! 1. **Validate** - spot-check three fixed positions of a registered pair
//! 2. **Review tiles** - re-score a stratified sample from a metrics table
//! 3. **Match tiles** - compare pre-tiled images from two directories
//! 4. **Register** - drive an external registration engine with guaranteed cleanup
//!
//! Every workflow is synchronous. Comparison images and report pages go to
//! an [`ArtifactSink`](crate::core::render::ArtifactSink) owned by the caller,
//! who finishes it on success and drops it otherwise.

mod pairs;
mod registration;
mod review;
mod validate;

pub use pairs::{
    PairReview, PairReviewConfig, PairReviewer, ReviewedPair, SkippedPair,
    OUTPUT_DIR_NAME as PAIR_OUTPUT_DIR, REPORT_NAME as PAIR_REPORT,
};
pub use registration::{
    register, register_pair, RegistrationEngine, RegistrationOutput, RegistrationRequest, EVALUATION_DIR,
    RESULTS_DIR,
};
pub use review::{
    ReviewedTile, TileReview, TileReviewConfig, TileReviewer, REPORT_NAME as REVIEW_REPORT,
};
pub use validate::{
    default_output_dir, SpotCheck, Validation, ValidationBuilder, ValidationConfig, Validator,
    REPORT_NAME as VALIDATION_REPORT,
};

use crate::core::pixels::{align_extents, AlignedPair, SlideLoader};
use crate::error::{LoadError, QcError};
use crate::events::{Event, EventSender, LoadEvent};
use std::path::Path;
use std::time::Instant;

/// Load both slides with the same stride and clip them to a common extent
pub(crate) fn load_aligned(
    loader: &dyn SlideLoader,
    reference: &Path,
    marker: &Path,
    downsample_factor: usize,
    events: &EventSender,
) -> Result<AlignedPair, LoadError> {
    let load = |path: &Path| -> Result<_, LoadError> {
        events.send(Event::Load(LoadEvent::Started {
            path: path.to_path_buf(),
        }));
        let slide = loader.load_downsampled(path, downsample_factor)?;
        events.send(Event::Load(LoadEvent::Loaded {
            path: path.to_path_buf(),
            shape: slide.shape().to_string(),
        }));
        Ok(slide)
    };

    let reference = load(reference)?;
    let marker = load(marker)?;
    let aligned = align_extents(&reference, &marker);

    if let Some(mismatch) = &aligned.mismatch {
        let extent = |(h, w): (usize, usize)| format!("({}, {})", h, w);
        events.send(Event::Load(LoadEvent::DimensionMismatch {
            reference: extent(mismatch.reference),
            marker: extent(mismatch.marker),
            common: extent(mismatch.common),
        }));
    }

    Ok(aligned)
}

/// Reject a zero-valued size or count setting
pub(crate) fn require_positive(setting: &str, value: usize) -> Result<(), QcError> {
    if value == 0 {
        return Err(QcError::Config(format!("{} must be at least 1", setting)));
    }
    Ok(())
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Score with four decimals, as shown in reports
pub(crate) fn format_score(value: f64) -> String {
    format!("{:.4}", value)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for workflow tests.

    use crate::core::pixels::{PixelArray, SlideLoader};
    use crate::core::render::{ArtifactSink, ReportPage};
    use crate::error::{LoadError, ReportError};
    use image::RgbImage;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    /// Serves in-memory slides keyed by path
    #[derive(Default)]
    pub struct MemoryLoader {
        pub slides: HashMap<PathBuf, PixelArray>,
    }

    impl MemoryLoader {
        pub fn with(mut self, path: &str, slide: PixelArray) -> Self {
            self.slides.insert(PathBuf::from(path), slide);
            self
        }
    }

    impl SlideLoader for MemoryLoader {
        fn load(&self, path: &Path) -> Result<PixelArray, LoadError> {
            self.slides
                .get(path)
                .cloned()
                .ok_or_else(|| LoadError::PathNotFound {
                    path: path.to_path_buf(),
                })
        }
    }

    /// Records what a workflow emitted
    #[derive(Default)]
    pub struct RecordingSink {
        pub images: Vec<(String, (u32, u32))>,
        pub pages: Vec<ReportPage>,
    }

    impl ArtifactSink for RecordingSink {
        fn save_image(&mut self, file_name: &str, image: &RgbImage) -> Result<PathBuf, ReportError> {
            self.images.push((file_name.to_string(), image.dimensions()));
            Ok(PathBuf::from(file_name))
        }

        fn add_page(&mut self, page: ReportPage) -> Result<(), ReportError> {
            self.pages.push(page);
            Ok(())
        }
    }

    pub fn textured(height: usize, width: usize) -> PixelArray {
        PixelArray::gray_from_fn(height, width, |y, x| ((x * 31 + y * 17 + (x * y) % 13) % 256) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{textured, MemoryLoader};
    use super::*;
    use crate::events::{null_sender, EventChannel};

    #[test]
    fn load_aligned_clips_and_reports_mismatch() {
        let loader = MemoryLoader::default()
            .with("he.tiff", textured(40, 60))
            .with("cd8.tiff", textured(50, 30));
        let (sender, receiver) = EventChannel::new();

        let aligned = load_aligned(&loader, Path::new("he.tiff"), Path::new("cd8.tiff"), 1, &sender).unwrap();
        drop(sender);

        assert_eq!((aligned.reference.height(), aligned.reference.width()), (40, 30));
        assert_eq!((aligned.marker.height(), aligned.marker.width()), (40, 30));
        assert!(receiver
            .iter()
            .any(|e| matches!(e, Event::Load(LoadEvent::DimensionMismatch { .. }))));
    }

    #[test]
    fn load_aligned_applies_stride() {
        let loader = MemoryLoader::default()
            .with("he.tiff", textured(64, 64))
            .with("cd8.tiff", textured(64, 64));

        let aligned =
            load_aligned(&loader, Path::new("he.tiff"), Path::new("cd8.tiff"), 16, &null_sender()).unwrap();

        assert_eq!(aligned.reference.height(), 4);
        assert!(aligned.mismatch.is_none());
    }

    #[test]
    fn missing_slide_is_path_not_found() {
        let loader = MemoryLoader::default().with("he.tiff", textured(8, 8));
        let result = load_aligned(&loader, Path::new("he.tiff"), Path::new("missing.tiff"), 1, &null_sender());

        assert!(matches!(result, Err(LoadError::PathNotFound { .. })));
    }

    #[test]
    fn scores_have_four_decimals() {
        assert_eq!(format_score(0.123456), "0.1235");
    }
}
