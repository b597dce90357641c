//! Stratified review of tiles listed in a metrics table.

use super::{elapsed_ms, format_score, load_aligned, require_positive};
use crate::core::pixels::{DimensionMismatch, ImageSlideLoader, SlideLoader};
use crate::core::render::{compose, AnalysisPanel, ArtifactSink, ReportPage};
use crate::core::sampler::{MetricsTable, QualityStratifiedSampler, SampledTile, DEFAULT_NUM_SAMPLES};
use crate::core::similarity::{MetricScores, SimilarityEngine, DEFAULT_WINDOW};
use crate::core::tile::{extract_at, TileGrid};
use crate::error::{ExtractError, QcError};
use crate::events::{
    null_sender, Event, EventSender, PipelineEvent, PipelinePhase, PipelineSummary, TileEvent,
    TileProgress, Workflow,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Tile edge in downsampled pixels
pub const DEFAULT_TILE_SIZE: usize = 256;

/// Stride applied to both slides after loading
pub const DEFAULT_DOWNSAMPLE: usize = 16;

/// File name of the consolidated review report
pub const REPORT_NAME: &str = "tile_review.html";

#[derive(Debug, Clone)]
pub struct TileReviewConfig {
    pub tile_size: usize,
    pub downsample_factor: usize,
    pub num_samples: usize,
    pub window: usize,
}

impl Default for TileReviewConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            downsample_factor: DEFAULT_DOWNSAMPLE,
            num_samples: DEFAULT_NUM_SAMPLES,
            window: DEFAULT_WINDOW,
        }
    }
}

impl TileReviewConfig {
    pub fn tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn downsample_factor(mut self, factor: usize) -> Self {
        self.downsample_factor = factor;
        self
    }

    pub fn num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    /// Check every size and count setting before any slide is read
    pub fn validate(&self) -> Result<(), QcError> {
        require_positive("tile size", self.tile_size)?;
        require_positive("downsample factor", self.downsample_factor)?;
        require_positive("number of samples", self.num_samples)?;
        require_positive("SSIM window", self.window)
    }
}

/// A sampled tile with its live scores
#[derive(Debug, Clone, Serialize)]
pub struct ReviewedTile {
    pub sample: SampledTile,
    pub live: MetricScores,
    pub degenerate: bool,
    pub image: PathBuf,
}

/// Outcome of a tile review
#[derive(Debug, Clone, Serialize)]
pub struct TileReview {
    pub grid: TileGrid,
    pub mismatch: Option<DimensionMismatch>,
    pub reviewed: Vec<ReviewedTile>,
    pub skipped: Vec<SampledTile>,
    pub duration_ms: u64,
}

/// Re-scores a best/worst/typical sample of a metrics table on the slides
pub struct TileReviewer {
    config: TileReviewConfig,
    loader: Box<dyn SlideLoader>,
    engine: SimilarityEngine,
}

impl TileReviewer {
    pub fn new(config: TileReviewConfig) -> Self {
        Self::with_loader(config, Box::new(ImageSlideLoader::new()))
    }

    pub fn with_loader(config: TileReviewConfig, loader: Box<dyn SlideLoader>) -> Self {
        Self {
            engine: SimilarityEngine::new().with_window(config.window),
            config,
            loader,
        }
    }

    pub fn run(
        &self,
        he_path: &Path,
        cd8_path: &Path,
        table: &MetricsTable,
        sink: &mut dyn ArtifactSink,
    ) -> Result<TileReview, QcError> {
        self.run_with_events(he_path, cd8_path, table, sink, &null_sender())
    }

    pub fn run_with_events(
        &self,
        he_path: &Path,
        cd8_path: &Path,
        table: &MetricsTable,
        sink: &mut dyn ArtifactSink,
        events: &EventSender,
    ) -> Result<TileReview, QcError> {
        self.config.validate()?;
        let start_time = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started {
            workflow: Workflow::ReviewTiles,
        }));

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Loading,
        }));
        let slides = load_aligned(
            self.loader.as_ref(),
            he_path,
            cd8_path,
            self.config.downsample_factor,
            events,
        )?;
        tracing::info!(shape = %slides.marker.shape(), "Using common dimensions");

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Sampling,
        }));
        let grid = TileGrid::for_image(&slides.marker, self.config.tile_size)?;
        if grid.cols == 0 || grid.rows == 0 {
            return Err(ExtractError::TileExceedsSlide {
                size: self.config.tile_size,
                width: slides.marker.width(),
                height: slides.marker.height(),
                downsample_factor: self.config.downsample_factor,
            }
            .into());
        }
        let samples = QualityStratifiedSampler::new(self.config.num_samples).sample(table, grid.cols)?;
        tracing::info!(
            rows = table.len(),
            grid_cols = grid.cols,
            samples = samples.len(),
            "Selected tiles for review"
        );

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Comparing,
        }));
        events.send(Event::Tile(TileEvent::Started {
            total: samples.len(),
        }));

        let total = samples.len();
        let mut reviewed = Vec::new();
        let mut skipped = Vec::new();

        for (i, sample) in samples.into_iter().enumerate() {
            let (row, col) = (sample.coordinate.row, sample.coordinate.col);
            let label = format!(
                "{} tile {} (row {}, col {})",
                sample.group.label(),
                sample.index,
                row,
                col
            );

            let tiles = extract_at(&slides.reference, row, col, self.config.tile_size).and_then(|he| {
                extract_at(&slides.marker, row, col, self.config.tile_size).map(|cd8| (he, cd8))
            });
            let (he_tile, cd8_tile) = match tiles {
                Ok(tiles) => tiles,
                Err(e) => {
                    tracing::warn!(index = sample.index, error = %e, "Skipping sampled tile");
                    events.send(Event::Tile(TileEvent::Skipped {
                        label,
                        reason: e.to_string(),
                    }));
                    skipped.push(sample);
                    continue;
                }
            };

            let outcome = self.engine.evaluate(&cd8_tile, &he_tile);
            let live = outcome.scores();

            let file_name = format!(
                "tile_comparison_idx{}_row{}_col{}.png",
                sample.index, row, col
            );
            let image = sink.save_image(
                &file_name,
                &compose(&he_tile, &cd8_tile, AnalysisPanel::Difference),
            )?;
            sink.add_page(review_page(&label, &file_name, &sample, &live))?;
            tracing::info!(path = %image.display(), "Saved comparison");

            events.send(Event::Tile(TileEvent::Progress(TileProgress {
                completed: i + 1,
                total,
                label,
                ssim: live.ssim,
                degenerate: outcome.is_degenerate(),
            })));
            reviewed.push(ReviewedTile {
                sample,
                live,
                degenerate: outcome.is_degenerate(),
                image,
            });
        }

        events.send(Event::Tile(TileEvent::Completed {
            compared: reviewed.len(),
            skipped: skipped.len(),
        }));

        let review = TileReview {
            grid,
            mismatch: slides.mismatch,
            reviewed,
            skipped,
            duration_ms: elapsed_ms(start_time),
        };

        events.send(Event::Pipeline(PipelineEvent::Completed {
            summary: PipelineSummary {
                compared: review.reviewed.len(),
                skipped: review.skipped.len(),
                degenerate: review.reviewed.iter().filter(|r| r.degenerate).count(),
                duration_ms: review.duration_ms,
            },
        }));

        Ok(review)
    }
}

fn optional_score(value: Option<f64>) -> String {
    value.map(format_score).unwrap_or_else(|| "n/a".to_string())
}

fn review_page(label: &str, file_name: &str, sample: &SampledTile, live: &MetricScores) -> ReportPage {
    let record = &sample.record;
    ReportPage::new(label)
        .with_image(file_name)
        .with_metric("SSIM (table)", format_score(record.ssim))
        .with_metric("SSIM (live)", format_score(live.ssim))
        .with_metric("NCC (table)", optional_score(record.ncc))
        .with_metric("NCC (live)", format_score(live.ncc))
        .with_metric("Pearson (live)", format_score(live.pearson))
        .with_metric("Combined (table)", format_score(record.combined_score))
        .with_note("Panels: H&E, CD8, absolute difference (single-channel pairs only)")
}

#[cfg(test)]
mod tests {
    use super::super::testing::{textured, MemoryLoader, RecordingSink};
    use super::*;
    use crate::core::sampler::{MetricRecord, SampleGroup};
    use crate::core::tile::TileCoordinate;

    fn reviewer(num_samples: usize) -> TileReviewer {
        let loader = MemoryLoader::default()
            .with("he.tiff", textured(64, 64))
            .with("cd8.tiff", textured(64, 64));
        let config = TileReviewConfig::default()
            .tile_size(16)
            .downsample_factor(1)
            .num_samples(num_samples);
        TileReviewer::with_loader(config, Box::new(loader))
    }

    fn ranked_table(n: usize) -> MetricsTable {
        MetricsTable::from_records(
            (0..n)
                .map(|i| MetricRecord::new(0.5, 0.5, i as f64 / n as f64))
                .collect(),
        )
    }

    fn run(reviewer: &TileReviewer, table: &MetricsTable, sink: &mut RecordingSink) -> Result<TileReview, QcError> {
        reviewer.run(Path::new("he.tiff"), Path::new("cd8.tiff"), table, sink)
    }

    #[test]
    fn best_worst_and_typical_are_rendered() {
        let mut sink = RecordingSink::default();
        let review = run(&reviewer(5), &ranked_table(16), &mut sink).unwrap();

        assert_eq!(review.grid.cols, 4);
        assert_eq!(review.reviewed.len(), 5);
        assert_eq!(review.reviewed[0].sample.group, SampleGroup::Best);
        assert_eq!(review.reviewed[0].sample.index, 15);
        assert_eq!(review.reviewed[1].sample.index, 0);
        assert_eq!(sink.images[0].0, "tile_comparison_idx15_row3_col3.png");
        assert_eq!(sink.images[1].0, "tile_comparison_idx0_row0_col0.png");
    }

    #[test]
    fn identical_slides_give_perfect_live_scores() {
        let review = run(&reviewer(5), &ranked_table(16), &mut RecordingSink::default()).unwrap();

        for tile in &review.reviewed {
            assert!((tile.live.ssim - 1.0).abs() < 1e-9);
            assert!((tile.live.ncc - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn single_channel_pairs_get_difference_panel() {
        let mut sink = RecordingSink::default();
        run(&reviewer(1), &ranked_table(4), &mut sink).unwrap();

        assert_eq!(sink.images[0].1, (16 * 3 + 16, 16));
    }

    #[test]
    fn index_past_grid_clamps_to_edge_tile() {
        let table = MetricsTable::from_records(vec![MetricRecord::new(0.1, 0.1, 0.1).with_index(40)]);
        let review = run(&reviewer(5), &table, &mut RecordingSink::default()).unwrap();

        assert_eq!(review.reviewed.len(), 1);
        assert_eq!(review.reviewed[0].sample.coordinate, TileCoordinate::new(10, 0));
    }

    #[test]
    fn tile_larger_than_slide_names_both_sizes() {
        let loader = MemoryLoader::default()
            .with("he.tiff", textured(24, 8))
            .with("cd8.tiff", textured(24, 8));
        let config = TileReviewConfig::default().tile_size(16).downsample_factor(1);
        let reviewer = TileReviewer::with_loader(config, Box::new(loader));
        let mut sink = RecordingSink::default();

        let error = run(&reviewer, &ranked_table(3), &mut sink).unwrap_err();

        assert!(matches!(
            error,
            QcError::Extract(ExtractError::TileExceedsSlide {
                size: 16,
                width: 8,
                height: 24,
                downsample_factor: 1,
            })
        ));
        let message = error.to_string();
        assert!(message.contains("Tile size 16"));
        assert!(message.contains("8x24"));
        assert!(sink.images.is_empty());
    }

    #[test]
    fn zero_settings_are_rejected_before_loading() {
        let reviewer = TileReviewer::with_loader(
            TileReviewConfig::default().num_samples(0),
            Box::new(MemoryLoader::default()),
        );

        let error = run(&reviewer, &ranked_table(3), &mut RecordingSink::default()).unwrap_err();

        assert!(matches!(error, QcError::Config(_)));
        assert!(error.to_string().contains("number of samples"));
        assert!(TileReviewConfig::default().tile_size(0).validate().is_err());
        assert!(TileReviewConfig::default().downsample_factor(0).validate().is_err());
        assert!(TileReviewConfig::default().validate().is_ok());
    }

    #[test]
    fn pages_show_table_and_live_scores() {
        let mut sink = RecordingSink::default();
        run(&reviewer(1), &ranked_table(4), &mut sink).unwrap();

        let labels: Vec<&str> = sink.pages[0].metrics.iter().map(|(l, _)| l.as_str()).collect();
        assert!(labels.contains(&"SSIM (table)"));
        assert!(labels.contains(&"SSIM (live)"));
        assert!(labels.contains(&"Combined (table)"));
    }
}
