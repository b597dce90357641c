//! Review of pre-tiled image pairs from two directories.

use super::{elapsed_ms, format_score};
use crate::core::matcher::{PairingMethod, TilePair, TilePairMatcher, DEFAULT_PAIR_LIMIT};
use crate::core::pixels::{ImageSlideLoader, SlideLoader};
use crate::core::render::{compose, AnalysisPanel, ArtifactSink, ReportPage};
use crate::core::similarity::{MetricScores, SimilarityEngine};
use crate::core::transform::{TransformMatrix, TransformSource};
use crate::error::QcError;
use crate::events::{
    null_sender, Event, EventSender, PipelineEvent, PipelinePhase, PipelineSummary, TileEvent,
    TileProgress, Workflow,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// File name of the consolidated pair report
pub const REPORT_NAME: &str = "tile_pairs.html";

/// Output directory name used below the slide root
pub const OUTPUT_DIR_NAME: &str = "visualizations";

#[derive(Debug, Clone)]
pub struct PairReviewConfig {
    /// Maximum number of pairs to render
    pub limit: usize,
    /// Add live metrics when both tiles have the same extent
    pub score_pairs: bool,
}

impl Default for PairReviewConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAIR_LIMIT,
            score_pairs: true,
        }
    }
}

/// A rendered tile pair
#[derive(Debug, Clone, Serialize)]
pub struct ReviewedPair {
    /// 1-based comparison number
    pub number: usize,
    pub pair: TilePair,
    /// Live scores, when the tiles could be compared
    pub scores: Option<MetricScores>,
    pub degenerate: bool,
    pub image: PathBuf,
}

/// A pair that could not be rendered
#[derive(Debug, Clone, Serialize)]
pub struct SkippedPair {
    pub pair: TilePair,
    pub reason: String,
}

/// Outcome of a tile-pair review
#[derive(Debug, Clone, Serialize)]
pub struct PairReview {
    pub transform: TransformMatrix,
    pub reviewed: Vec<ReviewedPair>,
    pub skipped: Vec<SkippedPair>,
    pub duration_ms: u64,
}

/// Pairs tiles across two directories and renders each pair
pub struct PairReviewer {
    config: PairReviewConfig,
    matcher: TilePairMatcher,
    loader: Box<dyn SlideLoader>,
    engine: SimilarityEngine,
}

impl PairReviewer {
    pub fn new(config: PairReviewConfig) -> Self {
        Self::with_loader(config, Box::new(ImageSlideLoader::new()))
    }

    pub fn with_loader(config: PairReviewConfig, loader: Box<dyn SlideLoader>) -> Self {
        Self {
            config,
            matcher: TilePairMatcher::new(),
            loader,
            engine: SimilarityEngine::new(),
        }
    }

    pub fn run(
        &self,
        he_dir: &Path,
        cd8_dir: &Path,
        transform: TransformMatrix,
        sink: &mut dyn ArtifactSink,
    ) -> Result<PairReview, QcError> {
        self.run_with_events(he_dir, cd8_dir, transform, sink, &null_sender())
    }

    pub fn run_with_events(
        &self,
        he_dir: &Path,
        cd8_dir: &Path,
        transform: TransformMatrix,
        sink: &mut dyn ArtifactSink,
        events: &EventSender,
    ) -> Result<PairReview, QcError> {
        let start_time = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started {
            workflow: Workflow::MatchTiles,
        }));

        sink.add_page(transform_page(&transform))?;

        let pairs = self.matcher.match_pairs(he_dir, cd8_dir, self.config.limit)?;
        if pairs.first().is_some_and(|p| p.method == PairingMethod::Position) {
            tracing::warn!("Tile names do not match; pairs are formed by listing order");
        }

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Comparing,
        }));
        events.send(Event::Tile(TileEvent::Started { total: pairs.len() }));

        let total = pairs.len();
        let mut reviewed = Vec::new();
        let mut skipped = Vec::new();

        for (i, pair) in pairs.into_iter().enumerate() {
            let number = i + 1;
            let label = format!("Tile Pair Comparison {}", number);

            let tiles = self
                .loader
                .load(&pair.reference)
                .and_then(|he| self.loader.load(&pair.marker).map(|cd8| (he, cd8)));
            let (he_tile, cd8_tile) = match tiles {
                Ok(tiles) => tiles,
                Err(e) => {
                    tracing::warn!(comparison = number, error = %e, "Error loading images for comparison");
                    events.send(Event::Tile(TileEvent::Skipped {
                        label,
                        reason: e.to_string(),
                    }));
                    skipped.push(SkippedPair {
                        pair,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let same_extent = (he_tile.height(), he_tile.width()) == (cd8_tile.height(), cd8_tile.width());
            let outcome = (self.config.score_pairs && same_extent)
                .then(|| self.engine.evaluate(&he_tile, &cd8_tile));
            let scores = outcome.as_ref().map(|o| o.scores());
            let degenerate = outcome.as_ref().is_some_and(|o| o.is_degenerate());

            let file_name = format!("tile_comparison_{}.png", number);
            let image = sink.save_image(&file_name, &compose(&he_tile, &cd8_tile, AnalysisPanel::None))?;
            sink.add_page(pair_page(&label, &file_name, &pair, scores.as_ref()))?;
            tracing::info!(comparison = number, path = %image.display(), "Saved comparison");

            events.send(Event::Tile(TileEvent::Progress(TileProgress {
                completed: number,
                total,
                label,
                ssim: scores.map(|s| s.ssim).unwrap_or(f64::NAN),
                degenerate,
            })));
            reviewed.push(ReviewedPair {
                number,
                pair,
                scores,
                degenerate,
                image,
            });
        }

        events.send(Event::Tile(TileEvent::Completed {
            compared: reviewed.len(),
            skipped: skipped.len(),
        }));

        let review = PairReview {
            transform,
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

fn transform_page(transform: &TransformMatrix) -> ReportPage {
    let source = match &transform.source {
        TransformSource::Stored { path, key } => format!("'{}' in {}", key, path.display()),
        TransformSource::IdentityFallback { reason } => format!("identity fallback ({})", reason),
    };

    let mut page = ReportPage::new("Registration Matrix")
        .with_metric("Shape", transform.shape_label())
        .with_metric("Type", transform.element_type.to_string())
        .with_note(format!("Source: {}", source));
    for line in transform.to_string().lines() {
        page = page.with_note(line);
    }
    page
}

fn pair_page(label: &str, file_name: &str, pair: &TilePair, scores: Option<&MetricScores>) -> ReportPage {
    let mut page = ReportPage::new(label)
        .with_image(file_name)
        .with_note(format!("H&E: {}", pair.reference.display()))
        .with_note(format!("CD8: {}", pair.marker.display()));

    if pair.method == PairingMethod::Position {
        page = page.with_note("Paired by listing position");
    }
    if let Some(scores) = scores {
        page = page
            .with_metric("SSIM", format_score(scores.ssim))
            .with_metric("NCC", format_score(scores.ncc))
            .with_metric("Pearson", format_score(scores.pearson));
    }
    page
}
