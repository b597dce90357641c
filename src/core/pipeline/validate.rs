//! Spot-check validation of a registered slide pair.

use super::{elapsed_ms, format_score, load_aligned, require_positive};
use crate::core::locator::RegistrationLocation;
use crate::core::pixels::{DimensionMismatch, ImageSlideLoader, Shape, SlideLoader};
use crate::core::render::{compose, AnalysisPanel, ArtifactSink, ReportPage};
use crate::core::similarity::{MetricScores, SimilarityEngine, DEFAULT_WINDOW};
use crate::core::tile::{extract, spot_check_origins, TileOrigin};
use crate::error::QcError;
use crate::events::{
    null_sender, Event, EventSender, PipelineEvent, PipelinePhase, PipelineSummary, TileEvent,
    TileProgress, Workflow,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Tile edge used for spot checks
pub const DEFAULT_TILE_SIZE: usize = 512;

/// File name of the consolidated validation report
pub const REPORT_NAME: &str = "registration_validation.html";

/// Where results go when no output directory is given: a sibling of the
/// registration directory
pub fn default_output_dir(registration_dir: &Path) -> PathBuf {
    registration_dir
        .parent()
        .unwrap_or(registration_dir)
        .join("validation_results")
}

/// Configuration for spot-check validation
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Tile edge in pixels
    pub tile_size: usize,
    /// Stride applied to both slides after loading (1 keeps full resolution)
    pub downsample_factor: usize,
    /// SSIM window
    pub window: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            downsample_factor: 1,
            window: DEFAULT_WINDOW,
        }
    }
}

impl ValidationConfig {
    /// Check every size setting before any slide is read
    pub fn validate(&self) -> Result<(), QcError> {
        require_positive("tile size", self.tile_size)?;
        require_positive("downsample factor", self.downsample_factor)?;
        require_positive("SSIM window", self.window)
    }
}

/// One compared position
#[derive(Debug, Clone, Serialize)]
pub struct SpotCheck {
    /// 1-based position number
    pub number: usize,
    pub origin: TileOrigin,
    pub scores: MetricScores,
    pub degenerate: bool,
    pub image: PathBuf,
}

/// Outcome of a validation run
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub pair_name: String,
    pub reference_shape: Shape,
    pub marker_shape: Shape,
    pub mismatch: Option<DimensionMismatch>,
    pub checks: Vec<SpotCheck>,
    /// Positions whose tile fell outside the slides
    pub skipped: Vec<TileOrigin>,
    /// Per-metric average over `checks`
    pub average: Option<MetricScores>,
    pub duration_ms: u64,
}

/// Builder for [`Validator`]
pub struct ValidationBuilder {
    config: ValidationConfig,
    loader: Option<Box<dyn SlideLoader>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            config: ValidationConfig::default(),
            loader: None,
        }
    }

    /// Set the tile edge
    pub fn tile_size(mut self, tile_size: usize) -> Self {
        self.config.tile_size = tile_size;
        self
    }

    /// Set the downsampling stride
    pub fn downsample_factor(mut self, factor: usize) -> Self {
        self.config.downsample_factor = factor;
        self
    }

    /// Set the SSIM window
    pub fn window(mut self, window: usize) -> Self {
        self.config.window = window;
        self
    }

    /// Use a different slide loader
    pub fn loader(mut self, loader: Box<dyn SlideLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Validator {
        Validator {
            engine: SimilarityEngine::new().with_window(self.config.window),
            config: self.config,
            loader: self.loader.unwrap_or_else(|| Box::new(ImageSlideLoader::new())),
        }
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Compares the quarter, center and three-quarter tiles of a registered pair
pub struct Validator {
    config: ValidationConfig,
    loader: Box<dyn SlideLoader>,
    engine: SimilarityEngine,
}

impl Validator {
    pub fn builder() -> ValidationBuilder {
        ValidationBuilder::new()
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Run without events
    pub fn run(
        &self,
        location: &RegistrationLocation,
        sink: &mut dyn ArtifactSink,
    ) -> Result<Validation, QcError> {
        self.run_with_events(location, sink, &null_sender())
    }

    /// Run with event reporting
    pub fn run_with_events(
        &self,
        location: &RegistrationLocation,
        sink: &mut dyn ArtifactSink,
        events: &EventSender,
    ) -> Result<Validation, QcError> {
        self.config.validate()?;
        let start_time = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started {
            workflow: Workflow::Validate,
        }));

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Loading,
        }));
        let slides = load_aligned(
            self.loader.as_ref(),
            &location.he_path,
            &location.cd8_path,
            self.config.downsample_factor,
            events,
        )?;

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Comparing,
        }));
        let origins = spot_check_origins(slides.reference.width(), slides.reference.height());
        events.send(Event::Tile(TileEvent::Started {
            total: origins.len(),
        }));

        let mut checks = Vec::new();
        let mut skipped = Vec::new();

        for (i, origin) in origins.iter().copied().enumerate() {
            let number = i + 1;
            let label = format!("Tile {} at ({}, {})", number, origin.x, origin.y);
            tracing::info!(tile = number, x = origin.x, y = origin.y, "Extracting tile");

            let tiles = extract(&slides.reference, origin, self.config.tile_size).and_then(|he| {
                extract(&slides.marker, origin, self.config.tile_size).map(|cd8| (he, cd8))
            });
            let (he_tile, cd8_tile) = match tiles {
                Ok(tiles) => tiles,
                Err(e) => {
                    tracing::warn!(tile = number, error = %e, "Skipping tile");
                    events.send(Event::Tile(TileEvent::Skipped {
                        label,
                        reason: e.to_string(),
                    }));
                    skipped.push(origin);
                    continue;
                }
            };

            let outcome = self.engine.evaluate(&he_tile, &cd8_tile);
            let scores = outcome.scores();
            tracing::info!(
                tile = number,
                ssim = scores.ssim,
                mse = scores.mse,
                ncc = scores.ncc,
                "Tile metrics"
            );

            let file_name = format!("tile_{}_comparison.png", number);
            let image = sink.save_image(
                &file_name,
                &compose(&he_tile, &cd8_tile, AnalysisPanel::Overlay),
            )?;

            let mut page = ReportPage::new(label.clone())
                .with_image(file_name)
                .with_metric("SSIM", format_score(scores.ssim))
                .with_metric("MSE", format_score(scores.mse))
                .with_metric("NCC", format_score(scores.ncc))
                .with_metric("Pearson", format_score(scores.pearson))
                .with_note("Panels: H&E, CD8, overlay");
            if outcome.is_degenerate() {
                page = page.with_note("Metrics could not be computed for this tile; defaults shown");
            }
            sink.add_page(page)?;

            checks.push(SpotCheck {
                number,
                origin,
                scores,
                degenerate: outcome.is_degenerate(),
                image,
            });
            events.send(Event::Tile(TileEvent::Progress(TileProgress {
                completed: number,
                total: origins.len(),
                label,
                ssim: scores.ssim,
                degenerate: outcome.is_degenerate(),
            })));
        }

        events.send(Event::Tile(TileEvent::Completed {
            compared: checks.len(),
            skipped: skipped.len(),
        }));

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Reporting,
        }));
        let scores: Vec<MetricScores> = checks.iter().map(|c| c.scores).collect();
        let average = MetricScores::mean(&scores);
        sink.add_page(summary_page(checks.len(), average.as_ref()))?;

        let validation = Validation {
            pair_name: location.pair_name.clone(),
            reference_shape: slides.reference.shape(),
            marker_shape: slides.marker.shape(),
            mismatch: slides.mismatch,
            skipped,
            average,
            duration_ms: elapsed_ms(start_time),
            checks,
        };

        events.send(Event::Pipeline(PipelineEvent::Completed {
            summary: PipelineSummary {
                compared: validation.checks.len(),
                skipped: validation.skipped.len(),
                degenerate: validation.checks.iter().filter(|c| c.degenerate).count(),
                duration_ms: validation.duration_ms,
            },
        }));

        Ok(validation)
    }
}

fn summary_page(analyzed: usize, average: Option<&MetricScores>) -> ReportPage {
    let page = ReportPage::new("Registration Validation Summary")
        .with_metric("Tiles analyzed", analyzed.to_string());

    match average {
        Some(average) => page
            .with_metric("Average SSIM", format_score(average.ssim))
            .with_metric("Average MSE", format_score(average.mse))
            .with_metric("Average NCC", format_score(average.ncc))
            .with_metric("Average Pearson", format_score(average.pearson))
            .with_note("Individual tile metrics are shown on previous pages."),
        None => page.with_note("No tile could be extracted from the slides."),
    }
}
