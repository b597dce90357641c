//! # CLI Module
//!
//! Command-line interface for slide registration quality checks.
//!
//! ## Usage
//! ```bash
//! # List the slide pairs described by a storage file tree
//! reg-qc pairs --tree wasabi_file_tree.json
//!
//! # Spot-check a registered pair
//! reg-qc validate --tree wasabi_file_tree.json --pair Pair_03
//!
//! # Re-score best/worst/typical tiles from a metrics table
//! reg-qc review-tiles --he-slide he.tiff --cd8-slide cd8.tiff \
//!     --metrics tile_metrics.csv --output-dir review
//!
//! # Compare pre-tiled images, JSON output
//! reg-qc match-tiles --base-dir ~/slides --output json
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use slide_registration_qc::core::locator::{
    default_base_dir, resolve_validation_inputs, select_pair, FileTreeNode, SlidePairLocator,
    TileReviewPaths, ValidationInputs,
};
use slide_registration_qc::core::pipeline::{
    default_output_dir, PairReview, PairReviewConfig, PairReviewer, TileReview, TileReviewConfig,
    TileReviewer, Validation, Validator, PAIR_OUTPUT_DIR, PAIR_REPORT, REVIEW_REPORT,
    VALIDATION_REPORT,
};
use slide_registration_qc::core::render::HtmlReportSink;
use slide_registration_qc::core::sampler::MetricsTable;
use slide_registration_qc::core::similarity::MetricScores;
use slide_registration_qc::core::transform::{load_transform, TransformMatrix};
use slide_registration_qc::error::{LocateError, QcError, Result};
use slide_registration_qc::events::{
    Event, EventChannel, EventSender, LoadEvent, PipelineEvent, TileEvent,
};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

/// Slide Registration QC - check how well two stains line up
#[derive(Parser, Debug)]
#[command(name = "reg-qc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the slide pairs found in a file tree description
    Pairs {
        /// File tree JSON (name / type / children)
        #[arg(long)]
        tree: PathBuf,

        /// Show only this pair (1-based)
        #[arg(long)]
        pair_index: Option<usize>,
    },

    /// Spot-check a registered pair at three fixed positions
    Validate(ValidateArgs),

    /// Re-score a best/worst/typical sample of a metrics table
    ReviewTiles(ReviewArgs),

    /// Compare pre-tiled images from two directories
    MatchTiles(MatchArgs),

    /// Show the shape and type of a registration transform
    Transform {
        /// Transform artifact (JSON)
        path: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Directory holding the registered slides
    #[arg(long)]
    registration_dir: Option<PathBuf>,

    /// Registered H&E slide
    #[arg(long)]
    he_path: Option<PathBuf>,

    /// Registered CD8 slide
    #[arg(long)]
    cd8_path: Option<PathBuf>,

    /// File tree JSON used to find the registration directory
    #[arg(long)]
    tree: Option<PathBuf>,

    /// Pair directory name to look up in the tree
    #[arg(long)]
    pair: Option<String>,

    /// Where to write comparisons and the report
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Tile edge in pixels
    #[arg(long, default_value = "512")]
    tile_size: usize,
}

#[derive(Args, Debug)]
struct ReviewArgs {
    /// Registered H&E slide
    #[arg(long)]
    he_slide: PathBuf,

    /// Registered CD8 slide
    #[arg(long)]
    cd8_slide: PathBuf,

    /// Tile metrics table (CSV or JSON)
    #[arg(long)]
    metrics: PathBuf,

    /// Where to write comparisons and the report
    #[arg(long)]
    output_dir: PathBuf,

    /// Tile edge in downsampled pixels
    #[arg(long, default_value = "256")]
    tile_size: usize,

    /// Stride applied to both slides after loading
    #[arg(long, default_value = "16")]
    downsample: usize,

    /// Number of tiles to review
    #[arg(long, default_value = "5")]
    num_samples: usize,
}

#[derive(Args, Debug)]
struct MatchArgs {
    /// Slide root searched for tiles and the transform (default: ~/WSI slides)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// H&E tile directory
    #[arg(long)]
    he_tiles: Option<PathBuf>,

    /// CD8 tile directory
    #[arg(long)]
    cd8_tiles: Option<PathBuf>,

    /// Registration transform artifact
    #[arg(long)]
    matrix: Option<PathBuf>,

    /// Where to write comparisons and the report
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of pairs to render
    #[arg(long, default_value = "5")]
    limit: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (paths only)
    Minimal,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    slide_registration_qc::init_tracing(cli.verbose);

    let term = Term::stderr();
    if matches!(cli.output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Slide Registration QC").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    match cli.command {
        Commands::Pairs { tree, pair_index } => run_pairs(&tree, pair_index, cli.output),
        Commands::Validate(args) => run_validate(args, cli.output, cli.verbose),
        Commands::ReviewTiles(args) => run_review(args, cli.output, cli.verbose),
        Commands::MatchTiles(args) => run_match(args, cli.output, cli.verbose),
        Commands::Transform { path } => {
            let transform = load_transform(path.as_deref());
            match cli.output {
                OutputFormat::Pretty => print_transform(&term, &transform),
                OutputFormat::Json => print_json(&transform),
                OutputFormat::Minimal => println!("{} {}", transform.shape_label(), transform.element_type),
            }
            Ok(())
        }
    }
}

/// Print a fatal error, naming the missing resource when there is one
pub fn report_error(error: &QcError) {
    let term = Term::stderr();
    let label = if error.is_path_not_found() {
        "Missing input:"
    } else {
        "Error:"
    };
    term.write_line(&format!("{} {}", style(label).red().bold(), error))
        .ok();
}

fn run_pairs(tree_path: &Path, pair_index: Option<usize>, output: OutputFormat) -> Result<()> {
    let tree = FileTreeNode::load(tree_path)?;
    let pairs = SlidePairLocator::new().enumerate_pairs(&tree);

    let shown = match pair_index {
        Some(index) => vec![select_pair(&pairs, index)?.clone()],
        None => pairs,
    };

    match output {
        OutputFormat::Pretty => {
            let term = Term::stdout();
            term.write_line(&format!(
                "{} {} slide pairs",
                style("✓").green().bold(),
                style(shown.len()).cyan()
            ))
            .ok();
            term.write_line("").ok();
            for (i, pair) in shown.iter().enumerate() {
                let number = pair_index.unwrap_or(i + 1);
                term.write_line(&format!("  {} {}", style(format!("{}.", number)).bold(), pair.pair_name))
                    .ok();
                term.write_line(&format!("     {} {}", style("H&E:").dim(), pair.he_path.display()))
                    .ok();
                term.write_line(&format!("     {} {}", style("CD8:").dim(), pair.cd8_path.display()))
                    .ok();
            }
        }
        OutputFormat::Json => print_json(&shown),
        OutputFormat::Minimal => {
            for pair in &shown {
                println!("{}\t{}\t{}", pair.pair_name, pair.he_path.display(), pair.cd8_path.display());
            }
        }
    }
    Ok(())
}

fn run_validate(args: ValidateArgs, output: OutputFormat, verbose: bool) -> Result<()> {
    let location = resolve_validation_inputs(&ValidationInputs {
        registration_dir: args.registration_dir,
        he_path: args.he_path,
        cd8_path: args.cd8_path,
        tree_path: args.tree,
        pair_name: args.pair,
    })?;
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| default_output_dir(&location.registration_dir));

    let validator = Validator::builder().tile_size(args.tile_size).build();
    let mut sink = HtmlReportSink::create(&output_dir, VALIDATION_REPORT, "Registration Validation")?;

    let progress = ProgressListener::spawn(output, verbose);
    let result = validator.run_with_events(&location, &mut sink, progress.sender());
    progress.finish();

    let validation = result?;
    let report = sink.finish()?;

    match output {
        OutputFormat::Pretty => print_validation(&Term::stdout(), &validation, &report),
        OutputFormat::Json => print_json(&serde_json::json!({
            "report": report,
            "validation": validation,
        })),
        OutputFormat::Minimal => print_paths(validation.checks.iter().map(|c| c.image.as_path()), &report),
    }
    Ok(())
}

fn run_review(args: ReviewArgs, output: OutputFormat, verbose: bool) -> Result<()> {
    let table = MetricsTable::load(&args.metrics)?;
    tracing::info!(rows = table.len(), path = %args.metrics.display(), "Loaded metrics table");

    let config = TileReviewConfig::default()
        .tile_size(args.tile_size)
        .downsample_factor(args.downsample)
        .num_samples(args.num_samples);
    let reviewer = TileReviewer::new(config);
    let mut sink = HtmlReportSink::create(&args.output_dir, REVIEW_REPORT, "Tile Review")?;

    let progress = ProgressListener::spawn(output, verbose);
    let result = reviewer.run_with_events(&args.he_slide, &args.cd8_slide, &table, &mut sink, progress.sender());
    progress.finish();

    let review = result?;
    let report = sink.finish()?;

    match output {
        OutputFormat::Pretty => print_review(&Term::stdout(), &review, &report),
        OutputFormat::Json => print_json(&serde_json::json!({
            "report": report,
            "review": review,
        })),
        OutputFormat::Minimal => print_paths(review.reviewed.iter().map(|r| r.image.as_path()), &report),
    }
    Ok(())
}

fn run_match(args: MatchArgs, output: OutputFormat, verbose: bool) -> Result<()> {
    let base_dir = match args.base_dir {
        Some(dir) => dir,
        None => default_base_dir(&dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))),
    };
    let found = TileReviewPaths::resolve(&base_dir);

    let he_dir = args
        .he_tiles
        .or(found.he_tiles)
        .ok_or_else(|| missing("H&E tile directory", &base_dir.join("he_tiles")))?;
    let cd8_dir = args
        .cd8_tiles
        .or(found.cd8_tiles)
        .ok_or_else(|| missing("CD8 tile directory", &base_dir.join("cd8_tiles")))?;
    let transform = load_transform(args.matrix.or(found.matrix).as_deref());
    let output_dir = args.output_dir.unwrap_or_else(|| base_dir.join(PAIR_OUTPUT_DIR));

    let reviewer = PairReviewer::new(PairReviewConfig {
        limit: args.limit,
        ..Default::default()
    });
    let mut sink = HtmlReportSink::create(&output_dir, PAIR_REPORT, "Tile Pair Review")?;

    let progress = ProgressListener::spawn(output, verbose);
    let result = reviewer.run_with_events(&he_dir, &cd8_dir, transform, &mut sink, progress.sender());
    progress.finish();

    let review = result?;
    let report = sink.finish()?;

    match output {
        OutputFormat::Pretty => print_pair_review(&Term::stdout(), &review, &report),
        OutputFormat::Json => print_json(&serde_json::json!({
            "report": report,
            "review": review,
        })),
        OutputFormat::Minimal => print_paths(review.reviewed.iter().map(|r| r.image.as_path()), &report),
    }
    Ok(())
}

fn missing(what: &'static str, path: &Path) -> QcError {
    LocateError::PathNotFound {
        what,
        path: path.to_path_buf(),
    }
    .into()
}

/// Drains workflow events on a separate thread and drives a progress bar
struct ProgressListener {
    sender: EventSender,
    handle: JoinHandle<()>,
}

impl ProgressListener {
    fn spawn(output: OutputFormat, verbose: bool) -> Self {
        let (sender, receiver) = EventChannel::new();

        let progress = matches!(output, OutputFormat::Pretty).then(|| {
            let pb = ProgressBar::new(0);
            if let Ok(bar_style) =
                ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(bar_style.progress_chars("█▓░"));
            }
            pb
        });

        let handle = thread::spawn(move || {
            for event in receiver.iter() {
                let Some(pb) = progress.as_ref() else {
                    continue;
                };
                match event {
                    Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                        pb.set_message(format!("{}", phase));
                    }
                    Event::Load(LoadEvent::Started { path }) if verbose => {
                        pb.set_message(format!(
                            "loading {}",
                            path.file_name().unwrap_or_default().to_string_lossy()
                        ));
                    }
                    Event::Load(LoadEvent::DimensionMismatch {
                        reference,
                        marker,
                        common,
                    }) => {
                        pb.println(format!(
                            "  {} slides differ in size: {} vs {}, using {}",
                            style("!").yellow().bold(),
                            reference,
                            marker,
                            common
                        ));
                    }
                    Event::Tile(TileEvent::Started { total }) => {
                        pb.set_length(total as u64);
                    }
                    Event::Tile(TileEvent::Progress(p)) => {
                        pb.set_position(p.completed as u64);
                        if verbose {
                            pb.set_message(format!("{} (SSIM {:.4})", p.label, p.ssim));
                        }
                    }
                    Event::Tile(TileEvent::Skipped { label, reason }) => {
                        pb.inc(1);
                        if verbose {
                            pb.println(format!("  {} {}: {}", style("-").dim(), label, reason));
                        }
                    }
                    Event::Pipeline(PipelineEvent::Completed { .. }) => {
                        pb.finish_and_clear();
                    }
                    _ => {}
                }
            }
            if let Some(pb) = progress {
                pb.finish_and_clear();
            }
        });

        Self { sender, handle }
    }

    fn sender(&self) -> &EventSender {
        &self.sender
    }

    /// Close the channel and wait for the listener to drain it
    fn finish(self) {
        drop(self.sender);
        self.handle.join().ok();
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to serialize results"),
    }
}

fn print_paths<'a>(images: impl Iterator<Item = &'a Path>, report: &Path) {
    for image in images {
        println!("{}", image.display());
    }
    println!("{}", report.display());
}

fn score_line(scores: &MetricScores) -> String {
    format!(
        "SSIM {}  MSE {}  NCC {}  Pearson {}",
        style(format!("{:.4}", scores.ssim)).cyan(),
        style(format!("{:.4}", scores.mse)).cyan(),
        style(format!("{:.4}", scores.ncc)).cyan(),
        style(format!("{:.4}", scores.pearson)).cyan()
    )
}

fn print_header(term: &Term, title: &str, duration_ms: u64) {
    term.write_line(&format!(
        "{} {} in {:.1}s",
        style("✓").green().bold(),
        title,
        duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line("").ok();
}

fn print_footer(term: &Term, report: &Path) {
    term.write_line("").ok();
    term.write_line(&format!("  {} {}", style("Report:").bold(), report.display()))
        .ok();
}

fn degenerate_tag(degenerate: bool) -> String {
    if degenerate {
        style(" (degenerate)").yellow().to_string()
    } else {
        String::new()
    }
}

fn print_validation(term: &Term, validation: &Validation, report: &Path) {
    print_header(term, "Validation Complete", validation.duration_ms);

    if !validation.pair_name.is_empty() {
        term.write_line(&format!("  Pair: {}", style(&validation.pair_name).bold()))
            .ok();
    }
    term.write_line(&format!(
        "  H&E {}  CD8 {}",
        style(validation.reference_shape).dim(),
        style(validation.marker_shape).dim()
    ))
    .ok();
    if let Some(mismatch) = &validation.mismatch {
        term.write_line(&format!(
            "  {} compared on the common extent {:?}",
            style("!").yellow().bold(),
            mismatch.common
        ))
        .ok();
    }
    term.write_line("").ok();

    for check in &validation.checks {
        term.write_line(&format!(
            "  {} at ({}, {}): {}{}",
            style(format!("Tile {}", check.number)).bold(),
            check.origin.x,
            check.origin.y,
            score_line(&check.scores),
            degenerate_tag(check.degenerate)
        ))
        .ok();
    }
    for origin in &validation.skipped {
        term.write_line(&format!(
            "  {} tile at ({}, {}) is outside the slide",
            style("-").dim(),
            origin.x,
            origin.y
        ))
        .ok();
    }

    if let Some(average) = &validation.average {
        term.write_line("").ok();
        term.write_line(&format!("  {} {}", style("Average:").bold(), score_line(average)))
            .ok();
    }
    print_footer(term, report);
}

fn print_review(term: &Term, review: &TileReview, report: &Path) {
    print_header(term, "Tile Review Complete", review.duration_ms);

    term.write_line(&format!(
        "  Grid: {} x {} tiles of {} px",
        style(review.grid.rows).cyan(),
        style(review.grid.cols).cyan(),
        review.grid.tile_size
    ))
    .ok();
    term.write_line("").ok();

    for tile in &review.reviewed {
        let sample = &tile.sample;
        term.write_line(&format!(
            "  {} {} (row {}, col {}): table SSIM {:.4}, live {}{}",
            style(format!("{:>7}", sample.group.label())).yellow(),
            sample.index,
            sample.coordinate.row,
            sample.coordinate.col,
            sample.record.ssim,
            score_line(&tile.live),
            degenerate_tag(tile.degenerate)
        ))
        .ok();
    }
    if !review.skipped.is_empty() {
        term.write_line(&format!(
            "  {} {} sampled tiles could not be extracted",
            style("-").dim(),
            review.skipped.len()
        ))
        .ok();
    }
    print_footer(term, report);
}

fn print_pair_review(term: &Term, review: &PairReview, report: &Path) {
    print_header(term, "Tile Pair Review Complete", review.duration_ms);
    print_transform(term, &review.transform);
    term.write_line("").ok();

    for pair in &review.reviewed {
        let names = format!(
            "{} / {}",
            pair.pair.reference.file_name().unwrap_or_default().to_string_lossy(),
            pair.pair.marker.file_name().unwrap_or_default().to_string_lossy()
        );
        let scores = pair
            .scores
            .as_ref()
            .map(score_line)
            .unwrap_or_else(|| style("sizes differ, not scored").dim().to_string());
        term.write_line(&format!(
            "  {} {}: {}{}",
            style(format!("Pair {}", pair.number)).bold(),
            names,
            scores,
            degenerate_tag(pair.degenerate)
        ))
        .ok();
    }
    for skipped in &review.skipped {
        term.write_line(&format!(
            "  {} {}: {}",
            style("-").dim(),
            skipped.pair.marker.display(),
            skipped.reason
        ))
        .ok();
    }
    print_footer(term, report);
}

fn print_transform(term: &Term, transform: &TransformMatrix) {
    let origin = if transform.is_fallback() {
        style("identity fallback").yellow().to_string()
    } else {
        style("stored").green().to_string()
    };
    term.write_line(&format!(
        "  {} shape {} {} ({})",
        style("Transform:").bold(),
        transform.shape_label(),
        transform.element_type,
        origin
    ))
    .ok();
    for line in transform.to_string().lines() {
        term.write_line(&format!("    {}", line)).ok();
    }
}
