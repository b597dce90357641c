//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the quality-check workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Slide loading events
    Load(LoadEvent),
    /// Tile comparison events
    Tile(TileEvent),
    /// Registration driver events
    Registration(RegistrationEvent),
    /// Pipeline-level events
    Pipeline(PipelineEvent),
}

/// Events while reading slides into memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoadEvent {
    /// Started reading a slide
    Started { path: PathBuf },
    /// Slide is in memory, after any downsampling
    Loaded { path: PathBuf, shape: String },
    /// The two slides differ in extent and were clipped
    DimensionMismatch {
        reference: String,
        marker: String,
        common: String,
    },
}

/// Events while comparing tile pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TileEvent {
    /// Comparison has started
    Started { total: usize },
    /// One pair was scored and rendered
    Progress(TileProgress),
    /// A pair could not be compared; the batch continues
    Skipped { label: String, reason: String },
    /// All pairs processed
    Completed { compared: usize, skipped: usize },
}

/// Progress information during tile comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileProgress {
    /// Pairs processed so far, including skipped ones
    pub completed: usize,
    /// Total pairs in this run
    pub total: usize,
    /// Human-readable tile label
    pub label: String,
    /// Live SSIM of this pair
    pub ssim: f64,
    /// Whether the scores fell back to the degenerate defaults
    pub degenerate: bool,
}

/// Events from the registration driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistrationEvent {
    /// Engine invoked for a pair
    Started { pair_name: String },
    /// Engine produced its outputs
    Completed {
        pair_name: String,
        output_dir: PathBuf,
    },
    /// Engine resources released
    CleanedUp,
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Pipeline has started
    Started { workflow: Workflow },
    /// Moving to a new phase
    PhaseChanged { phase: PipelinePhase },
    /// Pipeline completed successfully
    Completed { summary: PipelineSummary },
    /// Pipeline encountered a fatal error
    Error { message: String },
}

/// Which workflow is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Workflow {
    Validate,
    ReviewTiles,
    MatchTiles,
    Register,
}

/// Phases of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Loading,
    Sampling,
    Comparing,
    Reporting,
    Registering,
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Tile pairs scored
    pub compared: usize,
    /// Tile pairs skipped
    pub skipped: usize,
    /// Pairs that fell back to degenerate scores
    pub degenerate: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Workflow::Validate => write!(f, "Validation"),
            Workflow::ReviewTiles => write!(f, "Tile review"),
            Workflow::MatchTiles => write!(f, "Tile pair review"),
            Workflow::Register => write!(f, "Registration"),
        }
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Loading => write!(f, "Loading"),
            PipelinePhase::Sampling => write!(f, "Sampling"),
            PipelinePhase::Comparing => write!(f, "Comparing"),
            PipelinePhase::Reporting => write!(f, "Reporting"),
            PipelinePhase::Registering => write!(f, "Registering"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Tile(TileEvent::Progress(TileProgress {
            completed: 2,
            total: 3,
            label: "Tile 2 at (512, 512)".to_string(),
            ssim: 0.75,
            degenerate: false,
        }));

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Tile(TileEvent::Progress(p)) => {
                assert_eq!(p.completed, 2);
                assert_eq!(p.ssim, 0.75);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn pipeline_summary_is_serializable() {
        let summary = PipelineSummary {
            compared: 3,
            skipped: 1,
            degenerate: 0,
            duration_ms: 5000,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"skipped\":1"));
    }

    #[test]
    fn workflow_names_are_readable() {
        assert_eq!(Workflow::ReviewTiles.to_string(), "Tile review");
        assert_eq!(PipelinePhase::Comparing.to_string(), "Comparing");
    }
}
