//! Driver for an external registration engine.
//!
//! The alignment itself is opaque. This module prepares the output layout,
//! checks that both slides exist and makes sure the engine's resources are
//! released however the run ends.

use super::elapsed_ms;
use crate::error::{LocateError, QcError, RegistrationError};
use crate::events::{
    null_sender, Event, EventSender, PipelineEvent, PipelinePhase, PipelineSummary,
    RegistrationEvent, Workflow,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Subdirectory receiving the warped slides
pub const RESULTS_DIR: &str = "registration_results";

/// Subdirectory reserved for the engine's own evaluation output
pub const EVALUATION_DIR: &str = "registration_evaluation";

/// One pair to register
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    pub pair_name: String,
    pub he_path: PathBuf,
    pub cd8_path: PathBuf,
    pub output_dir: PathBuf,
}

impl RegistrationRequest {
    pub fn results_dir(&self) -> PathBuf {
        self.output_dir.join(RESULTS_DIR)
    }

    pub fn evaluation_dir(&self) -> PathBuf {
        self.output_dir.join(EVALUATION_DIR)
    }
}

/// What the engine left behind
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutput {
    pub pair_name: String,
    pub results_dir: PathBuf,
    pub evaluation_dir: PathBuf,
    /// Warped slides written by the engine
    pub registered_slides: Vec<PathBuf>,
    pub duration_ms: u64,
}

/// An external slide registration engine.
///
/// `register` aligns the marker slide onto the reference, warps both to
/// their overlap and writes them below `request.results_dir()`.
/// `release` frees whatever the engine holds (a JVM, GPU context, worker
/// processes). It is called exactly once per [`register_pair`] call, on
/// success and on failure.
pub trait RegistrationEngine {
    fn register(&mut self, request: &RegistrationRequest) -> Result<Vec<PathBuf>, RegistrationError>;

    fn release(&mut self);
}

/// Releases the engine when dropped
struct ReleaseGuard<'a> {
    engine: &'a mut dyn RegistrationEngine,
    events: &'a EventSender,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        tracing::debug!("Releasing registration engine");
        self.engine.release();
        self.events.send(Event::Registration(RegistrationEvent::CleanedUp));
    }
}

fn require_file(what: &'static str, path: &Path) -> Result<(), LocateError> {
    if path.exists() {
        Ok(())
    } else {
        Err(LocateError::PathNotFound {
            what,
            path: path.to_path_buf(),
        })
    }
}

fn create_dir(path: &Path) -> Result<(), RegistrationError> {
    fs::create_dir_all(path).map_err(|source| RegistrationError::OutputDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Register one slide pair.
///
/// Output directories are created first, then the inputs are checked. The
/// engine is released on every path that reaches it, including errors and
/// panics inside `register`.
pub fn register_pair(
    engine: &mut dyn RegistrationEngine,
    request: &RegistrationRequest,
    events: &EventSender,
) -> Result<RegistrationOutput, QcError> {
    let start_time = Instant::now();
    events.send(Event::Pipeline(PipelineEvent::Started {
        workflow: Workflow::Register,
    }));

    let results_dir = request.results_dir();
    let evaluation_dir = request.evaluation_dir();
    create_dir(&results_dir)?;
    create_dir(&evaluation_dir)?;

    require_file("CD8 slide", &request.cd8_path)?;
    require_file("H&E slide", &request.he_path)?;

    events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
        phase: PipelinePhase::Registering,
    }));
    events.send(Event::Registration(RegistrationEvent::Started {
        pair_name: request.pair_name.clone(),
    }));
    tracing::info!(
        pair = %request.pair_name,
        he = %request.he_path.display(),
        cd8 = %request.cd8_path.display(),
        "Starting registration"
    );

    let guard = ReleaseGuard { engine, events };
    let registered = guard.engine.register(request);
    drop(guard);

    let registered_slides = match registered {
        Ok(slides) => slides,
        Err(e) => {
            tracing::error!(pair = %request.pair_name, error = %e, "Registration failed");
            events.send(Event::Pipeline(PipelineEvent::Error {
                message: e.to_string(),
            }));
            return Err(e.into());
        }
    };

    let output = RegistrationOutput {
        pair_name: request.pair_name.clone(),
        results_dir,
        evaluation_dir,
        registered_slides,
        duration_ms: elapsed_ms(start_time),
    };

    tracing::info!(
        pair = %output.pair_name,
        slides = output.registered_slides.len(),
        duration_ms = output.duration_ms,
        results = %output.results_dir.display(),
        "Registration completed"
    );
    events.send(Event::Registration(RegistrationEvent::Completed {
        pair_name: output.pair_name.clone(),
        output_dir: output.results_dir.clone(),
    }));
    events.send(Event::Pipeline(PipelineEvent::Completed {
        summary: PipelineSummary {
            compared: 0,
            skipped: 0,
            degenerate: 0,
            duration_ms: output.duration_ms,
        },
    }));

    Ok(output)
}

/// [`register_pair`] without an event listener
pub fn register(
    engine: &mut dyn RegistrationEngine,
    request: &RegistrationRequest,
) -> Result<RegistrationOutput, QcError> {
    register_pair(engine, request, &null_sender())
}
