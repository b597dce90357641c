//! # Slide Registration QC
//!
//! Quality checks for co-registered H&E and CD8 slide pairs.
//!
//! ## What it does
//! - **Locate** - find slide pairs in a storage file tree
//! - **Compare** - score aligned tiles with SSIM, MSE, NCC and Pearson
//! - **Sample** - pick the best, worst and typical tiles from a metrics table
//! - **Report** - write comparison composites and one HTML report per run
//!
//! ## Architecture
//! The library is split into a core engine and presentation layers:
//! - `core` - Loading, tiling, metrics, sampling and the workflows
//! - `events` - Event-driven progress reporting
//! - `error` - Error taxonomy
//!
//! The `reg-qc` binary adds the command-line interface on top.

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{QcError, Result};

/// Initialize tracing for the binary
///
/// `RUST_LOG` overrides the default level, which is `debug` when `verbose`
/// is set and `info` otherwise. Calling it again keeps the first subscriber.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_tracing(false);
        init_tracing(true);
    }
}
