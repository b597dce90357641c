//! # reg-qc CLI
//!
//! Command-line interface for slide registration quality checks.
//!
//! ## Usage
//! ```bash
//! reg-qc pairs --tree wasabi_file_tree.json
//! reg-qc validate --tree wasabi_file_tree.json --pair Pair_03
//! reg-qc review-tiles --he-slide he.tiff --cd8-slide cd8.tiff --metrics tile_metrics.csv
//! reg-qc match-tiles --base-dir ~/slides --output json
//! ```

mod cli;

use std::process::ExitCode;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            cli::report_error(&e);
            ExitCode::FAILURE
        }
    }
}
