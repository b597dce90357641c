//! Candidate-directory search for pre-tiled review inputs.
//!
//! Resolution is a pure function of the base directory: it checks a fixed
//! list of conventional locations and returns what exists. Callers resolve
//! once and pass the result in explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Conventional slide roots below the home directory, in search order
const BASE_DIR_NAMES: [&str; 2] = ["WSI slides", "WSI_slides"];

/// JSON artifacts first; a NumPy archive is found so it can be reported as unsupported
const MATRIX_CANDIDATES: [&str; 6] = [
    "registration_matrix.json",
    "registration_results/registration_matrix.json",
    "registration_results/data/registration_matrix.json",
    "registration_matrix.npz",
    "registration_results/registration_matrix.npz",
    "registration_results/data/registration_matrix.npz",
];

const HE_TILE_CANDIDATES: [&str; 5] = [
    "he_tiles",
    "registration_results/matched_tiles/he_tiles",
    "registration_results/matched_tiles/he",
    "matched_tiles/he_tiles",
    "matched_tiles/he",
];

const CD8_TILE_CANDIDATES: [&str; 5] = [
    "cd8_tiles",
    "registration_results/matched_tiles/cd8_tiles",
    "registration_results/matched_tiles/cd8",
    "matched_tiles/cd8_tiles",
    "matched_tiles/cd8",
];

/// First candidate that exists on disk
pub fn resolve_first_existing<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|c| c.as_ref())
        .find(|c| c.exists())
        .map(Path::to_path_buf)
}

/// Default slide root: the first conventional directory under `home`, else `home`
pub fn default_base_dir(home: &Path) -> PathBuf {
    let candidates: Vec<PathBuf> = BASE_DIR_NAMES.iter().map(|name| home.join(name)).collect();
    resolve_first_existing(&candidates).unwrap_or_else(|| {
        tracing::warn!(
            home = %home.display(),
            "Could not find a WSI slides directory; using the home directory"
        );
        home.to_path_buf()
    })
}

/// Locations of the transform artifact and the two tile directories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileReviewPaths {
    pub base_dir: PathBuf,
    pub matrix: Option<PathBuf>,
    pub he_tiles: Option<PathBuf>,
    pub cd8_tiles: Option<PathBuf>,
}

impl TileReviewPaths {
    /// Search the conventional layout below `base_dir`
    pub fn resolve(base_dir: &Path) -> Self {
        let under = |names: &[&str]| -> Vec<PathBuf> { names.iter().map(|n| base_dir.join(n)).collect() };

        let paths = Self {
            base_dir: base_dir.to_path_buf(),
            matrix: resolve_first_existing(&under(&MATRIX_CANDIDATES)),
            he_tiles: resolve_first_existing(&under(&HE_TILE_CANDIDATES)),
            cd8_tiles: resolve_first_existing(&under(&CD8_TILE_CANDIDATES)),
        };

        tracing::debug!(
            matrix = ?paths.matrix,
            he_tiles = ?paths.he_tiles,
            cd8_tiles = ?paths.cd8_tiles,
            "Resolved tile review inputs"
        );
        paths
    }
}
