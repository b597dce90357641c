//! # Matcher Module
//!
//! Pairs pre-tiled images from a reference (H&E) directory and a marker
//! (CD8) directory.
//!
//! ## How It Works
//! 1. List the tile images directly inside each directory, sorted by name
//! 2. Pair files whose stems (names without extension) match, in marker order
//! 3. If no stem is shared, pair by listing position instead
//!
//! The positional fallback assumes both directories came from the same
//! tiling run and enumerate in the same order.

mod filter;

pub use filter::TileImageFilter;

use crate::error::LocateError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default number of pairs to collect
pub const DEFAULT_PAIR_LIMIT: usize = 5;

/// How a tile pair was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingMethod {
    /// Shared file stem
    Stem,
    /// Same position in both sorted listings
    Position,
}

/// One reference tile and its marker counterpart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePair {
    pub reference: PathBuf,
    pub marker: PathBuf,
    pub method: PairingMethod,
}

/// Lists and pairs tile images
pub struct TilePairMatcher {
    filter: TileImageFilter,
}

impl Default for TilePairMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TilePairMatcher {
    pub fn new() -> Self {
        Self {
            filter: TileImageFilter::new(),
        }
    }

    pub fn with_filter(filter: TileImageFilter) -> Self {
        Self { filter }
    }

    /// Tile images directly inside `dir`, sorted by file name
    pub fn list_tiles(&self, dir: &Path) -> Result<Vec<PathBuf>, LocateError> {
        if !dir.is_dir() {
            return Err(LocateError::PathNotFound {
                what: "tile directory",
                path: dir.to_path_buf(),
            });
        }

        let mut tiles = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| LocateError::ReadDirectory {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

            if entry.file_type().is_file() && self.filter.should_include(entry.path()) {
                tiles.push(entry.into_path());
            }
        }

        Ok(tiles)
    }

    /// Pair tiles from `reference_dir` and `marker_dir`, at most `limit` pairs
    pub fn match_pairs(
        &self,
        reference_dir: &Path,
        marker_dir: &Path,
        limit: usize,
    ) -> Result<Vec<TilePair>, LocateError> {
        let reference = self.list_tiles(reference_dir)?;
        let marker = self.list_tiles(marker_dir)?;

        tracing::info!(
            reference_tiles = reference.len(),
            marker_tiles = marker.len(),
            "Listed tile directories"
        );

        let pairs = pair_tiles(&reference, &marker, limit);
        tracing::info!(pairs = pairs.len(), "Matched tile pairs");
        Ok(pairs)
    }
}

fn stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Pair two listings by stem, falling back to position when nothing matches
pub fn pair_tiles(reference: &[PathBuf], marker: &[PathBuf], limit: usize) -> Vec<TilePair> {
    let by_stem: HashMap<&str, &PathBuf> = reference
        .iter()
        .filter_map(|path| stem(path).map(|s| (s, path)))
        .collect();

    let matched: Vec<TilePair> = marker
        .iter()
        .filter_map(|marker_path| {
            let reference_path = by_stem.get(stem(marker_path)?)?;
            Some(TilePair {
                reference: (*reference_path).clone(),
                marker: marker_path.clone(),
                method: PairingMethod::Stem,
            })
        })
        .take(limit)
        .collect();

    if !matched.is_empty() || reference.is_empty() || marker.is_empty() {
        return matched;
    }

    tracing::info!("No matching file names found; matching by position");
    reference
        .iter()
        .zip(marker)
        .take(limit)
        .map(|(r, m)| TilePair {
            reference: r.clone(),
            marker: m.clone(),
            method: PairingMethod::Position,
        })
        .collect()
}
