//! # Locator Module
//!
//! Resolves which two slides form a registration pair.
//!
//! ## Resolution Modes
//! - **Enumerate-all** ([`SlidePairLocator::enumerate_pairs`]) - visits the whole
//!   tree and returns every `Pair` directory holding exactly one H&E and one
//!   marker ("Unmixed IF") file, in document order. Used for batch selection
//!   by index.
//! - **Find-first** ([`find_registration`]) - stops at the first directory
//!   matching a requested name (or starting with `Pair`) and points at its
//!   registered-slides output. Used to validate one named pair cheaply.

mod search;
mod tree;

pub use search::{default_base_dir, resolve_first_existing, TileReviewPaths};
pub use tree::{FileTreeNode, MalformedNode, NodeKind};

use crate::error::LocateError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Substring identifying a pair directory
pub const PAIR_MARKER: &str = "Pair";

/// Registered-slides output location, relative to a pair directory
pub const REGISTERED_SLIDES_SUBDIR: [&str; 2] = ["registration_results", "registered_slides"];

/// Registered H&E slide file name
pub const HE_SLIDE_FILE: &str = "HE_downsampled_x2.ome.tiff";

/// Registered CD8 slide file name
pub const CD8_SLIDE_FILE: &str = "CD8_channel2.ome.tiff";

/// Reference (H&E) and marker (CD8) slides of one registration pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidePair {
    pub pair_name: String,
    #[serde(rename = "he_slide")]
    pub he_path: PathBuf,
    #[serde(rename = "cd8_slide")]
    pub cd8_path: PathBuf,
}

/// Registered-slide locations for one pair directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationLocation {
    pub pair_name: String,
    pub registration_dir: PathBuf,
    pub he_path: PathBuf,
    pub cd8_path: PathBuf,
}

impl RegistrationLocation {
    /// Default slide locations inside a registered-slides directory
    pub fn in_directory(pair_name: impl Into<String>, registration_dir: PathBuf) -> Self {
        Self {
            pair_name: pair_name.into(),
            he_path: registration_dir.join(HE_SLIDE_FILE),
            cd8_path: registration_dir.join(CD8_SLIDE_FILE),
            registration_dir,
        }
    }
}

/// Case-insensitive file-name predicates for the two stains
#[derive(Debug, Clone)]
pub struct StainPatterns {
    /// Marker stain (checked first)
    pub marker: Regex,
    /// Reference stain (only for files that are not marker files)
    pub reference: Regex,
}

impl Default for StainPatterns {
    fn default() -> Self {
        Self {
            marker: Regex::new("(?i)unmixed if").expect("valid marker pattern"),
            reference: Regex::new("(?i)he").expect("valid reference pattern"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stain {
    Reference,
    Marker,
}

impl StainPatterns {
    fn classify(&self, file_name: &str) -> Option<Stain> {
        if self.marker.is_match(file_name) {
            Some(Stain::Marker)
        } else if self.reference.is_match(file_name) {
            Some(Stain::Reference)
        } else {
            None
        }
    }
}

/// Locates registration pairs in a file tree
#[derive(Debug, Clone, Default)]
pub struct SlidePairLocator {
    patterns: StainPatterns,
}

impl SlidePairLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patterns(patterns: StainPatterns) -> Self {
        Self { patterns }
    }

    /// Every complete pair in the tree, in depth-first document order
    pub fn enumerate_pairs(&self, root: &FileTreeNode) -> Vec<SlidePair> {
        self.collect_pairs(root, &[])
    }

    fn collect_pairs(&self, node: &FileTreeNode, prefix: &[&str]) -> Vec<SlidePair> {
        let mut pairs = Vec::new();

        if node.is_directory() && node.name.contains(PAIR_MARKER) {
            if let Some(pair) = self.pair_from_directory(node, prefix) {
                pairs.push(pair);
            }
        }

        let mut trail = prefix.to_vec();
        trail.push(&node.name);
        for child in node.children.iter().filter(|c| c.is_directory()) {
            pairs.extend(self.collect_pairs(child, &trail));
        }

        pairs
    }

    fn pair_from_directory(&self, directory: &FileTreeNode, prefix: &[&str]) -> Option<SlidePair> {
        let mut reference = Vec::new();
        let mut marker = Vec::new();

        for file in directory.children.iter().filter(|c| c.is_file()) {
            match self.patterns.classify(&file.name) {
                Some(Stain::Reference) => reference.push(file),
                Some(Stain::Marker) => marker.push(file),
                None => {}
            }
        }

        match (reference.as_slice(), marker.as_slice()) {
            ([he], [cd8]) => {
                let base: Vec<&str> = prefix
                    .iter()
                    .copied()
                    .chain(std::iter::once(directory.name.as_str()))
                    .collect();
                Some(SlidePair {
                    pair_name: directory.name.clone(),
                    he_path: join_names(&base, &he.name),
                    cd8_path: join_names(&base, &cd8.name),
                })
            }
            ([], _) | (_, []) => None,
            _ => {
                tracing::warn!(
                    pair = %directory.name,
                    reference_files = reference.len(),
                    marker_files = marker.len(),
                    "Pair directory has ambiguous slide files; skipping"
                );
                None
            }
        }
    }
}

fn join_names(components: &[&str], file_name: &str) -> PathBuf {
    components
        .iter()
        .copied()
        .chain(std::iter::once(file_name))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Pick a pair by 1-based position
pub fn select_pair(pairs: &[SlidePair], index: usize) -> Result<&SlidePair, LocateError> {
    if index == 0 || index > pairs.len() {
        return Err(LocateError::PairIndexOutOfRange {
            index,
            available: pairs.len(),
        });
    }
    Ok(&pairs[index - 1])
}

/// First pair directory below the root, short-circuiting on the first hit.
///
/// With `pair_name`, the directory name must match exactly; otherwise the
/// first directory whose name starts with `Pair` wins. The result is
/// rooted at `base_dir` (the directory holding the tree description).
pub fn find_registration(
    root: &FileTreeNode,
    pair_name: Option<&str>,
    base_dir: &Path,
) -> Option<RegistrationLocation> {
    let trail = find_directory(&root.children, &[], pair_name)?;
    let pair = trail.last().map(|s| s.to_string()).unwrap_or_default();

    let mut registration_dir = base_dir.to_path_buf();
    registration_dir.extend(trail.iter().filter(|c| !c.is_empty()));
    registration_dir.extend(REGISTERED_SLIDES_SUBDIR);

    Some(RegistrationLocation::in_directory(pair, registration_dir))
}

fn find_directory<'a>(
    children: &'a [FileTreeNode],
    trail: &[&'a str],
    pair_name: Option<&str>,
) -> Option<Vec<&'a str>> {
    for child in children.iter().filter(|c| c.is_directory()) {
        let mut path = trail.to_vec();
        path.push(&child.name);

        let hit = match pair_name {
            Some(name) => child.name == name,
            None => child.name.starts_with(PAIR_MARKER),
        };
        if hit {
            return Some(path);
        }

        if let Some(found) = find_directory(&child.children, &path, pair_name) {
            return Some(found);
        }
    }
    None
}

/// Caller-supplied hints for locating the slides to validate
#[derive(Debug, Clone, Default)]
pub struct ValidationInputs {
    pub registration_dir: Option<PathBuf>,
    pub he_path: Option<PathBuf>,
    pub cd8_path: Option<PathBuf>,
    pub tree_path: Option<PathBuf>,
    pub pair_name: Option<String>,
}

/// Resolve the registered slides to validate.
///
/// Explicit slide paths win. A registration directory supplies the default
/// file names. Otherwise the tree description is searched for the pair.
pub fn resolve_validation_inputs(inputs: &ValidationInputs) -> Result<RegistrationLocation, LocateError> {
    if let Some(dir) = &inputs.registration_dir {
        let mut location = RegistrationLocation::in_directory(
            dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            dir.clone(),
        );
        if let Some(he) = &inputs.he_path {
            location.he_path = he.clone();
        }
        if let Some(cd8) = &inputs.cd8_path {
            location.cd8_path = cd8.clone();
        }
        return Ok(location);
    }

    if let (Some(he), Some(cd8)) = (&inputs.he_path, &inputs.cd8_path) {
        let registration_dir = he.parent().map(Path::to_path_buf).unwrap_or_default();
        return Ok(RegistrationLocation {
            pair_name: String::new(),
            registration_dir,
            he_path: he.clone(),
            cd8_path: cd8.clone(),
        });
    }

    let tree_path = inputs.tree_path.as_ref().ok_or_else(|| {
        LocateError::Unresolved(
            "provide --he-path and --cd8-path, --registration-dir, or a file tree".to_string(),
        )
    })?;

    let tree = FileTreeNode::load(tree_path)?;
    let base_dir = tree_path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut location = find_registration(&tree, inputs.pair_name.as_deref(), &base_dir)
        .ok_or_else(|| match &inputs.pair_name {
            Some(name) => LocateError::Unresolved(format!(
                "pair '{}' not found in {}",
                name,
                tree_path.display()
            )),
            None => LocateError::Unresolved(format!(
                "no pair directory found in {}",
                tree_path.display()
            )),
        })?;

    if let Some(he) = &inputs.he_path {
        location.he_path = he.clone();
    }
    if let Some(cd8) = &inputs.cd8_path {
        location.cd8_path = cd8.clone();
    }

    tracing::info!(
        pair = %location.pair_name,
        registration_dir = %location.registration_dir.display(),
        "Resolved slides from file tree"
    );
    Ok(location)
}
