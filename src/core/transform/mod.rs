//! # Transform Module
//!
//! Reads the registration transform artifact saved next to the tiles so its
//! shape and element type can be shown alongside the tile comparisons.
//!
//! The artifact is a JSON object mapping names to numeric arrays. The matrix
//! is taken from the first of [`MATRIX_KEYS`] present, else from the first
//! key in the document. Anything unusable falls back to a 3×3 identity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Keys tried for the matrix, in order
pub const MATRIX_KEYS: [&str; 4] = ["matrix", "registration_matrix", "transform_matrix", "homography"];

/// Numeric type of the stored elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Int64,
    Float64,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Int64 => write!(f, "int64"),
            ElementType::Float64 => write!(f, "float64"),
        }
    }
}

/// Where the matrix came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformSource {
    Stored { path: PathBuf, key: String },
    IdentityFallback { reason: String },
}

/// A dense numeric array of rank 0, 1 or 2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformMatrix {
    pub shape: Vec<usize>,
    pub element_type: ElementType,
    /// Row-major values
    pub values: Vec<f64>,
    pub source: TransformSource,
}

impl TransformMatrix {
    pub fn identity(reason: impl Into<String>) -> Self {
        let values = (0..9).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();
        Self {
            shape: vec![3, 3],
            element_type: ElementType::Float64,
            values,
            source: TransformSource::IdentityFallback {
                reason: reason.into(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, TransformSource::IdentityFallback { .. })
    }

    /// Shape as a tuple, e.g. `(3, 3)`
    pub fn shape_label(&self) -> String {
        match self.shape.as_slice() {
            [] => "()".to_string(),
            [n] => format!("({},)", n),
            dims => format!(
                "({})",
                dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
            ),
        }
    }

    /// Values grouped by row; a rank 0 or 1 array is a single row
    pub fn rows(&self) -> Vec<&[f64]> {
        match self.shape.as_slice() {
            [_, cols] if *cols > 0 => self.values.chunks(*cols).collect(),
            _ => vec![self.values.as_slice()],
        }
    }
}

impl fmt::Display for TransformMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|v| match self.element_type {
                    ElementType::Int64 => format!("{:>8}", *v as i64),
                    ElementType::Float64 => format!("{:>12.6}", v),
                })
                .collect();
            writeln!(f, "[{}]", cells.join(" "))?;
        }
        Ok(())
    }
}

/// Load the transform at `path`, falling back to identity when absent or unusable
pub fn load_transform(path: Option<&Path>) -> TransformMatrix {
    let Some(path) = path else {
        tracing::warn!("Registration matrix file not found; using identity");
        return TransformMatrix::identity("no transform artifact found");
    };

    if let Some(extension) = unsupported_extension(path) {
        tracing::warn!(
            path = %path.display(),
            extension = %extension,
            "Registration matrix format '.{}' is not supported (expected .json); using identity",
            extension
        );
        return TransformMatrix::identity(format!("unsupported transform format '.{}'", extension));
    }

    match read_transform(path) {
        Ok(matrix) => {
            tracing::info!(
                path = %path.display(),
                shape = %matrix.shape_label(),
                element_type = %matrix.element_type,
                "Loaded registration matrix"
            );
            matrix
        }
        Err(reason) => {
            tracing::warn!(path = %path.display(), %reason, "Unusable registration matrix; using identity");
            TransformMatrix::identity(reason)
        }
    }
}

/// Extension of an existing artifact that is not JSON
fn unsupported_extension(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    let extension = path.extension()?.to_str()?.to_lowercase();
    (extension != "json").then_some(extension)
}

fn read_transform(path: &Path) -> Result<TransformMatrix, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let value: Value = serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "artifact is not a JSON object".to_string())?;

    let key = select_key(object).ok_or_else(|| "artifact has no entries".to_string())?;
    tracing::debug!(keys = ?object.keys().collect::<Vec<_>>(), %key, "Selected matrix key");

    let (shape, element_type, values) = parse_array(&object[key.as_str()])
        .ok_or_else(|| format!("entry '{}' is not a numeric array", key))?;

    Ok(TransformMatrix {
        shape,
        element_type,
        values,
        source: TransformSource::Stored {
            path: path.to_path_buf(),
            key,
        },
    })
}

fn select_key(object: &Map<String, Value>) -> Option<String> {
    MATRIX_KEYS
        .iter()
        .find(|key| object.contains_key(**key))
        .map(|key| key.to_string())
        .or_else(|| object.keys().next().cloned())
}

fn parse_array(value: &Value) -> Option<(Vec<usize>, ElementType, Vec<f64>)> {
    let mut all_integer = true;
    let mut number = |v: &Value| -> Option<f64> {
        all_integer &= v.is_i64() || v.is_u64();
        v.as_f64()
    };

    let (shape, values) = match value {
        Value::Number(_) => (Vec::new(), vec![number(value)?]),
        Value::Array(items) if items.iter().all(Value::is_array) && !items.is_empty() => {
            let cols = items[0].as_array()?.len();
            let mut values = Vec::with_capacity(items.len() * cols);
            for row in items {
                let row = row.as_array()?;
                if row.len() != cols {
                    return None;
                }
                for v in row {
                    values.push(number(v)?);
                }
            }
            (vec![items.len(), cols], values)
        }
        Value::Array(items) => {
            let values = items.iter().map(&mut number).collect::<Option<Vec<_>>>()?;
            (vec![values.len()], values)
        }
        _ => return None,
    };

    let element_type = if all_integer {
        ElementType::Int64
    } else {
        ElementType::Float64
    };
    Some((shape, element_type, values))
}
