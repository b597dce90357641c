//! File-tree description parsing.
//!
//! Parsing is lenient: a node missing its name or type, or with a
//! non-array `children` field, is kept as a leaf and reported as a
//! [`MalformedNode`] so traversal of the rest of the tree continues.

use crate::error::LocateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Kind of a file-tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
    /// Missing or unrecognised `type`
    Unknown,
}

/// One node of a hierarchical file listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct FileTreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Ordered children; always empty for non-directories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileTreeNode>,
}

/// A node that was missing expected structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedNode {
    /// Slash-joined names from the root to the node
    pub location: String,
    pub problem: String,
}

impl FileTreeNode {
    pub fn directory(name: impl Into<String>, children: Vec<FileTreeNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
            children,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            children: Vec::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Parse a JSON value, collecting every malformed node
    pub fn parse(value: &Value) -> (FileTreeNode, Vec<MalformedNode>) {
        parse_node(value, "")
    }

    /// Load and parse a tree description from disk
    pub fn load(path: &Path) -> Result<FileTreeNode, LocateError> {
        if !path.exists() {
            return Err(LocateError::PathNotFound {
                what: "file tree",
                path: path.to_path_buf(),
            });
        }

        let text = fs::read_to_string(path).map_err(|e| LocateError::ReadTree {
            path: path.to_path_buf(),
            source: e,
        })?;

        let value: Value = serde_json::from_str(&text).map_err(|e| LocateError::TreeParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let (tree, malformed) = Self::parse(&value);
        for node in &malformed {
            tracing::warn!(
                location = %node.location,
                problem = %node.problem,
                "Malformed tree node treated as a leaf"
            );
        }
        tracing::debug!(path = %path.display(), malformed = malformed.len(), "Loaded file tree");

        Ok(tree)
    }
}

impl From<Value> for FileTreeNode {
    fn from(value: Value) -> Self {
        Self::parse(&value).0
    }
}

fn parse_node(value: &Value, parent: &str) -> (FileTreeNode, Vec<MalformedNode>) {
    let mut issues = Vec::new();

    let Some(object) = value.as_object() else {
        issues.push(MalformedNode {
            location: parent.to_string(),
            problem: "node is not an object".to_string(),
        });
        return (
            FileTreeNode {
                name: String::new(),
                kind: NodeKind::Unknown,
                children: Vec::new(),
            },
            issues,
        );
    };

    let name = match object.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => {
            issues.push(MalformedNode {
                location: parent.to_string(),
                problem: "missing 'name'".to_string(),
            });
            String::new()
        }
    };
    let location = if parent.is_empty() {
        name.clone()
    } else {
        format!("{}/{}", parent, name)
    };

    let kind = match object.get("type").and_then(Value::as_str) {
        Some("directory") => NodeKind::Directory,
        Some("file") => NodeKind::File,
        other => {
            issues.push(MalformedNode {
                location: location.clone(),
                problem: match other {
                    Some(kind) => format!("unknown type '{}'", kind),
                    None => "missing 'type'".to_string(),
                },
            });
            NodeKind::Unknown
        }
    };

    let mut children = Vec::new();
    if kind == NodeKind::Directory {
        match object.get("children") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let (child, child_issues) = parse_node(item, &location);
                    children.push(child);
                    issues.extend(child_issues);
                }
            }
            Some(_) => issues.push(MalformedNode {
                location: location.clone(),
                problem: "'children' is not an array".to_string(),
            }),
        }
    }

    (
        FileTreeNode {
            name,
            kind,
            children,
        },
        issues,
    )
}
