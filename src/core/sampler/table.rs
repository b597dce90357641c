//! Metrics table loading.
//!
//! Accepts comma-separated text with a header row, or a JSON array of
//! objects. Column lookup is by name so extra columns are ignored.

use crate::error::TableError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One row of a per-tile metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col: Option<usize>,
    pub ssim: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mse: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pearson: Option<f64>,
    pub combined_score: f64,
}

impl MetricRecord {
    /// Record with only the ranking fields set
    pub fn new(ssim: f64, ncc: f64, combined_score: f64) -> Self {
        Self {
            index: None,
            row: None,
            col: None,
            ssim,
            mse: None,
            ncc: Some(ncc),
            pearson: None,
            combined_score,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_position(mut self, row: usize, col: usize) -> Self {
        self.row = Some(row);
        self.col = Some(col);
        self
    }

    pub fn abs_combined_score(&self) -> f64 {
        self.combined_score.abs()
    }

    /// Linear grid index: explicit index, else `(row, col)`, else table position
    pub fn grid_index(&self, position: usize, grid_width: usize) -> usize {
        match (self.index, self.row, self.col) {
            (Some(index), _, _) => index,
            (None, Some(row), Some(col)) => row * grid_width + col,
            _ => position,
        }
    }
}

/// An ordered metrics table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsTable {
    records: Vec<MetricRecord>,
}

impl MetricsTable {
    pub fn from_records(records: Vec<MetricRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load a table, choosing the format from the file extension
    pub fn load(path: &Path) -> Result<Self, TableError> {
        if !path.exists() {
            return Err(TableError::PathNotFound {
                path: path.to_path_buf(),
            });
        }

        let text = fs::read_to_string(path).map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let table = if is_json {
            Self::parse_json(&text)?
        } else {
            Self::parse_csv(&text)?
        };

        tracing::info!(path = %path.display(), rows = table.len(), "Loaded metrics table");
        Ok(table)
    }

    /// Parse a JSON array of record objects
    pub fn parse_json(text: &str) -> Result<Self, TableError> {
        let rows: Vec<RawRecord> =
            serde_json::from_str(text).map_err(|e| TableError::Parse(e.to_string()))?;

        let records = rows
            .into_iter()
            .map(RawRecord::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { records })
    }

    /// Parse comma-separated text with a header row
    pub fn parse_csv(text: &str) -> Result<Self, TableError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (header_index, header) = lines
            .next()
            .ok_or_else(|| TableError::Parse("table is empty".to_string()))?;
        let names = split_fields(header, header_index + 1)?;
        let columns = Columns::from_header(&names)?;

        let mut records = Vec::new();
        for (line_index, text) in lines {
            let line = line_index + 1;
            let fields = split_fields(text, line)?;
            if fields.len() != names.len() {
                return Err(TableError::FieldCount {
                    line,
                    expected: names.len(),
                    found: fields.len(),
                });
            }
            let cells: Vec<&str> = fields.iter().map(|f| f.trim()).collect();
            records.push(columns.record(&cells, line)?);
        }

        Ok(Self { records })
    }
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes
fn split_fields(text: &str, line: usize) -> Result<Vec<String>, TableError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if quoted {
        return Err(TableError::Parse(format!(
            "unterminated quoted field on line {}",
            line
        )));
    }
    fields.push(field);
    Ok(fields)
}

/// Column positions resolved from a CSV header
struct Columns {
    index: Option<usize>,
    row: Option<usize>,
    col: Option<usize>,
    ssim: usize,
    mse: Option<usize>,
    ncc: Option<usize>,
    pearson: Option<usize>,
    combined_score: usize,
}

impl Columns {
    fn from_header(header: &[String]) -> Result<Self, TableError> {
        let names: Vec<String> = header.iter().map(|name| name.trim().to_lowercase()).collect();
        let find = |wanted: &str| names.iter().position(|name| name == wanted);

        let columns = Self {
            index: find("index"),
            row: find("row"),
            col: find("col"),
            ssim: find("ssim").ok_or(TableError::MissingColumn { column: "ssim" })?,
            mse: find("mse"),
            ncc: find("ncc"),
            pearson: find("pearson"),
            combined_score: find("combined_score").ok_or(TableError::MissingColumn {
                column: "combined_score",
            })?,
        };

        if columns.ncc.is_none() && columns.mse.is_none() {
            return Err(TableError::MissingColumn { column: "ncc" });
        }
        Ok(columns)
    }

    fn record(&self, cells: &[&str], line: usize) -> Result<MetricRecord, TableError> {
        let cell = |position: usize| cells.get(position).copied().unwrap_or("");

        let float = |position: usize, name: &str| -> Result<f64, TableError> {
            let value = cell(position);
            value.parse::<f64>().map_err(|_| TableError::InvalidValue {
                line,
                column: name.to_string(),
                value: value.to_string(),
            })
        };
        let optional_float = |position: Option<usize>, name: &str| -> Result<Option<f64>, TableError> {
            match position {
                Some(p) if !cell(p).is_empty() => float(p, name).map(Some),
                _ => Ok(None),
            }
        };
        let optional_count = |position: Option<usize>, name: &str| -> Result<Option<usize>, TableError> {
            match position {
                Some(p) if !cell(p).is_empty() => parse_count(cell(p)).map(Some).ok_or_else(|| {
                    TableError::InvalidValue {
                        line,
                        column: name.to_string(),
                        value: cell(p).to_string(),
                    }
                }),
                _ => Ok(None),
            }
        };

        Ok(MetricRecord {
            index: optional_count(self.index, "index")?,
            row: optional_count(self.row, "row")?,
            col: optional_count(self.col, "col")?,
            ssim: float(self.ssim, "ssim")?,
            mse: optional_float(self.mse, "mse")?,
            ncc: optional_float(self.ncc, "ncc")?,
            pearson: optional_float(self.pearson, "pearson")?,
            combined_score: float(self.combined_score, "combined_score")?,
        })
    }
}

/// Non-negative integer, also accepting whole floats such as `12.0`
fn parse_count(value: &str) -> Option<usize> {
    if let Ok(count) = value.parse::<usize>() {
        return Some(count);
    }
    let float = value.parse::<f64>().ok()?;
    (float >= 0.0 && float.fract() == 0.0).then_some(float as usize)
}

#[derive(Deserialize)]
struct RawRecord {
    index: Option<usize>,
    row: Option<usize>,
    col: Option<usize>,
    ssim: Option<f64>,
    mse: Option<f64>,
    ncc: Option<f64>,
    pearson: Option<f64>,
    combined_score: Option<f64>,
}

impl RawRecord {
    fn into_record(self) -> Result<MetricRecord, TableError> {
        let ssim = self.ssim.ok_or(TableError::MissingColumn { column: "ssim" })?;
        let combined_score = self.combined_score.ok_or(TableError::MissingColumn {
            column: "combined_score",
        })?;
        if self.ncc.is_none() && self.mse.is_none() {
            return Err(TableError::MissingColumn { column: "ncc" });
        }

        Ok(MetricRecord {
            index: self.index,
            row: self.row,
            col: self.col,
            ssim,
            mse: self.mse,
            ncc: self.ncc,
            pearson: self.pearson,
            combined_score,
        })
    }
}
