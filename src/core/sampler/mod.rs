//! # Sampler Module
//!
//! Picks a small, quality-stratified set of tiles for human review.
//!
//! ## Groups
//! - **Best**: the `k` highest combined scores
//! - **Worst**: the `k` lowest combined scores
//! - **Typical**: a contiguous block around the median rank
//!
//! where `k = max(1, num_samples / 3)`. Groups are concatenated as-is, so a
//! small table can yield the same tile in more than one group.

mod table;

pub use table::{MetricRecord, MetricsTable};

use crate::core::tile::TileCoordinate;
use crate::error::TableError;
use serde::{Deserialize, Serialize};

/// Default number of tiles to sample
pub const DEFAULT_NUM_SAMPLES: usize = 5;

/// Which stratum a sampled tile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleGroup {
    Best,
    Worst,
    Typical,
    /// Table smaller than the requested sample
    All,
}

impl SampleGroup {
    pub fn label(&self) -> &'static str {
        match self {
            SampleGroup::Best => "best",
            SampleGroup::Worst => "worst",
            SampleGroup::Typical => "typical",
            SampleGroup::All => "all",
        }
    }
}

/// A selected tile and its grid position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledTile {
    pub group: SampleGroup,
    pub index: usize,
    pub coordinate: TileCoordinate,
    pub record: MetricRecord,
}

/// Stratified selection over a metrics table
#[derive(Debug, Clone, Copy)]
pub struct QualityStratifiedSampler {
    num_samples: usize,
}

impl Default for QualityStratifiedSampler {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_SAMPLES)
    }
}

impl QualityStratifiedSampler {
    pub fn new(num_samples: usize) -> Self {
        Self { num_samples }
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Select tiles and map each to `(index / grid_width, index % grid_width)`
    pub fn sample(
        &self,
        table: &MetricsTable,
        grid_width: usize,
    ) -> Result<Vec<SampledTile>, TableError> {
        if grid_width == 0 {
            return Err(TableError::ZeroGridWidth);
        }

        let selected = self.select_positions(table.records());
        tracing::debug!(
            rows = table.len(),
            selected = selected.len(),
            "Sampled metrics table"
        );

        Ok(selected
            .into_iter()
            .map(|(group, position)| {
                let record = table.records()[position].clone();
                let index = record.grid_index(position, grid_width);
                SampledTile {
                    group,
                    index,
                    coordinate: TileCoordinate::from_index(index, grid_width),
                    record,
                }
            })
            .collect())
    }

    /// Table positions per group, in output order
    fn select_positions(&self, records: &[MetricRecord]) -> Vec<(SampleGroup, usize)> {
        let n = records.len();
        if n < self.num_samples {
            return (0..n).map(|p| (SampleGroup::All, p)).collect();
        }

        let k = (self.num_samples / 3).max(1);
        let typical_count = self.num_samples.saturating_sub(2 * k).max(1);

        // Stable sorts keep table order among equal scores
        let mut ascending: Vec<usize> = (0..n).collect();
        ascending.sort_by(|&a, &b| {
            records[a]
                .combined_score
                .total_cmp(&records[b].combined_score)
        });
        let mut descending: Vec<usize> = (0..n).collect();
        descending.sort_by(|&a, &b| {
            records[b]
                .combined_score
                .total_cmp(&records[a].combined_score)
        });

        // Equal number of ranks on each side of the block
        let typical_start = n.saturating_sub(typical_count) / 2;

        let best = descending.iter().take(k).map(|&p| (SampleGroup::Best, p));
        let worst = ascending.iter().take(k).map(|&p| (SampleGroup::Worst, p));
        let typical = ascending
            .iter()
            .skip(typical_start)
            .take(typical_count)
            .map(|&p| (SampleGroup::Typical, p));

        best.chain(worst).chain(typical).collect()
    }
}
