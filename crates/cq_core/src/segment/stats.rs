use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::SegmentOutput;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkStats {
    pub total_chunks: u32,
    pub units_whole: u32,
    pub units_split: u32,
    pub dropped_units: u32,
    pub min_tokens: u32,
    pub max_tokens: u32,
    pub avg_tokens: f64,
}

impl ChunkStats {
    pub fn from_output(out: &SegmentOutput) -> Self {
        let mut per_unit: BTreeMap<&str, u32> = BTreeMap::new();
        for c in out.chunks.iter() {
            *per_unit.entry(c.unit_id.as_str()).or_insert(0) += 1;
        }
        let units_split = per_unit.values().filter(|n| **n > 1).count() as u32;
        let units_whole = per_unit.len() as u32 - units_split;

        let counts = out.chunks.iter().map(|c| c.token_count);
        let total: u64 = counts.clone().map(u64::from).sum();
        let avg_tokens = if out.chunks.is_empty() {
            0.0
        } else {
            total as f64 / out.chunks.len() as f64
        };

        Self {
            total_chunks: out.chunks.len() as u32,
            units_whole,
            units_split,
            dropped_units: out.dropped_units,
            min_tokens: counts.clone().min().unwrap_or(0),
            max_tokens: counts.max().unwrap_or(0),
            avg_tokens,
        }
    }
}
