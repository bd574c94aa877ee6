//! Unit segmentation into bounded, overlapping chunks.
//!
//! Tokens are whitespace-delimited words (the same boundaries `str::split_whitespace`
//! uses). Every size in this module is expressed in those tokens.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{Chunk, PipelineWarning, Unit};
use crate::error::{codes, AppError};

mod stats;

pub use stats::ChunkStats;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentParams {
    pub max_chunk_size: u32,
    pub overlap_size: u32,
}

impl SegmentParams {
    pub fn new(max_chunk_size: u32, overlap_size: u32) -> Result<Self, AppError> {
        if max_chunk_size == 0 || overlap_size >= max_chunk_size {
            return Err(AppError::new(
                codes::SEGMENT_INVALID,
                "Chunk overlap must be smaller than the chunk size",
            )
            .with_details(format!(
                "max_chunk_size={max_chunk_size}; overlap_size={overlap_size}"
            )));
        }
        Ok(Self {
            max_chunk_size,
            overlap_size,
        })
    }

    fn stride(&self) -> usize {
        (self.max_chunk_size - self.overlap_size) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentOutput {
    pub chunks: Vec<Chunk>,
    pub dropped_units: u32,
    pub warnings: Vec<PipelineWarning>,
}

pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Byte spans `[start, end)` of every whitespace-delimited token in `text`.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

pub fn segment(units: &[Unit], params: SegmentParams) -> Result<SegmentOutput, AppError> {
    let params = SegmentParams::new(params.max_chunk_size, params.overlap_size)?;

    // Stable ordering: sequence_index asc, unit_id asc.
    let mut ordered: Vec<&Unit> = units.iter().collect();
    ordered.sort_by(|a, b| {
        a.sequence_index
            .cmp(&b.sequence_index)
            .then(a.unit_id.cmp(&b.unit_id))
    });

    let mut out = SegmentOutput {
        chunks: Vec::new(),
        dropped_units: 0,
        warnings: Vec::new(),
    };
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for unit in ordered {
        if !seen.insert(unit.unit_id.as_str()) {
            out.warnings.push(
                PipelineWarning::new("SEGMENT_DUPLICATE_UNIT", "Duplicate unit id skipped")
                    .with_details(format!("unit_id={}", unit.unit_id)),
            );
            continue;
        }

        let spans = token_spans(&unit.body_text);
        if spans.is_empty() {
            tracing::warn!(unit_id = %unit.unit_id, "dropping empty unit");
            out.dropped_units += 1;
            out.warnings.push(
                PipelineWarning::new("SEGMENT_EMPTY_UNIT", "Unit has no text and was dropped")
                    .with_details(format!("unit_id={}", unit.unit_id)),
            );
            continue;
        }

        out.chunks.extend(segment_unit(unit, &spans, params));
    }

    tracing::debug!(
        chunks = out.chunks.len(),
        dropped_units = out.dropped_units,
        "segmentation finished"
    );
    Ok(out)
}

fn segment_unit(unit: &Unit, spans: &[(usize, usize)], params: SegmentParams) -> Vec<Chunk> {
    let body = unit.body_text.as_str();
    let n = spans.len();
    let max = params.max_chunk_size as usize;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut position = 0u32;
    loop {
        let end = (start + max).min(n);

        // The first chunk owns any leading whitespace and the last owns the tail, so
        // the chunk byte ranges cover the body with no gaps. Interior chunks run up to
        // the first token of the next window they do not contain.
        let byte_start = if start == 0 { 0 } else { spans[start].0 };
        let byte_end = if end == n { body.len() } else { spans[end].0 };

        chunks.push(make_chunk(
            unit,
            &body[byte_start..byte_end],
            ChunkWindow {
                token_start: start,
                token_count: end - start,
                byte_range: (byte_start, byte_end),
                position,
            },
        ));

        if end == n {
            break;
        }
        start += params.stride();
        position += 1;
    }
    chunks
}

struct ChunkWindow {
    token_start: usize,
    token_count: usize,
    byte_range: (usize, usize),
    position: u32,
}

fn make_chunk(unit: &Unit, text: &str, w: ChunkWindow) -> Chunk {
    let text_sha256 = sha256_hex(text.as_bytes());
    let id_input = format!("v1|{}|{}|{}", unit.unit_id, w.position, text_sha256);
    Chunk {
        chunk_id: sha256_hex(id_input.as_bytes()),
        unit_id: unit.unit_id.clone(),
        unit_title: unit.title.clone(),
        text: text.to_string(),
        text_sha256,
        token_count: to_u32(w.token_count),
        token_start: to_u32(w.token_start),
        byte_range: [to_u32(w.byte_range.0), to_u32(w.byte_range.1)],
        position_in_unit: w.position,
        overlap_with_prev: w.position > 0,
    }
}

fn to_u32(v: usize) -> u32 {
    v.min(u32::MAX as usize) as u32
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}
