use serde::{Deserialize, Serialize};

/// A structured source passage (one article, or the preamble) before chunking.
///
/// Units are immutable once extracted. `sequence_index` is document order and is
/// what chunk ordering follows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Unit {
    pub unit_id: String,
    pub title: String,
    pub body_text: String,
    pub sequence_index: u32,
}

impl Unit {
    pub fn new(
        unit_id: impl Into<String>,
        title: impl Into<String>,
        body_text: impl Into<String>,
        sequence_index: u32,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            title: title.into(),
            body_text: body_text.into(),
            sequence_index,
        }
    }
}

/// Bounded-size slice of a unit's body; the atomic retrieval object.
///
/// Notes:
/// - `text` is exactly `unit.body_text[byte_range[0]..byte_range[1]]`.
/// - `token_start` is the offset (in whitespace tokens) of the first token of `text`
///   within the unit, so `[token_start, token_start + token_count)` is the window.
/// - `chunk_id` is derived from the unit id, position and text hash, so it is stable
///   across rebuilds of the same corpus with the same chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: String,
    pub unit_id: String,
    pub unit_title: String,
    pub text: String,
    pub text_sha256: String,
    pub token_count: u32,
    pub token_start: u32,
    pub byte_range: [u32; 2],
    pub position_in_unit: u32,
    pub overlap_with_prev: bool,
}

impl Chunk {
    /// Text handed to the embedder: the unit heading, then the chunk body.
    ///
    /// The heading lets a question that names an article land on that article's chunks;
    /// `text` itself stays a verbatim slice of the unit.
    pub fn embedding_input(&self) -> String {
        format!("{} - {}\n\n{}", self.unit_id, self.unit_title, self.text.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl PipelineWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
