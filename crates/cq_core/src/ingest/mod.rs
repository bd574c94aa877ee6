//! Plain-text cleanup and article extraction.
//!
//! Input is text that has already been pulled out of the source document; getting
//! text out of a PDF happens upstream.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{PipelineWarning, Unit};
use crate::error::{codes, AppError};

pub const PREAMBLE_UNIT_ID: &str = "PREAMBLE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestOutput {
    pub units: Vec<Unit>,
    pub warnings: Vec<PipelineWarning>,
}

fn compile(pattern: &str) -> Result<Regex, AppError> {
    Regex::new(pattern).map_err(|e| {
        AppError::new(codes::INGEST_FAILED, "Failed to prepare text patterns")
            .with_details(format!("pattern={pattern}; err={e}"))
    })
}

/// Strip page furniture (page numbers, running headers) and normalize spacing.
pub fn clean_text(raw: &str) -> Result<String, AppError> {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");

    let page_number_line = compile(r"(?m)^[ \t]*\d+[ \t]*$")?;
    let page_marker = compile(r"(?i)Page \d+")?;
    let running_headers = compile(r"(?i)THE CONSTITUTION OF INDIA|GOVERNMENT OF INDIA")?;
    let many_newlines = compile(r"\n{3,}")?;
    let many_spaces = compile(r" {2,}")?;

    let text = page_number_line.replace_all(&text, "");
    let text = page_marker.replace_all(&text, "");
    let text = running_headers.replace_all(&text, "");
    // Lines emptied above may leave whitespace-only lines behind.
    let text = text
        .lines()
        .map(|l| if l.trim().is_empty() { "" } else { l })
        .collect::<Vec<_>>()
        .join("\n");
    let text = many_newlines.replace_all(&text, "\n\n");
    let text = many_spaces.replace_all(&text, " ");
    Ok(text.trim().to_string())
}

struct Heading {
    start: usize,
    end: usize,
    kind: HeadingKind,
}

enum HeadingKind {
    Article { number: String, title: String },
    Preamble,
    Stop,
}

/// Split cleaned text into units at `Article <n>` headings.
///
/// A leading `PREAMBLE` section becomes its own unit. Article bodies end at the next
/// article heading, a `PART <roman>` / `SCHEDULE` heading, or the end of the text.
pub fn extract_units(cleaned: &str) -> Result<IngestOutput, AppError> {
    // Headings are capitalized and end the number with a period, a dash or the line.
    // Lowercase "article N" is a cross-reference, even when a line wrap puts it first.
    let article = compile(
        r"(?m)^[ \t]*Article[ \t]+(\d+[A-Z]?)(?:[ \t]*(?:\.|[—–-])[ \t]*([^\n]*))?[ \t]*$",
    )?;
    let preamble = compile(r"(?mi)^[ \t]*PREAMBLE[ \t]*$")?;
    let stop = compile(r"(?m)^[ \t]*(?:PART[ \t]+[IVXLC]+\b|SCHEDULE\b)[^\n]*$")?;
    let inner_ws = compile(r"\s*\n\s*")?;
    let many_spaces = compile(r" {2,}")?;

    let mut headings: Vec<Heading> = Vec::new();
    for caps in article.captures_iter(cleaned) {
        let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let title = caps
            .get(2)
            .map(|m| m.as_str().trim().trim_end_matches(['.', '—', '–', '-']).trim())
            .unwrap_or("")
            .to_string();
        headings.push(Heading {
            start: whole.start(),
            end: whole.end(),
            kind: HeadingKind::Article {
                number: num.as_str().to_uppercase(),
                title,
            },
        });
    }
    if let Some(m) = preamble.find(cleaned) {
        headings.push(Heading {
            start: m.start(),
            end: m.end(),
            kind: HeadingKind::Preamble,
        });
    }
    for m in stop.find_iter(cleaned) {
        headings.push(Heading {
            start: m.start(),
            end: m.end(),
            kind: HeadingKind::Stop,
        });
    }
    headings.sort_by_key(|h| h.start);

    let mut out = IngestOutput {
        units: Vec::new(),
        warnings: Vec::new(),
    };
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut next_seq: u32 = 1;

    for (i, h) in headings.iter().enumerate() {
        let body_end = headings.get(i + 1).map(|n| n.start).unwrap_or(cleaned.len());
        let raw_body = &cleaned[h.end..body_end];
        let body = inner_ws.replace_all(raw_body.trim(), " ");
        let body = many_spaces.replace_all(&body, " ").trim().to_string();

        match &h.kind {
            HeadingKind::Stop => {}
            HeadingKind::Preamble => {
                seen.insert(PREAMBLE_UNIT_ID.to_string());
                out.units
                    .push(Unit::new(PREAMBLE_UNIT_ID, "Preamble", body, 0));
            }
            HeadingKind::Article { number, title } => {
                let unit_id = format!("Article {number}");
                if !seen.insert(unit_id.clone()) {
                    // Keep the text: it stays with the unit it follows.
                    let carried = inner_ws.replace_all(cleaned[h.start..body_end].trim(), " ");
                    let carried = many_spaces.replace_all(&carried, " ").trim().to_string();
                    if let Some(prev) = out.units.last_mut() {
                        if prev.body_text.is_empty() {
                            prev.body_text = carried;
                        } else {
                            prev.body_text.push(' ');
                            prev.body_text.push_str(&carried);
                        }
                    }
                    out.warnings.push(
                        PipelineWarning::new(
                            "INGEST_DUPLICATE_ARTICLE",
                            "Repeated article heading merged into the preceding text",
                        )
                        .with_details(format!("unit_id={unit_id}; offset={}", h.start)),
                    );
                    continue;
                }
                if body.is_empty() {
                    out.warnings.push(
                        PipelineWarning::new("INGEST_EMPTY_ARTICLE", "Article heading has no text")
                            .with_details(format!("unit_id={unit_id}")),
                    );
                }
                let title = if title.is_empty() {
                    unit_id.clone()
                } else {
                    title.clone()
                };
                out.units.push(Unit::new(unit_id, title, body, next_seq));
                next_seq += 1;
            }
        }
    }

    tracing::info!(
        units = out.units.len(),
        warnings = out.warnings.len(),
        "extracted units from text"
    );
    Ok(out)
}
