use serde::{Deserialize, Serialize};

/// Fixed sentence the model must use when the sources do not answer the question.
pub const NOT_FOUND_PHRASE: &str =
    "This information is not found in the provided Constitutional text.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptSource {
    pub label: String,
    pub chunk_text: String,
    pub unit_title: String,
    pub unit_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundedPrompt {
    pub instructions: String,
    pub sources: Vec<PromptSource>,
    pub question: String,
}

pub fn source_label(rank: usize) -> String {
    format!("Source {rank}")
}

pub fn instructions() -> String {
    format!(
        r#"You are a careful assistant answering questions about the Constitution of India.

Rules (non-negotiable):
1) Answer using ONLY the sources provided below.
2) Cite the sources you rely on by their label, for example [Source 1].
3) If the sources do not contain the answer, reply exactly: "{NOT_FOUND_PHRASE}"
4) Do not use outside knowledge, and do not guess."#
    )
}

impl GroundedPrompt {
    /// `sources` must already be in rank order; labels follow that order.
    pub fn new(sources: Vec<(String, String, String)>, question: &str) -> Self {
        let sources = sources
            .into_iter()
            .enumerate()
            .map(|(i, (unit_id, unit_title, chunk_text))| PromptSource {
                label: source_label(i + 1),
                chunk_text,
                unit_title,
                unit_id,
            })
            .collect();
        Self {
            instructions: instructions(),
            sources,
            question: question.to_string(),
        }
    }

    pub fn render(&self) -> String {
        let blocks = self
            .sources
            .iter()
            .map(|s| {
                format!(
                    "[{}] {} - {}\n{}",
                    s.label,
                    s.unit_id,
                    s.unit_title,
                    s.chunk_text.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n");

        format!(
            "{}\n\nSources:\n{}\n\nQuestion:\n{}\n\nAnswer:\n",
            self.instructions, blocks, self.question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_labels_sources_in_order_and_keeps_question_verbatim() {
        let p = GroundedPrompt::new(
            vec![
                (
                    "Article 21".to_string(),
                    "Protection of life and personal liberty".to_string(),
                    "No person shall be deprived of his life.".to_string(),
                ),
                (
                    "Article 14".to_string(),
                    "Equality before law".to_string(),
                    "The State shall not deny to any person equality.".to_string(),
                ),
            ],
            "What does  Article 21 say?",
        );
        let out = p.render();
        let first = out.find("[Source 1] Article 21").expect("source 1");
        let second = out.find("[Source 2] Article 14").expect("source 2");
        assert!(first < second);
        assert!(out.contains("What does  Article 21 say?"));
        assert!(out.contains(NOT_FOUND_PHRASE));
        assert!(out.contains("ONLY the sources"));
        assert!(out.contains("outside knowledge"));
    }
}
