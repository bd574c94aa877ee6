pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod segment;

#[cfg(test)]
mod tests {
    use super::error::{codes, AppError};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new(codes::NO_KNOWLEDGE_BASE, "No knowledge base loaded")
            .with_details("index_path=data/index.json")
            .with_retryable(false);
        assert_eq!(err.code, "RAG_NO_KNOWLEDGE_BASE");
        assert_eq!(err.to_string(), "[RAG_NO_KNOWLEDGE_BASE] No knowledge base loaded");
        assert!(err.is(codes::NO_KNOWLEDGE_BASE));
        assert!(!err.retryable);
        assert!(err.hint().contains("build"));
    }

    #[test]
    fn every_query_error_has_a_distinct_hint() {
        let kinds = [
            codes::EMPTY_QUERY,
            codes::INVALID_K,
            codes::DIMENSION_MISMATCH,
            codes::NO_KNOWLEDGE_BASE,
            codes::EMBEDDING_UNAVAILABLE,
            codes::GENERATION_UNAVAILABLE,
            codes::GENERATION_TIMEOUT,
        ];
        let hints: std::collections::BTreeSet<&str> = kinds
            .iter()
            .map(|c| AppError::new(*c, "x").hint())
            .collect();
        assert_eq!(hints.len(), kinds.len());
    }
}
