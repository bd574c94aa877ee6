use super::EvalCategory;

fn category(name: &str, expected_behavior: &str, questions: &[&str]) -> EvalCategory {
    EvalCategory {
        name: name.to_string(),
        expected_behavior: expected_behavior.to_string(),
        questions: questions.iter().map(|q| q.to_string()).collect(),
    }
}

/// Built-in question set spanning direct lookups, concepts and unanswerable questions.
pub fn default_suite() -> Vec<EvalCategory> {
    vec![
        category(
            "Direct Article Query",
            "Should cite the specific article and give its content",
            &[
                "What is Article 21?",
                "Explain Article 14",
                "What does Article 19 say?",
                "What is Article 32?",
            ],
        ),
        category(
            "Conceptual Query",
            "Should retrieve and synthesize several articles",
            &[
                "What are fundamental rights?",
                "What are directive principles?",
                "Explain right to equality",
                "What is freedom of speech in India?",
            ],
        ),
        category(
            "Complex Query",
            "Should combine information from multiple sources",
            &[
                "Can Parliament amend fundamental rights?",
                "How can the Constitution be amended?",
                "What is the relationship between fundamental rights and directive principles?",
                "Can states make laws on matters in the Union List?",
            ],
        ),
        category(
            "Preamble/Special",
            "Should retrieve the Preamble or relevant articles",
            &[
                "What does the Preamble say?",
                "What are the objectives in the Preamble?",
                "Is India a secular state according to the Constitution?",
            ],
        ),
        category(
            "Tricky/Negative",
            "Should say the information is not found or stay limited",
            &[
                "What is Article 1000?",
                "Is there a right to free pizza?",
                "What does the Constitution say about cryptocurrency?",
                "Can the President dissolve Parliament?",
            ],
        ),
        category(
            "Specific Rights",
            "Should cite the relevant articles with specifics",
            &[
                "Is right to privacy a fundamental right?",
                "What is right to education?",
                "Can I be arrested without a warrant?",
                "Do I have freedom of religion?",
            ],
        ),
    ]
}
