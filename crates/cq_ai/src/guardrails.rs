use std::collections::BTreeSet;

use crate::answer::prompts::NOT_FOUND_PHRASE;

/// Source numbers (1-based) an answer cites as `Source N`, limited to `1..=source_count`.
///
/// Matching is case-insensitive, allows spaces between the word and the number and
/// rejects words that merely end in "source" (e.g. "resource 2").
pub fn cited_labels(answer: &str, source_count: usize) -> BTreeSet<u32> {
    let lower = answer.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let needle = b"source";
    let mut out = BTreeSet::new();

    let mut i = 0;
    while i + needle.len() <= bytes.len() {
        if &bytes[i..i + needle.len()] != needle {
            i += 1;
            continue;
        }
        let word_start = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
        let mut j = i + needle.len();
        while j < bytes.len() && bytes[j] == b' ' {
            j += 1;
        }
        let digits_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if word_start && j > digits_start {
            if let Ok(n) = lower[digits_start..j].parse::<u32>() {
                if n >= 1 && (n as usize) <= source_count {
                    out.insert(n);
                }
            }
        }
        i = j.max(i + 1);
    }
    out
}

/// True when the answer carries the fixed not-found sentence (case and spacing ignored).
pub fn mentions_not_found(answer: &str) -> bool {
    let normalize = |s: &str| {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    };
    let phrase = normalize(NOT_FOUND_PHRASE.trim_end_matches('.'));
    normalize(answer).contains(&phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_labels_in_common_spellings() {
        let a = "Per [Source 1] and source 3, also (SOURCE  2).";
        assert_eq!(cited_labels(a, 3), BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn ignores_out_of_range_and_embedded_words() {
        assert!(cited_labels("see Source 4", 3).is_empty());
        assert!(cited_labels("Source 0 says", 3).is_empty());
        assert!(cited_labels("a resource 1 was used", 3).is_empty());
        assert!(cited_labels("the source says so", 3).is_empty());
    }

    #[test]
    fn not_found_phrase_is_detected_loosely() {
        assert!(mentions_not_found(
            "this information is not found in the   provided\nconstitutional text"
        ));
        assert!(!mentions_not_found("The information is in Article 21."));
        assert!(mentions_not_found(NOT_FOUND_PHRASE));
    }
}
