//! Tokenizer and suffix-stripping stemmer shared by the LSA engine.
//!
//! Intentionally simple: a fixed stopword set and a table-driven stemmer,
//! not a full Porter implementation, so behavior stays deterministic and
//! language-neutral.

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "aren't", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "cannot", "could", "couldn't", "did", "didn't", "do", "does", "doesn't",
    "doing", "don't", "down", "during", "each", "few", "for", "from", "further", "had", "hadn't",
    "has", "hasn't", "have", "haven't", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "isn't", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "shan't",
    "she", "should", "shouldn't", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "wasn't", "we", "were", "weren't", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "won't", "would",
    "you", "your", "yours", "yourself", "yourselves",
];

const SUFFIXES: &[&str] = &[
    "tion", "sion", "ment", "ness", "able", "ible", "ful", "less", "ous", "ive", "ing", "ied",
    "ies", "ers", "est", "ely", "ed", "ly", "er", "es", "al", "en", "s",
];

/// Drop stopwords from `text`, word-boundary split the same way
/// [`tokenize`] does, but leave remaining words unstemmed and in their
/// original case. Used ahead of FTS5's own `porter` tokenizer, which
/// stems but has no stopword facility of its own.
pub fn strip_stopwords(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn stem(word: &str) -> &str {
    for suffix in SUFFIXES {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped;
            }
        }
    }
    word
}

/// Lowercase, split on non-letter-non-digit boundaries, drop short tokens
/// and stopwords, then stem what remains.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .filter(|w| !STOPWORDS.contains(w))
        .map(stem)
        .filter(|w| w.len() >= 2)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_splits_on_punctuation() {
        let tokens = tokenize("Fix the JWT-expiry bug!");
        assert!(tokens.contains(&"jwt".to_string()));
        assert!(tokens.contains(&"expiri".to_string()) || tokens.contains(&"expiry".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
    }

    #[test]
    fn drops_stopwords_and_short_tokens() {
        let tokens = tokenize("a an the is it of");
        assert!(tokens.is_empty());
    }

    #[test]
    fn stemmer_only_strips_when_stem_is_long_enough() {
        assert_eq!(stem("boxes"), "box");
        // "as" stripped of "s" leaves "a", below the 3-char floor, so it's left alone.
        assert_eq!(stem("as"), "as");
    }

    #[test]
    fn suffix_list_is_tried_in_order() {
        // "ing" should match before the shorter "ng" non-suffix; "running" -> "runn" stays >= 3.
        assert_eq!(stem("running"), "runn");
    }

    #[test]
    fn strip_stopwords_drops_stopwords_but_keeps_case_and_stems_untouched() {
        assert_eq!(strip_stopwords("Fix the JWT expiry bug"), "Fix JWT expiry bug");
    }

    #[test]
    fn strip_stopwords_of_all_stopwords_is_empty() {
        assert_eq!(strip_stopwords("a an the is it of"), "");
    }
}
