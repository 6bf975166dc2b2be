//! Text normalization shared by indexing and querying.
//!
//! Identifiers are split on non-alphanumerics, camelCase humps and
//! letter/digit boundaries, so `CustomerOrders`, `customer_orders` and
//! `CUSTOMER ORDERS` produce the same terms.

use crate::models::Language;

/// English stopwords. A few words that commonly name columns ("last",
/// "year") are deliberately absent.
const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

/// Split text into raw words at separators, case humps and digit runs.
pub fn split_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for chunk in text.split(|c: char| !c.is_alphanumeric()) {
        if chunk.is_empty() {
            continue;
        }
        let chars: Vec<char> = chunk.chars().collect();
        let mut start = 0;
        for i in 1..chars.len() {
            let prev = chars[i - 1];
            let cur = chars[i];
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && cur.is_uppercase())
                // "HTTPServer" -> "HTTP" "Server"
                || (prev.is_uppercase()
                    && cur.is_uppercase()
                    && next.is_some_and(|n| n.is_lowercase()))
                || (prev.is_alphabetic() && cur.is_numeric())
                || (prev.is_numeric() && cur.is_alphabetic());
            if boundary {
                words.push(chars[start..i].iter().collect());
                start = i;
            }
        }
        words.push(chars[start..].iter().collect());
    }
    words
}

/// Strip common English inflections.
pub fn stem_english(word: &str) -> String {
    let len = word.chars().count();
    let strip = |suffix: &str, replacement: &str| -> String {
        format!("{}{}", &word[..word.len() - suffix.len()], replacement)
    };

    if len > 4 && word.ends_with("ies") {
        return strip("ies", "y");
    }
    if word.ends_with("sses") {
        return strip("sses", "ss");
    }
    if len > 4
        && (word.ends_with("xes")
            || word.ends_with("ches")
            || word.ends_with("shes")
            || word.ends_with("zes"))
    {
        return strip("es", "");
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    if len > 3 && word.ends_with('s') {
        return strip("s", "");
    }
    if len > 5 && word.ends_with("ing") {
        return strip("ing", "");
    }
    if len > 4 && word.ends_with("ed") {
        return strip("ed", "");
    }
    word.to_string()
}

/// Turns text into index terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    fold_case: bool,
    language: Language,
}

impl Normalizer {
    pub fn new(case_sensitive: bool, language: Language) -> Self {
        Self {
            fold_case: !case_sensitive,
            language,
        }
    }

    pub fn terms(&self, text: &str) -> Vec<String> {
        split_words(text)
            .into_iter()
            .filter_map(|word| self.term(&word))
            .collect()
    }

    fn term(&self, word: &str) -> Option<String> {
        let folded = if self.fold_case {
            word.to_lowercase()
        } else {
            word.to_string()
        };
        match self.language {
            Language::None => Some(folded),
            Language::English => {
                let lower = folded.to_lowercase();
                if ENGLISH_STOPWORDS.contains(&lower.as_str()) {
                    return None;
                }
                // Only stem lowercase ASCII; other words pass through
                if folded.chars().all(|c| c.is_ascii_lowercase()) {
                    Some(stem_english(&folded))
                } else {
                    Some(folded)
                }
            }
        }
    }
}
