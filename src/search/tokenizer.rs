//! Tokenization for lexical scoring.
//!
//! Lowercases, turns every character that is neither a word character nor
//! whitespace into a space, then splits on whitespace. No stemming and no
//! stopword removal; BM25's idf already down-weights common tokens.

use once_cell::sync::Lazy;
use regex::Regex;

// Unicode-aware \w, so accented letters are kept
static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("Invalid non-word regex pattern"));

pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();

    NON_WORD
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_splits() {
        assert_eq!(
            tokenize("Diabetes  Symptoms\tAND\nCauses"),
            vec!["diabetes", "symptoms", "and", "causes"]
        );
    }

    #[test]
    fn test_punctuation_keeps_word_boundaries() {
        assert_eq!(tokenize("fever,cough;fatigue"), vec!["fever", "cough", "fatigue"]);
        assert_eq!(tokenize("can't breathe!"), vec!["can", "t", "breathe"]);
    }

    #[test]
    fn test_underscores_and_digits_are_word_chars() {
        assert_eq!(tokenize("covid_19 type-2"), vec!["covid_19", "type", "2"]);
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("?!...;").is_empty());
    }

    #[test]
    fn test_non_ascii_letters_survive() {
        assert_eq!(tokenize("Café Ödem"), vec!["café", "ödem"]);
    }
}
