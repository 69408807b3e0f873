use log::warn;
use serde::{Deserialize, Serialize};
use tokenizers::normalizers::unicode::NFC;
use tokenizers::{NormalizedString, Normalizer};
use unicode_segmentation::UnicodeSegmentation;

use super::lemmatizer::Lemmatizer;

/// Version of the segmentation rules. Bump whenever a change could alter the
/// token sequence produced for any input.
pub const TOKENIZER_VERSION: u32 = 2;

/// Clitics split off the end of a word, Penn Treebank style ("don't" -> "do", "n't").
const CLITICS: &[&str] = &["n't", "'s", "'re", "'ve", "'ll", "'d", "'m"];

/// Splits text into sentence and word units and reduces every word to its
/// dictionary form.
///
/// No casing or stopword handling happens here: `"Water"` and `"water"` are
/// different tokens. Callers that want case folding must do it explicitly
/// (the count vectorizer does, behind its own persisted flag).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTokenizer {
    lemmatizer: Lemmatizer,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self {
            lemmatizer: Lemmatizer::new(),
        }
    }

    /// Returns the lemmatized tokens of `text` as a lazy iterator.
    ///
    /// Segmentation happens up front, lemmatization as the iterator is driven.
    /// Empty or whitespace-only input yields an empty iterator, never an error.
    pub fn tokens(&self, text: &str) -> impl Iterator<Item = String> {
        let lemmatizer = self.lemmatizer;
        let normalized = normalize(text);
        let words: Vec<String> = sentences(&normalized)
            .flat_map(split_words)
            .collect();
        words
            .into_iter()
            .map(move |word| lemmatizer.lemmatize(&word).into_owned())
    }

    /// Collects [`tokens`](Self::tokens) into a vector.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokens(text).collect()
    }
}

/// Tokenizes `text` with the default [`WordTokenizer`].
///
/// # Example
/// ```
/// use triage::text::tokenize;
///
/// assert_eq!(tokenize("We need tents."), vec!["We", "need", "tent", "."]);
/// assert!(tokenize("").is_empty());
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    WordTokenizer::new().tokenize(text)
}

/// Splits text on UAX #29 sentence boundaries, dropping whitespace-only pieces.
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_sentence_bounds()
        .filter(|sentence| !sentence.trim().is_empty())
}

/// Canonical composition so that visually identical inputs share tokens.
fn normalize(text: &str) -> String {
    let mut normalized = NormalizedString::from(text);
    match NFC.normalize(&mut normalized) {
        Ok(()) => normalized.get().to_string(),
        Err(e) => {
            warn!("NFC normalization failed, using raw text: {}", e);
            text.to_string()
        }
    }
}

/// UAX #29 word segments without whitespace, with trailing clitics split off.
fn split_words(sentence: &str) -> Vec<String> {
    let mut words = Vec::new();
    for segment in sentence.split_word_bounds() {
        let segment: String = segment
            .chars()
            .filter(|&c| !is_invisible_format(c))
            .map(|c| if c == '\u{2019}' { '\'' } else { c })
            .collect();
        if segment.chars().all(|c| c.is_whitespace() || is_joiner(c)) {
            continue;
        }
        match split_clitic(&segment) {
            Some((stem, clitic)) => {
                words.push(stem.to_string());
                words.push(clitic.to_string());
            }
            None => words.push(segment),
        }
    }
    words
}

/// Format (Cf) characters with no rendering of their own: byte order mark,
/// zero-width space, bidi controls, soft hyphen and invisible operators.
/// Zero-width (non-)joiners are kept inside words.
fn is_invisible_format(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{061C}'
            | '\u{180E}'
            | '\u{200B}'
            | '\u{200E}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
    )
}

fn is_joiner(c: char) -> bool {
    matches!(c, '\u{200C}' | '\u{200D}')
}

fn split_clitic(word: &str) -> Option<(&str, &str)> {
    let lower = word.to_lowercase();
    // Lowercasing can change byte lengths for some scripts; only split when it didn't.
    if lower.len() != word.len() {
        return None;
    }
    CLITICS.iter().find_map(|clitic| {
        if lower.len() > clitic.len() && lower.ends_with(clitic) {
            let at = word.len() - clitic.len();
            word.is_char_boundary(at).then(|| word.split_at(at))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punctuation_is_kept_as_tokens() {
        assert_eq!(
            tokenize("Help, please!"),
            vec!["Help", ",", "please", "!"]
        );
    }

    #[test]
    fn test_contractions_are_split() {
        assert_eq!(tokenize("We don't have food"), vec!["We", "do", "n't", "have", "food"]);
        assert_eq!(tokenize("it's cold"), vec!["it", "'s", "cold"]);
        assert_eq!(tokenize("we\u{2019}re fine"), vec!["we", "'re", "fine"]);
    }

    #[test]
    fn test_tokens_are_lemmatized() {
        assert_eq!(tokenize("blankets and tents"), vec!["blanket", "and", "tent"]);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \n\t ").is_empty());
    }

    #[test]
    fn test_determinism() {
        let text = "People in the villages need medicines. Send help now!";
        assert_eq!(tokenize(text), tokenize(text));
        assert!(!tokenize(text).is_empty());
    }

    #[test]
    fn test_invisible_format_characters_dropped() {
        assert_eq!(tokenize("\u{feff}Send it"), vec!["Send", "it"]);
        assert_eq!(tokenize("need\u{200b} water\u{feff}"), vec!["need", "water"]);
        assert!(tokenize("\u{feff}\u{200b}\u{200d}").is_empty());
    }

    #[test]
    fn test_nfc_normalization() {
        let composed = "caf\u{e9}";
        let decomposed = "cafe\u{301}";
        assert_eq!(tokenize(composed), tokenize(decomposed));
    }

    #[test]
    fn test_sentences_skip_blank_pieces() {
        let found: Vec<&str> = sentences("Need water. Nice day!  ").collect();
        assert_eq!(found.len(), 2);
        assert!(found[0].starts_with("Need"));
    }

    #[test]
    fn test_tokens_iterator_is_lazy_sequence() {
        let tokenizer = WordTokenizer::new();
        let mut tokens = tokenizer.tokens("boxes of food");
        assert_eq!(tokens.next().as_deref(), Some("box"));
        assert_eq!(tokens.next().as_deref(), Some("of"));
    }
}
