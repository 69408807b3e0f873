use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Version of the lemma dictionary and detachment rules.
pub const LEMMATIZER_VERSION: u32 = 1;

lazy_static! {
    /// Plural forms that suffix rules get wrong.
    static ref IRREGULAR_PLURALS: HashMap<&'static str, &'static str> = [
        ("children", "child"),
        ("people", "person"),
        ("men", "man"),
        ("women", "woman"),
        ("firemen", "fireman"),
        ("policemen", "policeman"),
        ("fishermen", "fisherman"),
        ("feet", "foot"),
        ("teeth", "tooth"),
        ("mice", "mouse"),
        ("geese", "goose"),
        ("oxen", "ox"),
        ("lives", "life"),
        ("wives", "wife"),
        ("knives", "knife"),
        ("wolves", "wolf"),
        ("leaves", "leaf"),
        ("loaves", "loaf"),
        ("halves", "half"),
        ("shelves", "shelf"),
        ("thieves", "thief"),
        ("calves", "calf"),
        ("data", "datum"),
        ("criteria", "criterion"),
        ("phenomena", "phenomenon"),
        ("buses", "bus"),
        ("gases", "gas"),
        ("quizzes", "quiz"),
        ("aches", "ache"),
        ("headaches", "headache"),
        ("caches", "cache"),
        ("niches", "niche"),
        ("avalanches", "avalanche"),
        ("mustaches", "mustache"),
        ("ties", "tie"),
        ("lies", "lie"),
        ("pies", "pie"),
        ("movies", "movie"),
        ("cookies", "cookie"),
    ]
    .into_iter()
    .collect();

    /// Words that end in "s" but are not plural nouns.
    static ref UNINFLECTED: HashSet<&'static str> = [
        "news", "series", "species", "means", "physics", "mathematics", "ethics",
        "politics", "economics", "measles", "diabetes", "clothes", "scissors",
        "this", "his", "its", "was", "has", "does", "is", "as", "us", "thus",
        "yes", "always", "perhaps", "whereas", "sometimes", "besides", "unless",
        "towards", "afterwards", "nevertheless", "ours", "yours", "theirs", "hers",
        "across", "less", "alas", "bias", "atlas", "canvas", "chaos", "christmas",
    ]
    .into_iter()
    .collect();
}

/// Noun lemmatizer backed by a fixed exception table and suffix detachment
/// rules.
///
/// Only all-lowercase alphabetic words are touched; anything else (numbers,
/// punctuation, capitalized words) comes back unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lemmatizer;

impl Lemmatizer {
    pub fn new() -> Self {
        Lemmatizer
    }

    /// Reduces a word to its singular dictionary form.
    ///
    /// # Example
    /// ```
    /// use triage::text::Lemmatizer;
    ///
    /// let lemmatizer = Lemmatizer::new();
    /// assert_eq!(lemmatizer.lemmatize("supplies"), "supply");
    /// assert_eq!(lemmatizer.lemmatize("children"), "child");
    /// assert_eq!(lemmatizer.lemmatize("Houses"), "Houses");
    /// ```
    pub fn lemmatize<'a>(&self, word: &'a str) -> Cow<'a, str> {
        if !word.chars().all(|c| c.is_alphabetic() && c.is_lowercase()) {
            return Cow::Borrowed(word);
        }
        if let Some(lemma) = IRREGULAR_PLURALS.get(word) {
            return Cow::Borrowed(*lemma);
        }
        if UNINFLECTED.contains(word) || word.chars().count() <= 3 {
            return Cow::Borrowed(word);
        }

        if let Some(stem) = word.strip_suffix("ies") {
            return Cow::Owned(format!("{}y", stem));
        }
        for suffix in ["sses", "xes", "ches", "shes", "zzes"] {
            if word.ends_with(suffix) {
                return Cow::Borrowed(&word[..word.len() - 2]);
            }
        }
        if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
            return Cow::Borrowed(word);
        }
        match word.strip_suffix('s') {
            Some(stem) => Cow::Borrowed(stem),
            None => Cow::Borrowed(word),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lemma(word: &str) -> String {
        Lemmatizer::new().lemmatize(word).into_owned()
    }

    #[test]
    fn test_regular_plurals() {
        assert_eq!(lemma("tents"), "tent");
        assert_eq!(lemma("houses"), "house");
        assert_eq!(lemma("medicines"), "medicine");
        assert_eq!(lemma("sizes"), "size");
    }

    #[test]
    fn test_es_plurals() {
        assert_eq!(lemma("boxes"), "box");
        assert_eq!(lemma("churches"), "church");
        assert_eq!(lemma("bushes"), "bush");
        assert_eq!(lemma("classes"), "class");
        assert_eq!(lemma("families"), "family");
    }

    #[test]
    fn test_irregular_plurals() {
        assert_eq!(lemma("people"), "person");
        assert_eq!(lemma("women"), "woman");
        assert_eq!(lemma("lives"), "life");
        assert_eq!(lemma("buses"), "bus");
        assert_eq!(lemma("headaches"), "headache");
    }

    #[test]
    fn test_words_left_alone() {
        for word in ["water", "crisis", "virus", "loss", "news", "was", "has", "gas", "food"] {
            assert_eq!(lemma(word), word);
        }
    }

    #[test]
    fn test_non_lowercase_input_is_untouched() {
        assert_eq!(lemma("Tents"), "Tents");
        assert_eq!(lemma("42s"), "42s");
        assert_eq!(lemma("."), ".");
        assert_eq!(lemma(""), "");
    }
}
