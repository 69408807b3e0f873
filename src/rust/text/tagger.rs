use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Version of the tagging lexicon and fallback rules.
pub const TAGGER_VERSION: u32 = 1;

/// Penn Treebank part-of-speech tags.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PosTag {
    CC,
    CD,
    DT,
    EX,
    IN,
    JJ,
    MD,
    NN,
    NNS,
    NNP,
    PRP,
    /// `PRP$`
    PRPS,
    RB,
    TO,
    UH,
    VB,
    VBD,
    VBG,
    VBN,
    VBP,
    VBZ,
    WDT,
    WP,
    WRB,
    /// Sentence punctuation and symbols
    Punct,
}

impl PosTag {
    /// The Penn Treebank spelling of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CC => "CC",
            Self::CD => "CD",
            Self::DT => "DT",
            Self::EX => "EX",
            Self::IN => "IN",
            Self::JJ => "JJ",
            Self::MD => "MD",
            Self::NN => "NN",
            Self::NNS => "NNS",
            Self::NNP => "NNP",
            Self::PRP => "PRP",
            Self::PRPS => "PRP$",
            Self::RB => "RB",
            Self::TO => "TO",
            Self::UH => "UH",
            Self::VB => "VB",
            Self::VBD => "VBD",
            Self::VBG => "VBG",
            Self::VBN => "VBN",
            Self::VBP => "VBP",
            Self::VBZ => "VBZ",
            Self::WDT => "WDT",
            Self::WP => "WP",
            Self::WRB => "WRB",
            Self::Punct => ".",
        }
    }

    /// Base form (`VB`) or non-3rd-person present (`VBP`).
    pub fn is_base_or_present_verb(&self) -> bool {
        matches!(self, Self::VB | Self::VBP)
    }

    fn is_have_or_be(word: &str) -> bool {
        matches!(
            word,
            "have" | "has" | "had" | "be" | "is" | "are" | "am" | "was" | "were" | "been" | "being"
        )
    }
}

/// Assigns one part-of-speech tag per token.
pub trait PosTagger: Send + Sync {
    /// Tags a tokenized sentence. The output has exactly one tag per input token.
    fn tag(&self, tokens: &[String]) -> Vec<PosTag>;
}

lazy_static! {
    static ref CLOSED_CLASS: HashMap<&'static str, PosTag> = {
        use PosTag::*;
        let mut words = HashMap::new();
        for w in ["the", "a", "an", "this", "that", "these", "those", "every", "each", "some",
                  "any", "no", "all", "both", "another", "either", "neither"] {
            words.insert(w, DT);
        }
        for w in ["in", "on", "at", "of", "for", "from", "with", "by", "about", "into", "near",
                  "after", "before", "during", "without", "under", "over", "since", "until",
                  "because", "if", "than", "through", "between", "against", "around", "like",
                  "across", "behind", "beside", "within", "upon", "outside", "inside"] {
            words.insert(w, IN);
        }
        for w in ["i", "you", "we", "they", "he", "she", "it", "me", "us", "them", "him",
                  "myself", "ourselves", "themselves", "yourself", "itself", "someone",
                  "everyone", "anyone", "nobody", "somebody", "everybody"] {
            words.insert(w, PRP);
        }
        for w in ["my", "your", "our", "their", "his", "her", "its"] {
            words.insert(w, PRPS);
        }
        for w in ["and", "or", "but", "nor", "yet", "so", "&"] {
            words.insert(w, CC);
        }
        for w in ["can", "could", "will", "would", "shall", "should", "may", "might", "must",
                  "ca", "wo", "'ll", "'d"] {
            words.insert(w, MD);
        }
        for w in ["what", "who", "whom"] {
            words.insert(w, WP);
        }
        for w in ["where", "when", "how", "why"] {
            words.insert(w, WRB);
        }
        words.insert("which", WDT);
        words.insert("whose", WP);
        words.insert("to", TO);
        words.insert("there", EX);
        for w in ["not", "n't", "very", "also", "now", "here", "still", "just", "already",
                  "soon", "again", "too", "only", "even", "never", "always", "often", "really",
                  "today", "tomorrow", "yesterday", "tonight", "quickly", "urgently", "asap"] {
            words.insert(w, RB);
        }
        for w in ["hello", "hi", "hey", "ok", "okay", "oh", "thanks", "thank-you"] {
            words.insert(w, UH);
        }
        for (w, tag) in [("is", VBZ), ("'s", VBZ), ("are", VBP), ("'re", VBP), ("am", VBP),
                         ("'m", VBP), ("was", VBD), ("were", VBD), ("be", VB), ("been", VBN),
                         ("being", VBG), ("have", VBP), ("'ve", VBP), ("has", VBZ), ("had", VBD),
                         ("do", VBP), ("does", VBZ), ("did", VBD), ("done", VBN)] {
            words.insert(w, tag);
        }
        words
    };

    /// Verbs in base form. Many double as nouns ("need", "help", "call").
    static ref BASE_VERBS: HashSet<&'static str> = [
        "need", "help", "send", "give", "bring", "get", "want", "please", "go", "come",
        "call", "save", "rescue", "provide", "deliver", "distribute", "supply", "feed",
        "evacuate", "find", "know", "tell", "let", "make", "take", "contact", "share",
        "support", "donate", "assist", "protect", "stop", "look", "keep", "stay", "move",
        "leave", "live", "die", "eat", "drink", "sleep", "build", "repair", "fix", "clean",
        "open", "close", "see", "hear", "say", "ask", "answer", "report", "check", "confirm",
        "register", "visit", "collect", "receive", "pray", "hope", "think", "believe", "lose",
        "suffer", "survive", "wait", "try", "use", "work", "pay", "buy", "sell", "return",
        "start", "continue", "inform", "advise", "warn", "prepare", "shelter", "treat",
        "vaccinate", "cook", "boil", "drop", "bury", "search", "locate", "reach", "carry",
        "transport", "dig", "pump", "drain", "clear", "remove", "restore",
    ]
    .into_iter()
    .collect();

    static ref ADJECTIVES: HashSet<&'static str> = [
        "nice", "good", "bad", "new", "old", "many", "much", "more", "most", "few", "little",
        "other", "big", "small", "large", "great", "high", "low", "long", "short", "hot",
        "cold", "warm", "clean", "dirty", "safe", "sick", "ill", "hungry", "thirsty", "poor",
        "dead", "alive", "injured", "homeless", "urgent", "serious", "severe", "heavy", "free",
        "local", "medical", "human", "national", "international", "clear", "enough", "same",
        "such", "first", "last", "next", "able", "available", "possible", "ready", "sure",
    ]
    .into_iter()
    .collect();

    /// Nouns the suffix rules would mistag ("family" is not an adverb).
    static ref COMMON_NOUNS: HashSet<&'static str> = [
        "family", "assembly", "ally", "rally", "belly", "july", "italy", "water", "food",
        "weather", "person", "child", "house", "home", "area", "road", "rain", "flood",
        "earthquake", "storm", "hurricane", "fire", "village", "city", "town", "camp",
        "hospital", "doctor", "medicine", "tent", "blanket", "electricity", "power",
    ]
    .into_iter()
    .collect();
}

/// Deterministic tagger driven by a closed-class lexicon, a base-verb lexicon
/// and suffix rules, with a one-tag lookbehind for verb/noun ambiguity.
///
/// Sentence-initial base verbs are tagged `VB`: in this domain an initial
/// "Need", "Send" or "Please" reads as a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconTagger;

impl LexiconTagger {
    pub fn new() -> Self {
        LexiconTagger
    }

    fn tag_word(token: &str, position: usize, prev: Option<(&str, PosTag)>) -> PosTag {
        let word = token.to_lowercase();

        if word.chars().all(|c| !c.is_alphanumeric()) {
            return PosTag::Punct;
        }
        if word.chars().any(|c| c.is_ascii_digit())
            && word.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ':' | '/'))
        {
            return PosTag::CD;
        }
        if let Some(tag) = CLOSED_CLASS.get(word.as_str()) {
            return *tag;
        }

        let prev_tag = prev.map(|(_, tag)| tag);
        let after_have_or_be = prev.is_some_and(|(w, _)| PosTag::is_have_or_be(w));

        if BASE_VERBS.contains(word.as_str()) {
            if prev.is_some_and(|(w, _)| w == "please") {
                return PosTag::VB;
            }
            return match prev_tag {
                None => PosTag::VB,
                Some(PosTag::TO) | Some(PosTag::MD) | Some(PosTag::Punct) => PosTag::VB,
                Some(PosTag::PRP) | Some(PosTag::NNS) | Some(PosTag::RB) | Some(PosTag::WRB) => {
                    PosTag::VBP
                }
                Some(PosTag::DT) | Some(PosTag::PRPS) | Some(PosTag::JJ) | Some(PosTag::IN) => {
                    PosTag::NN
                }
                Some(_) if position == 0 => PosTag::VB,
                Some(_) => PosTag::VBP,
            };
        }
        if let Some(stem) = word.strip_suffix('s') {
            if BASE_VERBS.contains(stem) {
                return match prev_tag {
                    Some(PosTag::DT) | Some(PosTag::PRPS) | Some(PosTag::JJ) | Some(PosTag::CD) => {
                        PosTag::NNS
                    }
                    _ => PosTag::VBZ,
                };
            }
        }
        if ADJECTIVES.contains(word.as_str()) {
            return PosTag::JJ;
        }
        if COMMON_NOUNS.contains(word.as_str()) {
            return PosTag::NN;
        }

        let len = word.chars().count();
        if len > 4 && word.ends_with("ing") {
            return PosTag::VBG;
        }
        if len > 3 && word.ends_with("ed") {
            return if after_have_or_be { PosTag::VBN } else { PosTag::VBD };
        }
        if len > 3 && word.ends_with("ly") {
            return PosTag::RB;
        }
        const NOUN_SUFFIXES: &[&str] = &["tion", "sion", "ment", "ness", "ity", "ance", "ence", "ship", "hood"];
        if NOUN_SUFFIXES.iter().any(|s| word.ends_with(s)) {
            return PosTag::NN;
        }
        const ADJ_SUFFIXES: &[&str] = &["ous", "ful", "able", "ible", "ive", "less", "ical", "ish"];
        if len > 4 && ADJ_SUFFIXES.iter().any(|s| word.ends_with(s)) {
            return PosTag::JJ;
        }
        if position > 0 && token.chars().next().is_some_and(char::is_uppercase) {
            return PosTag::NNP;
        }
        if len > 3 && word.ends_with('s') && !word.ends_with("ss") {
            return PosTag::NNS;
        }
        PosTag::NN
    }
}

impl PosTagger for LexiconTagger {
    fn tag(&self, tokens: &[String]) -> Vec<PosTag> {
        let mut tags: Vec<PosTag> = Vec::with_capacity(tokens.len());
        for (position, token) in tokens.iter().enumerate() {
            let prev = position
                .checked_sub(1)
                .map(|i| (tokens[i].as_str(), tags[i]));
            let prev_lower = prev.map(|(w, t)| (w.to_lowercase(), t));
            let tag = Self::tag_word(
                token,
                position,
                prev_lower.as_ref().map(|(w, t)| (w.as_str(), *t)),
            );
            tags.push(tag);
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(sentence: &[&str]) -> Vec<&'static str> {
        let tokens: Vec<String> = sentence.iter().map(|s| s.to_string()).collect();
        LexiconTagger::new()
            .tag(&tokens)
            .iter()
            .map(PosTag::as_str)
            .collect()
    }

    #[test]
    fn test_sentence_initial_base_verb() {
        assert_eq!(tags(&["Need", "water"]), vec!["VB", "NN"]);
        assert_eq!(tags(&["please", "send", "food"]), vec!["VB", "VB", "NN"]);
    }

    #[test]
    fn test_non_verb_openers() {
        assert_eq!(tags(&["nice", "weather", "today"]), vec!["JJ", "NN", "RB"]);
        assert_eq!(tags(&["The", "road", "is", "blocked"]), vec!["DT", "NN", "VBZ", "VBN"]);
    }

    #[test]
    fn test_verb_noun_ambiguity_uses_previous_tag() {
        assert_eq!(tags(&["we", "need", "tents"]), vec!["PRP", "VBP", "NNS"]);
        assert_eq!(tags(&["our", "need", "is", "great"]), vec!["PRP$", "NN", "VBZ", "JJ"]);
        assert_eq!(tags(&["he", "needs", "tents"]), vec!["PRP", "VBZ", "NNS"]);
    }

    #[test]
    fn test_numbers_and_punctuation() {
        assert_eq!(tags(&["200", "family", "."]), vec!["CD", "NN", "."]);
        assert_eq!(tags(&["!"]), vec!["."]);
    }

    #[test]
    fn test_output_length_matches_input() {
        assert!(LexiconTagger::new().tag(&[]).is_empty());
        let tokens: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(LexiconTagger::new().tag(&tokens).len(), 4);
    }
}
