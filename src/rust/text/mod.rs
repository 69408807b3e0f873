//! Text normalization: word tokenization, noun lemmatization and
//! part-of-speech tagging.
//!
//! Everything in here is deterministic for a given dictionary version. The
//! versions are written into every persisted artifact so that a model is never
//! served with a tokenizer that would produce a different vocabulary.

mod lemmatizer;
mod tagger;
mod tokenizer;

pub use lemmatizer::{Lemmatizer, LEMMATIZER_VERSION};
pub use tagger::{LexiconTagger, PosTag, PosTagger, TAGGER_VERSION};
pub use tokenizer::{sentences, tokenize, WordTokenizer, TOKENIZER_VERSION};
