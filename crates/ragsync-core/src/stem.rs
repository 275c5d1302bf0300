//! Tokenization and optional English stemming.
//!
//! The same [`TextNormalizer`] is used on both sides of every comparison:
//! chunk text before embedding and the query before embedding, and chunk
//! text and query terms for lexical scoring. Mixing stemmed and unstemmed
//! text would silently hurt relevance.

use rust_stemmers::{Algorithm, Stemmer};

/// Lowercase alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

pub struct TextNormalizer {
    stemmer: Option<Stemmer>,
}

impl TextNormalizer {
    pub fn new(stemming: bool) -> Self {
        Self {
            stemmer: stemming.then(|| Stemmer::create(Algorithm::English)),
        }
    }

    pub fn is_stemming(&self) -> bool {
        self.stemmer.is_some()
    }

    /// Terms used for lexical scoring.
    pub fn terms(&self, text: &str) -> Vec<String> {
        let tokens = tokenize(text);
        match &self.stemmer {
            Some(stemmer) => tokens
                .iter()
                .map(|t| stemmer.stem(t).into_owned())
                .collect(),
            None => tokens,
        }
    }

    /// Text handed to the embedding backend.
    ///
    /// Unchanged when stemming is off; otherwise the stemmed terms joined
    /// by single spaces.
    pub fn for_embedding(&self, text: &str) -> String {
        if self.stemmer.is_some() {
            self.terms(text).join(" ")
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Anti-Helmholtz Coils, 2 loops!"),
            vec!["anti", "helmholtz", "coils", "2", "loops"]
        );
    }

    #[test]
    fn test_stemming_off_is_identity_for_embedding() {
        let n = TextNormalizer::new(false);
        assert_eq!(n.for_embedding("Running Coils"), "Running Coils");
        assert_eq!(n.terms("Running Coils"), vec!["running", "coils"]);
    }

    #[test]
    fn test_stemming_on() {
        let n = TextNormalizer::new(true);
        assert!(n.is_stemming());
        assert_eq!(n.terms("running coils"), vec!["run", "coil"]);
        assert_eq!(n.for_embedding("Running, coils."), "run coil");
    }
}
