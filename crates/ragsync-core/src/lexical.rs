//! Okapi BM25 scoring over a small in-memory corpus.
//!
//! ```text
//! score(D, Q) = Σ idf(q) · tf(q, D) · (k1 + 1) / (tf(q, D) + k1 · (1 − b + b · |D| / avgdl))
//! idf(q)      = ln(1 + (N − df(q) + 0.5) / (df(q) + 0.5))
//! ```
//!
//! `k1` controls term-frequency saturation, `b` the strength of document
//! length normalization (`0` disables it).

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Score every document (already tokenized) against the query terms.
///
/// Returns one score per document, in input order. Repeated query terms
/// count once.
pub fn bm25_scores(docs: &[Vec<String>], query: &[String], params: Bm25Params) -> Vec<f64> {
    let n = docs.len();
    if n == 0 {
        return Vec::new();
    }

    let terms: HashSet<&str> = query.iter().map(String::as_str).collect();
    if terms.is_empty() {
        return vec![0.0; n];
    }

    let total_len: usize = docs.iter().map(Vec::len).sum();
    let avgdl = total_len as f64 / n as f64;

    let mut df: HashMap<&str, usize> = HashMap::new();
    for doc in docs {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique.intersection(&terms) {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    docs.iter()
        .map(|doc| {
            let mut tf: HashMap<&str, usize> = HashMap::new();
            for token in doc {
                if terms.contains(token.as_str()) {
                    *tf.entry(token.as_str()).or_insert(0) += 1;
                }
            }
            let dl = doc.len() as f64;
            let norm = if avgdl > 0.0 {
                1.0 - params.b + params.b * dl / avgdl
            } else {
                1.0
            };
            tf.iter()
                .map(|(term, &count)| {
                    let df_t = df.get(term).copied().unwrap_or(0) as f64;
                    let idf = (1.0 + (n as f64 - df_t + 0.5) / (df_t + 0.5)).ln();
                    let tf_t = count as f64;
                    idf * tf_t * (params.k1 + 1.0) / (tf_t + params.k1 * norm)
                })
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stem::tokenize;

    fn corpus(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenize(t)).collect()
    }

    #[test]
    fn test_empty_corpus() {
        assert!(bm25_scores(&[], &tokenize("x"), Bm25Params::default()).is_empty());
    }

    #[test]
    fn test_empty_query_scores_zero() {
        let docs = corpus(&["a b", "c"]);
        assert_eq!(bm25_scores(&docs, &[], Bm25Params::default()), vec![0.0, 0.0]);
    }

    #[test]
    fn test_matching_doc_ranks_first() {
        let docs = corpus(&[
            "python machine learning",
            "magnetic field of helmholtz coils",
            "kubernetes deployment",
        ]);
        let scores = bm25_scores(&docs, &tokenize("coils field"), Bm25Params::default());
        assert!(scores[1] > scores[0]);
        assert!(scores[1] > scores[2]);
        assert_eq!(scores[0], 0.0);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let docs = corpus(&["coil coil common", "common text", "common words"]);
        let scores = bm25_scores(&docs, &tokenize("coil common"), Bm25Params::default());
        let only_common = bm25_scores(&docs, &tokenize("common"), Bm25Params::default());
        assert!(scores[0] - only_common[0] > only_common[1]);
    }

    #[test]
    fn test_k1_controls_saturation() {
        let docs = corpus(&["coil", "coil coil coil coil", "other"]);
        let q = tokenize("coil");
        let low = bm25_scores(&docs, &q, Bm25Params { k1: 1.2, b: 0.0 });
        let high = bm25_scores(&docs, &q, Bm25Params { k1: 2.0, b: 0.0 });
        let ratio_low = low[1] / low[0];
        let ratio_high = high[1] / high[0];
        assert!(ratio_high > ratio_low);
    }

    #[test]
    fn test_b_zero_ignores_length() {
        let docs = corpus(&["coil", "coil padding padding padding padding"]);
        let scores = bm25_scores(&docs, &tokenize("coil"), Bm25Params { k1: 1.5, b: 0.0 });
        assert!((scores[0] - scores[1]).abs() < 1e-12);
        let scores = bm25_scores(&docs, &tokenize("coil"), Bm25Params { k1: 1.5, b: 1.0 });
        assert!(scores[0] > scores[1]);
    }
}
