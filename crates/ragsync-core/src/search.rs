//! Hybrid retrieval over a [`VectorIndex`].
//!
//! # Scoring
//!
//! 1. Embed the query (optional instruction prefix, stemmed when stemming
//!    is on). A backend failure fails the search.
//! 2. Load all chunks from the index and compute each chunk's raw
//!    distance under the configured [`DistanceMetric`].
//! 3. Semantic only: `score = similarity(distance)`.
//!    Hybrid: min-max normalize semantic similarity and BM25 scores to
//!    `[0, 1]`, then `score = bm25_weight × lexical + semantic_weight × semantic`.
//! 4. Stable sort by score (desc); ties keep index insertion order.
//! 5. Truncate to `k`.
//! 6. Surface the top hit's source link only if its raw distance is
//!    strictly below `similarity_threshold`.

use serde::Serialize;

use crate::embedding::{embed_query, DistanceMetric, EmbeddingProvider};
use crate::error::SearchError;
use crate::index::{IndexedChunk, VectorIndex};
use crate::lexical::{bm25_scores, Bm25Params};
use crate::stem::TextNormalizer;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub metric: DistanceMetric,
    /// Combine lexical and semantic scores; semantic only when false.
    pub hybrid: bool,
    pub bm25_weight: f64,
    pub semantic_weight: f64,
    pub bm25: Bm25Params,
    /// Raw distance the top hit must beat for its source link to be shown.
    pub similarity_threshold: f64,
    /// Must match the stemming setting the index was built with.
    pub stemming: bool,
    /// Prefix for instruction-aware embedding models.
    pub query_instruction: Option<String>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Cosine,
            hybrid: false,
            bm25_weight: 0.6,
            semantic_weight: 0.4,
            bm25: Bm25Params::default(),
            similarity_threshold: 1.0,
            stemming: false,
            query_instruction: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: IndexedChunk,
    /// Combined ranking score (higher is better).
    pub score: f64,
    /// Raw semantic distance (lower is better).
    pub distance: f64,
    /// Semantic component as used in `score`.
    pub semantic_score: f64,
    /// Lexical component as used in `score`; absent when hybrid is off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// Whether the top hit is relevant enough to show its source link.
    pub include_source_link: bool,
    /// The top hit's `url`, present only when `include_source_link` is set.
    pub source_link: Option<String>,
}

pub struct HybridRetriever<'a> {
    index: &'a dyn VectorIndex,
    embedder: &'a dyn EmbeddingProvider,
    params: RetrievalParams,
    normalizer: TextNormalizer,
}

impl<'a> HybridRetriever<'a> {
    pub fn new(
        index: &'a dyn VectorIndex,
        embedder: &'a dyn EmbeddingProvider,
        params: RetrievalParams,
    ) -> Self {
        let normalizer = TextNormalizer::new(params.stemming);
        Self {
            index,
            embedder,
            params,
            normalizer,
        }
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Return the top `k` chunks for `query`.
    pub async fn search(&self, query: &str, k: usize) -> Result<SearchResponse, SearchError> {
        if query.trim().is_empty() || k == 0 {
            return Ok(SearchResponse::default());
        }

        let query_text = self.normalizer.for_embedding(query);
        let query_vec = embed_query(
            self.embedder,
            self.params.query_instruction.as_deref(),
            &query_text,
        )
        .await
        .map_err(SearchError::BackendUnavailable)?;

        let chunks = self.index.load_chunks().await.map_err(SearchError::Index)?;

        let query_terms = self
            .params
            .hybrid
            .then(|| self.normalizer.terms(query));
        let hits = rank_chunks(
            chunks,
            &query_vec,
            query_terms.as_deref(),
            &self.params,
            &self.normalizer,
            k,
        );

        let (include_source_link, source_link) =
            source_link_gate(&hits, self.params.similarity_threshold);

        tracing::debug!(
            query,
            k,
            hits = hits.len(),
            hybrid = self.params.hybrid,
            include_source_link,
            "search complete"
        );

        Ok(SearchResponse {
            hits,
            include_source_link,
            source_link,
        })
    }
}

/// Score and rank chunks against an embedded query.
///
/// `query_terms` enables the lexical component; pass `None` for
/// semantic-only ranking. Chunks must be in index insertion order.
pub fn rank_chunks(
    chunks: Vec<IndexedChunk>,
    query_vec: &[f32],
    query_terms: Option<&[String]>,
    params: &RetrievalParams,
    normalizer: &TextNormalizer,
    k: usize,
) -> Vec<SearchHit> {
    if chunks.is_empty() || k == 0 {
        return Vec::new();
    }

    let distances: Vec<f64> = chunks
        .iter()
        .map(|c| params.metric.distance(query_vec, &c.vector))
        .collect();
    let similarities: Vec<f64> = distances
        .iter()
        .map(|d| params.metric.similarity(*d))
        .collect();

    let (scores, semantic, lexical): (Vec<f64>, Vec<f64>, Option<Vec<f64>>) = match query_terms {
        Some(terms) => {
            let docs: Vec<Vec<String>> = chunks.iter().map(|c| normalizer.terms(&c.text)).collect();
            let lexical_raw = bm25_scores(&docs, terms, params.bm25);
            let sem = normalize_scores(&similarities);
            let lex = normalize_scores(&lexical_raw);
            let combined = sem
                .iter()
                .zip(lex.iter())
                .map(|(s, l)| params.bm25_weight * l + params.semantic_weight * s)
                .collect();
            (combined, sem, Some(lex))
        }
        None => (similarities.clone(), similarities, None),
    };

    let mut order: Vec<usize> = (0..chunks.len()).collect();
    let rank_key = |i: usize| {
        if scores[i].is_nan() {
            f64::NEG_INFINITY
        } else {
            scores[i]
        }
    };
    // `sort_by` is stable: equal scores keep insertion order. NaN sorts last.
    order.sort_by(|&a, &b| rank_key(b).total_cmp(&rank_key(a)));
    order.truncate(k);

    let mut slots: Vec<Option<IndexedChunk>> = chunks.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| {
            slots[i].take().map(|chunk| SearchHit {
                chunk,
                score: scores[i],
                distance: distances[i],
                semantic_score: semantic[i],
                lexical_score: lexical.as_ref().map(|l| l[i]),
            })
        })
        .collect()
}

/// Decide whether the top hit's source link is surfaced: only when its raw
/// distance is strictly below `threshold`.
pub fn source_link_gate(hits: &[SearchHit], threshold: f64) -> (bool, Option<String>) {
    match hits.first() {
        Some(top) if top.distance < threshold => (true, top.chunk.url().map(str::to_string)),
        _ => (false, None),
    }
}

/// Min-max normalize scores to `[0.0, 1.0]`.
///
/// If all finite scores are equal, they normalize to `1.0`. Non-finite
/// scores normalize to `0.0`.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    let finite = scores.iter().copied().filter(|s| s.is_finite());
    let s_min = finite.clone().fold(f64::INFINITY, f64::min);
    let s_max = finite.fold(f64::NEG_INFINITY, f64::max);

    scores
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                0.0
            } else if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}
