//! Ranker: lexical, vector, and hybrid retrieval over a [`Store`].
//!
//! The ranker operates entirely through the [`Store`] trait. The calling
//! application embeds the query (only when the mode needs a vector) and
//! passes the result in [`SearchRequest::query_vec`].
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Fetch `top_k × candidate_multiplier` lexical candidates (BM25).
//! 2. Fetch `top_k × candidate_multiplier` vector candidates (cosine).
//! 3. Min-max normalize each set to `[0, 1]`; a set with a single distinct
//!    score maps every member to `1.0`.
//! 4. Union by chunk id: `score = wₗ × lexical + wᵥ × vector`, a missing
//!    side contributing `0`.
//! 5. Sort by score (desc), ordinal (asc), first-seen order (lexical first).
//! 6. Truncate to `top_k` and assign 1-based ranks.
//!
//! A side whose weight is exactly `0` is not fetched at all.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

use crate::models::{DocumentClass, SearchResult};
use crate::store::{ChunkCandidate, Store};

/// Which ranking signals a query uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Lexical,
    Vector,
    Hybrid,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchMode::Lexical => "lexical",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        })
    }
}

impl FromStr for SearchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lexical" | "keyword" => Ok(SearchMode::Lexical),
            "vector" | "semantic" => Ok(SearchMode::Vector),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => bail!(
                "Unknown search mode: {}. Use lexical, vector, or hybrid.",
                other
            ),
        }
    }
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub top_k: usize,
    pub lexical_weight: f64,
    pub vector_weight: f64,
    /// Candidates fetched per side are `top_k × candidate_multiplier`.
    pub candidate_multiplier: usize,
}

impl SearchParams {
    fn candidate_limit(&self) -> usize {
        self.top_k.saturating_mul(self.candidate_multiplier.max(1))
    }
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Pre-computed query embedding. Required when [`needs_query_vector`](Self::needs_query_vector).
    pub query_vec: Option<&'a [f32]>,
    pub mode: SearchMode,
    /// Keep only results of this class. Applied after ranking.
    pub class: Option<DocumentClass>,
    pub params: SearchParams,
}

impl SearchRequest<'_> {
    fn uses_lexical(&self) -> bool {
        match self.mode {
            SearchMode::Lexical => true,
            SearchMode::Vector => false,
            SearchMode::Hybrid => self.params.lexical_weight != 0.0,
        }
    }

    fn uses_vector(&self) -> bool {
        match self.mode {
            SearchMode::Lexical => false,
            SearchMode::Vector => true,
            SearchMode::Hybrid => self.params.vector_weight != 0.0,
        }
    }

    /// Whether the caller must embed the query before searching.
    pub fn needs_query_vector(&self) -> bool {
        !self.query.trim().is_empty() && self.params.top_k > 0 && self.uses_vector()
    }
}

/// Run a search against a [`Store`] backend.
///
/// Lexical and vector modes rank by their raw score; hybrid mode fuses
/// normalized scores. Results carry 1-based ranks from that ranking, and the
/// class filter drops results afterwards without re-numbering.
pub async fn search(store: &dyn Store, req: &SearchRequest<'_>) -> Result<Vec<SearchResult>> {
    if req.query.trim().is_empty() || req.params.top_k == 0 {
        return Ok(Vec::new());
    }
    if req.params.lexical_weight < 0.0 || req.params.vector_weight < 0.0 {
        bail!("search weights must be non-negative");
    }

    let limit = req.params.candidate_limit();

    let lexical = if req.uses_lexical() {
        store.keyword_search(req.query, limit).await?
    } else {
        Vec::new()
    };

    let vector = if req.uses_vector() {
        match req.query_vec {
            Some(qv) => store.vector_search(qv, limit).await?,
            None => bail!("query_vec is required for {} mode", req.mode),
        }
    } else {
        Vec::new()
    };

    let mut results = match req.mode {
        SearchMode::Lexical => rank_raw(&lexical, req.params.top_k),
        SearchMode::Vector => rank_raw(&vector, req.params.top_k),
        SearchMode::Hybrid => fuse(
            &lexical,
            &vector,
            req.params.lexical_weight,
            req.params.vector_weight,
            req.params.top_k,
        ),
    };

    if let Some(class) = req.class {
        results.retain(|r| r.document_class == class);
    }

    Ok(results)
}

/// Min-max normalize raw scores to `[0.0, 1.0]`, preserving input order.
///
/// If all scores are equal, they are normalized to `1.0`.
pub fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<f64> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

struct Scored<'a> {
    candidate: &'a ChunkCandidate,
    seen: usize,
    score: f64,
    lexical: Option<f64>,
    vector: Option<f64>,
}

fn by_score_then_position(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then(a.candidate.ordinal.cmp(&b.candidate.ordinal))
        .then(a.seen.cmp(&b.seen))
}

fn into_results(mut scored: Vec<Scored<'_>>, top_k: usize) -> Vec<SearchResult> {
    scored.sort_by(by_score_then_position);
    scored.truncate(top_k);
    scored
        .into_iter()
        .enumerate()
        .map(|(i, s)| SearchResult {
            chunk_id: s.candidate.chunk_id.clone(),
            source_path: s.candidate.source_path.clone(),
            document_class: s.candidate.document_class,
            text: s.candidate.text.clone(),
            ordinal: s.candidate.ordinal,
            score: s.score,
            rank: i + 1,
            lexical_score: s.lexical,
            vector_score: s.vector,
        })
        .collect()
}

/// Rank a single candidate list by raw score.
pub fn rank_raw(candidates: &[ChunkCandidate], top_k: usize) -> Vec<SearchResult> {
    let scored = candidates
        .iter()
        .enumerate()
        .map(|(seen, c)| Scored {
            candidate: c,
            seen,
            score: c.raw_score,
            lexical: None,
            vector: None,
        })
        .collect();
    into_results(scored, top_k)
}

/// Fuse lexical and vector candidates into one ranked list.
pub fn fuse(
    lexical: &[ChunkCandidate],
    vector: &[ChunkCandidate],
    lexical_weight: f64,
    vector_weight: f64,
    top_k: usize,
) -> Vec<SearchResult> {
    let norm_lexical = normalize_scores(lexical);
    let norm_vector = normalize_scores(vector);

    let mut scored: Vec<Scored<'_>> = Vec::with_capacity(lexical.len() + vector.len());
    let mut by_id: HashMap<&str, usize> = HashMap::new();

    for (c, s) in lexical.iter().zip(norm_lexical) {
        if by_id.contains_key(c.chunk_id.as_str()) {
            continue;
        }
        by_id.insert(c.chunk_id.as_str(), scored.len());
        scored.push(Scored {
            candidate: c,
            seen: scored.len(),
            score: 0.0,
            lexical: Some(s),
            vector: None,
        });
    }
    for (c, s) in vector.iter().zip(norm_vector) {
        match by_id.get(c.chunk_id.as_str()) {
            Some(&i) => {
                if scored[i].vector.is_none() {
                    scored[i].vector = Some(s);
                }
            }
            None => {
                by_id.insert(c.chunk_id.as_str(), scored.len());
                scored.push(Scored {
                    candidate: c,
                    seen: scored.len(),
                    score: 0.0,
                    lexical: None,
                    vector: Some(s),
                });
            }
        }
    }

    for s in scored.iter_mut() {
        s.score = lexical_weight * s.lexical.unwrap_or(0.0)
            + vector_weight * s.vector.unwrap_or(0.0);
    }

    into_results(scored, top_k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, IndexedFile};
    use crate::store::memory::InMemoryStore;

    fn cand(id: &str, ordinal: i64, score: f64) -> ChunkCandidate {
        ChunkCandidate {
            chunk_id: id.to_string(),
            source_path: format!("/m/{}.md", id),
            document_class: DocumentClass::Other,
            text: String::new(),
            ordinal,
            raw_score: score,
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_normalize_single() {
        assert_eq!(normalize_scores(&[cand("c1", 0, 5.0)]), vec![1.0]);
    }

    #[test]
    fn test_normalize_range() {
        let n = normalize_scores(&[cand("a", 0, 10.0), cand("b", 0, 5.0), cand("c", 0, 0.0)]);
        assert!((n[0] - 1.0).abs() < 1e-9);
        assert!((n[1] - 0.5).abs() < 1e-9);
        assert!(n[2].abs() < 1e-9);
    }

    #[test]
    fn test_normalize_all_equal() {
        let n = normalize_scores(&[cand("a", 0, 3.0), cand("b", 0, 3.0)]);
        assert!(n.iter().all(|s| (*s - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_normalized_in_unit_with_max_one() {
        let n = normalize_scores(&[cand("a", 0, -5.0), cand("b", 0, 100.0), cand("c", 0, 42.0)]);
        assert!(n.iter().all(|s| (0.0..=1.0).contains(s)));
        let max = n.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_fuse_vector_similar_beats_lexical_exact() {
        let lexical = vec![cand("exact", 0, 8.0)];
        let vector = vec![cand("similar", 0, 0.92)];
        let results = fuse(&lexical, &vector, 0.3, 0.7, 10);
        assert_eq!(ids(&results), vec!["similar", "exact"]);
        assert!((results[0].score - 0.7).abs() < 1e-9);
        assert!((results[1].score - 0.3).abs() < 1e-9);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn test_fuse_missing_side_scores_zero() {
        let lexical = vec![cand("a", 0, 4.0), cand("b", 1, 1.0), cand("c", 2, 2.0)];
        let vector = vec![cand("b", 1, 0.9), cand("a", 0, 0.2), cand("c", 2, 0.5)];
        let results = fuse(&lexical, &vector, 0.3, 0.7, 10);
        let b = results.iter().find(|r| r.chunk_id == "b").unwrap();
        assert_eq!(b.lexical_score, Some(0.0));
        assert_eq!(b.vector_score, Some(1.0));
        assert_eq!(results[0].chunk_id, "b");
    }

    #[test]
    fn test_fuse_truncates_and_ranks() {
        let lexical: Vec<_> = (0..6).map(|i| cand(&format!("c{}", i), i, 10.0 - i as f64)).collect();
        let results = fuse(&lexical, &[], 1.0, 1.0, 3);
        assert_eq!(ids(&results), vec!["c0", "c1", "c2"]);
        assert_eq!(
            results.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_fuse_tie_break_ordinal_then_first_seen() {
        // every score ties at 1.0
        let lexical = vec![cand("l5", 5, 2.0), cand("l1", 1, 2.0)];
        let vector = vec![cand("v1", 1, 0.4), cand("v0", 0, 0.4)];
        let results = fuse(&lexical, &vector, 1.0, 1.0, 10);
        assert_eq!(ids(&results), vec!["v0", "l1", "v1", "l5"]);
    }

    #[test]
    fn test_fusion_monotonic_in_vector_weight() {
        let lexical = vec![cand("a", 0, 1.0), cand("b", 1, 1.0), cand("z", 2, 0.0)];
        let vector = vec![cand("a", 0, 0.9), cand("b", 1, 0.3), cand("z", 2, 0.1)];
        let mut prev_gap = f64::NEG_INFINITY;
        for step in 0..=10 {
            let vw = step as f64 / 10.0;
            let results = fuse(&lexical, &vector, 0.5, vw, 10);
            let a = results.iter().find(|r| r.chunk_id == "a").unwrap().score;
            let b = results.iter().find(|r| r.chunk_id == "b").unwrap().score;
            let gap = a - b;
            assert!(gap >= prev_gap - 1e-12);
            assert!(gap >= 0.0);
            prev_gap = gap;
        }
    }

    #[test]
    fn test_rank_raw_keeps_raw_scores() {
        let results = rank_raw(&[cand("a", 0, 0.2), cand("b", 0, 7.5)], 10);
        assert_eq!(ids(&results), vec!["b", "a"]);
        assert_eq!(results[0].score, 7.5);
        assert_eq!(results[0].lexical_score, None);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("hybrid".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert_eq!("keyword".parse::<SearchMode>().unwrap(), SearchMode::Lexical);
        assert_eq!("vector".parse::<SearchMode>().unwrap(), SearchMode::Vector);
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let rows = [
            ("/m/daily/2026-10-18.md", "c0", "walked the dog in the park", vec![0.1f32, 0.9]),
            ("/m/topics/dogs.md", "c1", "notes on puppy training", vec![0.95, 0.05]),
            ("/m/memory.md", "c2", "the park closes at dusk", vec![0.5, 0.5]),
        ];
        for (path, id, text, v) in rows {
            let chunk = Chunk {
                chunk_id: id.to_string(),
                source_path: path.to_string(),
                document_class: DocumentClass::from_path(path),
                text: text.to_string(),
                ordinal: 0,
                approx_token_count: 5,
                created_at: 1,
                embedding: v,
            };
            let file = IndexedFile {
                path: path.to_string(),
                content_digest: id.to_string(),
                chunk_count: 1,
                last_indexed_at: 1,
            };
            store.replace_file(&file, &[chunk]).await.unwrap();
        }
        store
    }

    fn request<'a>(query: &'a str, qv: Option<&'a [f32]>, mode: SearchMode, lw: f64, vw: f64) -> SearchRequest<'a> {
        SearchRequest {
            query,
            query_vec: qv,
            mode,
            class: None,
            params: SearchParams {
                top_k: 10,
                lexical_weight: lw,
                vector_weight: vw,
                candidate_multiplier: 2,
            },
        }
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let store = seeded_store().await;
        let req = request("   ", None, SearchMode::Hybrid, 0.3, 0.7);
        assert!(!req.needs_query_vector());
        assert!(search(&store, &req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_vector_requires_query_vec() {
        let store = seeded_store().await;
        let req = request("dog", None, SearchMode::Vector, 0.3, 0.7);
        assert!(req.needs_query_vector());
        assert!(search(&store, &req).await.is_err());
    }

    #[tokio::test]
    async fn test_hybrid_with_zero_vector_weight_matches_lexical() {
        let store = seeded_store().await;
        let lexical = search(&store, &request("park dog", None, SearchMode::Lexical, 0.3, 0.7))
            .await
            .unwrap();
        let hybrid_req = request("park dog", None, SearchMode::Hybrid, 1.0, 0.0);
        assert!(!hybrid_req.needs_query_vector());
        let hybrid = search(&store, &hybrid_req).await.unwrap();
        assert_eq!(ids(&lexical), ids(&hybrid));
    }

    #[tokio::test]
    async fn test_class_filter_keeps_ranks() {
        let store = seeded_store().await;
        let qv = [1.0f32, 0.0];
        let mut req = request("park", Some(&qv), SearchMode::Vector, 0.3, 0.7);
        let all = search(&store, &req).await.unwrap();
        assert_eq!(ids(&all), vec!["c1", "c2", "c0"]);

        req.class = Some(DocumentClass::Memory);
        let filtered = search(&store, &req).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].chunk_id, "c2");
        assert_eq!(filtered[0].rank, 2);
    }
}
