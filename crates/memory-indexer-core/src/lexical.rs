//! Lexical tokenisation and BM25 scoring.
//!
//! Tokens are maximal runs of alphanumeric characters, lowercased, with
//! diacritics kept (`café` and `cafe` are different tokens). This mirrors the
//! SQLite FTS5 `unicode61 remove_diacritics 0` tokenizer used by the schema,
//! so the in-memory store and the SQLite store agree on which chunks match.

use std::collections::{HashMap, HashSet};

/// Okapi BM25 term-frequency saturation.
pub const BM25_K1: f64 = 1.2;
/// Okapi BM25 length normalization.
pub const BM25_B: f64 = 0.75;

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Unique query tokens in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Build an FTS5 `MATCH` expression from free-form user input.
///
/// Each token is double-quoted and the tokens are OR-ed together, so
/// punctuation and FTS operators in the input are never interpreted.
/// Returns `None` when the query has no tokens.
pub fn fts_match_expression(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// BM25 scorer over a fixed set of tokenized documents.
pub struct Bm25<'a> {
    docs: &'a [Vec<String>],
    avg_len: f64,
    doc_freq: HashMap<&'a str, usize>,
}

impl<'a> Bm25<'a> {
    pub fn new(docs: &'a [Vec<String>]) -> Self {
        let total: usize = docs.iter().map(|d| d.len()).sum();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total as f64 / docs.len() as f64
        };

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for doc in docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        Self {
            docs,
            avg_len,
            doc_freq,
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score document `idx` against `terms`. Zero when no term occurs.
    pub fn score(&self, idx: usize, terms: &[String]) -> f64 {
        let doc = &self.docs[idx];
        if doc.is_empty() || self.avg_len == 0.0 {
            return 0.0;
        }
        let len_norm = 1.0 - BM25_B + BM25_B * doc.len() as f64 / self.avg_len;

        terms
            .iter()
            .map(|term| {
                let tf = doc.iter().filter(|t| *t == term).count() as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                self.idf(term) * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenize(t)).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Hello, World! it's 2026-10-19"),
            vec!["hello", "world", "it", "s", "2026", "10", "19"]
        );
        assert!(tokenize("  --  ").is_empty());
        assert_eq!(tokenize("Café CAFE"), vec!["café", "cafe"]);
    }

    #[test]
    fn test_fts_expression_sanitises() {
        assert_eq!(
            fts_match_expression("rust AND \"sqlite\" rust*").as_deref(),
            Some("\"rust\" OR \"and\" OR \"sqlite\"")
        );
        assert_eq!(fts_match_expression("?!"), None);
        assert_eq!(fts_match_expression(""), None);
    }

    #[test]
    fn test_bm25_no_match_is_zero() {
        let d = docs(&["apples and pears", "bananas"]);
        let bm = Bm25::new(&d);
        assert_eq!(bm.score(1, &query_terms("apples")), 0.0);
        assert!(bm.score(0, &query_terms("apples")) > 0.0);
    }

    #[test]
    fn test_bm25_more_overlap_scores_higher() {
        let d = docs(&[
            "coffee brewing notes for the morning",
            "coffee grinder notes for the morning",
            "tea notes",
        ]);
        let bm = Bm25::new(&d);
        let q = query_terms("coffee brewing");
        assert!(bm.score(0, &q) > bm.score(1, &q));
    }

    #[test]
    fn test_bm25_penalizes_longer_documents() {
        let d = docs(&[
            "piano practice",
            "piano practice with a very long list of other unrelated filler words here",
        ]);
        let bm = Bm25::new(&d);
        let q = query_terms("piano");
        assert!(bm.score(0, &q) > bm.score(1, &q));
    }
}
