//! Local reranker tiers
//!
//! Three cross-encoder profiles (fast, accurate, code) sharing one lexical
//! scoring core, plus a late-interaction tier over multi-vector embeddings.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use memsearch_core::{
    MultiVectorEmbedder, RankedDocument, Reranker, Result, SearchError,
};

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can", "to",
    "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "and", "but", "if", "or",
    "because", "until", "while", "about", "i", "me", "my", "we", "our", "you", "your", "he",
    "him", "his", "she", "her", "it", "its", "they", "them", "their", "what", "which", "who",
    "whom", "this", "that", "these", "those", "how", "why", "when", "where",
];

/// Scoring profile for the cross-encoder tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringProfile {
    /// Plain term-overlap coverage, cheapest
    Fast,
    /// TF weighting with term specificity and position boosts
    Accurate,
    /// Like accurate, with identifier splitting for code tokens
    Code,
}

/// Lexical cross-encoder reranker.
pub struct CrossEncoderReranker {
    profile: ScoringProfile,
}

impl CrossEncoderReranker {
    pub fn new(profile: ScoringProfile) -> Self {
        Self { profile }
    }

    fn score(&self, query: &str, document: &str) -> f32 {
        match self.profile {
            ScoringProfile::Fast => overlap_score(query, document, false),
            ScoringProfile::Accurate => weighted_score(query, document, false),
            ScoringProfile::Code => weighted_score(query, document, true),
        }
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RankedDocument>> {
        let mut ranked: Vec<RankedDocument> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| RankedDocument {
                original_index: i,
                score: self.score(query, doc),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

fn tokens(text: &str, split_identifiers: bool) -> Vec<String> {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut out = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if raw.len() < 2 {
            continue;
        }
        let lower = raw.to_lowercase();
        if stopwords.contains(lower.as_str()) {
            continue;
        }
        if split_identifiers {
            let mut parts = split_ident(raw);
            if parts.len() > 1 {
                out.append(&mut parts);
                continue;
            }
        }
        out.push(lower);
    }
    out
}

fn split_ident(ident: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in ident.chars() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current.push(c.to_ascii_lowercase());
        } else {
            current.push(c.to_ascii_lowercase());
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Fraction of query terms present in the document.
fn overlap_score(query: &str, document: &str, split_identifiers: bool) -> f32 {
    let query_terms = tokens(query, split_identifiers);
    if query_terms.is_empty() {
        return 0.0;
    }
    let doc_terms: HashSet<String> = tokens(document, split_identifiers).into_iter().collect();
    let matched = query_terms
        .iter()
        .filter(|t| doc_terms.contains(*t))
        .count();
    matched as f32 / query_terms.len() as f32
}

/// Scoring formula:
/// - term frequency: sqrt(count) for diminishing returns
/// - specificity: log(1 + term length) favors longer terms
/// - position: earlier query terms weigh slightly more
/// - coverage bonus for matching more distinct query terms
fn weighted_score(query: &str, document: &str, split_identifiers: bool) -> f32 {
    let query_terms = tokens(query, split_identifiers);
    if query_terms.is_empty() {
        return 0.0;
    }

    let doc_terms = tokens(document, split_identifiers);
    let doc_len = doc_terms.len().max(1) as f32;

    let mut total = 0.0f32;
    let mut matched = 0usize;

    for (pos, term) in query_terms.iter().enumerate() {
        let tf = doc_terms.iter().filter(|t| *t == term).count() as f32;
        if tf > 0.0 {
            matched += 1;
            let tf_score = tf.sqrt();
            let specificity = (1.0 + term.len() as f32).ln();
            let position_weight = 1.0 / (1.0 + pos as f32 * 0.1);
            let length_norm = 1.0 / (1.0 + (doc_len / 50.0).sqrt());
            total += tf_score * specificity * position_weight * length_norm;
        }
    }

    let coverage = matched as f32 / query_terms.len() as f32;
    let raw = total + coverage * 0.3;
    (raw / (raw + 1.0)).min(1.0)
}

/// Late-interaction reranker over multi-vector embeddings.
///
/// Scores each document as the average over query token rows of the best
/// dot product against any document token row (sum-of-max).
pub struct ColbertReranker {
    embedder: Arc<dyn MultiVectorEmbedder>,
}

impl ColbertReranker {
    pub fn new(embedder: Arc<dyn MultiVectorEmbedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl Reranker for ColbertReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RankedDocument>> {
        let query_rows = self.embedder.embed_query(query).await?;
        if query_rows.is_empty() {
            return Err(SearchError::RerankerError(
                "empty query embedding".to_string(),
            ));
        }

        let doc_matrices = self.embedder.embed_documents(documents).await?;

        let mut ranked: Vec<RankedDocument> = doc_matrices
            .iter()
            .enumerate()
            .map(|(i, doc_rows)| {
                let mut sum = 0.0f32;
                for q in &query_rows {
                    let best = doc_rows
                        .iter()
                        .map(|d| dot(q, d))
                        .fold(f32::NEG_INFINITY, f32::max);
                    if best.is_finite() {
                        sum += best;
                    }
                }
                RankedDocument {
                    original_index: i,
                    score: sum / query_rows.len() as f32,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
