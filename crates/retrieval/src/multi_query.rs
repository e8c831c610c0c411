//! Multi-query retrieval with LLM query expansion
//!
//! Wraps the base retriever: expands the query into variants, searches every
//! variant in parallel, and fuses the result lists client-side with
//! reciprocal rank fusion. Expansion failures never fail the search; the
//! pipeline falls back to a single base search with results marked degraded.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use memsearch_core::{
    sort_results, CompletionRequest, LanguageModel, Result, SearchQuery, SearchResultItem,
    TokenUsage,
};

use crate::retriever::SearchRetriever;

const EXPANSION_SYSTEM_PROMPT: &str = "You generate search query variations. Reply with only a \
JSON object of the form {\"queries\": [\"...\"]} containing the requested number of variations. \
No explanation.";

/// Query expansion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionStrategy {
    /// Reword the query with the same intent
    Paraphrase,
    /// Extract the key terms
    Keyword,
    /// Generalize to a broader question
    Stepback,
    /// Break a compound question into parts
    Decompose,
}

impl ExpansionStrategy {
    fn instruction(&self) -> &'static str {
        match self {
            ExpansionStrategy::Paraphrase => "paraphrase the query with the same intent",
            ExpansionStrategy::Keyword => "reduce the query to its key search terms",
            ExpansionStrategy::Stepback => "generalize the query to a broader question",
            ExpansionStrategy::Decompose => "split the query into a simpler sub-question",
        }
    }
}

/// Multi-query configuration.
#[derive(Debug, Clone)]
pub struct MultiQueryConfig {
    /// Number of LLM-generated variants (1..=10)
    pub num_variations: usize,
    /// Expansion strategies the LLM is asked to honor
    pub strategies: Vec<ExpansionStrategy>,
    /// Include the original query as its own variant
    pub include_original: bool,
    /// RRF constant for client-side fusion
    pub rrf_k: u32,
}

impl Default for MultiQueryConfig {
    fn default() -> Self {
        Self {
            num_variations: 3,
            strategies: vec![ExpansionStrategy::Paraphrase, ExpansionStrategy::Keyword],
            include_original: true,
            rrf_k: 60,
        }
    }
}

/// Cumulative LLM usage across expansions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub expansions: u64,
    pub failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Retriever wrapper with query expansion and client-side RRF fusion.
pub struct MultiQueryRetriever {
    base: Arc<SearchRetriever>,
    llm: Option<Arc<dyn LanguageModel>>,
    config: MultiQueryConfig,
    usage: Mutex<UsageTotals>,
}

impl MultiQueryRetriever {
    pub fn new(
        base: Arc<SearchRetriever>,
        llm: Option<Arc<dyn LanguageModel>>,
        config: MultiQueryConfig,
    ) -> Self {
        Self {
            base,
            llm,
            config,
            usage: Mutex::new(UsageTotals::default()),
        }
    }

    pub fn config(&self) -> &MultiQueryConfig {
        &self.config
    }

    pub fn usage(&self) -> UsageTotals {
        *self.usage.lock()
    }

    pub fn reset_usage(&self) {
        *self.usage.lock() = UsageTotals::default();
    }

    /// Expanded search: variants in parallel, fused with RRF.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResultItem>> {
        match self.search_expanded(query).await {
            Ok(results) => Ok(results),
            Err(err) => {
                tracing::warn!(error = %err, "Multi-query pipeline failed, falling back to single search");
                let mut results = self.base.search(query).await?;
                let reason = format!("expansion failed: {err}");
                for result in &mut results {
                    result.degraded = true;
                    result.degraded_reason = Some(reason.clone());
                }
                Ok(results)
            }
        }
    }

    async fn search_expanded(&self, query: &SearchQuery) -> Result<Vec<SearchResultItem>> {
        let variants = self.expand_query(&query.text).await;

        // Each variant keeps the caller's query shape but oversamples so the
        // fusion has enough candidates per list.
        let per_variant_limit = (query.limit * 2).max(20);
        let searches = variants.iter().map(|variant| {
            let mut variant_query = query.clone();
            variant_query.text = variant.clone();
            variant_query.limit = per_variant_limit;
            async move { self.base.search(&variant_query).await }
        });

        let outcomes = join_all(searches).await;

        let mut result_sets = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            result_sets.push(outcome?);
        }

        Ok(rrf_fusion(result_sets, self.config.rrf_k, query.limit))
    }

    /// Expand the query into a deduplicated list of variants.
    ///
    /// On any LLM or parse failure the original query is the only variant.
    pub async fn expand_query(&self, text: &str) -> Vec<String> {
        let mut variants: Vec<String> = Vec::new();
        if self.config.include_original {
            variants.push(text.to_string());
        }

        let generated = match &self.llm {
            Some(llm) => match self.generate_variants(llm.as_ref(), text).await {
                Ok(generated) => generated,
                Err(err) => {
                    tracing::warn!(error = %err, "Query expansion failed, using original query only");
                    self.usage.lock().failures += 1;
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut seen: Vec<String> = variants.iter().map(|v| normalize(v)).collect();
        for variant in generated {
            let key = normalize(&variant);
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            variants.push(variant);
        }

        if variants.is_empty() {
            variants.push(text.to_string());
        }

        let max_variants = self.config.num_variations + usize::from(self.config.include_original);
        variants.truncate(max_variants);
        variants
    }

    async fn generate_variants(&self, llm: &dyn LanguageModel, text: &str) -> Result<Vec<String>> {
        let prompt = self.build_expansion_prompt(text);
        let completion = llm
            .complete(CompletionRequest::new(prompt).with_system(EXPANSION_SYSTEM_PROMPT))
            .await?;

        self.record_usage(completion.usage);

        parse_expansion_reply(&completion.text)
    }

    fn build_expansion_prompt(&self, text: &str) -> String {
        let strategies = if self.config.strategies.is_empty() {
            "paraphrase the query".to_string()
        } else {
            self.config
                .strategies
                .iter()
                .map(|s| s.instruction())
                .collect::<Vec<_>>()
                .join("; ")
        };

        format!(
            "Generate {} search query variations for the query below. Strategies: {}.\n\n\
             Query: {}\n\n\
             Reply with a JSON object: {{\"queries\": [\"...\"]}}",
            self.config.num_variations, strategies, text
        )
    }

    fn record_usage(&self, usage: TokenUsage) {
        let mut totals = self.usage.lock();
        totals.expansions += 1;
        totals.input_tokens += usage.input_tokens;
        totals.output_tokens += usage.output_tokens;
    }
}

#[derive(Debug, Deserialize)]
struct ExpansionReply {
    queries: Vec<String>,
}

/// Parse the expansion reply, accepting a JSON object embedded in prose.
fn parse_expansion_reply(reply: &str) -> Result<Vec<String>> {
    let parsed: std::result::Result<ExpansionReply, _> = serde_json::from_str(reply);
    if let Ok(reply) = parsed {
        return Ok(reply.queries);
    }

    let start = reply.find('{');
    let end = reply.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(embedded) = serde_json::from_str::<ExpansionReply>(&reply[start..=end]) {
                return Ok(embedded.queries);
            }
        }
    }

    Err(memsearch_core::SearchError::ExpansionFailed(
        "reply did not contain a {\"queries\": [..]} object".to_string(),
    ))
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Client-side reciprocal rank fusion across result lists.
///
/// Every item at zero-based rank `r` in a list contributes
/// `1 / (rrf_k + r + 1)` to its fused score, keyed by id. The first
/// occurrence wins for payload; reranker metadata and degradation flags are
/// carried from any occurrence that has them. The fused score is exposed as
/// both `score` and `fusion_score`.
pub fn rrf_fusion(
    result_sets: Vec<Vec<SearchResultItem>>,
    rrf_k: u32,
    top_k: usize,
) -> Vec<SearchResultItem> {
    let mut fused: HashMap<String, SearchResultItem> = HashMap::new();
    let mut scores: HashMap<String, f32> = HashMap::new();

    for results in result_sets {
        for (rank, result) in results.into_iter().enumerate() {
            let contribution = 1.0 / (rrf_k as f32 + rank as f32 + 1.0);
            *scores.entry(result.id.clone()).or_insert(0.0) += contribution;

            match fused.get_mut(&result.id) {
                None => {
                    fused.insert(result.id.clone(), result);
                }
                Some(existing) => {
                    if existing.reranker_score.is_none() && result.reranker_score.is_some() {
                        existing.reranker_score = result.reranker_score;
                        existing.rerank_tier = result.rerank_tier;
                    }
                    if !existing.degraded && result.degraded {
                        existing.degraded = true;
                        existing.degraded_reason = result.degraded_reason;
                    }
                }
            }
        }
    }

    let mut merged: Vec<SearchResultItem> = fused
        .into_values()
        .map(|mut item| {
            let fused_score = scores[&item.id];
            item.score = fused_score;
            item.fusion_score = Some(fused_score);
            item
        })
        .collect();

    sort_results(&mut merged);
    merged.truncate(top_k);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, score: f32) -> SearchResultItem {
        SearchResultItem::new(id, score)
    }

    #[test]
    fn test_rrf_single_list_scores() {
        let fused = rrf_fusion(vec![vec![item("doc1", 0.9), item("doc2", 0.8)]], 60, 2);
        assert_eq!(fused[0].id, "doc1");
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-4);
        assert!((fused[1].score - 1.0 / 62.0).abs() < 1e-4);
        assert_eq!(fused[0].fusion_score, Some(fused[0].score));
    }

    #[test]
    fn test_rrf_overlap_boost() {
        // Lists [A, B, C] and [B, D, A]: B and A appear twice and outrank
        // the singletons
        let fused = rrf_fusion(
            vec![
                vec![item("A", 0.9), item("B", 0.8), item("C", 0.7)],
                vec![item("B", 0.85), item("D", 0.75), item("A", 0.7)],
            ],
            60,
            4,
        );

        assert_eq!(fused[0].id, "B");
        assert_eq!(fused[1].id, "A");
        assert!((fused[0].score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-4);
        assert!((fused[1].score - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-4);

        let c = fused.iter().find(|r| r.id == "C").unwrap();
        let d = fused.iter().find(|r| r.id == "D").unwrap();
        assert!((c.score - 1.0 / 63.0).abs() < 1e-4);
        assert!((d.score - 1.0 / 62.0).abs() < 1e-4);
    }

    #[test]
    fn test_rrf_empty_sets() {
        assert!(rrf_fusion(vec![], 60, 10).is_empty());
        assert!(rrf_fusion(vec![vec![]], 60, 10).is_empty());
    }

    #[test]
    fn test_rrf_top_k_limit() {
        let list: Vec<SearchResultItem> = (0..10)
            .map(|i| item(&format!("doc{i}"), 0.9 - i as f32 * 0.05))
            .collect();
        let fused = rrf_fusion(vec![list], 60, 3);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_rrf_preserves_metadata() {
        let mut carried = item("doc1", 0.9);
        carried.reranker_score = Some(0.95);
        carried.rerank_tier = Some(memsearch_core::RerankerTier::Fast);
        carried.degraded = true;
        carried.degraded_reason = Some("test reason".to_string());

        let fused = rrf_fusion(vec![vec![item("doc1", 0.8)], vec![carried]], 60, 1);
        assert_eq!(fused[0].reranker_score, Some(0.95));
        assert_eq!(fused[0].rerank_tier, Some(memsearch_core::RerankerTier::Fast));
        assert!(fused[0].degraded);
        assert_eq!(fused[0].degraded_reason.as_deref(), Some("test reason"));
    }

    #[test]
    fn test_rrf_deterministic() {
        let sets = || {
            vec![
                vec![item("a", 0.9), item("b", 0.8)],
                vec![item("c", 0.85), item("a", 0.7)],
            ]
        };
        let first = rrf_fusion(sets(), 60, 10);
        let second = rrf_fusion(sets(), 60, 10);
        let first_ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_parse_expansion_reply_plain() {
        let variants = parse_expansion_reply(r#"{"queries": ["a", "b"]}"#).unwrap();
        assert_eq!(variants, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_expansion_reply_embedded() {
        let reply = "Sure, here you go: {\"queries\": [\"pod eviction\"]} hope that helps";
        let variants = parse_expansion_reply(reply).unwrap();
        assert_eq!(variants, vec!["pod eviction"]);
    }

    #[test]
    fn test_parse_expansion_reply_garbage() {
        assert!(parse_expansion_reply("no json at all").is_err());
    }
}
