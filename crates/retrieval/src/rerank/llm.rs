//! Listwise LLM reranker
//!
//! Prompts the language model with the query and every candidate, asking for
//! a JSON array of integer scores in [0, 100], one per candidate. Parsing is
//! deliberately forgiving: an array embedded in prose is accepted,
//! out-of-range values are clamped, and a parse failure falls back to a
//! uniform 50 for every candidate.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use memsearch_core::{
    CompletionRequest, LanguageModel, RankedDocument, Reranker, Result, TokenUsage,
};

const SYSTEM_PROMPT: &str = "You are a relevance judge. Given a query and a numbered list of \
documents, reply with only a JSON array of integer scores from 0 to 100, one per document, in \
document order. No explanation.";

/// Cost estimate per call: a base charge plus a per-document charge.
const BASE_COST_CENTS: f64 = 0.1;
const PER_DOC_COST_CENTS: f64 = 0.02;

/// Cumulative usage across calls.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LlmRerankUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Prompt-based listwise reranker.
pub struct LlmReranker {
    llm: Arc<dyn LanguageModel>,
    usage: Mutex<LlmRerankUsage>,
}

impl LlmReranker {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            usage: Mutex::new(LlmRerankUsage::default()),
        }
    }

    pub fn usage(&self) -> LlmRerankUsage {
        *self.usage.lock()
    }

    fn record_usage(&self, usage: TokenUsage) {
        let mut totals = self.usage.lock();
        totals.calls += 1;
        totals.input_tokens += usage.input_tokens;
        totals.output_tokens += usage.output_tokens;
    }

    fn build_prompt(query: &str, documents: &[String]) -> String {
        let mut prompt = format!("Query: {query}\n\nDocuments:\n");
        for (i, doc) in documents.iter().enumerate() {
            // Long candidates are truncated; the head carries the signal
            let snippet: String = doc.chars().take(1000).collect();
            prompt.push_str(&format!("{}. {}\n", i + 1, snippet));
        }
        prompt.push_str(&format!(
            "\nReturn a JSON array of {} integer scores (0-100).",
            documents.len()
        ));
        prompt
    }
}

/// Parse a JSON integer array out of the model reply.
///
/// Accepts an array embedded in surrounding prose, clamps values into
/// [0, 100], and returns a uniform 50 when parsing fails or the length does
/// not match.
pub fn parse_scores(reply: &str, expected_len: usize) -> Vec<u8> {
    let uniform = vec![50u8; expected_len];

    let Some(start) = reply.find('[') else {
        return uniform;
    };
    let Some(end) = reply[start..].find(']').map(|i| start + i + 1) else {
        return uniform;
    };

    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(&reply[start..end]) else {
        return uniform;
    };
    if values.len() != expected_len {
        return uniform;
    }

    values
        .into_iter()
        .map(|v| {
            let score = v.as_f64().unwrap_or(50.0);
            score.clamp(0.0, 100.0).round() as u8
        })
        .collect()
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_k: usize,
    ) -> Result<Vec<RankedDocument>> {
        let request = CompletionRequest::new(Self::build_prompt(query, documents))
            .with_system(SYSTEM_PROMPT);

        let completion = self.llm.complete(request).await?;
        self.record_usage(completion.usage);

        let scores = parse_scores(&completion.text, documents.len());

        let mut ranked: Vec<RankedDocument> = scores
            .into_iter()
            .enumerate()
            .map(|(i, score)| RankedDocument {
                original_index: i,
                score: score as f32 / 100.0,
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

    fn cost_cents(&self, documents: usize) -> f64 {
        BASE_COST_CENTS + PER_DOC_COST_CENTS * documents as f64
    }
}
