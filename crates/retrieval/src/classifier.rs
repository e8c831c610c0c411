//! Query classifier
//!
//! Purely lexical (no model): extracts surface features from the query text
//! and maps them to a recommended strategy and a complexity class. All
//! decisions are deterministic and side-effect-free.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use memsearch_core::{QueryComplexity, SearchStrategy};

static CAMEL_CASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-z]+[A-Z][A-Za-z]*\b").expect("camelCase pattern"));
static FUNCTION_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\(").expect("function-call pattern"));

const INTERROGATIVES: &[&str] = &[
    "what", "when", "where", "which", "who", "whom", "whose", "why", "how", "is", "are", "was",
    "were", "do", "does", "did", "can", "could", "should", "would", "will",
];

/// Extracted lexical features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryFeatures {
    /// Presence of a matched pair of double quotes
    pub has_quotes: bool,
    /// Leading interrogative word or trailing question mark
    pub is_question: bool,
    /// Fenced code, camelCase identifiers, call shapes, or symbol density
    pub has_code: bool,
    /// Whitespace-separated token count
    pub token_count: usize,
}

/// Classification output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub strategy: SearchStrategy,
    pub complexity: QueryComplexity,
    pub features: QueryFeatures,
    /// Weighted feature score, for logging only
    pub score: f32,
}

/// Lexical query classifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryClassifier;

impl QueryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Extract surface features from the query text.
    pub fn extract_features(&self, text: &str) -> QueryFeatures {
        let trimmed = text.trim();
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();

        let has_quotes = trimmed.matches('"').count() >= 2;

        let is_question = trimmed.ends_with('?')
            || tokens
                .first()
                .map(|first| INTERROGATIVES.contains(&first.to_lowercase().as_str()))
                .unwrap_or(false);

        let has_code = trimmed.contains("```")
            || CAMEL_CASE
                .find_iter(trimmed)
                .any(|m| m.as_str().len() >= 4)
            || FUNCTION_CALL.is_match(trimmed)
            || symbol_density(trimmed) > 0.25;

        QueryFeatures {
            has_quotes,
            is_question,
            has_code,
            token_count: tokens.len(),
        }
    }

    /// Map a query to a recommended strategy plus features.
    ///
    /// Quoted phrases bias toward sparse (exact-match intent); questions
    /// without quotes lean on semantics; everything else fuses both sides.
    pub fn classify(&self, text: &str) -> Classification {
        let features = self.extract_features(text);

        let strategy = if features.has_quotes {
            SearchStrategy::Sparse
        } else {
            SearchStrategy::Hybrid
        };

        let complexity = self.complexity_for(&features);

        Classification {
            strategy,
            complexity,
            features,
            score: self.feature_score(&features),
        }
    }

    /// Complexity classification used for reranker tier auto-selection.
    pub fn classify_complexity(&self, text: &str) -> Classification {
        self.classify(text)
    }

    fn complexity_for(&self, features: &QueryFeatures) -> QueryComplexity {
        if features.has_code {
            return QueryComplexity::Complex;
        }
        match features.token_count {
            0..=3 => QueryComplexity::Simple,
            4..=9 => QueryComplexity::Moderate,
            _ => QueryComplexity::Complex,
        }
    }

    fn feature_score(&self, features: &QueryFeatures) -> f32 {
        let mut score = features.token_count as f32 * 0.1;
        if features.has_quotes {
            score += 0.5;
        }
        if features.is_question {
            score += 0.3;
        }
        if features.has_code {
            score += 1.0;
        }
        score
    }
}

/// Share of non-alphanumeric, non-space grapheme clusters.
fn symbol_density(text: &str) -> f32 {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.is_empty() {
        return 0.0;
    }
    let symbols = graphemes
        .iter()
        .filter(|g| {
            g.chars()
                .all(|c| !c.is_alphanumeric() && !c.is_whitespace())
        })
        .count();
    symbols as f32 / graphemes.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_query_selects_sparse() {
        let classifier = QueryClassifier::new();
        let c = classifier.classify("find \"exact error message\" in logs");
        assert!(c.features.has_quotes);
        assert_eq!(c.strategy, SearchStrategy::Sparse);
    }

    #[test]
    fn test_question_detected() {
        let classifier = QueryClassifier::new();
        assert!(classifier.extract_features("how does eviction work").is_question);
        assert!(classifier.extract_features("pods keep dying?").is_question);
        assert!(!classifier.extract_features("kubernetes pod eviction").is_question);
    }

    #[test]
    fn test_default_strategy_is_hybrid() {
        let classifier = QueryClassifier::new();
        let c = classifier.classify("kubernetes pod eviction");
        assert_eq!(c.strategy, SearchStrategy::Hybrid);
    }

    #[test]
    fn test_code_detection() {
        let classifier = QueryClassifier::new();
        assert!(classifier.extract_features("where is parseQuery defined").has_code);
        assert!(classifier.extract_features("why does connect() fail").has_code);
        assert!(classifier.extract_features("```\nlet x = 1;\n```").has_code);
        assert!(!classifier.extract_features("pod eviction policy").has_code);
    }

    #[test]
    fn test_complexity_by_token_count() {
        let classifier = QueryClassifier::new();
        assert_eq!(
            classifier.classify("pod eviction").complexity,
            QueryComplexity::Simple
        );
        assert_eq!(
            classifier
                .classify("why do pods get evicted under pressure")
                .complexity,
            QueryComplexity::Moderate
        );
        assert_eq!(
            classifier
                .classify("explain the full lifecycle of a pod from scheduling to eviction under memory pressure")
                .complexity,
            QueryComplexity::Complex
        );
    }

    #[test]
    fn test_deterministic() {
        let classifier = QueryClassifier::new();
        let a = classifier.classify("what is the retry policy?");
        let b = classifier.classify("what is the retry policy?");
        assert_eq!(a, b);
    }
}
