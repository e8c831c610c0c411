//! Sparse term-weight embeddings
//!
//! Produces the term-weight maps that back lexical retrieval in the vector
//! store. Tokenization runs through tantivy's analyzer pipeline (simple
//! tokenizer, long-token removal, lowercasing, English stemming) so query
//! and document sides agree on term forms.
//!
//! Weight generation is CPU-bound and intentionally blocking; callers run it
//! under `spawn_blocking`.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
};

use memsearch_core::{Result, SparseEmbedder, SparseVec};

/// Sparse embedder over the tantivy analyzer pipeline.
pub struct TermWeightEmbedder {
    analyzer: Mutex<TextAnalyzer>,
}

impl Default for TermWeightEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl TermWeightEmbedder {
    pub fn new() -> Self {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(64))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::English))
            .build();

        Self {
            analyzer: Mutex::new(analyzer),
        }
    }

    fn term_counts(&self, text: &str) -> HashMap<u32, f32> {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        let mut analyzer = self.analyzer.lock();
        let mut stream = analyzer.token_stream(text);
        while let Some(token) = stream.next() {
            *counts.entry(term_index(&token.text)).or_insert(0.0) += 1.0;
        }
        counts
    }

    fn embed(&self, text: &str) -> SparseVec {
        let counts = self.term_counts(text);

        // Sublinear term frequency; stable ordering by index so identical
        // inputs produce identical vectors.
        let mut entries: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, 1.0 + tf.ln()))
            .collect();
        entries.sort_by_key(|(idx, _)| *idx);

        let (indices, values) = entries.into_iter().unzip();
        SparseVec::new(indices, values)
    }
}

/// Stable term -> vocabulary index mapping.
fn term_index(term: &str) -> u32 {
    let mut hasher = DefaultHasher::new();
    term.hash(&mut hasher);
    (hasher.finish() & 0xFFFF_FFFF) as u32
}

impl SparseEmbedder for TermWeightEmbedder {
    fn embed_query(&self, text: &str) -> Result<SparseVec> {
        Ok(self.embed(text))
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<SparseVec>> {
        texts.iter().map(|t| self.embed_query(t)).collect()
    }
}
