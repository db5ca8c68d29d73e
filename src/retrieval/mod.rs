//! Top-k semantic retrieval over the shared corpus
//!
//! Scores are plain dot products. The target embedding model emits vectors of
//! (near) unit length, so this ranks the same as cosine similarity without the
//! per-entry norm. A corpus built from a model that does not normalize needs
//! its vectors normalized before the snapshot is written.

#[cfg(test)]
mod tests;

use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, RetrievalConfig};
use crate::corpus::{Corpus, MetadataRecord, SharedCorpus};
use crate::embeddings::{CompletionOptions, EmbeddingProvider, OpenAiClient};
use crate::{Result, SearchError};

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Zero-based position in the ranking.
    pub rank: usize,
    /// Raw dot product. NaN (from a corrupt vector) is kept, ranks last and
    /// serializes to JSON as `null`.
    pub score: f32,
    /// The matched corpus block.
    pub text: String,
    pub source: MetadataRecord,
}

impl SearchResult {
    /// Link to the document the block came from.
    #[inline]
    pub fn url(&self) -> &str {
        &self.source.url
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrieverOptions {
    /// Sampling for the hypothetical answer.
    pub hyde: CompletionOptions,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            hyde: CompletionOptions {
                temperature: 0.0,
                max_tokens: 200,
            },
        }
    }
}

impl From<&RetrievalConfig> for RetrieverOptions {
    #[inline]
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            hyde: CompletionOptions {
                temperature: config.hyde_temperature,
                max_tokens: config.hyde_max_tokens,
            },
        }
    }
}

pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    corpus: Arc<SharedCorpus>,
    options: RetrieverOptions,
}

impl Retriever {
    #[inline]
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        corpus: Arc<SharedCorpus>,
        options: RetrieverOptions,
    ) -> Self {
        Self {
            provider,
            corpus,
            options,
        }
    }

    /// OpenAI-backed retriever over the configured snapshot, loaded on first query.
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = OpenAiClient::new(config)?;
        Ok(Self::new(
            Arc::new(client),
            Arc::new(SharedCorpus::lazy(config.corpus_path())),
            RetrieverOptions::from(&config.retrieval),
        ))
    }

    #[inline]
    pub fn corpus(&self) -> &SharedCorpus {
        &self.corpus
    }

    /// Return the `k` corpus blocks most similar to `query`, best first.
    ///
    /// With `use_hyde` the search vector is the embedding of a generated answer
    /// rather than of the question itself. Asking for more results than the
    /// corpus holds returns the whole corpus.
    #[inline]
    pub fn top_k(&self, query: &str, k: usize, use_hyde: bool) -> Result<Vec<SearchResult>> {
        let corpus = self.corpus.get()?;
        let vector = self.scoring_vector(query, use_hyde)?;
        let ranked = rank(&corpus, &vector, k)?;

        let results = ranked
            .into_iter()
            .enumerate()
            .map(|(rank, (index, score))| {
                let entry = corpus.entry(index)?;
                Ok(SearchResult {
                    rank,
                    score,
                    text: entry.text.to_string(),
                    source: entry.metadata.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Query matched {} blocks (k = {}, hyde = {})",
            results.len(),
            k,
            use_hyde
        );
        Ok(results)
    }

    /// The vector the corpus is scored against.
    #[inline]
    pub fn scoring_vector(&self, query: &str, use_hyde: bool) -> Result<Vec<f32>> {
        let query_embedding = self.provider.embed(query)?;
        if !use_hyde {
            return Ok(query_embedding);
        }

        let answer = self.provider.complete(query, self.options.hyde)?;
        debug!("Hypothetical answer has {} chars", answer.len());
        self.provider.embed(&hyde_prompt(query, &answer))
    }
}

/// Text embedded in place of the bare query when HyDE is on.
#[inline]
pub fn hyde_prompt(query: &str, answer: &str) -> String {
    format!("Question: {}\n\nAnswer: {}", query, answer)
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Indices and scores of the `k` best entries, best first.
///
/// Equal scores keep corpus order; NaN scores sort last.
#[inline]
pub fn rank(corpus: &Corpus, vector: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
    if !corpus.is_empty() && vector.len() != corpus.dimension() {
        return Err(SearchError::DimensionMismatch {
            expected: corpus.dimension(),
            actual: vector.len(),
        });
    }

    if k == 0 {
        return Ok(Vec::new());
    }

    let mut scored: Vec<(usize, f32)> = corpus
        .embeddings()
        .iter()
        .map(|embedding| dot(embedding, vector))
        .enumerate()
        .collect();

    if k < scored.len() {
        scored.select_nth_unstable_by(k, by_score_then_index);
        scored.truncate(k);
    }
    scored.sort_unstable_by(by_score_then_index);

    Ok(scored)
}

fn by_score_then_index(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    sort_key(b.1).total_cmp(&sort_key(a.1)).then(a.0.cmp(&b.0))
}

fn sort_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}
