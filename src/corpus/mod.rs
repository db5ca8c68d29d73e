//! Pre-embedded corpus snapshot
//!
//! The snapshot is produced offline and only ever read here. Each indexed block
//! has an embedding, its text, and an index into the table of source documents.


use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info};

use crate::{Result, SearchError};

/// One source document the corpus blocks were cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawMetadataRecord")]
pub struct MetadataRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub date_published: String,
    pub url: String,
    pub tags: String,
}

/// Records are stored either as objects or positionally as
/// `[title, authors, date_published, url, tags]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMetadataRecord {
    Positional(String, Vec<String>, String, String, String),
    Named {
        #[serde(default)]
        title: String,
        #[serde(default)]
        authors: Vec<String>,
        #[serde(default)]
        date_published: String,
        url: String,
        #[serde(default)]
        tags: String,
    },
}

impl From<RawMetadataRecord> for MetadataRecord {
    fn from(raw: RawMetadataRecord) -> Self {
        match raw {
            RawMetadataRecord::Positional(title, authors, date_published, url, tags)
            | RawMetadataRecord::Named {
                title,
                authors,
                date_published,
                url,
                tags,
            } => Self {
                title,
                authors,
                date_published,
                url,
                tags,
            },
        }
    }
}

/// On-disk layout of the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub embeddings: Vec<Vec<f32>>,
    pub embedding_strings: Vec<String>,
    pub embeddings_metadata_index: Vec<usize>,
    pub metadata: Vec<MetadataRecord>,
}

/// A resolved corpus entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry<'a> {
    pub embedding: &'a [f32],
    pub text: &'a str,
    pub metadata: &'a MetadataRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusStats {
    pub entries: usize,
    pub documents: usize,
    pub dimension: usize,
    pub distinct_urls: usize,
}

/// Immutable in-memory corpus.
///
/// Embeddings, texts and metadata references are aligned index for index and all
/// embeddings share one width. Metadata references are only checked on lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    embeddings: Vec<Vec<f32>>,
    texts: Vec<String>,
    metadata_index: Vec<usize>,
    metadata: Vec<MetadataRecord>,
    dimension: usize,
}

impl Corpus {
    #[inline]
    pub fn new(
        embeddings: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadata_index: Vec<usize>,
        metadata: Vec<MetadataRecord>,
    ) -> Result<Self> {
        if embeddings.len() != texts.len() || embeddings.len() != metadata_index.len() {
            return Err(SearchError::CorruptCorpus(format!(
                "misaligned corpus: {} embeddings, {} texts, {} metadata references",
                embeddings.len(),
                texts.len(),
                metadata_index.len()
            )));
        }

        let dimension = embeddings.first().map_or(0, Vec::len);
        if let Some(position) = embeddings.iter().position(|e| e.len() != dimension) {
            return Err(SearchError::CorruptCorpus(format!(
                "embedding {} has width {}, expected {}",
                position,
                embeddings[position].len(),
                dimension
            )));
        }

        Ok(Self {
            embeddings,
            texts,
            metadata_index,
            metadata,
            dimension,
        })
    }

    #[inline]
    pub fn from_snapshot(snapshot: CorpusSnapshot) -> Result<Self> {
        Self::new(
            snapshot.embeddings,
            snapshot.embedding_strings,
            snapshot.embeddings_metadata_index,
            snapshot.metadata,
        )
    }

    /// Read and deserialize a JSON snapshot.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading corpus snapshot from {}", path.display());

        let unavailable = |reason: String| SearchError::CorpusUnavailable {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        let snapshot: CorpusSnapshot =
            serde_json::from_str(&content).map_err(|e| unavailable(e.to_string()))?;

        let corpus = Self::from_snapshot(snapshot)?;
        info!(
            "Loaded corpus with {} entries ({} dims) from {}",
            corpus.len(),
            corpus.dimension(),
            path.display()
        );
        Ok(corpus)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Width of every embedding; zero for an empty corpus.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// Resolve entry `index` together with its source document.
    #[inline]
    pub fn entry(&self, index: usize) -> Result<Entry<'_>> {
        let (Some(embedding), Some(text), Some(&metadata_index)) = (
            self.embeddings.get(index),
            self.texts.get(index),
            self.metadata_index.get(index),
        ) else {
            return Err(SearchError::CorruptCorpus(format!(
                "entry {} out of range for corpus of {}",
                index,
                self.len()
            )));
        };

        let metadata = self.metadata.get(metadata_index).ok_or_else(|| {
            SearchError::CorruptCorpus(format!(
                "entry {} references metadata record {} but only {} exist",
                index,
                metadata_index,
                self.metadata.len()
            ))
        })?;

        Ok(Entry {
            embedding,
            text,
            metadata,
        })
    }

    /// Check every metadata reference up front.
    #[inline]
    pub fn verify(&self) -> Result<()> {
        (0..self.len()).try_for_each(|index| self.entry(index).map(|_| ()))
    }

    #[inline]
    pub fn stats(&self) -> CorpusStats {
        let distinct_urls = self
            .metadata_index
            .iter()
            .filter_map(|&i| self.metadata.get(i))
            .map(|record| record.url.as_str())
            .collect::<HashSet<_>>()
            .len();

        CorpusStats {
            entries: self.len(),
            documents: self.metadata.len(),
            dimension: self.dimension,
            distinct_urls,
        }
    }
}

/// Corpus shared across requests, loaded at most once.
///
/// Readers that find it loaded never take the lock. A failed load is not
/// remembered, so the next caller tries again.
#[derive(Debug)]
pub struct SharedCorpus {
    path: Option<PathBuf>,
    cell: OnceLock<Arc<Corpus>>,
    init: Mutex<()>,
}

impl SharedCorpus {
    /// Lazily load the snapshot at `path` on first use.
    #[inline]
    pub fn lazy<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// Wrap an already-built corpus.
    #[inline]
    pub fn preloaded(corpus: Corpus) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Arc::new(corpus));
        Self {
            path: None,
            cell,
            init: Mutex::new(()),
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    #[inline]
    pub fn get(&self) -> Result<Arc<Corpus>> {
        if let Some(corpus) = self.cell.get() {
            return Ok(Arc::clone(corpus));
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(corpus) = self.cell.get() {
            return Ok(Arc::clone(corpus));
        }

        let path = self
            .path
            .as_ref()
            .ok_or_else(|| SearchError::CorpusUnavailable {
                path: "<none>".to_string(),
                reason: "no snapshot path configured".to_string(),
            })?;

        let corpus = Arc::new(Corpus::load(path)?);
        let _ = self.cell.set(Arc::clone(&corpus));
        Ok(corpus)
    }
}
