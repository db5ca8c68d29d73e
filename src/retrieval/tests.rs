use super::*;
use crate::embeddings::ProviderError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Provider that answers from fixed tables and records every call.
#[derive(Default)]
struct StubProvider {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    completion: String,
    fail_embed: Option<ProviderError>,
    calls: Mutex<Vec<String>>,
}

impl StubProvider {
    fn returning(vector: Vec<f32>) -> Self {
        Self {
            fallback: vector,
            ..Self::default()
        }
    }

    fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    fn with_completion(mut self, completion: &str) -> Self {
        self.completion = completion.to_string();
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl EmbeddingProvider for StubProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("embed:{}", text));
        if let Some(error) = &self.fail_embed {
            return Err(error.clone().into());
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String> {
        self.calls.lock().expect("calls lock").push(format!(
            "complete:{}:{}:{}",
            prompt, options.temperature, options.max_tokens
        ));
        Ok(self.completion.clone())
    }
}

fn record(url: &str) -> MetadataRecord {
    MetadataRecord {
        title: format!("Title of {}", url),
        authors: Vec::new(),
        date_published: String::new(),
        url: url.to_string(),
        tags: String::new(),
    }
}

/// The three-entry corpus: [1,0] "A", [0,1] "B", [0.7,0.7] "C".
fn abc_corpus() -> Corpus {
    Corpus::new(
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        vec!["A".to_string(), "B".to_string(), "C".to_string()],
        vec![0, 1, 2],
        vec![record("https://a"), record("https://b"), record("https://c")],
    )
    .expect("valid corpus")
}

fn retriever(provider: StubProvider, corpus: Corpus) -> (Retriever, Arc<StubProvider>) {
    let provider = Arc::new(provider);
    let retriever = Retriever::new(
        Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
        Arc::new(SharedCorpus::preloaded(corpus)),
        RetrieverOptions::default(),
    );
    (retriever, provider)
}

fn texts(results: &[SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.text.as_str()).collect()
}

#[test]
fn dot_product() {
    assert_eq!(dot(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 14.0);
    assert_eq!(dot(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
}

#[test]
fn reference_scenario() {
    let (retriever, _) = retriever(StubProvider::returning(vec![1.0, 0.0]), abc_corpus());

    let results = retriever.top_k("anything", 2, false).expect("search succeeds");
    assert_eq!(texts(&results), vec!["A", "C"]);
    assert_eq!(results[0].url(), "https://a");
    assert_eq!(results[1].url(), "https://c");
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!((results[1].score - 0.7).abs() < 1e-6);
    assert_eq!(results[1].rank, 1);
}

#[test]
fn returns_exactly_k_in_non_increasing_order() {
    let (retriever, _) = retriever(StubProvider::returning(vec![0.2, 0.9]), abc_corpus());

    for k in 0..=3 {
        let results = retriever.top_k("q", k, false).expect("search succeeds");
        assert_eq!(results.len(), k);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[test]
fn k_larger_than_corpus_returns_everything() {
    let (retriever, _) = retriever(StubProvider::returning(vec![0.0, 1.0]), abc_corpus());

    let results = retriever.top_k("q", 10, false).expect("search succeeds");
    assert_eq!(texts(&results), vec!["B", "C", "A"]);
}

#[test]
fn ties_keep_corpus_order() {
    let corpus = Corpus::new(
        vec![vec![0.5, 0.5], vec![1.0, 0.5], vec![0.5, 0.5], vec![0.5, 0.5]],
        vec!["t0".into(), "top".into(), "t2".into(), "t3".into()],
        vec![0, 0, 0, 0],
        vec![record("https://same")],
    )
    .expect("valid corpus");
    let (retriever, _) = retriever(StubProvider::returning(vec![1.0, 1.0]), corpus);

    let first = retriever.top_k("q", 3, false).expect("search succeeds");
    assert_eq!(texts(&first), vec!["top", "t0", "t2"]);

    let again = retriever.top_k("q", 3, false).expect("search succeeds");
    assert_eq!(first, again);
}

#[test]
fn rank_breaks_ties_by_index_for_large_corpus() {
    let embeddings: Vec<Vec<f32>> = (0..100).map(|i| vec![(i % 5) as f32, 1.0]).collect();
    let corpus = Corpus::new(
        embeddings,
        (0..100).map(|i| i.to_string()).collect(),
        vec![0; 100],
        vec![record("https://x")],
    )
    .expect("valid corpus");

    let ranked = rank(&corpus, &[1.0, 0.0], 5).expect("rank succeeds");
    let indices: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![4, 9, 14, 19, 24]);
}

#[test]
fn hyde_scores_with_question_answer_embedding() {
    let prompt = hyde_prompt("What is FOOM?", "A fast takeoff.");
    assert_eq!(prompt, "Question: What is FOOM?\n\nAnswer: A fast takeoff.");

    let provider = StubProvider::returning(vec![1.0, 0.0])
        .with_vector(&prompt, vec![0.0, 1.0])
        .with_completion("A fast takeoff.");
    let (retriever, provider) = retriever(provider, abc_corpus());

    let plain = retriever
        .top_k("What is FOOM?", 1, false)
        .expect("search succeeds");
    assert_eq!(texts(&plain), vec!["A"]);

    let expanded = retriever
        .top_k("What is FOOM?", 1, true)
        .expect("search succeeds");
    assert_eq!(texts(&expanded), vec!["B"]);

    let vector = retriever
        .scoring_vector("What is FOOM?", true)
        .expect("vector produced");
    assert_eq!(vector, vec![0.0, 1.0]);

    let calls = provider.calls();
    assert!(calls.contains(&"complete:What is FOOM?:0:200".to_string()));
    assert!(calls.contains(&format!("embed:{}", prompt)));
}

#[test]
fn without_hyde_no_completion_is_requested() {
    let (retriever, provider) = retriever(StubProvider::returning(vec![1.0, 0.0]), abc_corpus());
    retriever.top_k("q", 2, false).expect("search succeeds");
    assert_eq!(provider.calls(), vec!["embed:q".to_string()]);
}

#[test]
fn corrupt_metadata_reference_fails_search() {
    let corpus = Corpus::new(
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        vec!["A".into(), "B".into()],
        vec![0, 5],
        vec![record("https://a")],
    )
    .expect("columns are aligned");
    let (retriever, _) = retriever(StubProvider::returning(vec![0.0, 1.0]), corpus);

    assert!(matches!(
        retriever.top_k("q", 1, false),
        Err(SearchError::CorruptCorpus(_))
    ));
}

#[test]
fn dimension_mismatch_is_reported() {
    let (retriever, _) = retriever(StubProvider::returning(vec![1.0, 0.0, 0.0]), abc_corpus());
    assert!(matches!(
        retriever.top_k("q", 1, false),
        Err(SearchError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}

#[test]
fn provider_errors_propagate_unchanged() {
    let provider = StubProvider {
        fail_embed: Some(ProviderError::Status {
            status: 401,
            body: "unauthorized".to_string(),
        }),
        ..StubProvider::default()
    };
    let (retriever, _) = retriever(provider, abc_corpus());

    assert!(matches!(
        retriever.top_k("q", 1, false),
        Err(SearchError::Provider(ProviderError::Status { status: 401, ref body }))
            if body == "unauthorized"
    ));
}

#[test]
fn missing_corpus_fails_before_any_provider_call() {
    let provider = Arc::new(StubProvider::returning(vec![1.0, 0.0]));
    let retriever = Retriever::new(
        Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
        Arc::new(SharedCorpus::lazy("/nonexistent/dataset.json")),
        RetrieverOptions::default(),
    );

    assert!(matches!(
        retriever.top_k("q", 1, false),
        Err(SearchError::CorpusUnavailable { .. })
    ));
    assert!(provider.calls().is_empty());
}

#[test]
fn options_follow_retrieval_config() {
    let config = RetrievalConfig {
        hyde_max_tokens: 64,
        hyde_temperature: 0.5,
        ..RetrievalConfig::default()
    };
    let options = RetrieverOptions::from(&config);
    assert_eq!(options.hyde.max_tokens, 64);
    assert_eq!(options.hyde.temperature, 0.5);
}

#[test]
fn nan_scores_rank_last_and_stay_nan() {
    let corpus = Corpus::new(
        vec![vec![f32::NAN, 0.0], vec![-1.0, 0.0], vec![0.5, 0.0]],
        vec!["broken".into(), "opposite".into(), "close".into()],
        vec![0, 0, 0],
        vec![record("https://x")],
    )
    .expect("valid corpus");
    let (retriever, _) = retriever(StubProvider::returning(vec![1.0, 0.0]), corpus);

    let results = retriever.top_k("q", 3, false).expect("search succeeds");
    assert_eq!(texts(&results), vec!["close", "opposite", "broken"]);
    assert_eq!(results[1].score, -1.0);
    assert!(results[2].score.is_nan());

    let json = serde_json::to_value(&results[2]).expect("result serializes");
    assert!(json["score"].is_null());
}
