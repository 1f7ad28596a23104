//! End-to-end recommendation scenarios against in-memory collaborators.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use ndarray::{array, Array2};
use paperrec_core::artifacts::{self, ArtifactPaths};
use paperrec_core::config::{ProfileConfig, RecommendConfig};
use paperrec_core::PaperRecConfig;
use paperrec_core::{
    EmbeddingBackend, EmbeddingError, EmbeddingStore, FlatIpIndex, InteractionRow,
    InteractionSource, InteractionSourceSpec, LoadedArtifacts, PaperCorpus, PaperRecError,
    PaperRecord, VectorIndex,
};
use paperrec_indexer::{build_index, update_index, UpdateOutcome};
use paperrec_server::{recommend_for_user, ServingState};

/// `(table, user_id) -> rows`
#[derive(Default)]
struct History(HashMap<(String, i64), Vec<InteractionRow>>);

impl History {
    fn with(mut self, table: &str, user_id: i64, paper_id: i64, age_days: f64) -> Self {
        self.0
            .entry((table.to_string(), user_id))
            .or_default()
            .push(InteractionRow { paper_id, age_days });
        self
    }
}

#[async_trait]
impl InteractionSource for History {
    async fn fetch_interactions(
        &self,
        user_id: i64,
        source: &InteractionSourceSpec,
    ) -> Result<Vec<InteractionRow>, PaperRecError> {
        Ok(self
            .0
            .get(&(source.table.clone(), user_id))
            .cloned()
            .unwrap_or_default())
    }
}

fn serving(raw: Array2<f32>, ids: Vec<i64>) -> ServingState {
    let store = EmbeddingStore::load(raw, ids).unwrap();
    let mut index = FlatIpIndex::new(store.dimensions());
    index
        .add_with_ids(store.normalized().view(), store.paper_ids())
        .unwrap();
    ServingState::new(
        LoadedArtifacts { store, index },
        ProfileConfig::default(),
        RecommendConfig::default(),
    )
}

#[tokio::test]
async fn scenario_a_profile_leans_towards_recent_favourite() {
    let state = serving(
        array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.6, 0.1, 0.79]],
        vec![1, 2, 3],
    );
    let history = History::default()
        .with("user_favorites", 42, 1, 0.0)
        .with("user_view_history", 42, 2, 30.0);

    let profile = paperrec_server::build_profile(42, &history, &state.store, &state.profile)
        .await
        .unwrap()
        .unwrap();
    let cos_1 = profile.query[0];
    let cos_2 = profile.query[1];
    assert!(cos_1 > cos_2, "favourite {cos_1} should beat old view {cos_2}");
    // Weights 1.0 and 0.3·e^-1 over orthonormal rows.
    let view_weight = 0.3 * (-1.0f32).exp();
    assert!((cos_2 / cos_1 - view_weight).abs() < 1e-4);

    let recs = recommend_for_user(&state, &history, 42, 2).await.unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].paper_id, 3);
}

#[tokio::test]
async fn scenario_b_no_history_is_empty() {
    let state = serving(array![[1.0, 0.0], [0.0, 1.0]], vec![1, 2]);
    let recs = recommend_for_user(&state, &History::default(), 7, 10)
        .await
        .unwrap();
    assert!(recs.is_empty());
}

#[tokio::test]
async fn history_without_vectors_is_treated_as_cold_start() {
    let state = serving(array![[1.0, 0.0], [0.0, 1.0]], vec![1, 2]);
    let history = History::default().with("user_favorites", 7, 999, 0.0);

    let recs = recommend_for_user(&state, &history, 7, 10).await.unwrap();
    assert!(recs.is_empty());
}

#[tokio::test]
async fn scenario_d_underflow_returns_remaining_in_score_order() {
    let state = serving(
        array![
            [1.0, 0.0],
            [0.0, 1.0],
            [0.9, 0.2],
            [0.5, 0.5],
            [0.2, 0.9]
        ],
        vec![1, 2, 3, 4, 5],
    );
    let history = History::default()
        .with("user_favorites", 1, 1, 0.0)
        .with("user_view_history", 1, 2, 3.0);

    let recs = recommend_for_user(&state, &history, 1, 10).await.unwrap();

    let ids: Vec<i64> = recs.iter().map(|r| r.paper_id).collect();
    assert_eq!(ids, vec![3, 4, 5]);
    assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(recs.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
}

#[tokio::test]
async fn favourite_and_view_of_same_paper_both_count() {
    let state = serving(array![[1.0, 0.0], [0.0, 1.0], [0.7, 0.7]], vec![1, 2, 3]);
    let history = History::default()
        .with("user_favorites", 5, 1, 0.0)
        .with("user_view_history", 5, 1, 0.0)
        .with("user_favorites", 5, 2, 0.0);

    let profile = paperrec_server::build_profile(5, &history, &state.store, &state.profile)
        .await
        .unwrap()
        .unwrap();
    // Paper 1 carries 1.3, paper 2 carries 1.0.
    assert!((profile.query[0] / profile.query[1] - 1.3).abs() < 1e-5);
    assert_eq!(profile.seen, HashSet::from([1, 2]));
}

#[tokio::test]
async fn zero_decay_config_never_reaches_scoring() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paperrec.toml");
    std::fs::write(
        &path,
        r#"
[service]
log_level = "info"

[database]
url = "postgresql://localhost/papers"
max_connections = 1

[embedding]
backend = "onnx"
gemini_model = "gemini-embedding-001"
gemini_dimensions = 768
onnx_dimensions = 384

[profile]
decay_days = 0.0
"#,
    )
    .unwrap();

    let err = PaperRecConfig::load(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, PaperRecError::InvalidValue { .. }), "got {err:?}");

    // The default time constant keeps a fresh favourite's scores finite and in range.
    let state = serving(array![[1.0, 0.0], [0.8, 0.6], [0.0, 1.0]], vec![1, 2, 3]);
    let history = History::default().with("user_favorites", 3, 1, 0.0);
    let recs = recommend_for_user(&state, &history, 3, 2).await.unwrap();
    assert_eq!(recs.len(), 2);
    assert!(recs.iter().all(|r| r.score.is_finite() && (-1.0..=1.0).contains(&r.score)));
}

// ---------------------------------------------------------------------------
// Offline job scenario
// ---------------------------------------------------------------------------

struct Corpus(Vec<PaperRecord>);

#[async_trait]
impl PaperCorpus for Corpus {
    async fn fetch_papers(&self, exclude: &HashSet<i64>) -> Result<Vec<PaperRecord>, PaperRecError> {
        Ok(self
            .0
            .iter()
            .filter(|p| !exclude.contains(&p.paper_id))
            .cloned()
            .collect())
    }
}

/// Letter-frequency embedding over a..z.
struct Letters;

#[async_trait]
impl EmbeddingBackend for Letters {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; 26];
        for b in text.bytes().filter(u8::is_ascii_lowercase) {
            v[(b - b'a') as usize] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        26
    }

    fn name(&self) -> &str {
        "letters"
    }
}

fn paper(paper_id: i64, title: &str, abstract_text: &str) -> PaperRecord {
    PaperRecord {
        paper_id,
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
    }
}

#[tokio::test]
async fn scenario_c_update_without_new_papers_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let corpus = Corpus(vec![
        paper(1, "graph networks", "message passing on graphs"),
        paper(2, "vision transformers", "patches as tokens"),
    ]);

    build_index(&corpus, &Letters, 128, &paths).await.unwrap();
    let before = std::fs::read(&paths.index).unwrap();
    let query = Letters.embed("graph").await.unwrap();
    let hits_before = artifacts::load_index(&paths).unwrap().search(&query, 2).unwrap();

    let outcome = update_index(&corpus, &Letters, 128, &paths).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::NoNewPapers { total: 2 });
    assert_eq!(std::fs::read(&paths.index).unwrap(), before);
    let hits_after = artifacts::load_index(&paths).unwrap().search(&query, 2).unwrap();
    assert_eq!(hits_before, hits_after);
}

#[tokio::test]
async fn updated_papers_feed_profiles_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    let mut corpus = Corpus(vec![paper(1, "abc", "abc"), paper(2, "xyz", "xyz")]);
    build_index(&corpus, &Letters, 128, &paths).await.unwrap();

    corpus.0.push(paper(3, "xyy", "yyx"));
    corpus.0.push(paper(4, "xyz xyz", "xy"));
    update_index(&corpus, &Letters, 1, &paths).await.unwrap();

    let loaded = artifacts::load_serving_state(&paths).unwrap();
    let state = ServingState::new(loaded, ProfileConfig::default(), RecommendConfig::default());
    // Paper 3 only exists because of the update, yet it shapes the profile.
    let history = History::default().with("user_favorites", 9, 3, 0.0);

    let recs = recommend_for_user(&state, &history, 9, 3).await.unwrap();
    let ids: Vec<i64> = recs.iter().map(|r| r.paper_id).collect();
    assert_eq!(ids[0], 4);
    assert!(!ids.contains(&3));
    assert_eq!(ids.len(), 3);
}
