use ngram_search::config::SearchConfig;
use ngram_search::indexer::{BuildReport, IndexOptions, run_build};
use ngram_search::model::types::SearchHit;
use ngram_search::search::ranker::Ranker;
use ngram_search::storage::index_store::SearchIndex;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct TempFixtureDir {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TempFixtureDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn index_dir(&self) -> PathBuf {
        self.dir.path().join("index")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }
}

/// Builds an NDJSON corpus one document at a time.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct CorpusFixtureBuilder {
    docs: Vec<Value>,
}

#[allow(dead_code)]
impl CorpusFixtureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doc(mut self, doc_id: &str, text_main: &str) -> Self {
        self.docs.push(json!({ "doc_id": doc_id, "text_main": text_main }));
        self
    }

    pub fn titled(mut self, doc_id: &str, title: &str, text_main: &str) -> Self {
        self.docs.push(json!({
            "doc_id": doc_id,
            "title": title,
            "text_main": text_main,
        }));
        self
    }

    pub fn with_paragraphs(mut self, doc_id: &str, text_main: &str, paragraphs: &[&str]) -> Self {
        self.docs.push(json!({
            "doc_id": doc_id,
            "text_main": text_main,
            "paragraphs": paragraphs,
        }));
        self
    }

    /// Raw document object, for fields the helpers above don't cover.
    pub fn raw(mut self, doc: Value) -> Self {
        self.docs.push(doc);
        self
    }

    pub fn write(&self, dir: &Path) -> PathBuf {
        std::fs::create_dir_all(dir).expect("create corpus dir");
        let path = dir.join("corpus.jsonl");
        let body: String = self
            .docs
            .iter()
            .map(|doc| format!("{doc}\n"))
            .collect();
        std::fs::write(&path, body).expect("write corpus");
        path
    }
}

#[allow(dead_code)]
pub fn config_with_min_df(min_df: usize) -> SearchConfig {
    let mut cfg = SearchConfig::default();
    cfg.embedding.min_df = min_df;
    cfg
}

/// Write `corpus` under `fixture` and build a hash index into `fixture.index_dir()`.
#[allow(dead_code)]
pub fn build_index(
    fixture: &TempFixtureDir,
    corpus: &CorpusFixtureBuilder,
    config: SearchConfig,
) -> BuildReport {
    let corpus_path = corpus.write(&fixture.path());
    run_build(&IndexOptions {
        corpus: corpus_path,
        index_dir: fixture.index_dir(),
        data_dir: fixture.data_dir(),
        config,
        embedder: None,
        strict_embedder: false,
        show_progress: false,
    })
    .expect("build index")
}

#[allow(dead_code)]
pub fn open_ranker(fixture: &TempFixtureDir) -> Ranker {
    ngram_search::open_ranker(&fixture.data_dir(), &fixture.index_dir(), None, None)
        .expect("open ranker")
}

#[allow(dead_code)]
pub fn load_index(fixture: &TempFixtureDir) -> Arc<SearchIndex> {
    Arc::new(SearchIndex::load(&fixture.index_dir()).expect("load index"))
}

/// Fluent assertions for search hits.
#[allow(dead_code)]
pub struct SearchHitAssert<'a> {
    hit: &'a SearchHit,
}

#[allow(dead_code)]
pub fn assert_hit(hit: &SearchHit) -> SearchHitAssert<'_> {
    SearchHitAssert { hit }
}

#[allow(dead_code)]
impl SearchHitAssert<'_> {
    pub fn doc_id(self, expected: impl AsRef<str>) -> Self {
        assert_eq!(
            self.hit.doc_id,
            expected.as_ref(),
            "doc_id mismatch for hit {:?}",
            self.hit
        );
        self
    }

    pub fn title(self, expected: impl AsRef<str>) -> Self {
        assert_eq!(
            self.hit.title,
            expected.as_ref(),
            "title mismatch for hit {}",
            self.hit.doc_id
        );
        self
    }

    pub fn snippet(self, expected: impl AsRef<str>) -> Self {
        assert_eq!(
            self.hit.snippet,
            expected.as_ref(),
            "snippet mismatch for hit {}",
            self.hit.doc_id
        );
        self
    }

    pub fn snippet_contains(self, needle: impl AsRef<str>) -> Self {
        let needle = needle.as_ref();
        assert!(
            self.hit.snippet.contains(needle),
            "expected snippet of {} to contain {needle:?}, got {:?}",
            self.hit.doc_id,
            self.hit.snippet
        );
        self
    }

    pub fn score_between(self, low: f32, high: f32) -> Self {
        assert!(
            (low..=high).contains(&self.hit.score),
            "score {} of {} outside [{low}, {high}]",
            self.hit.score,
            self.hit.doc_id
        );
        self
    }
}
