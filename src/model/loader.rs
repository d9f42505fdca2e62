// src/model/loader.rs
use crate::model::fetch;
use crate::model::{TaggerModel, CHECKPOINT_FILES};
use crate::utils::error::ModelError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the tagger model comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// The model compiled into the binary
    Builtin,
    /// A JSON model file, optionally re-fetched from `fetch_url` when it cannot be loaded
    File {
        path: PathBuf,
        fetch_url: Option<String>,
    },
}

/// A directory holding a token-classification checkpoint. When it cannot be
/// opened, every checkpoint file is fetched from `fetch_base/<file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSource {
    pub dir: PathBuf,
    pub fetch_base: Option<String>,
}

/// Retrieves a model file into a local path.
#[allow(async_fn_in_trait)]
pub trait ModelFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), ModelError>;
}

/// Fetches over HTTP(S).
pub struct HttpFetcher;

impl ModelFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), ModelError> {
        fetch::download_model(url, dest).await.map(|_| ())
    }
}

fn read_model_file(path: &Path) -> Result<TaggerModel, ModelError> {
    let json = std::fs::read_to_string(path)?;
    TaggerModel::from_json(&json)
}

/// Loads the model described by `source`, downloading it over HTTP if needed.
pub async fn load_model(source: &ModelSource) -> Result<TaggerModel, ModelError> {
    load_model_with(source, &HttpFetcher).await
}

/// Loads a model. A model file that fails to load is fetched once from its
/// URL and loaded again; a second failure is final.
pub async fn load_model_with<F: ModelFetcher>(
    source: &ModelSource,
    fetcher: &F,
) -> Result<TaggerModel, ModelError> {
    let (path, fetch_url) = match source {
        ModelSource::Builtin => {
            tracing::debug!("Using builtin tagger model");
            return Ok(TaggerModel::builtin());
        }
        ModelSource::File { path, fetch_url } => (path, fetch_url),
    };

    let first_error = match read_model_file(path) {
        Ok(model) => {
            tracing::info!("Loaded tagger model '{}' from {}", model.name, path.display());
            return Ok(model);
        }
        Err(e) => e,
    };

    let Some(url) = fetch_url else {
        return Err(ModelError::Unavailable {
            path: path.display().to_string(),
            reason: first_error.to_string(),
        });
    };

    tracing::warn!(
        "Could not load tagger model from {} ({}); fetching from {}",
        path.display(),
        first_error,
        url
    );
    fetcher.fetch(url, path).await?;

    read_model_file(path)
        .map(|model| {
            tracing::info!("Loaded tagger model '{}' after fetch", model.name);
            model
        })
        .map_err(|e| ModelError::Unavailable {
            path: path.display().to_string(),
            reason: format!("still unusable after fetch: {}", e),
        })
}

/// Opens the checkpoint in `source.dir` with `open`, downloading its files
/// over HTTP if needed.
pub async fn load_checkpoint<T, E, O>(source: &CheckpointSource, open: O) -> Result<T, ModelError>
where
    E: fmt::Display,
    O: Fn(&Path) -> Result<T, E>,
{
    load_checkpoint_with(source, &HttpFetcher, open).await
}

/// Opens a checkpoint directory. If that fails and a base URL is known, all
/// checkpoint files are fetched once and the directory is opened again; a
/// second failure is final.
pub async fn load_checkpoint_with<T, E, O, F>(
    source: &CheckpointSource,
    fetcher: &F,
    open: O,
) -> Result<T, ModelError>
where
    E: fmt::Display,
    O: Fn(&Path) -> Result<T, E>,
    F: ModelFetcher,
{
    let dir = &source.dir;
    let first_error = match open(dir) {
        Ok(checkpoint) => {
            tracing::info!("Opened NER checkpoint in {}", dir.display());
            return Ok(checkpoint);
        }
        Err(e) => e,
    };

    let Some(base) = &source.fetch_base else {
        return Err(ModelError::Unavailable {
            path: dir.display().to_string(),
            reason: first_error.to_string(),
        });
    };

    tracing::warn!(
        "Could not open NER checkpoint in {} ({}); fetching from {}",
        dir.display(),
        first_error,
        base
    );
    for file in CHECKPOINT_FILES {
        let url = format!("{}/{}", base.trim_end_matches('/'), file);
        fetcher.fetch(&url, &dir.join(file)).await?;
    }

    open(dir).map_err(|e| ModelError::Unavailable {
        path: dir.display().to_string(),
        reason: format!("still unusable after fetch: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Writes fixed content to the destination and records the URLs asked for.
    struct StubFetcher {
        content: String,
        calls: Cell<usize>,
        urls: RefCell<Vec<String>>,
    }

    impl StubFetcher {
        fn new(content: &str) -> Self {
            Self { content: content.to_string(), calls: Cell::new(0), urls: RefCell::new(Vec::new()) }
        }
    }

    impl ModelFetcher for StubFetcher {
        async fn fetch(&self, url: &str, dest: &Path) -> Result<(), ModelError> {
            self.calls.set(self.calls.get() + 1);
            self.urls.borrow_mut().push(url.to_string());
            std::fs::write(dest, &self.content)?;
            Ok(())
        }
    }

    /// Opens a checkpoint when every file is present and holds `expected`.
    fn open_checkpoint(dir: &Path, expected: &str) -> Result<usize, String> {
        for file in CHECKPOINT_FILES {
            let content = std::fs::read_to_string(dir.join(file)).map_err(|e| format!("{}: {}", file, e))?;
            if content != expected {
                return Err(format!("{} is corrupt", file));
            }
        }
        Ok(CHECKPOINT_FILES.len())
    }

    fn checkpoint_source(dir: &Path, base: Option<&str>) -> CheckpointSource {
        CheckpointSource { dir: dir.to_path_buf(), fetch_base: base.map(str::to_string) }
    }

    fn file_source(path: &Path, url: Option<&str>) -> ModelSource {
        ModelSource::File { path: path.to_path_buf(), fetch_url: url.map(str::to_string) }
    }

    #[test]
    fn test_builtin_needs_no_fetch() {
        let fetcher = StubFetcher::new("");
        let model = tokio_test::block_on(load_model_with(&ModelSource::Builtin, &fetcher)).unwrap();
        assert_eq!(model.name, "builtin");
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn test_existing_file_is_loaded_without_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"name": "local"}"#).unwrap();

        let fetcher = StubFetcher::new("");
        let source = file_source(&path, Some("https://models.example/tagger.json"));
        let model = tokio_test::block_on(load_model_with(&source, &fetcher)).unwrap();
        assert_eq!(model.name, "local");
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn test_missing_file_is_fetched_once_then_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let fetcher = StubFetcher::new(r#"{"name": "downloaded", "locations": ["Lagos"]}"#);
        let source = file_source(&path, Some("https://models.example/tagger.json"));
        let model = tokio_test::block_on(load_model_with(&source, &fetcher)).unwrap();
        assert_eq!(model.name, "downloaded");
        assert_eq!(fetcher.calls.get(), 1);
        assert!(path.exists());
    }

    #[test]
    fn test_second_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let fetcher = StubFetcher::new("<html>not a model</html>");
        let source = file_source(&path, Some("https://models.example/tagger.json"));
        let result = tokio_test::block_on(load_model_with(&source, &fetcher));
        assert!(matches!(result, Err(ModelError::Unavailable { .. })), "got {:?}", result);
        assert_eq!(fetcher.calls.get(), 1);
    }

    #[test]
    fn test_missing_file_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StubFetcher::new("");
        let source = file_source(&dir.path().join("absent.json"), None);
        let result = tokio_test::block_on(load_model_with(&source, &fetcher));
        assert!(matches!(result, Err(ModelError::Unavailable { .. })));
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn test_complete_checkpoint_needs_no_fetch() {
        let dir = tempfile::tempdir().unwrap();
        for file in CHECKPOINT_FILES {
            std::fs::write(dir.path().join(file), "ok").unwrap();
        }
        let fetcher = StubFetcher::new("ok");
        let source = checkpoint_source(dir.path(), Some("https://models.example/ner"));
        let opened = tokio_test::block_on(load_checkpoint_with(&source, &fetcher, |d| open_checkpoint(d, "ok")));
        assert_eq!(opened.unwrap(), 3);
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn test_missing_checkpoint_is_fetched_file_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StubFetcher::new("ok");
        let source = checkpoint_source(dir.path(), Some("https://models.example/ner/"));
        let opened = tokio_test::block_on(load_checkpoint_with(&source, &fetcher, |d| open_checkpoint(d, "ok")));
        assert_eq!(opened.unwrap(), 3);
        assert_eq!(
            *fetcher.urls.borrow(),
            vec![
                "https://models.example/ner/model.onnx".to_string(),
                "https://models.example/ner/tokenizer.json".to_string(),
                "https://models.example/ner/config.json".to_string(),
            ]
        );
    }

    #[test]
    fn test_checkpoint_still_broken_after_fetch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StubFetcher::new("<html>404</html>");
        let source = checkpoint_source(dir.path(), Some("https://models.example/ner"));
        let result = tokio_test::block_on(load_checkpoint_with(&source, &fetcher, |d| open_checkpoint(d, "ok")));
        assert!(matches!(result, Err(ModelError::Unavailable { .. })), "got {:?}", result);
        assert_eq!(fetcher.calls.get(), CHECKPOINT_FILES.len(), "one round of downloads only");
    }

    #[test]
    fn test_checkpoint_without_base_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StubFetcher::new("ok");
        let source = checkpoint_source(dir.path(), None);
        let result = tokio_test::block_on(load_checkpoint_with(&source, &fetcher, |d| open_checkpoint(d, "ok")));
        assert!(matches!(result, Err(ModelError::Unavailable { .. })));
        assert_eq!(fetcher.calls.get(), 0);
    }
}
