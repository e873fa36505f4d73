use super::classifier::{Classifier, ClassifierError, OnnxClassifier};
use super::params::{is_plain_model_name, ActionRecognitionParams, Backend, Target};
use super::PLUGIN_ID;
use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};

#[derive(Debug, Error)]
pub enum ModelStoreError {
    #[error("invalid model name '{0}': expected a file stem inside the models directory")]
    InvalidName(String),

    #[error("model file not found: {path} (no model hub configured)")]
    NotFound { path: PathBuf },

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("model store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("model loader task failed: {0}")]
    Join(String),
}

/// Source of classifiers for a parameter set
#[async_trait]
pub trait ClassifierLoader: Send + Sync {
    async fn load(
        &self,
        params: &ActionRecognitionParams,
    ) -> Result<Arc<dyn Classifier>, ModelStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModelKey {
    path: PathBuf,
    backend: Backend,
    target: Target,
}

type ClassifierSlot = Arc<OnceCell<Arc<dyn Classifier>>>;

/// Resolves model files on disk, downloads missing ones from the model hub,
/// and shares one loaded session per (model, backend, target).
pub struct ModelStore {
    models_dir: PathBuf,
    hub_url: Option<Url>,
    http: reqwest::Client,
    slots: Mutex<HashMap<ModelKey, ClassifierSlot>>,
}

impl ModelStore {
    pub fn new(models_dir: impl Into<PathBuf>, hub_url: Option<Url>) -> Self {
        Self {
            models_dir: models_dir.into(),
            hub_url,
            http: reqwest::Client::new(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Local path for a model name, always inside the models directory
    pub fn model_path(&self, model_name: &str) -> Result<PathBuf, ModelStoreError> {
        if !is_plain_model_name(model_name) {
            return Err(ModelStoreError::InvalidName(model_name.to_string()));
        }
        Ok(self.models_dir.join(format!("{model_name}.onnx")))
    }

    /// Hub location of a model, if a hub is configured
    pub fn model_url(&self, model_name: &str) -> Option<String> {
        self.hub_url.as_ref().map(|hub| {
            format!(
                "{}/{}/{}.onnx",
                hub.as_str().trim_end_matches('/'),
                PLUGIN_ID,
                model_name
            )
        })
    }

    /// Make sure the model file exists locally, downloading it if needed
    pub async fn ensure_model(&self, model_name: &str) -> Result<PathBuf, ModelStoreError> {
        let path = self.model_path(model_name)?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }

        let Some(url) = self.model_url(model_name) else {
            return Err(ModelStoreError::NotFound { path });
        };

        tracing::info!(%url, path = %path.display(), "Downloading model, please wait...");
        tokio::fs::create_dir_all(&self.models_dir).await?;
        let partial = path.with_extension(format!("onnx.{}.part", uuid::Uuid::new_v4()));

        match self.download(&url, &partial).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, &path).await?;
                tracing::info!(path = %path.display(), bytes, "Model downloaded");
                Ok(path)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    tracing::debug!("No partial download to clean up: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, ModelStoreError> {
        let download_err = |e: reqwest::Error| ModelStoreError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download_err)?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(download_err)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

impl ModelStore {
    /// Slot shared by every load of the same (model, backend, target)
    async fn slot(&self, key: ModelKey) -> ClassifierSlot {
        let mut slots = self.slots.lock().await;
        slots.entry(key).or_default().clone()
    }

    async fn load_from_disk(
        &self,
        params: &ActionRecognitionParams,
    ) -> Result<Arc<dyn Classifier>, ModelStoreError> {
        let path = self.ensure_model(&params.model_name).await?;
        let (backend, target) = (params.backend, params.target);
        let classifier =
            tokio::task::spawn_blocking(move || OnnxClassifier::load(&path, backend, target))
                .await
                .map_err(|e| ModelStoreError::Join(e.to_string()))??;
        Ok(Arc::new(classifier))
    }
}

#[async_trait]
impl ClassifierLoader for ModelStore {
    async fn load(
        &self,
        params: &ActionRecognitionParams,
    ) -> Result<Arc<dyn Classifier>, ModelStoreError> {
        let key = ModelKey {
            path: self.model_path(&params.model_name)?,
            backend: params.backend,
            target: params.target,
        };
        let slot = self.slot(key).await;

        if let Some(classifier) = slot.get() {
            telemetry::metrics::ACTION_MODEL_LOADS
                .with_label_values(&["cache", "ok"])
                .inc();
            return Ok(classifier.clone());
        }

        // Concurrent loads of the same key wait here; other keys proceed
        let result = slot
            .get_or_try_init(|| async {
                let result = self.load_from_disk(params).await;
                let status = if result.is_ok() { "ok" } else { "error" };
                telemetry::metrics::ACTION_MODEL_LOADS
                    .with_label_values(&["disk", status])
                    .inc();
                result
            })
            .await;

        result.cloned()
    }
}
