use crate::recognition::classifier::Classifier;
use crate::recognition::controller::{ControllerError, InferenceController};
use crate::recognition::labels::LabelTable;
use crate::recognition::model_store::{ClassifierLoader, ModelStoreError};
use crate::recognition::params::{ActionRecognitionParams, ParamError};
use common::actions::{ActionResult, SessionInfo, VideoFrame};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error(transparent)]
    Params(#[from] ParamError),

    #[error(transparent)]
    Model(#[from] ModelStoreError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("frame worker failed: {0}")]
    Worker(String),
}

/// Inference state of one video stream
pub struct StreamSession {
    params: ActionRecognitionParams,
    controller: InferenceController,
    frames_processed: u64,
}

impl StreamSession {
    fn new(
        params: ActionRecognitionParams,
        labels: LabelTable,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let controller =
            InferenceController::new(params.sample_duration, params.mode(), labels, classifier);
        Self {
            params,
            controller,
            frames_processed: 0,
        }
    }

    fn info(&self, id: &str) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            params: self.params.to_map(),
            window_len: self.controller.window_len(),
            last_label: self.controller.last_label().to_string(),
            frames_processed: self.frames_processed,
            inferences: self.controller.inferences(),
        }
    }
}

type SharedSession = Arc<Mutex<StreamSession>>;

#[derive(Clone)]
pub struct ActionServiceState {
    inner: Arc<ActionServiceStateInner>,
}

struct ActionServiceStateInner {
    node_id: String,
    labels: LabelTable,
    loader: Arc<dyn ClassifierLoader>,
    default_params: ActionRecognitionParams,
    sessions: RwLock<HashMap<String, SharedSession>>,
    default_model_ready: AtomicBool,
}

impl ActionServiceState {
    pub fn new(
        node_id: String,
        labels: LabelTable,
        loader: Arc<dyn ClassifierLoader>,
        default_params: ActionRecognitionParams,
    ) -> Self {
        Self {
            inner: Arc::new(ActionServiceStateInner {
                node_id,
                labels,
                loader,
                default_params,
                sessions: RwLock::new(HashMap::new()),
                default_model_ready: AtomicBool::new(false),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn labels(&self) -> &LabelTable {
        &self.inner.labels
    }

    pub fn default_params(&self) -> &ActionRecognitionParams {
        &self.inner.default_params
    }

    /// Whether the default model has been loaded
    pub fn is_ready(&self) -> bool {
        self.inner.default_model_ready.load(Ordering::Acquire)
    }

    /// Load (and download if needed) the default model ahead of the first frame
    pub async fn warm_up(&self) -> Result<(), ServiceError> {
        self.load_classifier(&self.inner.default_params).await?;
        info!(
            model = %self.inner.default_params.model_name,
            "Default action recognition model ready"
        );
        Ok(())
    }

    /// Load a classifier; any successful load of the default model marks the service ready
    async fn load_classifier(
        &self,
        params: &ActionRecognitionParams,
    ) -> Result<Arc<dyn Classifier>, ServiceError> {
        let classifier = self.inner.loader.load(params).await?;
        if !params.needs_model_reload(&self.inner.default_params) {
            self.inner.default_model_ready.store(true, Ordering::Release);
        }
        Ok(classifier)
    }

    async fn find_session(&self, session_id: &str) -> Option<SharedSession> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    async fn existing_session(&self, session_id: &str) -> Result<SharedSession, ServiceError> {
        self.find_session(session_id)
            .await
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))
    }

    async fn create_session(
        &self,
        session_id: &str,
        params: ActionRecognitionParams,
    ) -> Result<SharedSession, ServiceError> {
        // Load outside the map lock so other streams keep flowing
        let classifier = self.load_classifier(&params).await?;

        let mut sessions = self.inner.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(
                    session = session_id,
                    sample_duration = params.sample_duration.get(),
                    mode = params.mode().as_str(),
                    "Created stream session"
                );
                Arc::new(Mutex::new(StreamSession::new(
                    params,
                    self.inner.labels.clone(),
                    classifier,
                )))
            })
            .clone();
        telemetry::metrics::ACTION_ACTIVE_SESSIONS.set(sessions.len() as i64);
        Ok(session)
    }

    async fn session_or_create(&self, session_id: &str) -> Result<SharedSession, ServiceError> {
        match self.find_session(session_id).await {
            Some(session) => Ok(session),
            None => {
                self.create_session(session_id, self.inner.default_params.clone())
                    .await
            }
        }
    }

    /// Feed one frame to a stream's session, creating the session on first use.
    ///
    /// Frames of the same stream are serialized on the session lock; inference
    /// runs on the blocking pool.
    pub async fn process_frame(
        &self,
        session_id: &str,
        frame: VideoFrame,
    ) -> Result<ActionResult, ServiceError> {
        let session = self.session_or_create(session_id).await?;
        let mut guard = session.lock_owned().await;
        let (timestamp, sequence) = (frame.timestamp, frame.sequence);
        let start_time = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            let session = &mut *guard;
            if frame.new_sequence {
                session.controller.on_new_sequence();
            }
            let image = decode_frame(&frame)?;
            let outcome = session.controller.process_frame(&image)?;
            session.frames_processed += 1;
            Ok::<_, ServiceError>((
                outcome,
                session.controller.capacity().get(),
                session.controller.mode(),
            ))
        })
        .await
        .map_err(|e| ServiceError::Worker(e.to_string()))?;

        let (outcome, capacity, mode) = match result {
            Ok(processed) => processed,
            Err(e) => {
                telemetry::metrics::ACTION_FRAMES_PROCESSED
                    .with_label_values(&["error"])
                    .inc();
                return Err(e);
            }
        };

        telemetry::metrics::ACTION_FRAMES_PROCESSED
            .with_label_values(&["ok"])
            .inc();
        if let Some(prediction) = &outcome.prediction {
            telemetry::metrics::ACTION_INFERENCES
                .with_label_values(&[mode.as_str()])
                .inc();
            telemetry::metrics::ACTION_INFERENCE_LATENCY.observe(prediction.latency.as_secs_f64());
            if !prediction.known {
                telemetry::metrics::ACTION_UNKNOWN_CLASS.inc();
            }
        }

        Ok(ActionResult {
            session_id: session_id.to_string(),
            timestamp,
            sequence,
            overlay: outcome.overlay(),
            inferred: outcome.inferred(),
            class_index: outcome.prediction.as_ref().and_then(|p| p.class_index),
            label: outcome.label,
            window_len: outcome.window_len,
            capacity,
            processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
        })
    }

    /// Start a new sequence on a stream; waits for any in-flight inference first
    pub async fn reset(&self, session_id: &str) -> Result<SessionInfo, ServiceError> {
        let session = self.existing_session(session_id).await?;
        let mut session = session.lock().await;
        session.controller.on_new_sequence();
        info!(session = session_id, "Stream session reset");
        Ok(session.info(session_id))
    }

    /// Apply a partial string-map parameter update.
    ///
    /// A new classifier is loaded before anything is changed, so a failed
    /// reconfigure leaves the session as it was.
    pub async fn reconfigure(
        &self,
        session_id: &str,
        updates: HashMap<String, String>,
    ) -> Result<SessionInfo, ServiceError> {
        let Some(session) = self.find_session(session_id).await else {
            let params = self.inner.default_params.merge_map(&updates)?;
            let session = self.create_session(session_id, params).await?;
            let session = session.lock().await;
            return Ok(session.info(session_id));
        };

        let mut session = session.lock().await;
        let params = session.params.merge_map(&updates)?;

        if session.params.needs_model_reload(&params) {
            let classifier = self.load_classifier(&params).await?;
            session.controller.replace_classifier(classifier);
        }
        if session.params.changes_window(&params) {
            session
                .controller
                .reshape(params.sample_duration, params.mode());
        }

        info!(
            session = session_id,
            model = %params.model_name,
            sample_duration = params.sample_duration.get(),
            mode = params.mode().as_str(),
            "Stream session reconfigured"
        );
        session.params = params;
        Ok(session.info(session_id))
    }

    pub async fn session_info(&self, session_id: &str) -> Result<SessionInfo, ServiceError> {
        let session = self.existing_session(session_id).await?;
        let session = session.lock().await;
        Ok(session.info(session_id))
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<(String, SharedSession)> = {
            let sessions = self.inner.sessions.read().await;
            sessions
                .iter()
                .map(|(id, session)| (id.clone(), session.clone()))
                .collect()
        };

        let mut infos = Vec::with_capacity(sessions.len());
        for (id, session) in sessions {
            infos.push(session.lock().await.info(&id));
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub async fn remove_session(&self, session_id: &str) -> Result<(), ServiceError> {
        let mut sessions = self.inner.sessions.write().await;
        if sessions.remove(session_id).is_none() {
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        }
        telemetry::metrics::ACTION_ACTIVE_SESSIONS.set(sessions.len() as i64);
        info!(session = session_id, "Removed stream session");
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut sessions = self.inner.sessions.write().await;
        if !sessions.is_empty() {
            warn!("Dropping {} active stream sessions", sessions.len());
        }
        sessions.clear();
        telemetry::metrics::ACTION_ACTIVE_SESSIONS.set(0);
    }
}

fn decode_frame(frame: &VideoFrame) -> Result<DynamicImage, ServiceError> {
    let bytes = frame
        .decode_data()
        .map_err(|e| ServiceError::InvalidFrame(format!("invalid base64 data: {e}")))?;
    image::load_from_memory(&bytes)
        .map_err(|e| ServiceError::InvalidFrame(format!("undecodable {} image: {e}", frame.format)))
}
