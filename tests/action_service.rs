/// Integration tests for the action recognition service
use action_service::{
    api,
    recognition::classifier::{Classifier, ClassifierError},
    recognition::labels::LabelTable,
    recognition::model_store::{ClassifierLoader, ModelStoreError},
    recognition::params::ActionRecognitionParams,
    ActionServiceState,
};
use async_trait::async_trait;
use axum_test::TestServer;
use common::actions::{ActionResult, PluginInfo, SessionInfo, SessionListResponse, VideoFrame};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array5;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

/// Classifier whose scores favour one fixed class
struct FixedClassifier {
    class_index: usize,
}

impl Classifier for FixedClassifier {
    fn classify(&self, _blob: Array5<f32>) -> Result<Vec<f32>, ClassifierError> {
        let mut scores = vec![0.0; self.class_index + 1];
        scores[self.class_index] = 1.0;
        Ok(scores)
    }
}

/// Serves "resnet-18-kinetics" (class 0) and "resnet-34-kinetics" (class 1);
/// every other model name is missing.
struct FakeLoader;

#[async_trait]
impl ClassifierLoader for FakeLoader {
    async fn load(
        &self,
        params: &ActionRecognitionParams,
    ) -> Result<Arc<dyn Classifier>, ModelStoreError> {
        let class_index = match params.model_name.as_str() {
            "resnet-18-kinetics" => 0,
            "resnet-34-kinetics" => 1,
            "resnet-101-kinetics" => 7,
            other => {
                return Err(ModelStoreError::NotFound {
                    path: format!("models/{other}.onnx").into(),
                })
            }
        };
        Ok(Arc::new(FixedClassifier { class_index }))
    }
}

fn setup_test_service(sample_duration: &str) -> (TestServer, ActionServiceState) {
    let labels = LabelTable::parse("abseiling\nair drumming\nanswering questions").unwrap();
    let params = ActionRecognitionParams::default()
        .merge_map(&HashMap::from([(
            "sample_duration".to_string(),
            sample_duration.to_string(),
        )]))
        .unwrap();
    let state = ActionServiceState::new(
        "test-node".to_string(),
        labels,
        Arc::new(FakeLoader),
        params,
    );
    let server = TestServer::new(api::router(state.clone())).unwrap();
    (server, state)
}

fn png_frame(sequence: u64) -> VideoFrame {
    let img = RgbImage::from_pixel(64, 48, Rgb([200, 100, 50]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    VideoFrame::from_encoded(&bytes, "png").with_sequence(sequence, sequence * 40)
}

#[tokio::test]
async fn test_health_endpoints() {
    let (server, state) = setup_test_service("2");

    let response = server.get("/healthz").await;
    assert_eq!(response.status_code(), 200);

    let response = server.get("/readyz").await;
    assert_eq!(response.status_code(), 503);

    state.warm_up().await.unwrap();
    let response = server.get("/readyz").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["model"], "resnet-34-kinetics");
}

#[tokio::test]
async fn test_info_reports_class_count() {
    let (server, _state) = setup_test_service("2");

    let response = server.get("/v1/info").await;
    assert_eq!(response.status_code(), 200);

    let info: PluginInfo = response.json();
    assert_eq!(info.id, "infer_resnet_action_recognition");
    assert_eq!(info.class_count, 3);
    assert_eq!(info.year, 2018);
}

#[tokio::test]
async fn test_frames_fill_window_then_label() {
    let (server, _state) = setup_test_service("3");

    for sequence in 0..2 {
        let response = server
            .post("/v1/sessions/cam-1/frames")
            .json(&png_frame(sequence))
            .await;
        assert_eq!(response.status_code(), 200);

        let result: ActionResult = response.json();
        assert!(!result.inferred);
        assert_eq!(result.label, "");
        assert!(result.overlay.is_none());
        assert_eq!(result.window_len, sequence as usize + 1);
    }

    let response = server
        .post("/v1/sessions/cam-1/frames")
        .json(&png_frame(2))
        .await;
    let result: ActionResult = response.json();
    assert!(result.inferred);
    assert_eq!(result.class_index, Some(1));
    assert_eq!(result.label, "air drumming");
    assert_eq!(result.sequence, 2);
    assert_eq!(result.timestamp, 80);
    assert_eq!(result.capacity, 3);

    let overlay = result.overlay.unwrap();
    assert_eq!(overlay.text, "air drumming");
    assert_eq!((overlay.x, overlay.y), (10, 10));
}

#[tokio::test]
async fn test_new_sequence_flag_restarts_window() {
    let (server, _state) = setup_test_service("2");

    for sequence in 0..2 {
        server
            .post("/v1/sessions/cam-1/frames")
            .json(&png_frame(sequence))
            .await;
    }

    let result: ActionResult = server
        .post("/v1/sessions/cam-1/frames")
        .json(&png_frame(0).starting_sequence())
        .await
        .json();
    assert!(!result.inferred);
    assert_eq!(result.label, "");
    assert_eq!(result.window_len, 1);
}

#[tokio::test]
async fn test_reset_session() {
    let (server, _state) = setup_test_service("2");

    let response = server.post("/v1/sessions/cam-1/reset").await;
    assert_eq!(response.status_code(), 404);

    for sequence in 0..2 {
        server
            .post("/v1/sessions/cam-1/frames")
            .json(&png_frame(sequence))
            .await;
    }

    let response = server.post("/v1/sessions/cam-1/reset").await;
    assert_eq!(response.status_code(), 200);
    let info: SessionInfo = response.json();
    assert_eq!(info.window_len, 0);
    assert_eq!(info.last_label, "");
    assert_eq!(info.frames_processed, 2);
    assert_eq!(info.inferences, 1);
}

#[tokio::test]
async fn test_update_params() {
    let (server, _state) = setup_test_service("2");
    server
        .post("/v1/sessions/cam-1/frames")
        .json(&png_frame(0))
        .await;

    let response = server
        .put("/v1/sessions/cam-1/params")
        .json(&serde_json::json!({
            "model_name": "resnet-18-kinetics",
            "rolling": "false",
            "sample_duration": "4"
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let info: SessionInfo = response.json();
    assert_eq!(info.params["model_name"], "resnet-18-kinetics");
    assert_eq!(info.params["rolling"], "false");
    assert_eq!(info.params["sample_duration"], "4");
    assert_eq!(info.window_len, 0);

    let mut last = None;
    for sequence in 1..=4 {
        let result: ActionResult = server
            .post("/v1/sessions/cam-1/frames")
            .json(&png_frame(sequence))
            .await
            .json();
        last = Some(result);
    }
    let last = last.unwrap();
    assert!(last.inferred);
    assert_eq!(last.label, "abseiling");
    assert_eq!(last.window_len, 0);
}

#[tokio::test]
async fn test_invalid_params_are_rejected() {
    let (server, _state) = setup_test_service("2");

    let cases = [
        serde_json::json!({ "sample_duration": "0" }),
        serde_json::json!({ "rolling": "maybe" }),
        serde_json::json!({ "backend": "opencl" }),
        serde_json::json!({ "fps": "30" }),
        serde_json::json!({ "sample_duration": "9223372036854775807" }),
        serde_json::json!({ "model_name": "../../etc/evil" }),
        serde_json::json!({ "model_name": "/tmp/evil" }),
    ];
    for body in cases {
        let response = server.put("/v1/sessions/cam-1/params").json(&body).await;
        assert_eq!(response.status_code(), 400, "body: {body}");
    }

    // Nothing was created by the rejected updates
    let response = server.get("/v1/sessions/cam-1").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_missing_model_is_unavailable() {
    let (server, _state) = setup_test_service("2");

    let response = server
        .put("/v1/sessions/cam-1/params")
        .json(&serde_json::json!({ "model_name": "resnet-200-kinetics" }))
        .await;
    assert_eq!(response.status_code(), 503);
    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("resnet-200-kinetics"));
}

#[tokio::test]
async fn test_unknown_class_index_clears_label() {
    let (server, _state) = setup_test_service("1");

    server
        .put("/v1/sessions/cam-1/params")
        .json(&serde_json::json!({ "model_name": "resnet-101-kinetics" }))
        .await;

    let result: ActionResult = server
        .post("/v1/sessions/cam-1/frames")
        .json(&png_frame(0))
        .await
        .json();
    assert!(result.inferred);
    assert_eq!(result.class_index, Some(7));
    assert_eq!(result.label, "");
    assert!(result.overlay.is_none());
}

#[tokio::test]
async fn test_invalid_frame_payload() {
    let (server, _state) = setup_test_service("2");

    let mut frame = png_frame(0);
    frame.data = "not base64!".to_string();
    let response = server.post("/v1/sessions/cam-1/frames").json(&frame).await;
    assert_eq!(response.status_code(), 400);

    let mut frame = png_frame(0);
    frame.data = VideoFrame::from_encoded(b"definitely not an image", "png").data;
    let response = server.post("/v1/sessions/cam-1/frames").json(&frame).await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_list_and_remove_sessions() {
    let (server, _state) = setup_test_service("2");

    for id in ["cam-b", "cam-a"] {
        server
            .post(&format!("/v1/sessions/{id}/frames"))
            .json(&png_frame(0))
            .await;
    }

    let list: SessionListResponse = server.get("/v1/sessions").await.json();
    let ids: Vec<&str> = list.sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["cam-a", "cam-b"]);

    let response = server.delete("/v1/sessions/cam-a").await;
    assert_eq!(response.status_code(), 204);

    let response = server.delete("/v1/sessions/cam-a").await;
    assert_eq!(response.status_code(), 404);

    let list: SessionListResponse = server.get("/v1/sessions").await.json();
    assert_eq!(list.sessions.len(), 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (server, _state) = setup_test_service("1");
    server
        .post("/v1/sessions/cam-1/frames")
        .json(&png_frame(0))
        .await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);
    let body = response.text();
    assert!(body.contains("action_service_frames_processed_total"));
    assert!(body.contains("action_service_inferences_total"));
}
