use super::blob::{build_blob, normalize_frame, BlobSpec};
use super::classifier::{argmax, Classifier, ClassifierError};
use super::labels::LabelTable;
use super::window::{TemporalWindow, WindowMode};
use common::actions::LabelOverlay;
use image::{DynamicImage, GenericImageView};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error(transparent)]
    Inference(#[from] ClassifierError),
}

/// What the classifier decided for a full window
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Argmax of the scores, `None` for an empty or all-NaN score vector
    pub class_index: Option<usize>,

    /// Whether `class_index` named a row of the label table
    pub known: bool,

    pub latency: Duration,
}

/// Result of feeding one frame to the controller
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// The frame after width normalization, for the caller to annotate
    pub frame: DynamicImage,

    /// Current label; unchanged from the previous call unless `prediction` is set
    pub label: String,

    /// Set when this frame completed a window and inference ran
    pub prediction: Option<Prediction>,

    /// Frames buffered after this call
    pub window_len: usize,
}

impl FrameOutcome {
    pub fn inferred(&self) -> bool {
        self.prediction.is_some()
    }

    pub fn overlay(&self) -> Option<LabelOverlay> {
        LabelOverlay::for_label(&self.label)
    }
}

/// Rolling temporal-window inference for a single video stream.
///
/// Not safe for concurrent use; callers serialize frames per stream.
pub struct InferenceController {
    window: TemporalWindow,
    last_label: String,
    labels: LabelTable,
    classifier: Arc<dyn Classifier>,
    blob_spec: BlobSpec,
    inferences: u64,
}

impl InferenceController {
    pub fn new(
        capacity: NonZeroUsize,
        mode: WindowMode,
        labels: LabelTable,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            window: TemporalWindow::new(capacity, mode),
            last_label: String::new(),
            labels,
            classifier,
            blob_spec: BlobSpec::default(),
            inferences: 0,
        }
    }

    pub fn with_blob_spec(mut self, blob_spec: BlobSpec) -> Self {
        self.blob_spec = blob_spec;
        self
    }

    /// Forget buffered frames and the last label; a new video has started
    pub fn on_new_sequence(&mut self) {
        self.window.clear();
        self.last_label.clear();
    }

    /// Buffer a frame and classify the window once it is full.
    ///
    /// On classifier failure the window and label are left exactly as they
    /// were before the call.
    pub fn process_frame(&mut self, frame: &DynamicImage) -> Result<FrameOutcome, ControllerError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(ControllerError::EmptyFrame { width, height });
        }

        let normalized = normalize_frame(frame);
        let receipt = self.window.push(normalized.clone());

        let prediction = if self.window.is_full() {
            match self.classify_window() {
                Ok(prediction) => {
                    self.window.complete_inference();
                    Some(prediction)
                }
                Err(e) => {
                    self.window.rollback(receipt);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        Ok(FrameOutcome {
            frame: normalized,
            label: self.last_label.clone(),
            prediction,
            window_len: self.window.len(),
        })
    }

    fn classify_window(&mut self) -> Result<Prediction, ClassifierError> {
        let start = Instant::now();
        let blob = build_blob(self.window.frames(), &self.blob_spec);
        let scores = self.classifier.classify(blob)?;
        let latency = start.elapsed();

        let class_index = argmax(&scores);
        let label = class_index.and_then(|index| self.labels.get(index));
        let known = label.is_some();

        match label {
            Some(label) => {
                tracing::debug!(class_index, label, ?latency, "window classified");
                self.last_label = label.to_string();
            }
            None => {
                tracing::warn!(
                    class_index,
                    scores = scores.len(),
                    classes = self.labels.len(),
                    "classifier output does not match the label table"
                );
                self.last_label.clear();
            }
        }
        self.inferences += 1;

        Ok(Prediction {
            class_index,
            known,
            latency,
        })
    }

    /// Swap the classifier; buffered frames and label are kept
    pub fn replace_classifier(&mut self, classifier: Arc<dyn Classifier>) {
        self.classifier = classifier;
    }

    /// Change window capacity or mode. Starts a new sequence.
    pub fn reshape(&mut self, capacity: NonZeroUsize, mode: WindowMode) {
        self.window = TemporalWindow::new(capacity, mode);
        self.last_label.clear();
    }

    pub fn last_label(&self) -> &str {
        &self.last_label
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.window.capacity()
    }

    pub fn mode(&self) -> WindowMode {
        self.window.mode()
    }

    /// Successful inferences since creation
    pub fn inferences(&self) -> u64 {
        self.inferences
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::blob::KINETICS_MEAN;
    use image::{Rgb, RgbImage};
    use ndarray::Array5;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and records which frames each window held
    #[derive(Default)]
    struct ScriptedClassifier {
        responses: Mutex<VecDeque<Result<Vec<f32>, ClassifierError>>>,
        windows: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedClassifier {
        fn respond(&self, response: Result<Vec<f32>, ClassifierError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn windows(&self) -> Vec<Vec<u8>> {
            self.windows.lock().unwrap().clone()
        }
    }

    impl Classifier for ScriptedClassifier {
        fn classify(&self, blob: Array5<f32>) -> Result<Vec<f32>, ClassifierError> {
            let ids = (0..blob.shape()[2])
                .map(|t| (blob[[0, 0, t, 56, 56]] + KINETICS_MEAN[0]).round() as u8)
                .collect();
            self.windows.lock().unwrap().push(ids);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![0.9, 0.1, 0.0]))
        }
    }

    fn frame(id: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([id, id, id])))
    }

    fn labels() -> LabelTable {
        LabelTable::parse("abseiling\narchery\nbowling").unwrap()
    }

    fn controller(
        capacity: usize,
        mode: WindowMode,
    ) -> (InferenceController, Arc<ScriptedClassifier>) {
        let classifier = Arc::new(ScriptedClassifier::default());
        let controller = InferenceController::new(
            NonZeroUsize::new(capacity).unwrap(),
            mode,
            labels(),
            classifier.clone(),
        );
        (controller, classifier)
    }

    #[test]
    fn test_frames_are_normalized_to_width_400() {
        let (mut controller, _) = controller(4, WindowMode::Rolling);
        let outcome = controller.process_frame(&frame(1)).unwrap();
        assert_eq!(outcome.frame.dimensions(), (400, 300));
        assert!(!outcome.inferred());
        assert_eq!(outcome.label, "");
        assert!(outcome.overlay().is_none());
    }

    #[test]
    fn test_label_persists_between_inferences() {
        let (mut controller, classifier) = controller(2, WindowMode::Batch);
        classifier.respond(Ok(vec![0.0, 0.2, 0.8]));

        controller.process_frame(&frame(1)).unwrap();
        let outcome = controller.process_frame(&frame(2)).unwrap();
        assert_eq!(outcome.label, "bowling");
        assert_eq!(outcome.prediction.as_ref().unwrap().class_index, Some(2));

        // Next frame refills the batch window but keeps annotating
        let outcome = controller.process_frame(&frame(3)).unwrap();
        assert!(!outcome.inferred());
        assert_eq!(outcome.label, "bowling");
        assert_eq!(outcome.overlay().unwrap().text, "bowling");
    }

    #[test]
    fn test_out_of_range_index_clears_label() {
        let (mut controller, classifier) = controller(1, WindowMode::Rolling);
        classifier.respond(Ok(vec![0.1, 0.9, 0.0]));
        // One score more than there are labels, the extra class wins
        classifier.respond(Ok(vec![0.1, 0.0, 0.0, 0.9]));

        assert_eq!(controller.process_frame(&frame(1)).unwrap().label, "archery");

        let outcome = controller.process_frame(&frame(2)).unwrap();
        assert_eq!(outcome.label, "");
        let prediction = outcome.prediction.unwrap();
        assert_eq!(prediction.class_index, Some(3));
        assert!(!prediction.known);
    }

    #[test]
    fn test_empty_scores_clear_label() {
        let (mut controller, classifier) = controller(1, WindowMode::Rolling);
        classifier.respond(Ok(vec![0.1, 0.9]));
        classifier.respond(Ok(Vec::new()));

        controller.process_frame(&frame(1)).unwrap();
        let outcome = controller.process_frame(&frame(2)).unwrap();
        assert_eq!(outcome.label, "");
        assert_eq!(outcome.prediction.unwrap().class_index, None);
    }

    #[test]
    fn test_classifier_failure_leaves_rolling_window_untouched() {
        let (mut controller, classifier) = controller(2, WindowMode::Rolling);
        classifier.respond(Ok(vec![0.0, 1.0]));
        classifier.respond(Err(ClassifierError::Inference("backend crashed".into())));

        controller.process_frame(&frame(1)).unwrap();
        controller.process_frame(&frame(2)).unwrap();
        assert_eq!(controller.last_label(), "archery");

        let err = controller.process_frame(&frame(3)).unwrap_err();
        assert!(matches!(err, ControllerError::Inference(_)));
        assert_eq!(controller.window_len(), 2);
        assert_eq!(controller.last_label(), "archery");
        assert_eq!(controller.inferences(), 1);

        // The stream continues from the pre-failure window [1, 2]
        controller.process_frame(&frame(4)).unwrap();
        assert_eq!(classifier.windows(), vec![vec![1, 2], vec![2, 3], vec![2, 4]]);
    }

    #[test]
    fn test_classifier_failure_does_not_drain_batch_window() {
        let (mut controller, classifier) = controller(2, WindowMode::Batch);
        classifier.respond(Err(ClassifierError::Inference("timeout".into())));

        controller.process_frame(&frame(1)).unwrap();
        assert!(controller.process_frame(&frame(2)).is_err());
        assert_eq!(controller.window_len(), 1);

        let outcome = controller.process_frame(&frame(3)).unwrap();
        assert!(outcome.inferred());
        assert_eq!(outcome.window_len, 0);
        assert_eq!(classifier.windows(), vec![vec![1, 2], vec![1, 3]]);
    }

    #[test]
    fn test_empty_frame_rejected_without_state_change() {
        let (mut controller, _) = controller(2, WindowMode::Rolling);
        controller.process_frame(&frame(1)).unwrap();

        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            controller.process_frame(&empty),
            Err(ControllerError::EmptyFrame { .. })
        ));
        assert_eq!(controller.window_len(), 1);
    }

    #[test]
    fn test_new_sequence_resets_window_and_label() {
        let (mut controller, _) = controller(2, WindowMode::Rolling);
        controller.process_frame(&frame(1)).unwrap();
        controller.process_frame(&frame(2)).unwrap();
        assert_eq!(controller.last_label(), "abseiling");

        controller.on_new_sequence();
        assert_eq!(controller.window_len(), 0);
        assert_eq!(controller.last_label(), "");

        controller.on_new_sequence();
        assert_eq!(controller.window_len(), 0);
        assert_eq!(controller.last_label(), "");

        let outcome = controller.process_frame(&frame(3)).unwrap();
        assert_eq!(outcome.window_len, 1);
        assert_eq!(outcome.label, "");
    }

    #[test]
    fn test_reshape_and_replace_classifier() {
        let (mut controller, first) = controller(2, WindowMode::Rolling);
        controller.process_frame(&frame(1)).unwrap();
        controller.process_frame(&frame(2)).unwrap();

        let second = Arc::new(ScriptedClassifier::default());
        second.respond(Ok(vec![0.0, 0.0, 1.0]));
        controller.replace_classifier(second.clone());
        // Swapping the model keeps the buffered frames
        let outcome = controller.process_frame(&frame(3)).unwrap();
        assert_eq!(outcome.label, "bowling");
        assert_eq!(first.windows().len(), 1);
        assert_eq!(second.windows(), vec![vec![2, 3]]);

        controller.reshape(NonZeroUsize::new(3).unwrap(), WindowMode::Batch);
        assert_eq!(controller.window_len(), 0);
        assert_eq!(controller.last_label(), "");
        assert_eq!(controller.capacity().get(), 3);
        assert_eq!(controller.mode(), WindowMode::Batch);
    }
}
