use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// How the window behaves once it has been classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Sliding window: keep the newest `capacity` frames, classify on every frame once full
    Rolling,
    /// Non-overlapping chunks: classify once per `capacity` frames, then start over
    Batch,
}

impl WindowMode {
    pub fn from_rolling(rolling: bool) -> Self {
        if rolling {
            Self::Rolling
        } else {
            Self::Batch
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rolling => "rolling",
            Self::Batch => "batch",
        }
    }
}

/// Receipt for a push, needed to roll the window back when inference fails
#[derive(Debug)]
#[must_use]
pub struct PushReceipt {
    evicted: Option<DynamicImage>,
}

/// Bounded buffer of the most recent frames of one stream
#[derive(Debug)]
pub struct TemporalWindow {
    frames: VecDeque<DynamicImage>,
    capacity: NonZeroUsize,
    mode: WindowMode,
}

impl TemporalWindow {
    pub fn new(capacity: NonZeroUsize, mode: WindowMode) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity,
            mode,
        }
    }

    /// Append a frame, evicting the oldest one if the window is already full.
    ///
    /// Batch windows are drained after every inference so they never evict here.
    pub fn push(&mut self, frame: DynamicImage) -> PushReceipt {
        let evicted = if self.frames.len() >= self.capacity.get() {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        PushReceipt { evicted }
    }

    /// Undo the most recent push, restoring any frame it evicted
    pub fn rollback(&mut self, receipt: PushReceipt) {
        self.frames.pop_back();
        if let Some(frame) = receipt.evicted {
            self.frames.push_front(frame);
        }
    }

    /// Called after a successful inference over the full window
    pub fn complete_inference(&mut self) {
        if self.mode == WindowMode::Batch {
            self.frames.clear();
        }
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity.get()
    }

    /// Frames in arrival order, oldest first
    pub fn frames(&self) -> impl ExactSizeIterator<Item = &DynamicImage> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn mode(&self) -> WindowMode {
        self.mode
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
