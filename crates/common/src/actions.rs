//! Action recognition contracts shared by the service and its clients.
//!
//! This module defines the frame submission format, per-frame results,
//! the label overlay handed to rendering layers, and session/plugin metadata.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the label is drawn on an annotated frame
pub const OVERLAY_ORIGIN: (u32, u32) = (10, 10);

fn default_format() -> String {
    "jpeg".to_string()
}

/// Video frame submitted for action recognition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    /// Frame timestamp (Unix timestamp in milliseconds)
    #[serde(default)]
    pub timestamp: u64,

    /// Frame sequence number
    #[serde(default)]
    pub sequence: u64,

    /// Image format (e.g., "jpeg", "png")
    #[serde(default = "default_format")]
    pub format: String,

    /// Encoded image bytes (base64 encoded for JSON transport)
    pub data: String,

    /// Set on the first frame of a new video; clears the session window first
    #[serde(default)]
    pub new_sequence: bool,
}

impl VideoFrame {
    /// Wrap already-encoded image bytes (JPEG, PNG, ...) for transport
    pub fn from_encoded(bytes: &[u8], format: impl Into<String>) -> Self {
        Self {
            timestamp: 0,
            sequence: 0,
            format: format.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            new_sequence: false,
        }
    }

    pub fn with_sequence(mut self, sequence: u64, timestamp: u64) -> Self {
        self.sequence = sequence;
        self.timestamp = timestamp;
        self
    }

    pub fn starting_sequence(mut self) -> Self {
        self.new_sequence = true;
        self
    }

    /// Decode the base64 payload back into encoded image bytes
    pub fn decode_data(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

/// Text overlay for a caller-owned rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelOverlay {
    pub text: String,
    pub x: u32,
    pub y: u32,
}

impl LabelOverlay {
    /// Overlay for `label`, or `None` when there is nothing to annotate
    pub fn for_label(label: &str) -> Option<Self> {
        if label.is_empty() {
            return None;
        }
        Some(Self {
            text: label.to_string(),
            x: OVERLAY_ORIGIN.0,
            y: OVERLAY_ORIGIN.1,
        })
    }
}

/// Result of feeding one frame to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Session (video stream) that produced this result
    pub session_id: String,

    /// Timestamp of the submitted frame
    pub timestamp: u64,

    /// Sequence number of the submitted frame
    pub sequence: u64,

    /// Most recent action label, empty until the first full window
    pub label: String,

    /// Whether this frame completed a window and triggered inference
    pub inferred: bool,

    /// Class index picked by the last inference of this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_index: Option<usize>,

    /// Frames buffered after this call
    pub window_len: usize,

    /// Window capacity (sample duration)
    pub capacity: usize,

    /// Overlay to render, absent when the label is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<LabelOverlay>,

    /// Processing latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

/// Snapshot of a stream session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,

    /// Parameters in their string-map form
    pub params: BTreeMap<String, String>,

    pub window_len: usize,

    pub last_label: String,

    /// Total frames processed since the session was created
    pub frames_processed: u64,

    /// Total inferences run since the session was created
    pub inferences: u64,
}

/// List of active sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

/// Model and plugin metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub authors: String,
    pub article: String,
    pub journal: String,
    pub year: u16,
    pub license: String,
    pub repository: String,
    pub documentation_link: String,
    pub keywords: Vec<String>,

    /// Number of classes in the loaded label table
    pub class_count: usize,
}
