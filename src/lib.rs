//! Temporal action recognition: a rolling-window 3D-CNN classifier served per video stream.
pub use action_service;
pub use common;
