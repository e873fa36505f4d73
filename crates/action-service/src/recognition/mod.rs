//! Human action recognition over a temporal window of video frames.
//!
//! Frames are normalized and buffered in a [`window::TemporalWindow`]; once
//! the window is full it is packed into a 5-D blob and handed to a
//! [`classifier::Classifier`], and the winning class is looked up in the
//! [`labels::LabelTable`]. [`controller::InferenceController`] ties these
//! together for one video stream.

pub mod blob;
pub mod classifier;
pub mod controller;
pub mod labels;
pub mod model_store;
pub mod params;
pub mod window;

use common::actions::PluginInfo;

pub const PLUGIN_ID: &str = "infer_resnet_action_recognition";

/// Metadata describing the pretrained Kinetics 3D-CNN
pub fn plugin_info(class_count: usize) -> PluginInfo {
    PluginInfo {
        id: PLUGIN_ID.to_string(),
        name: "ResNet Action Recognition".to_string(),
        description: "Human action recognition with spatio-temporal 3D CNNs.".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        authors: "Kensho Hara, Hirokatsu Kataoka, Yutaka Satoh".to_string(),
        article: "Can Spatiotemporal 3D CNNs Retrace the History of 2D CNNs and ImageNet?"
            .to_string(),
        journal: "CVPR".to_string(),
        year: 2018,
        license: "MIT License".to_string(),
        repository: "https://github.com/kenshohara/3D-ResNets-PyTorch".to_string(),
        documentation_link: "https://www.pyimagesearch.com/2019/11/25/human-activity-recognition-with-opencv-and-deep-learning/".to_string(),
        keywords: ["3D", "CNN", "detection", "activity", "classification", "kinetics"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        class_count,
    }
}
