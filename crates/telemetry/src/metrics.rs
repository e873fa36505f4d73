#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref ACTION_ACTIVE_SESSIONS: IntGauge = {
        let metric = IntGauge::new(
            "action_service_active_sessions",
            "Number of active stream sessions",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ACTION_FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "action_service_frames_processed_total",
                "Total number of frames processed",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ACTION_INFERENCES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "action_service_inferences_total",
                "Total number of window inferences",
            ),
            &["mode"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ACTION_INFERENCE_LATENCY: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "action_service_inference_latency_seconds",
                "Latency of blob construction plus classifier forward pass",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ACTION_UNKNOWN_CLASS: IntCounter = {
        let metric = IntCounter::new(
            "action_service_unknown_class_total",
            "Predictions whose class index fell outside the label table",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ACTION_MODEL_LOADS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "action_service_model_loads_total",
                "Total number of classifier model loads",
            ),
            &["source", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Render every registered metric in the Prometheus text exposition format
pub fn encode_text() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
