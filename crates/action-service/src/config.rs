use crate::recognition::params::{
    ActionRecognitionParams, KEY_BACKEND, KEY_MODEL_NAME, KEY_ROLLING, KEY_SAMPLE_DURATION,
    KEY_TARGET,
};
use anyhow::{Context, Result};
use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Environment variables that override the default session parameters
const PARAM_VARS: [(&str, &str); 5] = [
    ("MODEL_NAME", KEY_MODEL_NAME),
    ("ROLLING", KEY_ROLLING),
    ("SAMPLE_DURATION", KEY_SAMPLE_DURATION),
    ("BACKEND", KEY_BACKEND),
    ("TARGET", KEY_TARGET),
];

#[derive(Debug, Clone)]
pub struct ActionServiceConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this service instance
    pub node_id: String,

    /// Directory holding `<model_name>.onnx` files
    pub models_dir: PathBuf,

    /// Label table, one class name per line
    pub class_names_path: PathBuf,

    /// Model hub used to download missing models (optional)
    pub model_hub_url: Option<Url>,

    /// Parameters for sessions created without explicit configuration
    pub default_params: ActionRecognitionParams,
}

impl ActionServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("ACTION_SERVICE_ADDR").unwrap_or_else(|| "0.0.0.0:8090".to_string());

        let models_dir = PathBuf::from(lookup("MODELS_DIR").unwrap_or_else(|| "models".to_string()));

        let class_names_path = lookup("CLASS_NAMES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| models_dir.join("class_names"));

        let model_hub_url = lookup("MODEL_HUB_URL")
            .map(|s| Url::parse(&s).context("Invalid MODEL_HUB_URL"))
            .transpose()?;

        let node_id = lookup("NODE_ID").unwrap_or_else(|| {
            format!(
                "action-service-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let overrides: HashMap<String, String> = PARAM_VARS
            .iter()
            .filter_map(|(var, key)| lookup(*var).map(|value| (key.to_string(), value)))
            .collect();
        let default_params = ActionRecognitionParams::default()
            .merge_map(&overrides)
            .context("Invalid default action recognition parameters")?;

        Ok(Self {
            bind_addr,
            node_id,
            models_dir,
            class_names_path,
            model_hub_url,
            default_params,
        })
    }
}
