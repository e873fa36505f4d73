/// Typed action recognition parameters and their string-map form
use super::window::WindowMode;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Component, Path};
use std::str::FromStr;
use thiserror::Error;

pub const KEY_MODEL_NAME: &str = "model_name";
pub const KEY_ROLLING: &str = "rolling";
pub const KEY_SAMPLE_DURATION: &str = "sample_duration";
pub const KEY_BACKEND: &str = "backend";
pub const KEY_TARGET: &str = "target";

const KEYS: [&str; 5] = [
    KEY_MODEL_NAME,
    KEY_ROLLING,
    KEY_SAMPLE_DURATION,
    KEY_BACKEND,
    KEY_TARGET,
];

pub const DEFAULT_MODEL_NAME: &str = "resnet-34-kinetics";
pub const DEFAULT_SAMPLE_DURATION: usize = 16;

/// Longest accepted window; published Kinetics models use 16 to 64 frames
pub const MAX_SAMPLE_DURATION: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("missing parameter '{0}'")]
    Missing(&'static str),

    #[error("unknown parameter '{0}'")]
    Unknown(String),

    #[error("invalid value '{value}' for parameter '{key}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Inference backend preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Backend {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "cuda")]
    Cuda,
    #[serde(rename = "tensorrt")]
    TensorRt,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::TensorRt => "tensorrt",
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "tensorrt" => Ok(Self::TensorRt),
            _ => Err("expected one of default, cpu, cuda, tensorrt".to_string()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute device preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    #[default]
    Cpu,
    Cuda,
    CudaFp16,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::CudaFp16 => "cuda_fp16",
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "cuda_fp16" => Ok(Self::CudaFp16),
            _ => Err("expected one of cpu, cuda, cuda_fp16".to_string()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one action recognition session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecognitionParams {
    /// Model file stem under the models directory
    #[serde(deserialize_with = "deserialize_model_name")]
    pub model_name: String,

    /// Sliding window when true, non-overlapping chunks when false
    pub rolling: bool,

    /// Frames per inference window, at most [`MAX_SAMPLE_DURATION`]
    #[serde(deserialize_with = "deserialize_sample_duration")]
    pub sample_duration: NonZeroUsize,

    pub backend: Backend,

    pub target: Target,
}

impl Default for ActionRecognitionParams {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            rolling: true,
            sample_duration: NonZeroUsize::new(DEFAULT_SAMPLE_DURATION)
                .unwrap_or(NonZeroUsize::MIN),
            backend: Backend::default(),
            target: Target::default(),
        }
    }
}

impl ActionRecognitionParams {
    /// Parse a complete parameter map; every key must be present
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ParamError> {
        if let Some(missing) = KEYS.iter().find(|key| !map.contains_key(**key)) {
            return Err(ParamError::Missing(*missing));
        }
        Self::default().merge_map(map)
    }

    /// Apply a partial parameter map on top of `self`; absent keys keep their value
    pub fn merge_map(&self, map: &HashMap<String, String>) -> Result<Self, ParamError> {
        if let Some(unknown) = map.keys().find(|key| !KEYS.iter().any(|known| known == key)) {
            return Err(ParamError::Unknown(unknown.clone()));
        }

        let mut params = self.clone();
        if let Some(value) = map.get(KEY_MODEL_NAME) {
            params.model_name = parse_model_name(value)?;
        }
        if let Some(value) = map.get(KEY_ROLLING) {
            params.rolling = parse_bool(KEY_ROLLING, value)?;
        }
        if let Some(value) = map.get(KEY_SAMPLE_DURATION) {
            params.sample_duration = parse_sample_duration(value)?;
        }
        if let Some(value) = map.get(KEY_BACKEND) {
            params.backend = value.parse().map_err(|reason| invalid(KEY_BACKEND, value, reason))?;
        }
        if let Some(value) = map.get(KEY_TARGET) {
            params.target = value.parse().map_err(|reason| invalid(KEY_TARGET, value, reason))?;
        }
        Ok(params)
    }

    /// String-map form, the inverse of [`Self::from_map`]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (KEY_MODEL_NAME.to_string(), self.model_name.clone()),
            (KEY_ROLLING.to_string(), self.rolling.to_string()),
            (
                KEY_SAMPLE_DURATION.to_string(),
                self.sample_duration.to_string(),
            ),
            (KEY_BACKEND.to_string(), self.backend.to_string()),
            (KEY_TARGET.to_string(), self.target.to_string()),
        ])
    }

    pub fn mode(&self) -> WindowMode {
        WindowMode::from_rolling(self.rolling)
    }

    /// Whether switching to `other` requires loading a different classifier
    pub fn needs_model_reload(&self, other: &Self) -> bool {
        self.model_name != other.model_name
            || self.backend != other.backend
            || self.target != other.target
    }

    /// Whether switching to `other` changes the window capacity or mode
    pub fn changes_window(&self, other: &Self) -> bool {
        self.sample_duration != other.sample_duration || self.rolling != other.rolling
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ParamError {
    ParamError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Whether `name` is a single file stem that cannot escape the models directory
pub fn is_plain_model_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', ':']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn parse_model_name(value: &str) -> Result<String, ParamError> {
    let name = value.trim();
    if name.is_empty() {
        return Err(invalid(KEY_MODEL_NAME, value, "must not be empty"));
    }
    if !is_plain_model_name(name) {
        return Err(invalid(
            KEY_MODEL_NAME,
            value,
            "must be a file stem without path separators or '..'",
        ));
    }
    Ok(name.to_string())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ParamError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(key, value, "expected true/false or 1/0")),
    }
}

fn parse_sample_duration(value: &str) -> Result<NonZeroUsize, ParamError> {
    let n: usize = value
        .trim()
        .parse()
        .map_err(|_| invalid(KEY_SAMPLE_DURATION, value, "expected a positive integer"))?;
    check_sample_duration(n).map_err(|reason| invalid(KEY_SAMPLE_DURATION, value, reason))
}

fn check_sample_duration(n: usize) -> Result<NonZeroUsize, String> {
    if n > MAX_SAMPLE_DURATION {
        return Err(format!("must be at most {MAX_SAMPLE_DURATION}"));
    }
    NonZeroUsize::new(n).ok_or_else(|| "must be at least 1".to_string())
}

fn deserialize_sample_duration<'de, D>(deserializer: D) -> Result<NonZeroUsize, D::Error>
where
    D: Deserializer<'de>,
{
    let n = usize::deserialize(deserializer)?;
    check_sample_duration(n).map_err(serde::de::Error::custom)
}

fn deserialize_model_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    parse_model_name(&name).map_err(serde::de::Error::custom)
}
