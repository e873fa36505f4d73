use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read label table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("label table is empty")]
    Empty,
}

/// Class index to action name, index-aligned with the classifier output
#[derive(Debug, Clone)]
pub struct LabelTable {
    labels: Arc<[String]>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Result<Self, LabelError> {
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        Ok(Self {
            labels: labels.into(),
        })
    }

    /// Parse one label per line. Blank lines are kept so indices stay aligned.
    pub fn parse(contents: &str) -> Result<Self, LabelError> {
        Self::new(contents.lines().map(str::to_string).collect())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&contents)?;
        tracing::info!(path = %path.display(), classes = table.len(), "Loaded label table");
        Ok(table)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
