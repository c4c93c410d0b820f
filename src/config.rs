use crate::reconcile::MergePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellarConfig {
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Base URL of the cellarium-server remote store. Absent means
    /// local-only mode.
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub merge_policy: MergePolicy,
    #[serde(default = "default_grace_ms")]
    pub suppression_grace_ms: u64,
    #[serde(default = "default_max_hold_ms")]
    pub suppression_max_hold_ms: u64,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub image_search: ImageSearchConfig,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("cellar.json")
}

fn default_grace_ms() -> u64 {
    1500
}

fn default_max_hold_ms() -> u64 {
    30_000
}

impl Default for CellarConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            server_url: None,
            merge_policy: MergePolicy::default(),
            suppression_grace_ms: default_grace_ms(),
            suppression_max_hold_ms: default_max_hold_ms(),
            recognizer: RecognizerConfig::default(),
            image_search: ImageSearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerKind {
    #[default]
    Stub,
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognizerConfig {
    #[serde(default)]
    pub kind: RecognizerKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSearchConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_attempt_timeout_ms() -> u64 {
    8_000
}

impl Default for ImageSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl CellarConfig {
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }
}
