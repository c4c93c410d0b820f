//! Label recognition collaborator. The real service is a vision model
//! behind HTTP; a stub provider satisfies the same trait so the add-bottle
//! flow is never blocked on recognition.

use crate::config::{RecognizerConfig, RecognizerKind};
use crate::model::{clamp_scale, BottleDraft, WineType};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Structured payload extracted from a label photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedLabel {
    pub name: String,
    #[serde(default)]
    pub producer: String,
    #[serde(rename = "type", default)]
    pub wine_type: Option<WineType>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub grape: String,
    #[serde(default = "mid_scale")]
    pub boldness: u8,
    #[serde(default = "mid_scale")]
    pub tannins: u8,
    #[serde(default = "mid_scale")]
    pub acidity: u8,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub description: String,
}

fn mid_scale() -> u8 {
    3
}

impl RecognizedLabel {
    /// Turn the recognition result into a draft ready for the manager,
    /// carrying the photographed label as the record image.
    pub fn into_draft(self, image: Option<String>) -> BottleDraft {
        BottleDraft {
            name: self.name,
            producer: self.producer,
            wine_type: self.wine_type,
            year: self.year,
            region: self.region,
            grape: self.grape,
            boldness: clamp_scale(self.boldness),
            tannins: clamp_scale(self.tannins),
            acidity: clamp_scale(self.acidity),
            price: self.price,
            quantity: 1,
            store: String::new(),
            notes: self.description,
            image,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("recognition service rejected credentials")]
    Unauthorized,
    #[error("recognition service rate limit hit")]
    RateLimited,
    #[error("could not parse recognition reply: {0}")]
    Malformed(String),
    #[error("recognition request failed: {0}")]
    Transport(String),
    #[error("recognizer endpoint not configured")]
    NotConfigured,
}

#[async_trait]
pub trait LabelRecognizer: Send + Sync {
    async fn recognize(&self, image_b64: &str) -> Result<RecognizedLabel, VisionError>;
}

/// Extract the structured payload from a possibly wrapped reply. Vision
/// models like to surround the JSON with prose or markdown fences; take the
/// outermost `{...}` slice before giving up.
pub fn extract_label_payload(raw: &str) -> Result<RecognizedLabel, VisionError> {
    if let Ok(label) = serde_json::from_str::<RecognizedLabel>(raw) {
        return Ok(label);
    }

    let start = raw
        .find('{')
        .ok_or_else(|| VisionError::Malformed("no JSON object in reply".to_string()))?;
    let end = raw
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| VisionError::Malformed("unterminated JSON object in reply".to_string()))?;

    serde_json::from_str::<RecognizedLabel>(&raw[start..=end])
        .map_err(|e| VisionError::Malformed(e.to_string()))
}

/// HTTP recognizer posting the label image to a configured endpoint.
pub struct HttpRecognizer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    image: &'a str,
}

impl HttpRecognizer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LabelRecognizer for HttpRecognizer {
    async fn recognize(&self, image_b64: &str) -> Result<RecognizedLabel, VisionError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&RecognizeRequest { image: image_b64 });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| VisionError::Transport(e.to_string()))?;

        match resp.status() {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(VisionError::Unauthorized)
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => return Err(VisionError::RateLimited),
            status if !status.is_success() => {
                return Err(VisionError::Transport(format!("HTTP {}", status)))
            }
            _ => {}
        }

        let body = resp
            .text()
            .await
            .map_err(|e| VisionError::Transport(e.to_string()))?;
        extract_label_payload(&body)
    }
}

/// Canned demo labels, rotated deterministically. Selected by configuration
/// and also used as the never-block fallback when the real service fails.
pub struct StubRecognizer {
    cursor: AtomicUsize,
}

impl StubRecognizer {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for StubRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn demo_label(seed: usize) -> RecognizedLabel {
    let labels = [
        RecognizedLabel {
            name: "Reserva Especial".to_string(),
            producer: "Bodega Demo".to_string(),
            wine_type: Some(WineType::Red),
            year: Some(2019),
            region: "Rioja".to_string(),
            grape: "Tempranillo".to_string(),
            boldness: 4,
            tannins: 4,
            acidity: 3,
            price: Some(18.5),
            description: "Demo entry: ripe cherry, vanilla, firm finish.".to_string(),
        },
        RecognizedLabel {
            name: "Cuvée Blanche".to_string(),
            producer: "Maison Exemple".to_string(),
            wine_type: Some(WineType::White),
            year: Some(2022),
            region: "Loire".to_string(),
            grape: "Chenin Blanc".to_string(),
            boldness: 2,
            tannins: 1,
            acidity: 4,
            price: Some(14.0),
            description: "Demo entry: green apple, wet stone.".to_string(),
        },
        RecognizedLabel {
            name: "Rosato di Prova".to_string(),
            producer: "Cantina Campione".to_string(),
            wine_type: Some(WineType::Rose),
            year: Some(2023),
            region: "Puglia".to_string(),
            grape: "Negroamaro".to_string(),
            boldness: 2,
            tannins: 2,
            acidity: 3,
            price: Some(11.0),
            description: "Demo entry: strawberry, light herbs.".to_string(),
        },
    ];
    labels[seed % labels.len()].clone()
}

#[async_trait]
impl LabelRecognizer for StubRecognizer {
    async fn recognize(&self, _image_b64: &str) -> Result<RecognizedLabel, VisionError> {
        let seed = self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(demo_label(seed))
    }
}

/// Build the configured recognizer. An HTTP recognizer without an endpoint
/// falls back to the stub with a warning rather than failing startup.
pub fn recognizer_from_config(config: &RecognizerConfig) -> Arc<dyn LabelRecognizer> {
    match config.kind {
        RecognizerKind::Stub => Arc::new(StubRecognizer::new()),
        RecognizerKind::Http => match &config.endpoint {
            Some(endpoint) => Arc::new(HttpRecognizer::new(endpoint, config.api_key.clone())),
            None => {
                warn!("HTTP recognizer selected but no endpoint configured, using stub");
                Arc::new(StubRecognizer::new())
            }
        },
    }
}

/// Recognize with the configured provider, falling back to a demo label on
/// any failure so the user flow is never blocked.
pub async fn recognize_or_demo(
    recognizer: &dyn LabelRecognizer,
    image_b64: &str,
) -> RecognizedLabel {
    match recognizer.recognize(image_b64).await {
        Ok(label) => label,
        Err(e) => {
            warn!("Label recognition failed ({}), using demo entry", e);
            demo_label(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let label = extract_label_payload(r#"{"name": "Reserva", "type": "red"}"#).unwrap();
        assert_eq!(label.name, "Reserva");
        assert_eq!(label.wine_type, Some(WineType::Red));
        assert_eq!(label.boldness, 3);
    }

    #[test]
    fn test_extract_from_markdown_fence() {
        let raw = "Here is the wine I found:\n```json\n{\"name\": \"Cuvée\", \"acidity\": 4}\n```\nHope that helps!";
        let label = extract_label_payload(raw).unwrap();
        assert_eq!(label.name, "Cuvée");
        assert_eq!(label.acidity, 4);
    }

    #[test]
    fn test_extract_rejects_unstructured_reply() {
        assert!(matches!(
            extract_label_payload("no structure here"),
            Err(VisionError::Malformed(_))
        ));
        assert!(matches!(
            extract_label_payload("{ broken"),
            Err(VisionError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_stub_rotates_demo_labels() {
        let stub = StubRecognizer::new();
        let first = stub.recognize("x").await.unwrap();
        let second = stub.recognize("x").await.unwrap();
        assert_ne!(first.name, second.name);
    }

    #[test]
    fn test_into_draft_clamps_scales() {
        let mut label = demo_label(0);
        label.boldness = 9;
        let draft = label.into_draft(None);
        assert_eq!(draft.boldness, 5);
        assert_eq!(draft.quantity, 1);
    }
}
