//! Yandex Vision OCR client. One `batchAnalyze` call per image, text
//! flattened from the page/block/line/word tree the API returns.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

const BATCH_ANALYZE_URL: &str = "https://vision.api.cloud.yandex.net/vision/v1/batchAnalyze";

pub struct VisionClient {
    http: reqwest::Client,
    api_key: String,
    folder_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecognizedText {
    pub text: String,
    /// Mean word confidence over the whole document, when reported.
    pub confidence: Option<f64>,
}

#[derive(Serialize)]
struct AnalyzeRequest {
    #[serde(rename = "folderId", skip_serializing_if = "Option::is_none")]
    folder_id: Option<String>,
    analyze_specs: Vec<AnalyzeSpec>,
}

#[derive(Serialize)]
struct AnalyzeSpec {
    content: String,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    feature_type: String,
    text_detection_config: TextDetectionConfig,
}

#[derive(Serialize)]
struct TextDetectionConfig {
    language_codes: Vec<String>,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    results: Vec<SpecResult>,
}

#[derive(Deserialize)]
struct SpecResult {
    results: Vec<FeatureResult>,
}

#[derive(Deserialize)]
struct FeatureResult {
    #[serde(rename = "textDetection")]
    text_detection: Option<TextDetection>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct TextDetection {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(default)]
    lines: Vec<Line>,
}

#[derive(Deserialize)]
struct Line {
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Deserialize)]
struct Word {
    text: String,
    confidence: Option<f64>,
}

impl VisionClient {
    pub fn new(http: reqwest::Client, api_key: &str, folder_id: Option<&str>) -> Self {
        VisionClient {
            http,
            api_key: api_key.to_string(),
            folder_id: folder_id.map(|s| s.to_string()),
        }
    }

    pub async fn recognize(&self, image: &[u8]) -> Result<RecognizedText> {
        let request = AnalyzeRequest {
            folder_id: self.folder_id.clone(),
            analyze_specs: vec![AnalyzeSpec {
                content: BASE64.encode(image),
                features: vec![Feature {
                    feature_type: "TEXT_DETECTION".to_string(),
                    text_detection_config: TextDetectionConfig {
                        language_codes: vec!["ru".to_string(), "en".to_string()],
                    },
                }],
            }],
        };

        let response = self
            .http
            .post(BATCH_ANALYZE_URL)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Yandex Vision error {}: {}", status, body));
        }

        let body: AnalyzeResponse = response.json().await?;
        let recognized = flatten(&body)?;
        debug!(
            chars = recognized.text.len(),
            confidence = ?recognized.confidence,
            "распознан текст"
        );
        Ok(recognized)
    }
}

fn flatten(response: &AnalyzeResponse) -> Result<RecognizedText> {
    let feature = response
        .results
        .first()
        .and_then(|spec| spec.results.first())
        .ok_or_else(|| anyhow!("Yandex Vision: пустой ответ"))?;

    if let Some(error) = &feature.error {
        return Err(anyhow!("Yandex Vision: {}", error.message));
    }

    let detection = feature
        .text_detection
        .as_ref()
        .ok_or_else(|| anyhow!("Yandex Vision: текст не распознан"))?;

    let mut lines = Vec::new();
    let mut confidences = Vec::new();
    for page in &detection.pages {
        for block in &page.blocks {
            for line in &block.lines {
                let words: Vec<&str> = line.words.iter().map(|w| w.text.as_str()).collect();
                if !words.is_empty() {
                    lines.push(words.join(" "));
                }
                confidences.extend(line.words.iter().filter_map(|w| w.confidence));
            }
        }
    }

    let confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
    };

    Ok(RecognizedText {
        text: lines.join("\n"),
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_joins_words_and_lines() {
        let body: AnalyzeResponse = serde_json::from_value(serde_json::json!({
            "results": [{
                "results": [{
                    "textDetection": {
                        "pages": [{
                            "blocks": [{
                                "lines": [
                                    {"words": [
                                        {"text": "СЧЕТ", "confidence": 0.9},
                                        {"text": "№", "confidence": 0.8},
                                        {"text": "784", "confidence": 0.7}
                                    ]},
                                    {"words": [{"text": "Итого:", "confidence": 0.9}]}
                                ]
                            }]
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        let recognized = flatten(&body).unwrap();
        assert_eq!(recognized.text, "СЧЕТ № 784\nИтого:");
        let confidence = recognized.confidence.unwrap();
        assert!((confidence - 0.825).abs() < 1e-9);
    }

    #[test]
    fn flatten_surfaces_api_error() {
        let body: AnalyzeResponse = serde_json::from_value(serde_json::json!({
            "results": [{"results": [{"error": {"message": "quota exceeded"}}]}]
        }))
        .unwrap();
        let err = flatten(&body).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn flatten_rejects_empty_response() {
        let body: AnalyzeResponse = serde_json::from_value(serde_json::json!({"results": []})).unwrap();
        assert!(flatten(&body).is_err());
    }
}
