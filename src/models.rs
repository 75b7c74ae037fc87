//! Request and response bodies for the studio HTTP API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// === Shared Types ===

/// Server-confirmed identity of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedRef {
    pub url: String,
    pub filename: String,
}

/// The two frame shapes the server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Portrait => "9:16",
            Self::Landscape => "16:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "9:16" | "portrait" => Ok(Self::Portrait),
            "16:9" | "landscape" => Ok(Self::Landscape),
            other => Err(format!(
                "Invalid aspect ratio '{other}': expected 9:16 or 16:9."
            )),
        }
    }
}

// === Requests ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub negative_prompt: String,
    pub guidance_scale: f64,
    pub num_inference_steps: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
}

// === Responses ===

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssistResponse {
    pub expanded: String,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub seed: Option<serde_json::Value>,
}

impl GeneratedImage {
    #[must_use]
    pub fn size_label(&self) -> String {
        match (self.width, self.height) {
            (Some(width), Some(height)) => format!("{width} x {height}"),
            _ => "-".to_string(),
        }
    }

    #[must_use]
    pub fn seed_label(&self) -> String {
        match &self.seed {
            None | Some(serde_json::Value::Null) => "N/A".to_string(),
            Some(serde_json::Value::String(seed)) if seed.is_empty() => "N/A".to_string(),
            Some(serde_json::Value::String(seed)) => seed.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Error body shared by every endpoint. 429 responses add `retry_after`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_after: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn assist_request_omits_empty_references() {
        let request = AssistRequest {
            prompt: "a cat".into(),
            aspect_ratio: AspectRatio::Landscape,
            reference_images: Vec::new(),
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value, json!({"prompt": "a cat", "aspect_ratio": "16:9"}));
    }

    #[test]
    fn generate_request_always_carries_numeric_fields() {
        let request = GenerateRequest {
            prompt: "a cat".into(),
            aspect_ratio: AspectRatio::Portrait,
            negative_prompt: String::new(),
            guidance_scale: 7.5,
            num_inference_steps: 20,
            reference_images: vec!["a.png".into()],
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value.get("guidance_scale").and_then(Value::as_f64), Some(7.5));
        assert_eq!(
            value.get("num_inference_steps").and_then(Value::as_u64),
            Some(20)
        );
        assert_eq!(value.get("negative_prompt"), Some(&json!("")));
        assert_eq!(value.get("reference_images"), Some(&json!(["a.png"])));
    }

    #[test]
    fn generated_image_labels() {
        let image: GeneratedImage = serde_json::from_value(json!({
            "url": "/output/x.png",
            "filename": "x.png",
            "width": 1024,
            "height": 1820,
            "seed": null
        }))
        .expect("parse");
        assert_eq!(image.size_label(), "1024 x 1820");
        assert_eq!(image.seed_label(), "N/A");

        let seeded: GeneratedImage =
            serde_json::from_value(json!({"url": "/o", "filename": "o", "seed": 42}))
                .expect("parse");
        assert_eq!(seeded.seed_label(), "42");
        assert_eq!(seeded.size_label(), "-");
    }

    #[test]
    fn aspect_ratio_parses_aliases() {
        assert_eq!("16:9".parse::<AspectRatio>(), Ok(AspectRatio::Landscape));
        assert_eq!(" Portrait ".parse::<AspectRatio>(), Ok(AspectRatio::Portrait));
        assert!("4:3".parse::<AspectRatio>().is_err());
    }
}
