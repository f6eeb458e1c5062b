//! Request and response bodies of the remote production API.

use serde::{Deserialize, Serialize};

/// Per-run processing parameters forwarded unchanged to job creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Integrated loudness target in LUFS/dB.
    #[serde(default = "default_loudness_target")]
    pub loudness_target: i32,
    #[serde(default)]
    pub noise_reduction: bool,
}

fn default_loudness_target() -> i32 {
    -18
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            loudness_target: default_loudness_target(),
            noise_reduction: false,
        }
    }
}

/// Body of the production creation call.
#[derive(Debug, Clone, Serialize)]
pub struct CreateProductionRequest {
    pub metadata: ProductionMetadata,
    pub algorithms: ProductionAlgorithms,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionMetadata {
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionAlgorithms {
    pub denoise: bool,
    pub loudnesstarget: i32,
}

impl CreateProductionRequest {
    pub fn new(options: &ProcessingOptions, label: &str) -> Self {
        Self {
            metadata: ProductionMetadata {
                title: label.to_string(),
            },
            algorithms: ProductionAlgorithms {
                denoise: options.noise_reduction,
                loudnesstarget: options.loudness_target,
            },
        }
    }
}

/// Envelope wrapping every API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub status_code: u16,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// The `data` object describing one production.
#[derive(Debug, Clone, Deserialize)]
pub struct Production {
    pub uuid: String,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub status_string: Option<String>,
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputFile {
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Status snapshot returned by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub status_code: i64,
    pub status_text: String,
    pub result_url: Option<String>,
}

impl From<Production> for RemoteStatus {
    fn from(production: Production) -> Self {
        Self {
            status_code: production.status.unwrap_or_default(),
            status_text: production.status_string.unwrap_or_default(),
            result_url: production
                .output_files
                .into_iter()
                .find_map(|file| file.download_url),
        }
    }
}
