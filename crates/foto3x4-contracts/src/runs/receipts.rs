use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::images::BackgroundRequest;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Pixel crop applied to a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRecord {
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReceipt {
    pub background: BackgroundRequest,
    pub provider: String,
    pub model: Option<String>,
    pub prompt: String,
    pub source_sha256: String,
    pub source_width: u32,
    pub source_height: u32,
    pub generated_width: u32,
    pub generated_height: u32,
    pub crop: CropRecord,
    pub latency_s: f64,
    #[serde(default)]
    pub provider_request: Map<String, Value>,
    #[serde(default)]
    pub provider_response: Map<String, Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

pub fn build_receipt(receipt: &GenerationReceipt, image_path: &Path, receipt_path: &Path) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert(
        "generation".to_string(),
        sanitize_payload(&serde_json::to_value(receipt).unwrap_or(Value::Null)),
    );

    let mut artifacts = Map::new();
    artifacts.insert(
        "image_path".to_string(),
        Value::String(image_path.to_string_lossy().to_string()),
    );
    artifacts.insert(
        "receipt_path".to_string(),
        Value::String(receipt_path.to_string_lossy().to_string()),
    );
    root.insert("artifacts".to_string(), Value::Object(artifacts));
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

/// Replaces inline image payloads (base64 blobs) and credentials with a marker.
fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "data" | "inlinedata" | "inline_data" | "image_bytes" | "key" | "api_key"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}
