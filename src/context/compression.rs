use crate::context::types::ContextConfig;
use serde_json::{Value, json};
use std::collections::HashSet;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub payload: Value,
    pub original_size: usize,
    pub compressed_size: usize,
    pub applied: bool,
}

impl CompressionOutcome {
    /// Fraction of the serialized payload removed
    pub fn compression_level(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size as f64 / self.original_size as f64).max(0.0)
    }
}

/// 1 - unique/total over whitespace-separated words
pub fn redundancy(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = words.iter().copied().collect();
    1.0 - unique.len() as f64 / words.len() as f64
}

pub fn needs_compression(serialized: &str, config: &ContextConfig) -> bool {
    serialized.len() > config.compression_size_threshold
        || redundancy(serialized) > config.redundancy_threshold
}

/// Compress a payload when it is oversized or redundant
pub fn compress(payload: Value, config: &ContextConfig) -> CompressionOutcome {
    let serialized = payload.to_string();
    let original_size = serialized.len();

    if !needs_compression(&serialized, config) {
        return CompressionOutcome {
            payload,
            original_size,
            compressed_size: original_size,
            applied: false,
        };
    }

    let compressed = match payload {
        Value::Object(mut map) => {
            if let Some(Value::String(description)) = map.get_mut("description") {
                truncate_description(description, config.max_description_length);
            }
            for value in map.values_mut() {
                if let Value::Array(items) = value {
                    elide_array(items, config);
                }
            }
            Value::Object(map)
        }
        Value::Array(mut items) => {
            elide_array(&mut items, config);
            Value::Array(items)
        }
        other => other,
    };

    let compressed_size = compressed.to_string().len();
    CompressionOutcome {
        payload: compressed,
        original_size,
        compressed_size,
        applied: true,
    }
}

fn truncate_description(description: &mut String, max_length: usize) {
    if description.chars().count() <= max_length {
        return;
    }
    let keep = max_length.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = description.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    *description = truncated;
}

/// Keep the head and tail of a long array with a count marker in between
fn elide_array(items: &mut Vec<Value>, config: &ContextConfig) {
    let keep = config.array_keep;
    if items.len() <= config.array_compression_threshold || items.len() <= keep * 2 {
        return;
    }
    let omitted = items.len() - keep * 2;
    let tail = items.split_off(items.len() - keep);
    items.truncate(keep);
    items.push(json!({ "_compressed": format!("... {} items omitted ...", omitted) }));
    items.extend(tail);
}
