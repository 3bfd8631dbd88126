use serde::Serialize;
use serde_json::{Value, json};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("payload is not serializable: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Snapshot of a value for a span's input/output payload.
///
/// Objects are stored as-is, anything else under a `value` key. Once the
/// encoded payload exceeds `max_bytes` it is replaced by a truncated preview.
pub fn capture<T: Serialize + ?Sized>(value: &T, max_bytes: usize) -> Result<Value, CaptureError> {
    let value = match serde_json::to_value(value)? {
        object @ Value::Object(_) => object,
        other => json!({ "value": other }),
    };

    let encoded = serde_json::to_string(&value)?;
    if encoded.len() <= max_bytes {
        return Ok(value);
    }

    let preview = &encoded[..char_floor(&encoded, max_bytes)];
    Ok(json!({ "truncated": true, "preview": preview }))
}

/// Largest char boundary in `text` that is `<= max_bytes`.
fn char_floor(text: &str, max_bytes: usize) -> usize {
    text.char_indices()
        .map(|(idx, ch)| idx + ch.len_utf8())
        .take_while(|&end| end <= max_bytes)
        .last()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn objects_pass_through() {
        let mut map = BTreeMap::new();
        map.insert("query", "refund policy");
        let v = capture(&map, DEFAULT_MAX_PAYLOAD_BYTES).unwrap();
        assert_eq!(v, json!({"query": "refund policy"}));
    }

    #[test]
    fn scalars_are_wrapped() {
        assert_eq!(capture(&42, 100).unwrap(), json!({"value": 42}));
        assert_eq!(
            capture(&vec!["a", "b"], 100).unwrap(),
            json!({"value": ["a", "b"]})
        );
    }

    #[test]
    fn oversized_payload_becomes_preview() {
        let text = "x".repeat(64);
        let v = capture(&text, 16).unwrap();
        assert_eq!(v["truncated"], json!(true));
        assert_eq!(v["preview"].as_str().unwrap().len(), 16);
    }

    #[test]
    fn multibyte_preview_stays_within_byte_cap() {
        // encodes as a 10-byte ascii prefix followed by 3-byte chars
        let text = "日本語".repeat(20);
        for cap in [8, 9, 10, 11, 16] {
            let v = capture(&text, cap).unwrap();
            let preview = v["preview"].as_str().unwrap();
            assert!(preview.len() <= cap, "cap {cap}: {} bytes", preview.len());
            assert!(cap - preview.len() < 3);
        }
        let v = capture(&"é".repeat(10), 1).unwrap();
        assert_eq!(v["preview"], json!("{"));
        assert_eq!(capture(&"é".repeat(10), 0).unwrap()["preview"], json!(""));
    }

    #[test]
    fn unserializable_payload_is_an_error() {
        let mut map = BTreeMap::new();
        map.insert((1, 2), "tuple keys are not valid json");
        assert!(capture(&map, 100).is_err());
    }
}
