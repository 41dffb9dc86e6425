//! Per-page blob codec
//!
//! A page blob is either `""` (no annotations) or a JSON array of
//! [`AnnotationDescriptor`]s. An empty page always encodes to `""`, never
//! `"[]"`, so "nothing stored" and "nothing drawn" compare equal.

use serde_json::Value;

use super::types::AnnotationDescriptor;
use crate::error::CodecError;
use crate::surface::LiveObject;

/// Serialize every live object on a page, skipping objects that refuse
pub fn serialize_page(objects: &[LiveObject]) -> Result<String, CodecError> {
    let descriptors: Vec<AnnotationDescriptor> =
        objects.iter().filter_map(|object| object.serialize()).collect();
    encode(&descriptors)
}

/// Encode descriptors into a page blob
pub fn encode(descriptors: &[AnnotationDescriptor]) -> Result<String, CodecError> {
    if descriptors.is_empty() {
        return Ok(String::new());
    }
    Ok(serde_json::to_string(descriptors)?)
}

/// Decode a page blob
///
/// Fails with [`CodecError::MalformedBlob`] when the blob is not JSON or not an
/// array. Individual entries that are not descriptors are dropped with a
/// warning so one bad entry does not hide the rest of the page.
pub fn decode(blob: &str) -> Result<Vec<AnnotationDescriptor>, CodecError> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_str(blob).map_err(|e| CodecError::MalformedBlob(e.to_string()))?;

    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            return Err(CodecError::MalformedBlob(format!(
                "expected an array, found {}",
                json_type_name(&other)
            )))
        }
    };

    let mut descriptors = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<AnnotationDescriptor>(entry) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => tracing::warn!(index, error = %e, "Skipping unreadable annotation entry"),
        }
    }
    Ok(descriptors)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::AnnotationKind;
    use crate::memory::MemoryObject;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_empty_page_is_empty_string() {
        assert_eq!(encode(&[]).unwrap(), "");
        assert_eq!(serialize_page(&[]).unwrap(), "");
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn test_serialize_skips_refusing_objects() {
        let stamp = AnnotationDescriptor::new(AnnotationKind::Stamp, 10.0, 20.0);
        let objects: Vec<LiveObject> = vec![
            Arc::new(MemoryObject::new(1, stamp.clone())),
            Arc::new(MemoryObject::new(1, stamp.clone()).refusing_serialization()),
        ];

        let blob = serialize_page(&objects).unwrap();
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded, vec![stamp]);
    }

    #[test]
    fn test_round_trip_preserves_kind_position_payload() {
        let descriptors = vec![
            AnnotationDescriptor::new(AnnotationKind::Ink, 5.0, 6.0)
                .with_size(40.0, 12.0)
                .with_payload("paths", json!([[0.0, 0.0], [4.0, 2.0]])),
            AnnotationDescriptor::new(AnnotationKind::FreeText, 100.0, 50.0)
                .with_payload("value", json!("Read this first")),
        ];

        let blob = encode(&descriptors).unwrap();
        assert!(blob.starts_with('['));
        assert_eq!(decode(&blob).unwrap(), descriptors);
    }

    #[test]
    fn test_malformed_blobs() {
        assert!(decode("{not json").unwrap_err().is_malformed());
        assert!(decode(r#"{"kind":"stamp"}"#).unwrap_err().is_malformed());
        assert!(decode("42").unwrap_err().is_malformed());
    }

    #[test]
    fn test_bad_entries_are_dropped() {
        let blob = r#"[{"kind":"stamp","x":10,"y":20}, "garbage", {"x":1}]"#;
        let decoded = decode(blob).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].kind, AnnotationKind::Stamp);
    }
}
