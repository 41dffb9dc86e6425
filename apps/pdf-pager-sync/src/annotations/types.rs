//! Annotation descriptor types
//!
//! A descriptor is the persistable form of one live annotation object, as
//! produced by the editing surface's own serializer. Only the fields the sync
//! engine needs are typed; everything else travels in `payload` untouched.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Persisted form of one annotation object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDescriptor {
    /// Kind of editor that produced this annotation
    pub kind: AnnotationKind,
    /// Horizontal position on the page
    #[serde(serialize_with = "coordinate")]
    pub x: f64,
    /// Vertical position on the page
    #[serde(serialize_with = "coordinate")]
    pub y: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "optional_coordinate"
    )]
    pub width: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "optional_coordinate"
    )]
    pub height: Option<f64>,
    /// Kind-specific data (ink paths, stamp bitmap, text, colour, ...)
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Types of annotations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnnotationKind {
    /// Image stamp
    Stamp,
    /// Freehand ink stroke
    Ink,
    /// Text highlight
    Highlight,
    /// Free text box
    FreeText,
    /// Any editor kind this crate does not know about; kept verbatim
    Other(String),
}

/// Global mode of the editing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    Disable,
    None,
    FreeText,
    Highlight,
    Stamp,
    Ink,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &str {
        match self {
            AnnotationKind::Stamp => "stamp",
            AnnotationKind::Ink => "ink",
            AnnotationKind::Highlight => "highlight",
            AnnotationKind::FreeText => "freetext",
            AnnotationKind::Other(kind) => kind,
        }
    }
}

impl From<String> for AnnotationKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "stamp" => AnnotationKind::Stamp,
            "ink" => AnnotationKind::Ink,
            "highlight" => AnnotationKind::Highlight,
            "freetext" => AnnotationKind::FreeText,
            _ => AnnotationKind::Other(kind),
        }
    }
}

impl From<AnnotationKind> for String {
    fn from(kind: AnnotationKind) -> Self {
        match kind {
            AnnotationKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AnnotationDescriptor {
    /// Create a descriptor with no size and an empty payload
    pub fn new(kind: AnnotationKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            x,
            y,
            width: None,
            height: None,
            payload: Map::new(),
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_payload(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    /// Width and height, zero when the editor did not record them
    pub fn size(&self) -> (f64, f64) {
        (self.width.unwrap_or(0.0), self.height.unwrap_or(0.0))
    }
}

/// Whole numbers are written without a fraction so a blob written by the
/// viewer (`"x":10`) re-encodes byte-for-byte and is not seen as a change
fn coordinate<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() < MAX_EXACT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

fn optional_coordinate<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => coordinate(value, serializer),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_stamp() {
        let parsed: AnnotationDescriptor =
            serde_json::from_str(r#"{"kind":"stamp","x":10,"y":20}"#).unwrap();
        assert_eq!(parsed.kind, AnnotationKind::Stamp);
        assert_eq!((parsed.x, parsed.y), (10.0, 20.0));
        assert_eq!(parsed.size(), (0.0, 0.0));
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn test_unknown_kind_and_payload_survive() {
        let raw = json!({
            "kind": "signature",
            "x": 1.5,
            "y": 2.5,
            "width": 30,
            "height": 10.5,
            "paths": [[0, 0], [1, 1]],
            "color": [255, 0, 0]
        });
        let parsed: AnnotationDescriptor = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(parsed.kind, AnnotationKind::Other("signature".to_string()));
        assert_eq!(parsed.payload.len(), 2);

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_whole_coordinates_reencode_identically() {
        let blob = r#"{"kind":"stamp","x":10,"y":20}"#;
        let parsed: AnnotationDescriptor = serde_json::from_str(blob).unwrap();
        assert_eq!(serde_json::to_string(&parsed).unwrap(), blob);

        let moved = AnnotationDescriptor::new(AnnotationKind::Ink, 0.5, -3.0);
        assert_eq!(
            serde_json::to_string(&moved).unwrap(),
            r#"{"kind":"ink","x":0.5,"y":-3}"#
        );
    }
}
