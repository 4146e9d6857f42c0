use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload key holding free text that redaction inspects.
pub const TEXT_CONTENT: &str = "text_content";
/// Payload key holding extracted tables.
pub const TABLES: &str = "tables";

/// Anything carrying a document category tag.
///
/// Implemented for the typed [`Document`] and for raw JSON objects, so
/// handler payloads can be filtered without converting them first.
pub trait DocumentRecord {
    /// Category tag as stored; may be empty when the record has none.
    fn category(&self) -> &str;
}

/// A document as seen by the access layer.
///
/// Only `type` is inspected for visibility. The remaining fields travel
/// untouched apart from `text_content` and `tables`, which redaction reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "type", default)]
    pub doc_type: String,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl Document {
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            content: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    pub fn text_content(&self) -> Option<&str> {
        self.content.get(TEXT_CONTENT).and_then(Value::as_str)
    }

    pub fn tables(&self) -> Option<&Vec<Value>> {
        self.content.get(TABLES).and_then(Value::as_array)
    }
}

impl DocumentRecord for Document {
    fn category(&self) -> &str {
        &self.doc_type
    }
}

impl DocumentRecord for Value {
    fn category(&self) -> &str {
        self.get("type").and_then(Value::as_str).unwrap_or("")
    }
}

impl<T: DocumentRecord + ?Sized> DocumentRecord for &T {
    fn category(&self) -> &str {
        (**self).category()
    }
}
