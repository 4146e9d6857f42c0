use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

use super::document::{Document, TABLES, TEXT_CONTENT};
use crate::error::AppError;

pub const DEFAULT_MARKER: &str = "[FINANCIAL INFORMATION REDACTED]";

const DEFAULT_KEYWORDS: &[&str] = &["cost", "price", "payment", "invoice", "budget", "sar", "$", "€", "£"];
const DEFAULT_TABLE_KEYWORDS: &[&str] = &["cost", "price", "amount", "total", "sar"];

/// Line-granular financial redaction.
///
/// Keywords match as case-insensitive substrings, so `sar` also hits
/// words like "necessary". That over-redaction is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Redactor {
    pub keywords: Vec<String>,
    pub table_keywords: Vec<String>,
    pub marker: String,
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            table_keywords: DEFAULT_TABLE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let lowered = haystack.to_lowercase();
    needles.iter().any(|needle| lowered.contains(needle.as_str()))
}

impl Redactor {
    /// Lower-case keywords and reject configurations that would break idempotence.
    pub fn validated(mut self) -> Result<Self, AppError> {
        for list in [&mut self.keywords, &mut self.table_keywords] {
            for keyword in list.iter_mut() {
                *keyword = keyword.to_lowercase();
            }
            list.retain(|k| !k.is_empty());
        }
        if self.marker.is_empty() || self.marker.contains('\n') {
            return Err(AppError::Config(
                "redaction marker must be a single non-empty line".to_string(),
            ));
        }
        if contains_any(&self.marker, &self.keywords) {
            return Err(AppError::Config(format!(
                "redaction marker `{}` contains a redaction keyword",
                self.marker
            )));
        }
        Ok(self)
    }

    pub fn line_is_sensitive(&self, line: &str) -> bool {
        contains_any(line, &self.keywords)
    }

    /// Replace every sensitive line with the marker.
    ///
    /// Line breaks are kept exactly, so text with nothing to redact comes
    /// back borrowed and byte-identical.
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !text.split('\n').any(|line| self.line_is_sensitive(line)) {
            return Cow::Borrowed(text);
        }

        let redacted: Vec<&str> = text
            .split('\n')
            .map(|line| {
                if self.line_is_sensitive(line) {
                    self.marker.as_str()
                } else {
                    line
                }
            })
            .collect();
        Cow::Owned(redacted.join("\n"))
    }

    /// A table is financial when its `data` mentions a table keyword.
    pub fn table_is_financial(&self, table: &Value) -> bool {
        match table.get("data") {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => contains_any(s, &self.table_keywords),
            Some(other) => contains_any(&other.to_string(), &self.table_keywords),
        }
    }

    /// Redact `text_content` and drop financial tables from a document body.
    pub fn redact_fields(&self, content: &mut Map<String, Value>) {
        if let Some(Value::String(text)) = content.get_mut(TEXT_CONTENT) {
            let cleaned = match self.redact(text) {
                Cow::Owned(cleaned) => Some(cleaned),
                Cow::Borrowed(_) => None,
            };
            if let Some(cleaned) = cleaned {
                *text = cleaned;
            }
        }

        if let Some(Value::Array(tables)) = content.get_mut(TABLES) {
            tables.retain(|table| !self.table_is_financial(table));
        }
    }

    pub fn redact_document(&self, document: &Document) -> Document {
        let mut redacted = document.clone();
        self.redact_fields(&mut redacted.content);
        redacted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_only_sensitive_lines() {
        let redactor = Redactor::default();
        let text = "Pour slab C3 on Monday\nConcrete price: 420 SAR/m3\nCrane booked";
        let out = redactor.redact(text);
        assert_eq!(
            out,
            "Pour slab C3 on Monday\n[FINANCIAL INFORMATION REDACTED]\nCrane booked"
        );
    }

    #[test]
    fn test_clean_text_is_borrowed() {
        let redactor = Redactor::default();
        let text = "Rebar inspection passed\r\n\nNext: formwork\n";
        match redactor.redact(text) {
            Cow::Borrowed(s) => assert_eq!(s, text),
            Cow::Owned(_) => panic!("clean text should not be copied"),
        }
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let redactor = Redactor::default();
        let text = "Invoice 77 overdue\nUSD $1,200\nsite clean\n€ transfer";
        let once = redactor.redact(text).into_owned();
        let twice = redactor.redact(&once).into_owned();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_currency_symbols_trigger() {
        let redactor = Redactor::default();
        assert!(redactor.line_is_sensitive("£40k"));
        assert!(redactor.line_is_sensitive("BUDGET review"));
        assert!(!redactor.line_is_sensitive("Scaffold inspection"));
    }

    #[test]
    fn test_financial_tables_dropped() {
        let redactor = Redactor::default();
        let doc = Document::new("boq")
            .with_field("text_content", "Item 4 total cost 10,000\nItem 5 rebar")
            .with_field(
                "tables",
                json!([
                    {"name": "pricing", "data": [["Item", "Amount"], ["4", "10000"]]},
                    {"name": "quantities", "data": [["Item", "Qty"], ["5", "12t"]]},
                    {"name": "empty"}
                ]),
            );

        let out = redactor.redact_document(&doc);
        assert_eq!(
            out.text_content(),
            Some("[FINANCIAL INFORMATION REDACTED]\nItem 5 rebar")
        );
        let names: Vec<&str> = out
            .tables()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(names, vec!["quantities", "empty"]);
        // input untouched
        assert_eq!(doc.tables().map(Vec::len), Some(3));
    }

    #[test]
    fn test_marker_must_not_trigger_itself() {
        let bad = Redactor {
            marker: "[PRICE HIDDEN]".to_string(),
            ..Redactor::default()
        };
        assert!(matches!(bad.validated(), Err(AppError::Config(_))));

        let upper = Redactor {
            keywords: vec!["COST".to_string(), String::new()],
            ..Redactor::default()
        }
        .validated()
        .unwrap();
        assert_eq!(upper.keywords, vec!["cost".to_string()]);
    }
}
