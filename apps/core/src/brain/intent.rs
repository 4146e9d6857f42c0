//! Intent rules and classification results.
//!
//! A rule is a named list of case-insensitive regular expressions. Rules are
//! authoritative: a rule match always classifies with confidence 1.0.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::statistical::Prediction;
use crate::error::AppError;

/// Statistical predictions must score strictly above this to be dispatched.
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Intent reported when neither a rule nor the classifier settles the message.
pub const GENERAL_INTENT: &str = "GENERAL";

/// Which stage of the pipeline produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// A registered rule pattern matched
    Rule,
    /// The statistical classifier cleared the confidence threshold
    Statistical,
    /// Nothing settled the intent
    Fallback,
}

impl ClassificationSource {
    pub fn label(&self) -> &'static str {
        match self {
            ClassificationSource::Rule => "rule",
            ClassificationSource::Statistical => "statistical",
            ClassificationSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Result of intent classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Intent name
    pub intent: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Stage that produced the intent
    pub source: ClassificationSource,
    /// Human-readable account of the decision, for auditing
    pub explanation: String,
    /// Rule pattern that matched, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,
}

impl Classification {
    /// Classification produced by a rule match.
    pub fn rule(intent: &str, pattern: &str) -> Self {
        Self {
            intent: intent.to_string(),
            confidence: 1.0,
            source: ClassificationSource::Rule,
            explanation: format!("Matched rule `{}` for intent {}.", pattern, intent),
            matched_pattern: Some(pattern.to_string()),
        }
    }

    /// Classification accepted from the statistical classifier.
    pub fn statistical(intent: &str, confidence: f32) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            intent: intent.to_string(),
            confidence,
            source: ClassificationSource::Statistical,
            explanation: format!(
                "TF-IDF classifier chose {} at confidence {:.2}.",
                intent, confidence
            ),
            matched_pattern: None,
        }
    }

    /// Classification when no stage settled the intent.
    ///
    /// `closest` is the classifier's best guess, if a classifier ran at all.
    pub fn fallback(closest: Option<&Prediction>) -> Self {
        let (confidence, explanation) = match closest {
            Some(prediction) => (
                prediction.confidence.clamp(0.0, 1.0),
                format!(
                    "No rule matched; closest statistical label {} at confidence {:.2} was not accepted.",
                    prediction.label, prediction.confidence
                ),
            ),
            None => (
                0.0,
                "No rule matched and no statistical model is available.".to_string(),
            ),
        };

        Self {
            intent: GENERAL_INTENT.to_string(),
            confidence,
            source: ClassificationSource::Fallback,
            explanation,
            matched_pattern: None,
        }
    }
}

/// A compiled, named rule
pub struct IntentRule {
    name: String,
    priority: i32,
    patterns: Vec<Regex>,
}

impl IntentRule {
    /// Compile `patterns` case-insensitively for the intent `name`.
    pub fn compile<S: AsRef<str>>(name: &str, priority: i32, patterns: &[S]) -> Result<Self, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Registration(
                "intent name must not be empty".to_string(),
            ));
        }
        if patterns.is_empty() {
            return Err(AppError::Registration(format!(
                "intent `{}` has no patterns",
                name
            )));
        }

        let patterns = patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| AppError::InvalidPattern {
                        intent: name.to_string(),
                        pattern: pattern.as_ref().to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            priority,
            patterns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// First pattern, in list order, that matches anywhere in `text`.
    pub fn first_match(&self, text: &str) -> Option<&Regex> {
        self.patterns.iter().find(|pattern| pattern.is_match(text))
    }
}
