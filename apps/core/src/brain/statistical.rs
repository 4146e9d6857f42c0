//! Statistical intent classification.
//!
//! A TF-IDF vectorizer turns a message into a sparse, L2-normalised
//! bag-of-words vector; a multinomial logistic regression assigns class
//! probabilities; the argmax is the predicted label and its probability the
//! confidence. The model is trained offline from a small labeled phrase table
//! and stored as JSON.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};
use validator::Validate;

use crate::error::AppError;

/// Version of the on-disk model layout
pub const MODEL_FORMAT_VERSION: u32 = 1;

// NOTE: expect() is acceptable here: the pattern is a constant.
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("Invalid regex: token pattern"));

/// Best label for a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label` (0.0 - 1.0)
    pub confidence: f32,
}

/// Something that can guess an intent label for free text.
///
/// Implemented by [`StatisticalClassifier`]; other models can be plugged into
/// the router through this seam.
pub trait IntentPredictor: Send + Sync {
    /// Returns `None` when the model has no signal to offer at all.
    fn predict(&self, text: &str) -> Option<Prediction>;
}

/// One labeled training phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPhrase {
    pub label: String,
    pub text: String,
}

impl LabeledPhrase {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Gradient-descent settings for training
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrainingOptions {
    /// Full passes over the training set.
    #[validate(range(min = 1, max = 100000))]
    pub epochs: usize,
    /// Step size for each update.
    #[validate(range(min = 0.0001, max = 100.0))]
    pub learning_rate: f64,
    /// L2 penalty on the weights (biases are not penalised).
    #[validate(range(min = 0.0, max = 10.0))]
    pub l2: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            epochs: 500,
            learning_rate: 1.0,
            l2: 0.001,
        }
    }
}

type SparseVector = Vec<(usize, f64)>;

/// TF-IDF vectorizer with smoothed IDF and L2-normalised rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Lowercase and split into tokens of two or more word characters.
    fn tokenize(text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        TOKEN_PATTERN
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Learn vocabulary and IDF weights from `documents`.
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for document in documents {
            let mut seen: Vec<String> = Self::tokenize(document.as_ref());
            seen.sort();
            seen.dedup();
            for token in seen {
                *document_frequency.entry(token).or_insert(0) += 1;
            }
        }

        let n = documents.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(document_frequency.len());
        for (index, (token, df)) in document_frequency.into_iter().enumerate() {
            vocabulary.insert(token, index);
            idf.push(((1.0 + n) / (1.0 + df as f64)).ln() + 1.0);
        }

        Self { vocabulary, idf }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    /// First token whose feature index has no IDF weight.
    fn out_of_range_token(&self) -> Option<(&str, usize)> {
        self.vocabulary
            .iter()
            .find(|&(_, &index)| index >= self.idf.len())
            .map(|(token, &index)| (token.as_str(), index))
    }

    /// Sparse TF-IDF vector for `text`; tokens outside the vocabulary are ignored.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in Self::tokenize(text) {
            if let Some(&index) = self.vocabulary.get(&token) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut vector: SparseVector = counts
            .into_iter()
            .filter_map(|(index, tf)| self.idf.get(index).map(|idf| (index, tf * idf)))
            .collect();
        vector.sort_by_key(|(index, _)| *index);

        let norm = vector.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// Multinomial logistic regression over sparse features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    classes: Vec<String>,
    /// One row of feature weights per class
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl SoftmaxRegression {
    fn fit(
        samples: &[(SparseVector, usize)],
        classes: Vec<String>,
        n_features: usize,
        options: &TrainingOptions,
    ) -> Self {
        let n_classes = classes.len();
        let mut model = Self {
            classes,
            weights: vec![vec![0.0; n_features]; n_classes],
            bias: vec![0.0; n_classes],
        };
        let n = samples.len().max(1) as f64;

        for _ in 0..options.epochs {
            let mut grad_w = vec![vec![0.0; n_features]; n_classes];
            let mut grad_b = vec![0.0; n_classes];

            for (features, target) in samples {
                let probs = model.probabilities(features);
                for (class, p) in probs.iter().enumerate() {
                    let delta = p - if class == *target { 1.0 } else { 0.0 };
                    grad_b[class] += delta;
                    for &(feature, value) in features {
                        grad_w[class][feature] += delta * value;
                    }
                }
            }

            for class in 0..n_classes {
                model.bias[class] -= options.learning_rate * grad_b[class] / n;
                for feature in 0..n_features {
                    let w = model.weights[class][feature];
                    let gradient = grad_w[class][feature] / n + options.l2 * w;
                    model.weights[class][feature] = w - options.learning_rate * gradient;
                }
            }
        }

        model
    }

    /// Class probabilities for one sparse vector.
    fn probabilities(&self, features: &[(usize, f64)]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| {
                bias + features
                    .iter()
                    .map(|&(feature, value)| row.get(feature).copied().unwrap_or(0.0) * value)
                    .sum::<f64>()
            })
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }
}

/// Trained TF-IDF + logistic regression intent classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalClassifier {
    format_version: u32,
    trained_at: DateTime<Utc>,
    vectorizer: TfidfVectorizer,
    model: SoftmaxRegression,
}

impl StatisticalClassifier {
    /// Train a classifier from labeled phrases.
    pub fn train(phrases: &[LabeledPhrase], options: &TrainingOptions) -> Result<Self, AppError> {
        options.validate()?;

        if phrases.iter().any(|p| p.label.trim().is_empty()) {
            return Err(AppError::Validation(
                "training phrases must have a non-empty label".to_string(),
            ));
        }

        let classes: Vec<String> = {
            let mut labels: Vec<String> = phrases.iter().map(|p| p.label.clone()).collect();
            labels.sort();
            labels.dedup();
            labels
        };
        if classes.len() < 2 {
            return Err(AppError::Validation(format!(
                "training needs at least two labels, got {}",
                classes.len()
            )));
        }

        let texts: Vec<&str> = phrases.iter().map(|p| p.text.as_str()).collect();
        let vectorizer = TfidfVectorizer::fit(&texts);
        if vectorizer.vocabulary_size() == 0 {
            return Err(AppError::Validation(
                "training phrases contain no usable tokens".to_string(),
            ));
        }

        let samples: Vec<(SparseVector, usize)> = phrases
            .iter()
            .filter_map(|p| {
                classes
                    .iter()
                    .position(|c| *c == p.label)
                    .map(|target| (vectorizer.transform(&p.text), target))
            })
            .collect();

        let model = SoftmaxRegression::fit(&samples, classes, vectorizer.vocabulary_size(), options);

        info!(
            "Trained intent classifier: {} labels, {} phrases, {} terms",
            model.classes.len(),
            samples.len(),
            vectorizer.vocabulary_size()
        );

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            trained_at: Utc::now(),
            vectorizer,
            model,
        })
    }

    /// Labels the model can predict, in sorted order.
    pub fn labels(&self) -> &[String] {
        &self.model.classes
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Write the model as JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        info!("Saved intent model to {:?}", path);
        Ok(())
    }

    /// Read a model previously written by [`StatisticalClassifier::save`].
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)?;
        let classifier: Self = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("Corrupt intent model {:?}: {}", path, e)))?;

        if classifier.format_version != MODEL_FORMAT_VERSION {
            return Err(AppError::Config(format!(
                "Intent model {:?} has format version {}, expected {}",
                path, classifier.format_version, MODEL_FORMAT_VERSION
            )));
        }
        let consistent = classifier.model.classes.len() == classifier.model.weights.len()
            && classifier.model.classes.len() == classifier.model.bias.len()
            && classifier
                .model
                .weights
                .iter()
                .all(|row| row.len() == classifier.vectorizer.vocabulary_size());
        if !consistent {
            return Err(AppError::Config(format!(
                "Intent model {:?} has mismatched dimensions",
                path
            )));
        }
        if let Some((token, index)) = classifier.vectorizer.out_of_range_token() {
            return Err(AppError::Config(format!(
                "Intent model {:?} maps token `{}` to feature {}, but the vocabulary has {} features",
                path,
                token,
                index,
                classifier.vectorizer.vocabulary_size()
            )));
        }

        info!(
            "Loaded intent model from {:?} ({} labels)",
            path,
            classifier.labels().len()
        );
        Ok(classifier)
    }

    /// Load the model if one is configured and present.
    ///
    /// A missing path or file is not an error: the classifier capability is
    /// simply absent. A file that exists but cannot be parsed is.
    pub fn load_optional(path: Option<&Path>) -> Result<Option<Self>, AppError> {
        match path {
            None => {
                warn!("No intent model configured; statistical fallback disabled");
                Ok(None)
            }
            Some(path) if !path.exists() => {
                warn!(
                    "Intent model {:?} not found; statistical fallback disabled",
                    path
                );
                Ok(None)
            }
            Some(path) => Self::load(path).map(Some),
        }
    }
}

impl IntentPredictor for StatisticalClassifier {
    fn predict(&self, text: &str) -> Option<Prediction> {
        let features = self.vectorizer.transform(text);
        let probs = self.model.probabilities(&features);

        probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(class, p)| Prediction {
                label: self.model.classes[class].clone(),
                confidence: *p as f32,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases() -> Vec<LabeledPhrase> {
        vec![
            LabeledPhrase::new("primavera", "import xer"),
            LabeledPhrase::new("primavera", "check p6 schedule"),
            LabeledPhrase::new("aconex", "search aconex"),
            LabeledPhrase::new("aconex", "get aconex docs"),
            LabeledPhrase::new("vision", "analyze photo"),
            LabeledPhrase::new("vision", "site image check"),
        ]
    }

    #[test]
    fn test_tokenize_drops_single_characters() {
        let tokens = TfidfVectorizer::tokenize("Run a CAD take-off on P6");
        assert_eq!(tokens, vec!["run", "cad", "take", "off", "on", "p6"]);
    }

    #[test]
    fn test_transform_is_l2_normalised() {
        let vectorizer = TfidfVectorizer::fit(&["import xer file", "search aconex"]);
        let vector = vectorizer.transform("import xer xer");
        let norm: f64 = vector.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_tokens_yield_empty_vector() {
        let vectorizer = TfidfVectorizer::fit(&["import xer"]);
        assert!(vectorizer.transform("qwerty zxcv").is_empty());
    }

    #[test]
    fn test_rarer_terms_get_higher_idf() {
        let vectorizer = TfidfVectorizer::fit(&["check schedule", "check image", "check xer"]);
        let check = vectorizer.vocabulary["check"];
        let xer = vectorizer.vocabulary["xer"];
        assert!(vectorizer.idf[xer] > vectorizer.idf[check]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let classifier = StatisticalClassifier::train(&phrases(), &TrainingOptions::default()).unwrap();
        let features = classifier.vectorizer.transform("analyze site photo");
        let total: f64 = classifier.model.probabilities(&features).iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_training_phrases_are_recovered() {
        let classifier = StatisticalClassifier::train(&phrases(), &TrainingOptions::default()).unwrap();

        for phrase in phrases() {
            let prediction = classifier.predict(&phrase.text).unwrap();
            assert_eq!(prediction.label, phrase.label, "for '{}'", phrase.text);
        }
    }

    #[test]
    fn test_train_rejects_single_label() {
        let single = vec![
            LabeledPhrase::new("aconex", "search aconex"),
            LabeledPhrase::new("aconex", "get aconex docs"),
        ];
        assert!(matches!(
            StatisticalClassifier::train(&single, &TrainingOptions::default()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_train_rejects_invalid_options() {
        let options = TrainingOptions {
            epochs: 0,
            ..TrainingOptions::default()
        };
        assert!(matches!(
            StatisticalClassifier::train(&phrases(), &options),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_model_disables_capability() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");

        assert!(StatisticalClassifier::load_optional(None).unwrap().is_none());
        assert!(StatisticalClassifier::load_optional(Some(&missing)).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_model_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent_model.json");
        fs::write(&path, "{ \"format_version\": 1 }").unwrap();

        assert!(matches!(
            StatisticalClassifier::load_optional(Some(&path)),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_out_of_range_vocabulary_index_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent_model.json");

        let classifier = StatisticalClassifier::train(&phrases(), &TrainingOptions::default()).unwrap();
        let mut model = serde_json::to_value(&classifier).unwrap();
        model["vectorizer"]["vocabulary"]["aconex"] = serde_json::json!(100_000);
        fs::write(&path, model.to_string()).unwrap();

        assert!(matches!(
            StatisticalClassifier::load(&path),
            Err(AppError::Config(message)) if message.contains("`aconex`")
        ));
    }

    #[test]
    fn test_transform_skips_index_without_weight() {
        let mut vectorizer = TfidfVectorizer::fit(&["run cad takeoff"]);
        vectorizer.vocabulary.insert("ghost".to_string(), 5);

        let vector = vectorizer.transform("run ghost");
        assert_eq!(vector.len(), 1);
        assert!((vector[0].1 - 1.0).abs() < 1e-9);
    }
}
