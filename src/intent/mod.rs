//! Intent classification: exact lookup table first, learned model second.

pub mod bert;

use crate::config::IntentProfile;
use crate::knowledge::{loader, normalize_key};
use crate::models::{IntentMethod, IntentResult};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub use bert::BertIntentModel;

/// A sequence classifier over a fixed label set.
pub trait IntentModel: Send + Sync {
    fn labels(&self) -> &[String];
    /// Probability distribution over `labels()`.
    fn predict(&self, text: &str) -> Result<Vec<f32>>;
}

/// Without a loaded model the classifier is disabled and answers
/// `unknown / 0.0 / disabled`, lookup table or not.
#[derive(Default)]
pub struct IntentClassifier {
    lookup: HashMap<String, String>,
    model: Option<Arc<dyn IntentModel>>,
}

impl IntentClassifier {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Builds the classifier a profile describes. A model that fails to load
    /// is logged and leaves the classifier disabled.
    pub fn from_profile(profile: Option<&IntentProfile>) -> Self {
        let Some(profile) = profile.filter(|p| p.enabled) else {
            return Self::disabled();
        };

        let model = match BertIntentModel::load(&profile.model_path) {
            Ok(model) => model,
            Err(e) => {
                warn!(
                    "⚠️  Intent model unavailable at {}: {:#}",
                    profile.model_path.display(),
                    e
                );
                return Self::disabled();
            }
        };
        info!("🎯 Loaded intent model with {} intents", model.labels().len());
        let mut classifier = Self::disabled().with_model(Arc::new(model));

        if let Some(path) = &profile.lookup_csv_path {
            match loader::read_intent_table(path) {
                Ok(rows) => classifier = classifier.with_lookup(rows),
                Err(e) => warn!("⚠️  Failed to load intent lookup table: {:#}", e),
            }
        }

        classifier
    }

    pub fn with_lookup(mut self, rows: Vec<(String, String)>) -> Self {
        for (text, intent) in rows {
            self.lookup.insert(normalize_key(&text), intent);
        }
        self
    }

    pub fn with_model(mut self, model: Arc<dyn IntentModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn lookup(&self, text: &str) -> Option<&str> {
        self.lookup.get(&normalize_key(text)).map(String::as_str)
    }

    pub fn classify(&self, text: &str) -> IntentResult {
        let Some(model) = &self.model else {
            return IntentResult::unknown(IntentMethod::Disabled);
        };

        if let Some(intent) = self.lookup(text) {
            return IntentResult {
                intent: intent.to_string(),
                confidence: 1.0,
                method: IntentMethod::ExactLookup,
                probabilities: None,
            };
        }

        match model.predict(text) {
            Ok(probabilities) => {
                let best = probabilities
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|(_, p)| p.is_finite())
                    .fold(None, |best: Option<(usize, f32)>, (idx, p)| match best {
                        Some((_, top)) if top >= p => best,
                        _ => Some((idx, p)),
                    });
                let Some((idx, confidence)) = best else {
                    warn!("Intent model returned no usable probabilities");
                    return IntentResult::unknown(IntentMethod::Error);
                };
                let intent = model
                    .labels()
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                IntentResult {
                    intent,
                    confidence: confidence.clamp(0.0, 1.0),
                    method: IntentMethod::ModelClassification,
                    probabilities: Some(probabilities),
                }
            }
            Err(e) => {
                warn!("Intent classification failed: {:#}", e);
                IntentResult::unknown(IntentMethod::Error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedModel {
        labels: Vec<String>,
        probabilities: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedModel {
        fn new(probabilities: Vec<f32>) -> Self {
            Self {
                labels: vec!["greeting".into(), "leave_request".into(), "payroll".into()],
                probabilities,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl IntentModel for FixedModel {
        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn predict(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.probabilities.clone())
        }
    }

    struct FailingModel;

    impl IntentModel for FailingModel {
        fn labels(&self) -> &[String] {
            &[]
        }

        fn predict(&self, _text: &str) -> Result<Vec<f32>> {
            Err(anyhow!("tensor shape mismatch"))
        }
    }

    #[test]
    fn disabled_classifier_reports_unknown() {
        let result = IntentClassifier::disabled().classify("hello");
        assert_eq!(result, IntentResult::unknown(IntentMethod::Disabled));
    }

    #[test]
    fn lookup_hit_skips_the_model() {
        let model = Arc::new(FixedModel::new(vec![0.1, 0.2, 0.7]));
        let classifier = IntentClassifier::disabled()
            .with_lookup(vec![("I want a day off".into(), "leave_request".into())])
            .with_model(model.clone());

        let result = classifier.classify("i want a DAY OFF!");
        assert_eq!(result.intent, "leave_request");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.method, IntentMethod::ExactLookup);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn model_returns_argmax_and_distribution() {
        let classifier =
            IntentClassifier::disabled().with_model(Arc::new(FixedModel::new(vec![0.1, 0.7, 0.2])));
        let result = classifier.classify("can I take friday off");
        assert_eq!(result.intent, "leave_request");
        assert!((result.confidence - 0.7).abs() < 1e-6);
        assert_eq!(result.method, IntentMethod::ModelClassification);
        assert_eq!(result.probabilities.unwrap().len(), 3);
    }

    #[test]
    fn lookup_without_model_stays_disabled() {
        let classifier =
            IntentClassifier::disabled().with_lookup(vec![("hi".into(), "greeting".into())]);
        assert_eq!(classifier.classify("hi").method, IntentMethod::Disabled);
        assert!(!classifier.is_ready());
    }

    #[test]
    fn model_failure_is_reported_as_error() {
        let classifier = IntentClassifier::disabled().with_model(Arc::new(FailingModel));
        assert_eq!(
            classifier.classify("anything"),
            IntentResult::unknown(IntentMethod::Error)
        );
    }

    #[test]
    fn missing_model_directory_disables_classifier() {
        let profile = IntentProfile {
            model_path: "/nonexistent/intent_model".into(),
            lookup_csv_path: None,
            confidence_threshold: 0.5,
            enabled: true,
        };

        let classifier = IntentClassifier::from_profile(Some(&profile));
        assert!(!classifier.is_ready());
        assert_eq!(classifier.classify("show my payslip").method, IntentMethod::Disabled);
    }
}
