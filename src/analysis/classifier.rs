//! # Emotion Classification
//!
//! A fixed, ordered rule over two aggregates of the feature matrix: the mean
//! short-term energy and the mean zero-crossing rate. This is a coarse
//! heuristic, not a trained model. The rules overlap, so the first match wins
//! and the order below is part of the behavior.
//!
//! | order | condition | label |
//! |-------|-----------|-------|
//! | 1 | energy > 0.1 and zcr > 0.1 | angry |
//! | 2 | energy < 0.05 and zcr < 0.05 | calm |
//! | 3 | zcr > 0.15 | happy |
//! | 4 | otherwise | neutral |

use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::features::{FeatureKind, FeatureMatrix};
use serde::{Deserialize, Serialize};
use std::fmt;

const ANGRY_MIN_ENERGY: f64 = 0.1;
const ANGRY_MIN_ZCR: f64 = 0.1;
const CALM_MAX_ENERGY: f64 = 0.05;
const CALM_MAX_ZCR: f64 = 0.05;
const HAPPY_MIN_ZCR: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Angry,
    Calm,
    Happy,
    Neutral,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 4] = [
        EmotionLabel::Angry,
        EmotionLabel::Calm,
        EmotionLabel::Happy,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label plus the aggregates it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub emotion: EmotionLabel,
    pub mean_energy: f64,
    pub mean_zcr: f64,
}

/// Stateless rule-based classifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmotionClassifier;

impl EmotionClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate the matrix and apply the rule.
    ///
    /// ## Errors:
    /// - `EmptyFeatureMatrix` when there are no rows, or when the energy or
    ///   ZCR column is missing so no aggregate can be formed
    pub fn classify(&self, matrix: &FeatureMatrix) -> AnalysisResult<Classification> {
        if matrix.is_empty() {
            return Err(AnalysisError::EmptyFeatureMatrix {
                reason: "feature matrix has no frames".to_string(),
            });
        }

        let mean_energy = Self::mean_of(matrix, FeatureKind::Energy)?;
        let mean_zcr = Self::mean_of(matrix, FeatureKind::Zcr)?;

        Ok(Classification {
            emotion: Self::label_for(mean_energy, mean_zcr),
            mean_energy,
            mean_zcr,
        })
    }

    fn mean_of(matrix: &FeatureMatrix, kind: FeatureKind) -> AnalysisResult<f64> {
        matrix.column_mean(kind).ok_or_else(|| AnalysisError::EmptyFeatureMatrix {
            reason: format!("feature matrix has no '{}' column", kind),
        })
    }

    /// The ordered first-match rule.
    pub fn label_for(mean_energy: f64, mean_zcr: f64) -> EmotionLabel {
        if mean_energy > ANGRY_MIN_ENERGY && mean_zcr > ANGRY_MIN_ZCR {
            EmotionLabel::Angry
        } else if mean_energy < CALM_MAX_ENERGY && mean_zcr < CALM_MAX_ZCR {
            EmotionLabel::Calm
        } else if mean_zcr > HAPPY_MIN_ZCR {
            EmotionLabel::Happy
        } else {
            EmotionLabel::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(energy: f64, zcr: f64) -> FeatureMatrix {
        // Two frames that average to the requested means
        FeatureMatrix::from_rows(
            vec![FeatureKind::Zcr, FeatureKind::Energy],
            vec![vec![zcr - 0.01, energy + 0.01], vec![zcr + 0.01, energy - 0.01]],
        )
    }

    #[test]
    fn test_reference_cases() {
        let classifier = EmotionClassifier::new();
        let cases = [
            (0.2, 0.2, EmotionLabel::Angry),
            (0.02, 0.01, EmotionLabel::Calm),
            (0.07, 0.2, EmotionLabel::Happy),
            (0.08, 0.08, EmotionLabel::Neutral),
        ];

        for (energy, zcr, expected) in cases {
            let result = classifier.classify(&matrix(energy, zcr)).unwrap();
            assert_eq!(result.emotion, expected, "energy={} zcr={}", energy, zcr);
            assert!((result.mean_energy - energy).abs() < 1e-9);
            assert!((result.mean_zcr - zcr).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rule_order_matters() {
        // High energy and zcr above the happy threshold: angry wins
        assert_eq!(EmotionClassifier::label_for(0.5, 0.3), EmotionLabel::Angry);
        // Low energy but zcr above happy: calm fails on zcr, happy matches
        assert_eq!(EmotionClassifier::label_for(0.01, 0.16), EmotionLabel::Happy);
        // High energy, low zcr: nothing matches
        assert_eq!(EmotionClassifier::label_for(0.5, 0.02), EmotionLabel::Neutral);
    }

    #[test]
    fn test_thresholds_are_strict() {
        assert_eq!(EmotionClassifier::label_for(0.1, 0.2), EmotionLabel::Happy);
        assert_eq!(EmotionClassifier::label_for(0.05, 0.01), EmotionLabel::Neutral);
        assert_eq!(EmotionClassifier::label_for(0.07, 0.15), EmotionLabel::Neutral);
    }

    #[test]
    fn test_empty_matrix_is_an_error() {
        let empty = FeatureMatrix::new(vec![FeatureKind::Zcr, FeatureKind::Energy]);
        let result = EmotionClassifier::new().classify(&empty);
        assert!(matches!(result, Err(AnalysisError::EmptyFeatureMatrix { .. })));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let matrix = FeatureMatrix::from_rows(vec![FeatureKind::Zcr], vec![vec![0.2]]);
        let result = EmotionClassifier::new().classify(&matrix);
        assert!(matches!(result, Err(AnalysisError::EmptyFeatureMatrix { reason }) if reason.contains("energy")));
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&EmotionLabel::Calm).unwrap(), "\"calm\"");
        assert_eq!(EmotionLabel::Angry.to_string(), "angry");
    }
}
