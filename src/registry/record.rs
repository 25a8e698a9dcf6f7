use crate::config::MetricsMode;
use crate::error::{ExoError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Reserved id of the permanent default record
pub const BASE_MODEL_ID: &str = "base-model";

pub const LEARNING_RATE_RANGE: RangeInclusive<f64> = 0.001..=0.1;
pub const ESTIMATORS_RANGE: RangeInclusive<u32> = 50..=500;
pub const MAX_DEPTH_RANGE: RangeInclusive<u32> = 3..=20;
pub const SUBSAMPLE_RANGE: RangeInclusive<f64> = 0.5..=1.0;
pub const REGULARIZATION_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Model family tag. Only gradient-boosted trees are supported.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelKind {
    #[default]
    XGBoost,
}

/// Tuning values a model was trained with
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hyperparameters {
    pub learning_rate: f64,
    pub estimators: u32,
    pub max_depth: u32,
    pub subsample: f64,
    pub regularization: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            estimators: 100,
            max_depth: 5,
            subsample: 0.8,
            regularization: 0.1,
        }
    }
}

impl Hyperparameters {
    /// Check every value against its allowed range
    pub fn check(&self) -> Result<()> {
        check_f64("learning rate", self.learning_rate, &LEARNING_RATE_RANGE)?;
        check_u32("estimators", self.estimators, &ESTIMATORS_RANGE)?;
        check_u32("max depth", self.max_depth, &MAX_DEPTH_RANGE)?;
        check_f64("subsample", self.subsample, &SUBSAMPLE_RANGE)?;
        check_f64("regularization", self.regularization, &REGULARIZATION_RANGE)?;
        Ok(())
    }

    /// Copy with every value pulled into its allowed range
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            learning_rate: clamp_f64(self.learning_rate, &LEARNING_RATE_RANGE),
            estimators: self
                .estimators
                .clamp(*ESTIMATORS_RANGE.start(), *ESTIMATORS_RANGE.end()),
            max_depth: self
                .max_depth
                .clamp(*MAX_DEPTH_RANGE.start(), *MAX_DEPTH_RANGE.end()),
            subsample: clamp_f64(self.subsample, &SUBSAMPLE_RANGE),
            regularization: clamp_f64(self.regularization, &REGULARIZATION_RANGE),
        }
    }
}

fn check_f64(field: &str, value: f64, range: &RangeInclusive<f64>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ExoError::InvalidInput(format!(
            "{field} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

fn check_u32(field: &str, value: u32, range: &RangeInclusive<u32>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ExoError::InvalidInput(format!(
            "{field} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

fn clamp_f64(value: f64, range: &RangeInclusive<f64>) -> f64 {
    if value.is_nan() {
        *range.start()
    } else {
        value.clamp(*range.start(), *range.end())
    }
}

/// Placeholder quality metrics, all percentages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Where placeholder metrics for new records come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetricsSource {
    #[default]
    Random,
    Fixed,
}

impl From<MetricsMode> for MetricsSource {
    fn from(mode: MetricsMode) -> Self {
        match mode {
            MetricsMode::Random => Self::Random,
            MetricsMode::Fixed => Self::Fixed,
        }
    }
}

impl MetricsSource {
    #[must_use]
    pub fn generate(self) -> QualityMetrics {
        match self {
            Self::Random => {
                let mut rng = rand::thread_rng();
                QualityMetrics {
                    accuracy: rng.gen_range(91.0..96.0),
                    precision: rng.gen_range(88.0..93.0),
                    recall: rng.gen_range(93.0..98.0),
                }
            }
            Self::Fixed => BASE_METRICS,
        }
    }
}

const BASE_METRICS: QualityMetrics = QualityMetrics {
    accuracy: 92.5,
    precision: 89.3,
    recall: 94.7,
};

/// Metadata for one trained model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ModelKind,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "parameters")]
    pub hyperparameters: Hyperparameters,
}

impl ModelRecord {
    /// The permanent default record
    #[must_use]
    pub fn base() -> Self {
        Self {
            id: BASE_MODEL_ID.to_string(),
            name: "Base Model".to_string(),
            kind: ModelKind::XGBoost,
            accuracy: BASE_METRICS.accuracy,
            precision: BASE_METRICS.precision,
            recall: BASE_METRICS.recall,
            created_at: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            hyperparameters: Hyperparameters::default(),
        }
    }

    /// Build a freshly trained record with a new id and the current time
    #[must_use]
    pub fn trained(name: String, hyperparameters: Hyperparameters, metrics: QualityMetrics) -> Self {
        Self {
            id: format!("model-{}", uuid::Uuid::new_v4().simple()),
            name,
            kind: ModelKind::XGBoost,
            accuracy: metrics.accuracy,
            precision: metrics.precision,
            recall: metrics.recall,
            created_at: Utc::now(),
            hyperparameters: hyperparameters.clamped(),
        }
    }

    #[must_use]
    pub fn is_base(&self) -> bool {
        self.id == BASE_MODEL_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_record() {
        let base = ModelRecord::base();
        assert!(base.is_base());
        assert_eq!(base.name, "Base Model");
        assert_eq!(base.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(base.hyperparameters.estimators, 100);
    }

    #[test]
    fn test_default_hyperparameters_in_range() {
        assert!(Hyperparameters::default().check().is_ok());
    }

    #[test]
    fn test_check_rejects_out_of_range() {
        let params = Hyperparameters {
            max_depth: 42,
            ..Hyperparameters::default()
        };
        let err = params.check().unwrap_err();
        assert!(err.to_string().contains("max depth"));

        let params = Hyperparameters {
            learning_rate: f64::NAN,
            ..Hyperparameters::default()
        };
        assert!(params.check().is_err());
    }

    #[test]
    fn test_clamped() {
        let params = Hyperparameters {
            learning_rate: 5.0,
            estimators: 10,
            max_depth: 100,
            subsample: f64::NAN,
            regularization: -1.0,
        }
        .clamped();

        assert!((params.learning_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(params.estimators, 50);
        assert_eq!(params.max_depth, 20);
        assert!((params.subsample - 0.5).abs() < f64::EPSILON);
        assert!(params.regularization.abs() < f64::EPSILON);
        assert!(params.check().is_ok());
    }

    #[test]
    fn test_random_metrics_bounds() {
        for _ in 0..200 {
            let m = MetricsSource::Random.generate();
            assert!((91.0..96.0).contains(&m.accuracy));
            assert!((88.0..93.0).contains(&m.precision));
            assert!((93.0..98.0).contains(&m.recall));
        }
    }

    #[test]
    fn test_trained_ids_are_unique() {
        let params = Hyperparameters::default();
        let a = ModelRecord::trained("a".into(), params, MetricsSource::Fixed.generate());
        let b = ModelRecord::trained("b".into(), params, MetricsSource::Fixed.generate());
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("model-"));
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(ModelRecord::base()).unwrap();
        assert_eq!(json["type"], "XGBoost");
        assert_eq!(json["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(json["parameters"]["learningRate"], 0.01);
        assert_eq!(json["parameters"]["maxDepth"], 5);
    }
}
