//! Weighted aggregation of the five judge verdicts into one score.

use super::judge::{JudgeDimension, JudgeFlags};
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-dimension weights for the overall score.
///
/// Only these five keys are recognized; overrides naming anything else are
/// ignored so the result schema cannot drift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    pub retrieval_relevance: f64,
    pub retrieval_correctness: f64,
    pub answer_grounding: f64,
    pub answer_accuracy: f64,
    pub answer_clarity: f64,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            retrieval_relevance: 0.25,
            retrieval_correctness: 0.25,
            answer_grounding: 0.20,
            answer_accuracy: 0.20,
            answer_clarity: 0.10,
        }
    }
}

impl MetricWeights {
    /// Weight of one dimension.
    pub fn weight(&self, dimension: JudgeDimension) -> f64 {
        match dimension {
            JudgeDimension::RetrievalRelevance => self.retrieval_relevance,
            JudgeDimension::RetrievalCorrectness => self.retrieval_correctness,
            JudgeDimension::AnswerGrounding => self.answer_grounding,
            JudgeDimension::AnswerAccuracy => self.answer_accuracy,
            JudgeDimension::AnswerClarity => self.answer_clarity,
        }
    }

    /// Set the weight for a metric key. Returns `false` for unknown keys.
    pub fn set(&mut self, key: &str, value: f64) -> bool {
        let Some(dimension) = JudgeDimension::from_key(key) else {
            debug!(key, "ignoring unknown weight key");
            return false;
        };
        let slot = match dimension {
            JudgeDimension::RetrievalRelevance => &mut self.retrieval_relevance,
            JudgeDimension::RetrievalCorrectness => &mut self.retrieval_correctness,
            JudgeDimension::AnswerGrounding => &mut self.answer_grounding,
            JudgeDimension::AnswerAccuracy => &mut self.answer_accuracy,
            JudgeDimension::AnswerClarity => &mut self.answer_clarity,
        };
        *slot = value;
        true
    }

    /// Apply a JSON object of overrides on top of these weights.
    ///
    /// Keys not named here keep their current value.
    pub fn with_override_json(mut self, json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| EvalError::Config(format!("Invalid weights override JSON: {}", e)))?;

        let object = value.as_object().ok_or_else(|| {
            EvalError::Config("Weights override must be a JSON object".to_string())
        })?;

        for (key, raw) in object {
            if JudgeDimension::from_key(key).is_none() {
                debug!(key = key.as_str(), "ignoring unknown weight key");
                continue;
            }
            let weight = raw.as_f64().ok_or_else(|| {
                EvalError::Config(format!("Weight for '{}' must be a number, got {}", key, raw))
            })?;
            self.set(key, weight);
        }

        self.validate()?;
        Ok(self)
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        JudgeDimension::ALL.iter().map(|d| self.weight(*d)).sum()
    }

    /// Reject weight vectors that cannot produce a score in [0, 1].
    pub fn validate(&self) -> Result<()> {
        for dimension in JudgeDimension::ALL {
            let weight = self.weight(dimension);
            if !weight.is_finite() || weight < 0.0 {
                return Err(EvalError::Config(format!(
                    "Weight for '{}' must be a finite non-negative number, got {}",
                    dimension.key(),
                    weight
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(EvalError::Config(
                "At least one metric weight must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Weighted mean of the judge booleans, normalized by the weight sum.
    ///
    /// Always in [0, 1]; a degenerate weight vector scores 0.
    pub fn overall_score(&self, flags: &JudgeFlags) -> f64 {
        let total = self.total();
        if !(total.is_finite() && total > 0.0) {
            return 0.0;
        }

        let earned: f64 = JudgeDimension::ALL
            .iter()
            .filter(|d| flags.get(**d))
            .map(|d| self.weight(*d))
            .sum();

        (earned / total).clamp(0.0, 1.0)
    }
}
