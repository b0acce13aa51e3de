use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PredictError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PredictionResponse {
    pub prediction: String,
    pub probability: f64,
    pub all_probabilities: Map<String, Value>,
}

impl PredictionResponse {
    /// Pairs every score with its label. Indices past the end of `labels`
    /// fall back to their decimal index.
    pub fn from_scores(scores: &[f32], labels: &[String]) -> Result<Self, PredictError> {
        let top = argmax(scores)
            .ok_or_else(|| PredictError::OutputShape("model returned no scores".to_string()))?;

        let mut all_probabilities = Map::with_capacity(scores.len());
        for (index, &score) in scores.iter().enumerate() {
            all_probabilities.insert(label_for(labels, index), Value::from(round6(score)));
        }

        Ok(PredictionResponse {
            prediction: label_for(labels, top),
            probability: round6(scores[top]),
            all_probabilities,
        })
    }
}

fn label_for(labels: &[String], index: usize) -> String {
    labels
        .get(index)
        .cloned()
        .unwrap_or_else(|| index.to_string())
}

/// First NaN wins, otherwise the first maximum.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            return Some(index);
        }
        match best {
            Some((_, value)) if score <= value => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

pub fn round6(value: f32) -> f64 {
    (f64::from(value) * 1e6).round() / 1e6
}
