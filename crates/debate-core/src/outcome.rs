use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, SessionId};

/// Aggregated verdict fetched once a debate completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebateOutcome {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub final_predictions: Vec<FinalPrediction>,
    #[serde(default)]
    pub summary: DebateSummary,
}

impl DebateOutcome {
    /// Mean predicted percentage for `outcome` across participants that
    /// reported one.
    pub fn average_for(&self, outcome: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .final_predictions
            .iter()
            .filter_map(|p| p.predictions.get(outcome).copied())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalPrediction {
    #[serde(default)]
    pub model_id: Option<ParticipantId>,
    pub model_name: String,
    #[serde(default)]
    pub predictions: BTreeMap<String, f64>,
    /// Movement since the opening prediction, e.g. "+5.0%".
    #[serde(default)]
    pub change: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateSummary {
    #[serde(default)]
    pub overall: String,
    #[serde(default)]
    pub consensus: String,
    #[serde(default)]
    pub rationales: Vec<ModelRationale>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRationale {
    pub model_name: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub key_arguments: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "session_id": "s-1",
        "final_predictions": [
            {"model_name":"GPT X","predictions":{"Yes":60.0,"No":40.0},"change":"+5.0%"},
            {"model_name":"Claude Y","predictions":{"Yes":70.0,"No":30.0}}
        ],
        "summary": {
            "overall": "Both lean yes.",
            "consensus": "Moderate agreement",
            "rationales": [
                {"model_name":"GPT X","rationale":"Polling","key_arguments":["lead in polls","incumbency"]}
            ]
        }
    }"#;

    #[test]
    fn decode_full_outcome() {
        let outcome: DebateOutcome = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(outcome.session_id.as_ref().map(SessionId::as_str), Some("s-1"));
        assert_eq!(outcome.final_predictions.len(), 2);
        assert_eq!(outcome.final_predictions[0].change.as_deref(), Some("+5.0%"));
        assert!(outcome.final_predictions[1].change.is_none());
        assert_eq!(outcome.summary.rationales[0].key_arguments.len(), 2);
    }

    #[test]
    fn average_across_participants() {
        let outcome: DebateOutcome = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(outcome.average_for("Yes"), Some(65.0));
        assert_eq!(outcome.average_for("Maybe"), None);
    }

    #[test]
    fn minimal_outcome_decodes() {
        let outcome: DebateOutcome = serde_json::from_str("{}").unwrap();
        assert!(outcome.final_predictions.is_empty());
        assert_eq!(outcome.summary, DebateSummary::default());
    }
}
