//! Attribute suggestions from the extraction service.
//!
//! Suggestions are plain data: a path, a value and a confidence. Confident
//! suggestions seed the model through the same merge as dialogue answers;
//! the rest are kept as hints and offered alongside the matching gap.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::merge::merge_answer;
use crate::model::BuildingModel;
use crate::path::FieldPath;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub path: FieldPath,
    pub value: Value,
    /// Between 0 and 1.
    pub confidence: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSet {
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

impl SuggestionSet {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let string = fs::read_to_string(path)
            .with_context(|| format!("Failed to read suggestions {}", path.display()))?;
        Self::from_json(&string)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(json5::from_str(json)?)
    }

    /// Split into suggestions at or above `threshold` and hints below it.
    pub fn partition(self, threshold: f64) -> (Vec<Suggestion>, Vec<Suggestion>) {
        self.suggestions
            .into_iter()
            .partition(|suggestion| suggestion.confidence >= threshold)
    }
}

/// Model built from suggestions, and what was not applied.
#[derive(Clone, Debug, PartialEq)]
pub struct SeededModel {
    pub model: BuildingModel,
    pub hints: Vec<Suggestion>,
}

/// Merge confident suggestions into an empty model.
///
/// A suggestion may depend on another one (a zone attached to a system that
/// a later suggestion creates), so merging repeats over the remainder while
/// it makes progress. Suggestions that never fit become hints.
pub fn seed_model(suggestions: SuggestionSet, threshold: f64) -> SeededModel {
    let (mut pending, mut hints) = suggestions.partition(threshold);
    let mut model = BuildingModel::default();

    loop {
        let before = pending.len();
        let mut rest = Vec::new();
        for suggestion in pending {
            match merge_answer(&model, &suggestion.path, suggestion.value.clone()) {
                Ok(merged) => {
                    debug!(path = %suggestion.path, "applied suggestion");
                    model = merged;
                }
                Err(_) => rest.push(suggestion),
            }
        }
        pending = rest;
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    for suggestion in &pending {
        warn!(path = %suggestion.path, "suggestion does not fit the model, keeping it as a hint");
    }
    hints.extend(pending);
    info!(hints = hints.len(), "seeded model from suggestions");
    SeededModel { model, hints }
}
