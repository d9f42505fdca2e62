// src/model/mod.rs
//! Tagger models: the data a `PatternTagger` is built from, the file layout
//! of a token-classification checkpoint, and loading/fetching of both.
pub mod fetch;
pub mod loader;

use crate::utils::error::ModelError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use loader::{load_checkpoint, load_model, CheckpointSource, ModelSource};

/// ONNX export of the token-classification network
pub const CHECKPOINT_WEIGHTS: &str = "model.onnx";
pub const CHECKPOINT_TOKENIZER: &str = "tokenizer.json";
/// Hugging Face model config carrying `id2label`
pub const CHECKPOINT_CONFIG: &str = "config.json";
/// Files a checkpoint directory must hold, fetched together when missing
pub const CHECKPOINT_FILES: [&str; 3] = [CHECKPOINT_WEIGHTS, CHECKPOINT_TOKENIZER, CHECKPOINT_CONFIG];

/// A labelled regex supplied by a model file, e.g. `{"label": "B-ORG", "pattern": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledPattern {
    pub label: String,
    pub pattern: String,
}

/// Everything the pattern tagger needs to recognise entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggerModel {
    pub name: String,
    /// Words that end an organization name ("Inc", "LLC", "Holdings", ...)
    #[serde(default)]
    pub organization_suffixes: Vec<String>,
    /// Place names tagged as geo-political entities
    #[serde(default)]
    pub locations: Vec<String>,
    /// Regexes whose whole match is a date
    #[serde(default)]
    pub date_patterns: Vec<String>,
    #[serde(default)]
    pub extra_patterns: Vec<LabelledPattern>,
}

const BUILTIN_ORG_SUFFIXES: &[&str] = &[
    "Incorporated", "Inc", "Corporation", "Corp", "Company", "Co", "LLC", "L.L.C", "LLP",
    "L.P", "LP", "Limited", "Ltd", "PLC", "plc", "Holdings", "Group", "Partners",
    "Technologies", "Industries", "Enterprises", "Bancorp", "GmbH", "AG", "S.A", "N.V",
];

const BUILTIN_LOCATIONS: &[&str] = &[
    // Countries
    "United States", "United States of America", "USA", "U.S.", "United Kingdom", "UK",
    "Canada", "Mexico", "Brazil", "Argentina", "Chile", "Colombia", "Peru", "Germany",
    "France", "Italy", "Spain", "Portugal", "Netherlands", "Belgium", "Switzerland",
    "Austria", "Sweden", "Norway", "Denmark", "Finland", "Ireland", "Poland", "Greece",
    "Turkey", "Russia", "Ukraine", "Israel", "Egypt", "Nigeria", "Ghana", "Kenya",
    "South Africa", "Morocco", "Saudi Arabia", "United Arab Emirates", "UAE", "Qatar",
    "India", "Pakistan", "Bangladesh", "China", "Japan", "South Korea", "Korea",
    "Singapore", "Malaysia", "Indonesia", "Thailand", "Vietnam", "Philippines",
    "Australia", "New Zealand",
    // US states
    "Alabama", "Alaska", "Arizona", "Arkansas", "California", "Colorado", "Connecticut",
    "Delaware", "Florida", "Georgia", "Hawaii", "Idaho", "Illinois", "Indiana", "Iowa",
    "Kansas", "Kentucky", "Louisiana", "Maine", "Maryland", "Massachusetts", "Michigan",
    "Minnesota", "Mississippi", "Missouri", "Montana", "Nebraska", "Nevada",
    "New Hampshire", "New Jersey", "New Mexico", "New York", "North Carolina",
    "North Dakota", "Ohio", "Oklahoma", "Oregon", "Pennsylvania", "Rhode Island",
    "South Carolina", "South Dakota", "Tennessee", "Texas", "Utah", "Vermont", "Virginia",
    "Washington", "West Virginia", "Wisconsin", "Wyoming",
    // Cities
    "New York City", "Los Angeles", "San Francisco", "Chicago", "Houston", "Dallas",
    "Austin", "Seattle", "Boston", "Miami", "Atlanta", "Denver", "Phoenix", "Philadelphia",
    "San Diego", "Toronto", "Vancouver", "Montreal", "London", "Paris", "Berlin", "Munich",
    "Frankfurt", "Amsterdam", "Zurich", "Geneva", "Madrid", "Milan", "Dublin", "Stockholm",
    "Dubai", "Lagos", "Abuja", "Nairobi", "Johannesburg", "Cairo", "Mumbai", "Delhi",
    "Bangalore", "Beijing", "Shanghai", "Hong Kong", "Tokyo", "Seoul", "Sydney", "Melbourne",
];

const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December";
const MONTHS_SHORT: &str = "Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec";

static BUILTIN_MODEL: Lazy<TaggerModel> = Lazy::new(build_builtin);

fn build_builtin() -> TaggerModel {
    let month_day_year = format!(
        r"\b(?:{MONTHS}|(?:{MONTHS_SHORT})\.?)[ \t]+\d{{1,2}}(?:st|nd|rd|th)?,?[ \t]+\d{{4}}\b"
    );
    let day_month_year = format!(
        r"\b\d{{1,2}}[ \t]+(?:{MONTHS}|(?:{MONTHS_SHORT})\.?),?[ \t]+\d{{4}}\b"
    );
    let month_year = format!(r"\b(?:{MONTHS})[ \t]+\d{{4}}\b");

    TaggerModel {
        name: "builtin".to_string(),
        organization_suffixes: BUILTIN_ORG_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        locations: BUILTIN_LOCATIONS.iter().map(|s| s.to_string()).collect(),
        date_patterns: vec![
            month_day_year,
            day_month_year,
            month_year,
            r"\b\d{4}-\d{2}-\d{2}\b".to_string(),
            r"\b\d{1,2}/\d{1,2}/\d{2,4}\b".to_string(),
            r"\b(?:Q[1-4]|FY)[ \t]?\d{4}\b".to_string(),
            r"\b(?:[Ff]iscal [Yy]ear)[ \t]+\d{4}\b".to_string(),
        ],
        extra_patterns: Vec::new(),
    }
}

impl TaggerModel {
    /// The model compiled into the binary.
    pub fn builtin() -> Self {
        BUILTIN_MODEL.clone()
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        serde_json::from_str(json).map_err(|e| ModelError::Parse(e.to_string()))
    }

    #[cfg(test)]
    pub fn to_json(&self) -> Result<String, ModelError> {
        serde_json::to_string_pretty(self).map_err(|e| ModelError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_survives_json() {
        let model = TaggerModel::builtin();
        let json = model.to_json().unwrap();
        assert_eq!(TaggerModel::from_json(&json).unwrap(), model);
    }

    #[test]
    fn test_sparse_model_file_uses_defaults() {
        let model = TaggerModel::from_json(r#"{"name": "places-only", "locations": ["Lagos"]}"#).unwrap();
        assert_eq!(model.locations, vec!["Lagos".to_string()]);
        assert!(model.organization_suffixes.is_empty());
        assert!(model.extra_patterns.is_empty());
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(TaggerModel::from_json("not json"), Err(ModelError::Parse(_))));
    }
}
