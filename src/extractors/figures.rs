// src/extractors/figures.rs
use crate::extractors::record::{ExtractionRecord, FieldSet};
use crate::utils::error::ExtractError;
use regex::Regex;

/// Builds the keyword-anchored pattern for one term: the term, optional
/// whitespace/colons, an optional dollar sign, then the number run.
pub fn figure_pattern(term: &str) -> String {
    format!(r"{}[\s:]*\$?([\d,.]+)", regex::escape(term))
}

/// Compiled figure patterns for one field set.
#[derive(Debug, Clone)]
pub struct FigureScanner {
    patterns: Vec<(&'static str, Regex)>,
}

impl FigureScanner {
    pub fn new(field_set: FieldSet) -> Result<Self, ExtractError> {
        let patterns = field_set
            .figure_terms()
            .iter()
            .map(|term| {
                Regex::new(&figure_pattern(term))
                    .map(|re| (*term, re))
                    .map_err(|e| ExtractError::RegexError(format!("'{}': {}", term, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Compiled {} figure patterns for '{}'", patterns.len(), field_set);
        Ok(Self { patterns })
    }

    /// First captured figure for each term, in term order. Terms with no match
    /// are omitted.
    pub fn scan<'t>(&self, text: &'t str) -> Vec<(&'static str, &'t str)> {
        self.patterns
            .iter()
            .filter_map(|(term, re)| {
                let value = re.captures(text)?.get(1)?.as_str();
                tracing::trace!("Figure '{}' => '{}'", term, value);
                Some((*term, value))
            })
            .collect()
    }

    /// Writes every matched figure into `record`, verbatim.
    pub fn apply(&self, text: &str, record: &mut ExtractionRecord) {
        for (term, value) in self.scan(text) {
            record.set(term, value);
        }
    }
}
