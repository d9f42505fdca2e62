// src/extractors/entities.rs
use crate::model::TaggerModel;
use crate::utils::error::ExtractError;
use regex::Regex;
use std::fmt;

// --- Data Structures ---

/// Semantic category of a tagged span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityLabel {
    Organization,
    GeoPolitical,
    Date,
    Other(String),
}

impl EntityLabel {
    /// Parses a model tag such as `ORG`, `B-ORG`, `I-GPE` or `DATE`.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        let bare = match tag.split_once('-') {
            Some((prefix, rest)) if matches!(prefix, "B" | "I" | "E" | "S" | "L" | "U") => rest,
            _ => tag,
        };
        match bare.to_ascii_uppercase().as_str() {
            "ORG" => EntityLabel::Organization,
            "GPE" => EntityLabel::GeoPolitical,
            "DATE" => EntityLabel::Date,
            _ => EntityLabel::Other(bare.to_string()),
        }
    }
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityLabel::Organization => f.write_str("ORG"),
            EntityLabel::GeoPolitical => f.write_str("GPE"),
            EntityLabel::Date => f.write_str("DATE"),
            EntityLabel::Other(tag) => f.write_str(tag),
        }
    }
}

/// A labelled span of the document text. `start`/`end` are byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEntity {
    pub label: EntityLabel,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Anything that turns document text into an ordered list of labelled spans.
pub trait EntityTagger {
    fn name(&self) -> &str;

    /// Tags the whole text. Results are ordered by start offset and do not
    /// overlap.
    fn tag(&self, text: &str) -> Result<Vec<TaggedEntity>, ExtractError>;
}

// --- Pattern Tagger ---

/// Tagger driven by a `TaggerModel`: organization-suffix rules, a location
/// gazetteer, date regexes and any extra labelled patterns from the model.
pub struct PatternTagger {
    model_name: String,
    rules: Vec<(EntityLabel, Regex)>,
}

const NAME_WORD: &str = r"[A-Z][\w'&\-]*";

/// Escapes a literal and closes it with a word boundary when it ends in a
/// word character ("U.S." must not require one).
fn bounded_literal(literal: &str) -> String {
    let escaped = regex::escape(literal);
    match literal.chars().last() {
        Some(c) if c.is_alphanumeric() => format!(r"{}\b", escaped),
        _ => escaped,
    }
}

/// Alternation of literals, longest first so "New York City" beats "New York".
fn literal_alternation(literals: &[String]) -> String {
    let mut sorted: Vec<&String> = literals.iter().filter(|s| !s.trim().is_empty()).collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    sorted.iter().map(|s| bounded_literal(s.trim())).collect::<Vec<_>>().join("|")
}

fn organization_pattern(suffixes: &[String]) -> String {
    // Suffixes are matched without a trailing period, which is then optional
    let trimmed: Vec<String> = suffixes
        .iter()
        .map(|s| s.trim().trim_end_matches('.').to_string())
        .collect();
    format!(
        r"\b{w}(?:[ \t]+(?:{w}|&|and|of)){{0,4}},?[ \t]+(?:{suffixes})\.?",
        w = NAME_WORD,
        suffixes = literal_alternation(&trimmed),
    )
}

fn compile(label: &EntityLabel, pattern: &str) -> Result<Regex, ExtractError> {
    Regex::new(pattern).map_err(|e| ExtractError::RegexError(format!("{} rule: {}", label, e)))
}

impl PatternTagger {
    pub fn new(model: &TaggerModel) -> Result<Self, ExtractError> {
        let mut rules = Vec::new();

        if !model.organization_suffixes.is_empty() {
            let label = EntityLabel::Organization;
            let re = compile(&label, &organization_pattern(&model.organization_suffixes))?;
            rules.push((label, re));
        }

        if !model.locations.is_empty() {
            let label = EntityLabel::GeoPolitical;
            let pattern = format!(r"\b(?:{})", literal_alternation(&model.locations));
            let re = compile(&label, &pattern)?;
            rules.push((label, re));
        }

        for pattern in &model.date_patterns {
            let re = compile(&EntityLabel::Date, pattern)?;
            rules.push((EntityLabel::Date, re));
        }

        for extra in &model.extra_patterns {
            let label = EntityLabel::from_tag(&extra.label);
            if extra.pattern.is_empty() {
                return Err(ExtractError::InvalidModel(format!("empty pattern for label '{}'", extra.label)));
            }
            let re = compile(&label, &extra.pattern)?;
            rules.push((label, re));
        }

        tracing::debug!("PatternTagger '{}' compiled {} rules", model.name, rules.len());
        Ok(Self { model_name: model.name.clone(), rules })
    }
}

impl EntityTagger for PatternTagger {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn tag(&self, text: &str) -> Result<Vec<TaggedEntity>, ExtractError> {
        let mut candidates: Vec<TaggedEntity> = self
            .rules
            .iter()
            .flat_map(|(label, re)| {
                re.find_iter(text).map(move |m| TaggedEntity {
                    label: label.clone(),
                    text: m.as_str().trim().to_string(),
                    start: m.start(),
                    end: m.end(),
                })
            })
            .filter(|e| !e.text.is_empty())
            .collect();

        // Earliest start first; on ties the longest span
        candidates.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.end.cmp(&a.end)));

        let mut entities: Vec<TaggedEntity> = Vec::with_capacity(candidates.len());
        let mut covered_until = 0;
        for candidate in candidates {
            if candidate.start < covered_until {
                continue; // Overlaps an accepted span
            }
            covered_until = candidate.end;
            entities.push(candidate);
        }

        tracing::debug!("Tagged {} entities", entities.len());
        Ok(entities)
    }
}
