// src/extractors/resolver.rs
use crate::extractors::entities::{EntityLabel, EntityTagger, TaggedEntity};
use crate::extractors::figures::FigureScanner;
use crate::extractors::record::{ExtractionRecord, FieldSet, COMPANY_NAME, DATE, LOCATION};
use crate::utils::error::ExtractError;

/// Record field filled by the first entity carrying `label`, if any.
fn target_field(label: &EntityLabel) -> Option<&'static str> {
    match label {
        EntityLabel::Organization => Some(COMPANY_NAME),
        EntityLabel::GeoPolitical => Some(LOCATION),
        EntityLabel::Date => Some(DATE),
        EntityLabel::Other(_) => None,
    }
}

/// Merges tagger output and regex figures into one record.
pub struct FieldResolver {
    field_set: FieldSet,
    figures: FigureScanner,
}

impl FieldResolver {
    pub fn new(field_set: FieldSet) -> Result<Self, ExtractError> {
        Ok(Self {
            field_set,
            figures: FigureScanner::new(field_set)?,
        })
    }

    /// Builds a fresh record from the document text and its tagged entities.
    ///
    /// The first entity of each target label wins; later ones are ignored.
    /// Figures come from the raw text independently of the entities.
    pub fn resolve(&self, text: &str, entities: &[TaggedEntity]) -> ExtractionRecord {
        let mut record = ExtractionRecord::new(self.field_set);

        for entity in entities {
            if let Some(field) = target_field(&entity.label) {
                if record.set_if_empty(field, &entity.text) {
                    tracing::debug!("{} <- {} '{}'", field, entity.label, entity.text);
                }
            }
        }

        self.figures.apply(text, &mut record);
        record
    }
}

/// Runs the tagger and resolver over a document's text.
pub struct FinancialExtractor {
    tagger: Box<dyn EntityTagger>,
    resolver: FieldResolver,
}

impl FinancialExtractor {
    pub fn new(tagger: Box<dyn EntityTagger>, field_set: FieldSet) -> Result<Self, ExtractError> {
        Ok(Self {
            tagger,
            resolver: FieldResolver::new(field_set)?,
        })
    }

    pub fn extract(&self, text: &str) -> Result<ExtractionRecord, ExtractError> {
        tracing::info!("Tagging {} chars with '{}'", text.len(), self.tagger.name());
        let entities = self.tagger.tag(text)?;
        let record = self.resolver.resolve(text, &entities);
        tracing::info!(
            "Resolved {}/{} fields",
            record.filled_count(),
            record.values().len()
        );
        Ok(record)
    }
}
