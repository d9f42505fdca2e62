// src/extractors/mod.rs
pub mod entities;
pub mod figures;
pub mod ner;
pub mod record;
pub mod resolver;

pub use entities::{EntityTagger, PatternTagger};
pub use ner::TransformerTagger;
pub use resolver::FinancialExtractor;
