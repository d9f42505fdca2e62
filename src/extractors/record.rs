// src/extractors/record.rs
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

pub const COMPANY_NAME: &str = "Company Name";
pub const LOCATION: &str = "Location";
pub const DATE: &str = "Date";

// --- Column layouts ---
const SUMMARY_COLUMNS: &[&str] = &[
    "Company Name",
    "Revenue",
    "EBITDA",
    "Industry",
    "Location",
    "Date",
    "Gross Profit",
    "Net Sales",
    "COGS",
    "Total Operating Expenses",
    "Operating Income",
    "Adjusted EBITDA",
];

const SUMMARY_TERMS: &[&str] = &[
    "Revenue",
    "EBITDA",
    "Gross Profit",
    "Net Sales",
    "COGS",
    "Total Operating Expenses",
    "Operating Income",
    "Adjusted EBITDA",
];

const VALUATION_COLUMNS: &[&str] = &[
    "Company Name",
    "Revenue",
    "EBITDA",
    "Industry",
    "Location",
    "Date",
    "Gross Revenues",
    "Owner salary",
    "Adjusted EBITDA",
    "COGS",
    "Gross Profit",
    "Total Operating Expenses",
    "Operating Income",
    "Net Pre-Tax Income",
    "Employees",
    "Interest",
    "Current Assets",
    "Cash and Cash Equivalents",
    "Investment",
    "Bank Loan",
    "Seller's Note Value",
    "WACC",
    "Risk Factor",
    "Revenue Growth",
    "Quality of Management Team",
    "Quality of Staff",
];

const VALUATION_TERMS: &[&str] = &[
    "Revenue",
    "EBITDA",
    "Gross Revenues",
    "Owner salary",
    "COGS",
    "Gross Profit",
    "Total Operating Expenses",
    "Operating Income",
    "Net Pre-Tax Income",
    "Adjusted EBITDA",
];

/// The fixed column layout a record is extracted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FieldSet {
    /// Headline financial figures (financial_data.xlsx)
    #[default]
    Summary,
    /// Business valuation template (valuation_template.xlsx)
    Valuation,
}

impl FieldSet {
    /// Column names in header order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            FieldSet::Summary => SUMMARY_COLUMNS,
            FieldSet::Valuation => VALUATION_COLUMNS,
        }
    }

    /// Terms scanned for with a keyword-anchored numeric regex. Every term is
    /// also a column.
    pub fn figure_terms(self) -> &'static [&'static str] {
        match self {
            FieldSet::Summary => SUMMARY_TERMS,
            FieldSet::Valuation => VALUATION_TERMS,
        }
    }

    pub fn default_output_file(self) -> &'static str {
        match self {
            FieldSet::Summary => "financial_data.xlsx",
            FieldSet::Valuation => "valuation_template.xlsx",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldSet::Summary => "summary",
            FieldSet::Valuation => "valuation",
        }
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One flat row of extracted values, keyed by the columns of its field set.
/// Unresolved fields hold an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRecord {
    field_set: FieldSet,
    values: Vec<String>,
}

impl ExtractionRecord {
    pub fn new(field_set: FieldSet) -> Self {
        Self {
            field_set,
            values: vec![String::new(); field_set.columns().len()],
        }
    }

    pub fn field_set(&self) -> FieldSet {
        self.field_set
    }

    fn index_of(&self, field: &str) -> Option<usize> {
        self.field_set.columns().iter().position(|c| *c == field)
    }

    /// Returns the value of `field`, or `None` if the field set has no such column.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.index_of(field).map(|i| self.values[i].as_str())
    }

    /// Sets `field`. Returns false (and changes nothing) for unknown fields.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        match self.index_of(field) {
            Some(i) => {
                self.values[i] = value.into();
                true
            }
            None => false,
        }
    }

    /// Sets `field` only while it is still empty.
    pub fn set_if_empty(&mut self, field: &str, value: &str) -> bool {
        match self.index_of(field) {
            Some(i) if self.values[i].is_empty() => {
                self.values[i] = value.to_string();
                true
            }
            _ => false,
        }
    }

    /// Values in header order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// (column, value) pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.field_set
            .columns()
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn filled_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_empty()).count()
    }
}

// Serialized as a JSON object whose keys keep header order.
impl Serialize for ExtractionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}
