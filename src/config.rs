// src/config.rs
use crate::document::PageJoin;
use crate::extractors::record::FieldSet;
use crate::model::{CheckpointSource, ModelSource};
use crate::storage::WriteMode;
use crate::utils::AppError;
use clap::Parser;
use std::path::PathBuf;

/// Environment variable consulted for the tagger model download URL
pub const MODEL_URL_ENV: &str = "FINEX_MODEL_URL";
/// Environment variable consulted for the NER checkpoint base URL
pub const NER_MODEL_URL_ENV: &str = "FINEX_NER_MODEL_URL";

/// Command Line Interface for the PDF financial figure extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PDF documents to extract (one spreadsheet row each)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Column layout of the output spreadsheet
    #[arg(short, long, value_enum, default_value_t = FieldSet::Summary)]
    pub fields: FieldSet,

    /// Output spreadsheet (defaults to financial_data.xlsx or valuation_template.xlsx)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite the output or append to it (defaults: summary overwrites, valuation appends)
    #[arg(short, long, value_enum)]
    pub mode: Option<WriteMode>,

    /// How page texts are joined
    #[arg(long, value_enum, default_value_t = PageJoin::Newline)]
    pub page_join: PageJoin,

    /// Tagger model file (JSON); the builtin model is used when omitted
    #[arg(long, conflicts_with = "ner_model")]
    pub model: Option<PathBuf>,

    /// URL to fetch the tagger model from when the model file cannot be loaded
    #[arg(long)]
    pub model_url: Option<String>,

    /// Directory of a token-classification checkpoint (model.onnx, tokenizer.json,
    /// config.json); tags entities with the pretrained model instead of patterns
    #[arg(long)]
    pub ner_model: Option<PathBuf>,

    /// Base URL the checkpoint files are fetched from when the directory cannot be loaded
    #[arg(long)]
    pub ner_model_url: Option<String>,

    /// Also write <output>.meta.json describing the run
    #[arg(long)]
    pub metadata: bool,

    /// Print the extracted records to stdout as JSON
    #[arg(long)]
    pub json: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub inputs: Vec<PathBuf>,
    pub field_set: FieldSet,
    pub output_path: PathBuf,
    pub mode: WriteMode,
    pub page_join: PageJoin,
    pub model_source: ModelSource,
    /// When set, entities come from this checkpoint rather than `model_source`
    pub checkpoint: Option<CheckpointSource>,
    pub write_metadata: bool,
    pub print_json: bool,
}

fn default_mode(field_set: FieldSet) -> WriteMode {
    match field_set {
        FieldSet::Summary => WriteMode::Overwrite,
        FieldSet::Valuation => WriteMode::Append,
    }
}

/// A flag value wins over the environment; blank values count as unset.
fn pick_url(flag: Option<String>, env: Option<String>) -> Option<String> {
    flag.or(env).filter(|url| !url.trim().is_empty())
}

impl Args {
    /// Applies per-field-set defaults. `env_model_url` and `env_ner_url` are
    /// the values of `FINEX_MODEL_URL` and `FINEX_NER_MODEL_URL`; the
    /// matching flags take precedence over them.
    pub fn into_config(
        self,
        env_model_url: Option<String>,
        env_ner_url: Option<String>,
    ) -> Result<PipelineConfig, AppError> {
        let model_source = match self.model {
            Some(path) => ModelSource::File {
                path,
                fetch_url: pick_url(self.model_url, env_model_url),
            },
            None if self.model_url.is_some() => {
                return Err(AppError::Config("--model-url requires --model <PATH> to store the download".to_string()));
            }
            None => ModelSource::Builtin,
        };

        let checkpoint = match self.ner_model {
            Some(dir) => Some(CheckpointSource {
                dir,
                fetch_base: pick_url(self.ner_model_url, env_ner_url),
            }),
            None if self.ner_model_url.is_some() => {
                return Err(AppError::Config(
                    "--ner-model-url requires --ner-model <DIR> to store the download".to_string(),
                ));
            }
            None => None,
        };

        for input in &self.inputs {
            let is_pdf = input
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
            if !is_pdf {
                tracing::warn!("Input {} does not have a .pdf extension", input.display());
            }
        }

        Ok(PipelineConfig {
            output_path: self
                .output
                .unwrap_or_else(|| PathBuf::from(self.fields.default_output_file())),
            mode: self.mode.unwrap_or_else(|| default_mode(self.fields)),
            field_set: self.fields,
            inputs: self.inputs,
            page_join: self.page_join,
            model_source,
            checkpoint,
            write_metadata: self.metadata,
            print_json: self.json,
        })
    }
}
