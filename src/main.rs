// src/main.rs
mod config;
mod document;
mod extractors;
mod model;
mod storage;
mod utils;

use clap::Parser;
use config::{Args, MODEL_URL_ENV, NER_MODEL_URL_ENV};
use extractors::record::COMPANY_NAME;
use extractors::{EntityTagger, FinancialExtractor, PatternTagger, TransformerTagger};
use storage::{StorageManager, XLSX_MIME_TYPE};
use utils::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging("info");

    // 2. Parse CLI Arguments and resolve defaults
    let args = Args::parse();
    tracing::info!("Starting extraction for args: {:?}", args);
    let config = args.into_config(
        std::env::var(MODEL_URL_ENV).ok(),
        std::env::var(NER_MODEL_URL_ENV).ok(),
    )?;
    tracing::debug!("Resolved configuration: {:?}", config);

    // 3. Build the entity tagger (may download model files once)
    let tagger: Box<dyn EntityTagger> = match &config.checkpoint {
        Some(source) => Box::new(model::load_checkpoint(source, TransformerTagger::from_dir).await?),
        None => {
            let tagger_model = model::load_model(&config.model_source).await?;
            Box::new(PatternTagger::new(&tagger_model)?)
        }
    };

    // 4. Initialize extractor and storage
    let extractor = FinancialExtractor::new(tagger, config.field_set)?;
    let storage = StorageManager::new(&config.output_path)?;
    tracing::info!(
        "Writing '{}' rows to {} ({} mode)",
        config.field_set,
        storage.output_path().display(),
        config.mode
    );

    // 5. Process each document
    let mut records = Vec::with_capacity(config.inputs.len());
    let mut sources = Vec::with_capacity(config.inputs.len());
    let mut failure_count = 0;

    for input in &config.inputs {
        let extracted = document::read_pdf_text(input, config.page_join)
            .map_err(AppError::from)
            .and_then(|text| extractor.extract(&text).map_err(AppError::from));
        match extracted {
            Ok(record) => {
                tracing::info!(
                    "Extracted record from {} (company: '{}')",
                    input.display(),
                    record.get(COMPANY_NAME).unwrap_or_default()
                );
                records.push(record);
                sources.push(input.clone());
            }
            Err(e) => {
                tracing::error!("Failed to extract {}: {}", input.display(), e);
                failure_count += 1;
            }
        }
    }

    tracing::info!(
        "Documents processed. Success: {}, Failures: {}",
        records.len(),
        failure_count
    );

    if records.is_empty() {
        return Err(AppError::Processing(format!(
            "No document could be extracted ({} failure(s))",
            failure_count
        )));
    }

    // 6. Write the spreadsheet (and optional metadata)
    let summary = storage.save_records(&records, config.field_set, config.mode)?;

    if config.write_metadata {
        match storage.save_records_metadata(&summary, &sources) {
            Ok(path) => tracing::info!("Saved run metadata to: {}", path.display()),
            Err(e) => tracing::error!("Failed to save run metadata: {}", e),
        }
    }

    if config.print_json {
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| AppError::Processing(format!("Failed to serialize records: {}", e)))?;
        println!("{}", json);
    }

    tracing::info!(
        "Extraction completed: {} ({}, {} data row(s))",
        summary.path.display(),
        XLSX_MIME_TYPE,
        summary.total_data_rows
    );

    Ok(())
}
