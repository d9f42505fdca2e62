// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input is not a valid PDF document: {0}")]
    InvalidFormat(String),

    #[error("Failed to extract text from page {page}: {reason}")]
    PageText { page: u32, reason: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Regular expression error: {0}")]
    RegexError(String),

    #[error("Invalid tagger model: {0}")]
    InvalidModel(String),

    #[error("Entity model inference failed: {0}")]
    Inference(String),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse tagger model: {0}")]
    Parse(String),

    #[error("Tagger model could not be loaded from {path}: {reason}")]
    Unavailable { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Spreadsheet write error: {0}")]
    WriteError(#[from] rust_xlsxwriter::XlsxError),

    #[error("Spreadsheet read/update error: {0}")]
    WorkbookError(#[from] umya_spreadsheet::reader::xlsx::XlsxError),

    #[error("Workbook {0} has no worksheet")]
    NoWorksheet(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Existing header in {path} does not match the '{field_set}' columns (found: {found:?})")]
    HeaderMismatch {
        path: String,
        field_set: String,
        found: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Document could not be read: {0}")]
    Document(#[from] DocumentError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Tagger model error: {0}")]
    Model(#[from] ModelError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
