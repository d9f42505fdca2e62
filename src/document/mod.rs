// src/document/mod.rs
pub mod reader;

pub use reader::{read_pdf_text, PageJoin};
