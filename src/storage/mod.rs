// src/storage/mod.rs
use crate::extractors::record::{ExtractionRecord, FieldSet};
use crate::utils::error::StorageError;
use rust_xlsxwriter::{Format, Workbook};
use umya_spreadsheet::NumberingFormat;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const XLSX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// How records reach the output workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WriteMode {
    /// Replace the file with a header and this run's rows
    Overwrite,
    /// Add rows after the existing ones; create the file if missing
    Append,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Overwrite => f.write_str("overwrite"),
            WriteMode::Append => f.write_str("append"),
        }
    }
}

/// Outcome of one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub field_set: FieldSet,
    pub requested_mode: WriteMode,
    /// True when append mode added to an existing workbook
    pub appended: bool,
    pub rows_written: usize,
    /// Data rows in the file after the save (header excluded)
    pub total_data_rows: usize,
}

pub struct StorageManager {
    output_path: PathBuf,
}

impl StorageManager {
    /// Creates a StorageManager writing to `output_path`, creating its parent
    /// directory if it doesn't exist
    pub fn new<P: AsRef<Path>>(output_path: P) -> Result<Self, StorageError> {
        let output_path = output_path.as_ref().to_path_buf();

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(StorageError::IoError)?;
            }
        }

        Ok(Self { output_path })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Writes `records` as rows under the `field_set` header.
    ///
    /// In append mode an existing workbook is edited in place: the new rows
    /// go after the last used row of its first sheet and everything else in
    /// the file (other sheets, numbers, formulas) is kept. Its header must
    /// equal the `field_set` columns. A missing workbook is created.
    pub fn save_records(
        &self,
        records: &[ExtractionRecord],
        field_set: FieldSet,
        mode: WriteMode,
    ) -> Result<WriteSummary, StorageError> {
        if let Some(other) = records.iter().find(|r| r.field_set() != field_set) {
            return Err(StorageError::SerializationError(format!(
                "record uses the '{}' field set, expected '{}'",
                other.field_set(),
                field_set
            )));
        }

        let rows: Vec<&[String]> = records.iter().map(|r| r.values()).collect();

        let (appended, total_data_rows) = if mode == WriteMode::Append && self.output_path.exists() {
            let existing = append_in_place(&self.output_path, field_set, &rows)?;
            (true, existing + rows.len())
        } else {
            if mode == WriteMode::Append {
                tracing::info!("{} not found; creating a new workbook", self.output_path.display());
            }
            write_new_workbook(&self.output_path, field_set.columns(), &rows)?;
            (false, rows.len())
        };

        tracing::info!("Saved {} row(s) to {}", records.len(), self.output_path.display());

        Ok(WriteSummary {
            path: self.output_path.clone(),
            field_set,
            requested_mode: mode,
            appended,
            rows_written: records.len(),
            total_data_rows,
        })
    }

    /// Saves metadata about a write in JSON format next to the workbook
    pub fn save_records_metadata(
        &self,
        summary: &WriteSummary,
        sources: &[PathBuf],
    ) -> Result<PathBuf, StorageError> {
        let file_name = self
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output.xlsx".to_string());
        let file_path = self.output_path.with_file_name(format!("{}.meta.json", file_name));

        let metadata = serde_json::json!({
            "output_file": summary.path.display().to_string(),
            "mime_type": XLSX_MIME_TYPE,
            "field_set": summary.field_set.name(),
            "columns": summary.field_set.columns(),
            "mode": summary.requested_mode.to_string(),
            "appended": summary.appended,
            "rows_written": summary.rows_written,
            "total_data_rows": summary.total_data_rows,
            "source_files": sources.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, metadata_str).map_err(StorageError::IoError)?;

        tracing::info!("Saved metadata to {}", file_path.display());

        Ok(file_path)
    }
}

/// Reads every row of the first worksheet as display strings.
///
/// Rows run up to the sheet's highest used row, so a row of blank cells
/// still counts.
#[cfg(test)]
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, StorageError> {
    let book = umya_spreadsheet::reader::xlsx::read(path)?;
    let Some(sheet) = book.get_sheet(&0) else {
        return Ok(Vec::new());
    };

    let width = sheet.get_highest_column();
    Ok((1..=sheet.get_highest_row())
        .map(|row| (1..=width).map(|col| sheet.get_value((col, row))).collect())
        .collect())
}

fn check_header(path: &Path, header: &[String], field_set: FieldSet) -> Result<(), StorageError> {
    // The used range can be wider than the header when rows carry extra cells
    let mut found: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    while found.last().is_some_and(|h| h.is_empty()) {
        found.pop();
    }

    if found.iter().map(String::as_str).eq(field_set.columns().iter().copied()) {
        Ok(())
    } else {
        tracing::error!("Header mismatch in {}: {:?}", path.display(), found);
        Err(StorageError::HeaderMismatch {
            path: path.display().to_string(),
            field_set: field_set.name().to_string(),
            found,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("xlsx.tmp")
}

/// Writes a fresh workbook (bold header, one text row per record) to a
/// temporary file, then moves it over `path`.
fn write_new_workbook(path: &Path, header: &[&str], rows: &[&[String]]) -> Result<(), StorageError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header_format = Format::new().set_bold();
    // A formatted empty string is kept as a blank cell, so empty rows survive
    let value_format = Format::new().set_num_format("@");

    for (col, name) in header.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header_format)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let row_num = (i + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            worksheet.write_string_with_format(row_num, col as u16, value, &value_format)?;
        }
    }
    worksheet.autofit();

    let tmp_path = temp_path(path);
    workbook.save(&tmp_path)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Adds `rows` after the last used row of the first sheet of the workbook
/// at `path` and saves it back. Returns the number of data rows that were
/// already there.
fn append_in_place(path: &Path, field_set: FieldSet, rows: &[&[String]]) -> Result<usize, StorageError> {
    let mut book = umya_spreadsheet::reader::xlsx::read(path)?;
    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| StorageError::NoWorksheet(path.display().to_string()))?;

    let used_rows = sheet.get_highest_row();
    let existing = if used_rows == 0 {
        tracing::warn!("{} has no rows; writing a fresh header", path.display());
        for (i, name) in field_set.columns().iter().enumerate() {
            let cell = sheet.get_cell_mut(((i + 1) as u32, 1));
            cell.set_value_string(*name);
            cell.get_style_mut().get_font_mut().set_bold(true);
        }
        0
    } else {
        let width = sheet.get_highest_column();
        let header: Vec<String> = (1..=width).map(|col| sheet.get_value((col, 1))).collect();
        check_header(path, &header, field_set)?;
        (used_rows - 1) as usize
    };

    let first_row = existing as u32 + 2;
    tracing::info!(
        "Appending {} row(s) after {} existing row(s) in {}",
        rows.len(),
        existing,
        path.display()
    );

    for (i, row) in rows.iter().enumerate() {
        let row_num = first_row + i as u32;
        for (col, value) in row.iter().enumerate() {
            let cell = sheet.get_cell_mut(((col + 1) as u32, row_num));
            cell.set_value_string(value.as_str());
            cell.get_style_mut()
                .get_number_format_mut()
                .set_format_code(NumberingFormat::FORMAT_TEXT);
        }
    }

    let tmp_path = temp_path(path);
    umya_spreadsheet::writer::xlsx::write(&book, &tmp_path)?;
    fs::rename(&tmp_path, path)?;
    Ok(existing)
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Reader, Xlsx};

    fn record(field_set: FieldSet, pairs: &[(&str, &str)]) -> ExtractionRecord {
        let mut record = ExtractionRecord::new(field_set);
        for (field, value) in pairs {
            assert!(record.set(field, *value), "unknown field {}", field);
        }
        record
    }

    fn header_of(field_set: FieldSet) -> Vec<String> {
        field_set.columns().iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_overwrite_writes_header_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("financial_data.xlsx")).unwrap();
        let rec = record(FieldSet::Summary, &[("Company Name", "Acme Corp"), ("Revenue", "1,234.56")]);

        let summary = storage.save_records(&[rec], FieldSet::Summary, WriteMode::Overwrite).unwrap();
        assert_eq!(summary.total_data_rows, 1);
        assert!(!summary.appended);

        let rows = read_rows(storage.output_path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], header_of(FieldSet::Summary));
        assert_eq!(rows[1][0], "Acme Corp");
        assert_eq!(rows[1][1], "1,234.56");
        assert_eq!(rows[1][2], "");
    }

    #[test]
    fn test_overwrite_replaces_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("out.xlsx")).unwrap();
        let first = record(FieldSet::Summary, &[("Company Name", "First LLC")]);
        let second = record(FieldSet::Summary, &[("Company Name", "Second LLC")]);

        storage.save_records(&[first], FieldSet::Summary, WriteMode::Overwrite).unwrap();
        storage.save_records(&[second], FieldSet::Summary, WriteMode::Overwrite).unwrap();

        let rows = read_rows(storage.output_path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "Second LLC");
    }

    #[test]
    fn test_append_to_missing_file_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("nested").join("valuation_template.xlsx")).unwrap();
        let rec = record(FieldSet::Valuation, &[("Company Name", "Acme Corp")]);

        let summary = storage.save_records(&[rec], FieldSet::Valuation, WriteMode::Append).unwrap();
        assert!(!summary.appended);

        let rows = read_rows(storage.output_path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], header_of(FieldSet::Valuation));
    }

    #[test]
    fn test_append_adds_row_and_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("valuation_template.xlsx")).unwrap();
        let first = record(FieldSet::Valuation, &[("Company Name", "Acme Corp"), ("EBITDA", "10")]);
        let second = record(FieldSet::Valuation, &[("Company Name", "Globex Inc"), ("COGS", "7")]);

        storage.save_records(&[first], FieldSet::Valuation, WriteMode::Overwrite).unwrap();
        let summary = storage.save_records(&[second], FieldSet::Valuation, WriteMode::Append).unwrap();
        assert!(summary.appended);
        assert_eq!(summary.total_data_rows, 2);

        let rows = read_rows(storage.output_path()).unwrap();
        assert_eq!(rows.len(), 3, "one header row plus two data rows");
        assert_eq!(rows[0], header_of(FieldSet::Valuation));
        assert_eq!(rows[1][0], "Acme Corp");
        assert_eq!(rows[1][2], "10");
        assert_eq!(rows[2][0], "Globex Inc");
        assert_eq!(rows[2][9], "7");
    }

    #[test]
    fn test_append_keeps_other_sheets_numbers_and_formulas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valuation_template.xlsx");

        // A workbook someone has been working in by hand
        let mut workbook = Workbook::new();
        let main = workbook.add_worksheet();
        for (col, name) in FieldSet::Summary.columns().iter().enumerate() {
            main.write_string(0, col as u16, *name).unwrap();
        }
        main.write_string(1, 0, "Acme Corp").unwrap();
        main.write_number(1, 1, 1234.5).unwrap();
        let notes = workbook.add_worksheet().set_name("Notes").unwrap();
        notes.write_number(1, 1, 1234.5).unwrap();
        notes.write_formula(2, 1, "=B2*2").unwrap();
        workbook.save(&path).unwrap();

        let storage = StorageManager::new(&path).unwrap();
        let rec = record(FieldSet::Summary, &[("Company Name", "Globex Inc"), ("Revenue", "99")]);
        let summary = storage.save_records(&[rec], FieldSet::Summary, WriteMode::Append).unwrap();
        assert!(summary.appended);
        assert_eq!(summary.total_data_rows, 2);

        let mut reopened: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(reopened.sheet_names(), vec!["Sheet1".to_string(), "Notes".to_string()]);

        let notes = reopened.worksheet_range("Notes").unwrap();
        assert_eq!(notes.get_value((1, 1)), Some(&Data::Float(1234.5)));
        let formulas = reopened.worksheet_formula("Notes").unwrap();
        assert!(formulas.get_value((2, 1)).is_some_and(|f| f.contains("B2*2")), "{:?}", formulas);

        let main = reopened.worksheet_range("Sheet1").unwrap();
        assert_eq!(main.get_value((1, 1)), Some(&Data::Float(1234.5)), "existing number stays numeric");
        assert_eq!(main.get_value((2, 0)), Some(&Data::String("Globex Inc".to_string())));
        assert_eq!(main.get_value((2, 1)), Some(&Data::String("99".to_string())));
    }

    #[test]
    fn test_all_empty_record_still_takes_a_row() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("valuation_template.xlsx")).unwrap();

        storage
            .save_records(&[ExtractionRecord::new(FieldSet::Valuation)], FieldSet::Valuation, WriteMode::Overwrite)
            .unwrap();
        let rec = record(FieldSet::Valuation, &[("Revenue", "5")]);
        let summary = storage.save_records(&[rec], FieldSet::Valuation, WriteMode::Append).unwrap();
        assert_eq!(summary.total_data_rows, 2);

        let rows = read_rows(storage.output_path()).unwrap();
        assert_eq!(rows.len(), 3, "header, the empty row, then the new row");
        assert!(rows[1].iter().all(|v| v.is_empty()));
        let revenue = FieldSet::Valuation.columns().iter().position(|c| *c == "Revenue").unwrap();
        assert_eq!(rows[2][revenue], "5");
    }

    #[test]
    fn test_append_rejects_different_header() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("mixed.xlsx")).unwrap();
        let summary_rec = record(FieldSet::Summary, &[("Company Name", "Acme Corp")]);
        let valuation_rec = record(FieldSet::Valuation, &[("Company Name", "Globex Inc")]);

        storage.save_records(&[summary_rec], FieldSet::Summary, WriteMode::Overwrite).unwrap();
        let before = fs::read(storage.output_path()).unwrap();

        let result = storage.save_records(&[valuation_rec], FieldSet::Valuation, WriteMode::Append);
        assert!(matches!(result, Err(StorageError::HeaderMismatch { .. })), "got {:?}", result);
        assert_eq!(fs::read(storage.output_path()).unwrap(), before, "file must be untouched");
    }

    #[test]
    fn test_append_to_non_workbook_is_workbook_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        fs::write(&path, b"not a zip archive").unwrap();
        let storage = StorageManager::new(&path).unwrap();
        let rec = record(FieldSet::Summary, &[("Revenue", "1")]);

        let result = storage.save_records(&[rec], FieldSet::Summary, WriteMode::Append);
        assert!(matches!(result, Err(StorageError::WorkbookError(_))), "got {:?}", result);
    }

    #[test]
    fn test_mismatched_record_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("out.xlsx")).unwrap();
        let rec = record(FieldSet::Valuation, &[]);
        let result = storage.save_records(&[rec], FieldSet::Summary, WriteMode::Overwrite);
        assert!(matches!(result, Err(StorageError::SerializationError(_))));
        assert!(!storage.output_path().exists());
    }

    #[test]
    fn test_metadata_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("financial_data.xlsx")).unwrap();
        let rec = record(FieldSet::Summary, &[("Revenue", "5")]);
        let summary = storage.save_records(&[rec], FieldSet::Summary, WriteMode::Overwrite).unwrap();

        let meta_path = storage
            .save_records_metadata(&summary, &[PathBuf::from("report.pdf")])
            .unwrap();
        assert!(meta_path.ends_with("financial_data.xlsx.meta.json"));

        let meta: serde_json::Value = serde_json::from_str(&fs::read_to_string(meta_path).unwrap()).unwrap();
        assert_eq!(meta["mime_type"], XLSX_MIME_TYPE);
        assert_eq!(meta["field_set"], "summary");
        assert_eq!(meta["rows_written"], 1);
        assert_eq!(meta["source_files"][0], "report.pdf");
    }
}
