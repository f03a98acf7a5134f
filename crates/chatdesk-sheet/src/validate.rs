// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use chatdesk_app::{CellValue, Row, ValidationResult, has_valid_phone_digits};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::reader::read_first_sheet;

pub const REQUIRED_COLUMNS: [&str; 3] = ["phone_number", "name", "surname"];
/// Data rows inspected for content quality.
pub const SAMPLE_ROWS: usize = 5;
/// Data rows above this count only earn a processing-time warning.
pub const LARGE_FILE_ROWS: usize = 1000;

const EMPTY_OR_CORRUPT: &str = "File appears to be empty or corrupted.";
const TOO_FEW_ROWS: &str = "File must contain at least a header row and one data row.";
const UNREADABLE: &str =
    "Failed to read file. Please ensure it's a valid Excel (.xlsx, .xls) or CSV file.";
const NO_VALID_PHONES: &str = "No valid phone numbers found in the file.";

pub fn validate_path(path: &Path) -> ValidationResult {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) => {
            debug!(path = %path.display(), %error, "roster read failed");
            return ValidationResult::invalid("Failed to read file. Please try again.");
        }
    };
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    validate_bytes(&name, &bytes)
}

pub fn validate_bytes(file_name: &str, bytes: &[u8]) -> ValidationResult {
    match read_first_sheet(file_name, bytes) {
        Ok(Some(grid)) => validate_grid(&grid),
        Ok(None) => ValidationResult::invalid(EMPTY_OR_CORRUPT),
        Err(error) => {
            debug!(file_name, %error, "roster parse failed");
            ValidationResult::invalid(UNREADABLE)
        }
    }
}

/// Validates the first sheet's rows, header row first.
pub fn validate_grid(grid: &[Vec<CellValue>]) -> ValidationResult {
    let Some((header_row, data_rows)) = grid.split_first() else {
        return ValidationResult::invalid(TOO_FEW_ROWS);
    };
    if data_rows.is_empty() {
        return ValidationResult::invalid(TOO_FEW_ROWS);
    }

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_lowercase())
        .collect();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|header| header == column))
        .collect();
    if !missing.is_empty() {
        errors.push(format!("Missing required columns: {}", missing.join(", ")));
    }

    let preview: Vec<Row> = data_rows
        .iter()
        .take(SAMPLE_ROWS)
        .map(|cells| row_from_cells(&headers, cells))
        .collect();

    let mut valid_phones = 0;
    for (index, row) in preview.iter().enumerate() {
        // 1-indexed sheet row, counting the header.
        let row_number = index + 2;
        if has_valid_phone_digits(&row.text("phone_number")) {
            valid_phones += 1;
        } else {
            warnings.push(format!("Row {row_number}: Invalid or missing phone number"));
        }
        if row.get("name").is_none_or(CellValue::is_blank) {
            warnings.push(format!("Row {row_number}: Missing name"));
        }
        if row.get("surname").is_none_or(CellValue::is_blank) {
            warnings.push(format!("Row {row_number}: Missing surname"));
        }
    }

    if valid_phones == 0 {
        errors.push(NO_VALID_PHONES.to_owned());
    }
    if data_rows.len() > LARGE_FILE_ROWS {
        warnings.push(format!(
            "Large file detected ({} rows). Processing may take longer.",
            data_rows.len()
        ));
    }

    debug!(
        rows = data_rows.len(),
        errors = errors.len(),
        warnings = warnings.len(),
        "roster validated"
    );
    ValidationResult {
        errors,
        warnings,
        preview: Some(preview),
    }
}

fn row_from_cells(headers: &[String], cells: &[CellValue]) -> Row {
    let mut row = Row::new();
    for (header, cell) in headers.iter().zip(cells) {
        if *cell != CellValue::Empty {
            row.insert(header.clone(), cell.clone());
        }
    }
    row
}
