// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chatdesk_app::CellValue;
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Workbook,
    Csv,
    Unknown,
}

impl SheetFormat {
    pub fn from_file_name(name: &str) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Self::Workbook,
            "csv" => Self::Csv,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("read csv: {0}")]
    Csv(#[from] csv::Error),
}

pub type Grid = Vec<Vec<CellValue>>;

/// Reads the first sheet as rows of cells. `Ok(None)` means the workbook has
/// no sheets at all.
pub fn read_first_sheet(file_name: &str, bytes: &[u8]) -> Result<Option<Grid>, ReadError> {
    match SheetFormat::from_file_name(file_name) {
        SheetFormat::Workbook => read_workbook(bytes),
        SheetFormat::Csv => read_csv(bytes).map(Some),
        SheetFormat::Unknown => match read_workbook(bytes) {
            Ok(grid) => Ok(grid),
            Err(_) => read_csv(bytes).map(Some),
        },
    }
}

fn read_workbook(bytes: &[u8]) -> Result<Option<Grid>, ReadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Ok(None);
    };
    let range = workbook.worksheet_range(&first)?;
    let grid = range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();
    Ok(Some(grid))
}

fn read_csv(bytes: &[u8]) -> Result<Grid, ReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut grid = Vec::new();
    // Excel's default CSV export is cp1252, so fields are decoded lossily
    // instead of rejecting the whole file.
    for record in reader.byte_records() {
        let record = record?;
        grid.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(String::from_utf8_lossy(field).into_owned())
                    }
                })
                .collect(),
        );
    }
    Ok(grid)
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Bool(value) => CellValue::Bool(*value),
        Data::Int(value) => CellValue::Int(*value),
        Data::Float(value) => CellValue::Float(*value),
        Data::String(value) => CellValue::Text(value.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ReadError, SheetFormat, read_first_sheet};
    use chatdesk_app::CellValue;

    #[test]
    fn format_follows_extension_case_insensitively() {
        assert_eq!(SheetFormat::from_file_name("roster.XLSX"), SheetFormat::Workbook);
        assert_eq!(SheetFormat::from_file_name("a.b.xls"), SheetFormat::Workbook);
        assert_eq!(SheetFormat::from_file_name("roster.csv"), SheetFormat::Csv);
        assert_eq!(SheetFormat::from_file_name("roster"), SheetFormat::Unknown);
    }

    #[test]
    fn csv_rows_keep_ragged_lengths_and_blank_cells() {
        let grid = read_first_sheet("roster.csv", b"phone_number,name,surname\n123,,Doe\n456\n")
            .expect("csv should parse")
            .expect("csv always has a sheet");
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[1][1], CellValue::Empty);
        assert_eq!(grid[2], vec![CellValue::Text("456".to_owned())]);
    }

    #[test]
    fn non_utf8_csv_fields_decode_lossily() {
        let grid = read_first_sheet("roster.csv", b"phone_number,name,surname\n15551234567,Jos\xE9,Doe\n")
            .expect("latin-1 csv should parse")
            .expect("csv always has a sheet");
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[1][1], CellValue::Text("Jos\u{FFFD}".to_owned()));
        assert_eq!(grid[1][2], CellValue::Text("Doe".to_owned()));
    }

    #[test]
    fn garbage_workbook_bytes_fail_to_read() {
        let error = read_first_sheet("roster.xlsx", b"not a zip archive")
            .expect_err("garbage should not parse");
        assert!(matches!(error, ReadError::Workbook(_)));
        assert!(error.to_string().starts_with("read workbook: "));
    }
}
