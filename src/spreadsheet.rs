use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::columns::ColumnMapping;
use crate::models::{CellValue, StudentRow};

/// A parsed spreadsheet: ordered headers plus one cell map per data row.
/// Empty cells are dropped at parse time.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, CellValue>>,
}

impl SheetData {
    /// A couple of leading rows for the column classifier to look at.
    pub fn sample_rows(&self, count: usize) -> &[BTreeMap<String, CellValue>] {
        &self.rows[..self.rows.len().min(count)]
    }
}

pub fn read_csv(path: &Path) -> anyhow::Result<SheetData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let sheet = parse_reader(file)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    info!(
        rows = sheet.rows.len(),
        columns = sheet.columns.len(),
        "read spreadsheet {}",
        path.display()
    );
    Ok(sheet)
}

fn parse_reader<R: Read>(reader: R) -> anyhow::Result<SheetData> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let columns: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let mut row = BTreeMap::new();
        for (column, field) in columns.iter().zip(record.iter()) {
            let cell = parse_cell(field);
            if !cell.is_empty() {
                row.insert(column.clone(), cell);
            }
        }
        rows.push(row);
    }

    Ok(SheetData { columns, rows })
}

fn parse_cell(field: &str) -> CellValue {
    let trimmed = field.trim();
    match trimmed.parse::<f64>() {
        Ok(number) => CellValue::Number(number),
        Err(_) => CellValue::Text(trimmed.to_string()),
    }
}

/// Turn raw sheet rows into identifier-bearing student rows using the
/// classified column mapping. Rows with no identifier at all cannot be
/// reconciled against anything and are dropped with a warning.
pub fn extract_rows(sheet: &SheetData, mapping: &ColumnMapping) -> Vec<StudentRow> {
    let mut extracted = Vec::new();

    for (index, raw_row) in sheet.rows.iter().enumerate() {
        let identifier = |column: &Option<String>| -> Option<String> {
            column
                .as_ref()
                .and_then(|name| raw_row.get(name))
                .filter(|cell| !cell.is_empty())
                .map(|cell| cell.to_text())
        };

        let row = StudentRow {
            roll_number: identifier(&mapping.roll_number),
            name: identifier(&mapping.name),
            email: identifier(&mapping.email),
            row_data: raw_row.clone(),
        };

        if row.roll_number.is_none() && row.name.is_none() && row.email.is_none() {
            warn!(row = index + 1, "row has no identifiable student data, skipping");
            continue;
        }
        extracted.push(row);
    }

    info!(extracted = extracted.len(), "extracted student rows");
    extracted
}
