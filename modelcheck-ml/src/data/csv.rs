//! CSV tables of raw string cells, read and written with the `csv` crate.
//!
//! Cells are kept verbatim: no trimming, and quoted fields may span lines.

use crate::error::{MlError, io_at};
use std::io::{Read, Write};
use std::path::Path;

/// A table of raw string cells with a header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }

    /// Append the rows of `other`, aligning columns by name.
    ///
    /// Columns unknown to `self` are appended to the header; cells absent from
    /// a row are empty (missing).
    pub fn merge(&mut self, other: RawTable) {
        let mapping: Vec<usize> = other
            .header
            .iter()
            .map(|name| match self.header.iter().position(|h| h == name) {
                Some(i) => i,
                None => {
                    self.header.push(name.clone());
                    self.header.len() - 1
                }
            })
            .collect();
        let width = self.header.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
        for row in other.rows {
            let mut aligned = vec![String::new(); width];
            for (cell, &dst) in row.into_iter().zip(&mapping) {
                aligned[dst] = cell;
            }
            self.rows.push(aligned);
        }
    }
}

fn csv_error(context: &str, e: csv::Error) -> MlError {
    MlError::dataset(format!("{context}: {e}"))
}

/// Read CSV from `reader`. The first record is the header; every record must
/// have as many fields as the header.
pub fn read_csv<R: Read>(reader: R) -> Result<RawTable, MlError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let header: Vec<String> = csv_reader
        .headers()
        .map_err(|e| csv_error("CSV header", e))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| csv_error(&format!("CSV row {}", row_idx + 1), e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTable { header, rows })
}

/// Parse CSV held in memory.
pub fn parse_csv(content: &str) -> Result<RawTable, MlError> {
    read_csv(content.as_bytes())
}

/// Read a CSV file.
pub fn read_csv_file(path: &Path) -> Result<RawTable, MlError> {
    let file = std::fs::File::open(path).map_err(|e| io_at(path, e))?;
    read_csv(file).map_err(|e| match e {
        MlError::Dataset(msg) => MlError::dataset(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Write a table, header first, to `writer`.
pub fn write_csv<W: Write>(table: &RawTable, writer: W) -> Result<(), MlError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&table.header)
        .map_err(|e| csv_error("CSV header", e))?;
    for row in &table.rows {
        wtr.write_record(row).map_err(|e| csv_error("CSV row", e))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Render a whole table, header first.
pub fn format_csv(table: &RawTable) -> Result<String, MlError> {
    let mut buffer = Vec::new();
    write_csv(table, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| MlError::dataset(format!("CSV output: {e}")))
}

/// Render one record without its terminator.
pub fn format_record<I, S>(fields: I) -> Result<String, MlError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(fields)
        .map_err(|e| csv_error("CSV record", e))?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| MlError::Io(e.into_error()))?;
    let line = String::from_utf8(bytes).map_err(|e| MlError::dataset(format!("CSV record: {e}")))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
