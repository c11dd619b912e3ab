// 🏗️ Source Decoders - turn an uploaded file into positional rows
//
// Two formats:
// - XLSX (first worksheet only) via calamine
// - CSV via the csv crate
//
// Decoders know nothing about what a column means. They only hand out
// rows of typed cells; the reconciler owns the column mapping.

use crate::error::ImportError;
use calamine::{Data, Range, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceFormat - which decoder handles the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Xlsx,
    Csv,
}

impl SourceFormat {
    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::Xlsx => "Excel",
            SourceFormat::Csv => "CSV",
        }
    }

    /// Detect format from the file name extension
    pub fn from_filename(filename: &str) -> Result<Self, ImportError> {
        let lower = filename.to_lowercase();

        if lower.ends_with(".xlsx") || lower.ends_with(".xlsm") {
            return Ok(SourceFormat::Xlsx);
        }

        if lower.ends_with(".csv") {
            return Ok(SourceFormat::Csv);
        }

        Err(ImportError::UnsupportedFormat(filename.to_string()))
    }
}

/// One cell as the source stored it
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Int(i64),
    Bool(bool),
    /// Formula, date/time, duration or error cell
    Other,
}

/// RawRow - positional cells of one sheet row
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Zero-based position in the sheet (0 = header)
    pub row_number: usize,
    cells: Vec<CellValue>,
}

impl RawRow {
    pub fn new(row_number: usize, cells: Vec<CellValue>) -> Self {
        RawRow { row_number, cells }
    }

    /// Convenience constructor: every cell is text
    pub fn from_text(row_number: usize, values: &[&str]) -> Self {
        let cells = values
            .iter()
            .map(|v| CellValue::Text(v.to_string()))
            .collect();
        RawRow::new(row_number, cells)
    }

    pub fn cell(&self, column: usize) -> Option<&CellValue> {
        self.cells.get(column)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ============================================================================
// FIELD EXTRACTION
// ============================================================================

/// Read one positional field as a string.
///
/// - text → trimmed
/// - number → integer rendering (truncated, never `1.0` or `1E10`)
/// - boolean → `true` / `false`
/// - anything else, or a missing column → `None`
pub fn extract_field(row: &RawRow, column: usize) -> Option<String> {
    match row.cell(column)? {
        CellValue::Text(s) => Some(s.trim().to_string()),
        CellValue::Number(n) => Some((*n as i64).to_string()),
        CellValue::Int(n) => Some(n.to_string()),
        CellValue::Bool(b) => Some(b.to_string()),
        CellValue::Empty | CellValue::Other => None,
    }
}

// ============================================================================
// DECODER TRAIT
// ============================================================================

/// SheetDecoder - bytes in, rows out.
///
/// Zero bytes is `EmptySource`; bytes the format cannot make sense of are
/// `Unreadable`. Nothing else fails here.
pub trait SheetDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<RawRow>, ImportError>;

    fn format(&self) -> SourceFormat;
}

/// Factory: decoder for a format
pub fn get_decoder(format: SourceFormat) -> Box<dyn SheetDecoder> {
    match format {
        SourceFormat::Xlsx => Box::new(XlsxDecoder),
        SourceFormat::Csv => Box::new(CsvDecoder),
    }
}

pub fn decode_rows(bytes: &[u8], format: SourceFormat) -> Result<Vec<RawRow>, ImportError> {
    get_decoder(format).decode(bytes)
}

/// Read a file from disk, picking the decoder from its extension
pub fn load_source(path: &Path) -> Result<(SourceFormat, Vec<RawRow>), ImportError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let format = SourceFormat::from_filename(filename)?;

    let bytes = std::fs::read(path).map_err(|e| ImportError::Unreadable {
        format: format.name(),
        reason: format!("{}: {}", path.display(), e),
    })?;

    let decoder = get_decoder(format);
    let rows = decoder.decode(&bytes)?;
    Ok((decoder.format(), rows))
}

// ============================================================================
// XLSX
// ============================================================================

pub struct XlsxDecoder;

impl XlsxDecoder {
    fn unreadable(reason: impl ToString) -> ImportError {
        ImportError::Unreadable {
            format: SourceFormat::Xlsx.name(),
            reason: reason.to_string(),
        }
    }
}

impl SheetDecoder for XlsxDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<RawRow>, ImportError> {
        if bytes.is_empty() {
            return Err(ImportError::EmptySource);
        }

        let mut workbook: Xlsx<_> =
            Xlsx::new(Cursor::new(bytes)).map_err(Self::unreadable)?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Self::unreadable("workbook has no worksheets"))?;

        let values = workbook
            .worksheet_range(&sheet_name)
            .map_err(Self::unreadable)?;

        // Formula cells come back from worksheet_range as their cached
        // value; the formula range tells us which ones they were.
        let formulas = match workbook.worksheet_formula(&sheet_name) {
            Ok(formulas) => Some(formulas),
            Err(e) => {
                warn!(
                    sheet = %sheet_name,
                    error = %e,
                    "could not read formulas, formula cells keep their cached values"
                );
                None
            }
        };

        let rows = rows_from_range(&values, formulas.as_ref());
        debug!(sheet = %sheet_name, rows = rows.len(), "decoded worksheet");

        Ok(rows)
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Xlsx
    }
}

/// Lay the range out on absolute sheet coordinates.
///
/// calamine trims leading empty rows/columns from a range; column offsets
/// and the header row are defined on the sheet, so we re-anchor at (0, 0).
fn rows_from_range(values: &Range<Data>, formulas: Option<&Range<String>>) -> Vec<RawRow> {
    let Some((last_row, last_col)) = values.end() else {
        return Vec::new();
    };

    (0..=last_row)
        .map(|r| {
            let cells = (0..=last_col)
                .map(|c| {
                    let has_formula = formulas
                        .and_then(|f| f.get_value((r, c)))
                        .is_some_and(|f| !f.is_empty());

                    if has_formula {
                        return CellValue::Other;
                    }

                    match values.get_value((r, c)) {
                        None | Some(Data::Empty) => CellValue::Empty,
                        Some(Data::String(s)) => CellValue::Text(s.clone()),
                        Some(Data::Float(n)) => CellValue::Number(*n),
                        Some(Data::Int(n)) => CellValue::Int(*n),
                        Some(Data::Bool(b)) => CellValue::Bool(*b),
                        Some(_) => CellValue::Other,
                    }
                })
                .collect();

            RawRow::new(r as usize, cells)
        })
        .collect()
}

// ============================================================================
// CSV
// ============================================================================

pub struct CsvDecoder;

impl SheetDecoder for CsvDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<RawRow>, ImportError> {
        if bytes.is_empty() {
            return Err(ImportError::EmptySource);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();

        for (row_number, result) in reader.records().enumerate() {
            let record = result.map_err(|e| ImportError::Unreadable {
                format: SourceFormat::Csv.name(),
                reason: format!("line {}: {}", row_number + 1, e),
            })?;

            let cells = record
                .iter()
                .map(|field| CellValue::Text(field.to_string()))
                .collect();

            rows.push(RawRow::new(row_number, cells));
        }

        debug!(rows = rows.len(), "decoded csv");
        Ok(rows)
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }
}

// ============================================================================
// TESTS
// ============================================================================
