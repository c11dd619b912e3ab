// ⚖️ Batch Reconciler - rows → SwiftCode records with headquarters links
//
// Two passes over one batch:
//   1. extract + default each data row, classify it, index headquarters
//      by their 8-character prefix
//   2. give every branch the headquarters code found under its prefix
//
// The finished list goes to the store in ONE bulk save.

use crate::classifier;
use crate::entities::SwiftCode;
use crate::error::{ImportError, StoreResult};
use crate::parser::{decode_rows, extract_field, RawRow, SourceFormat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

// ============================================================================
// COLUMN LAYOUT
// ============================================================================

// Columns 2 and 5 exist in the source file but are not used.
pub const COL_COUNTRY_ISO2: usize = 0;
pub const COL_SWIFT_CODE: usize = 1;
pub const COL_BANK_NAME: usize = 3;
pub const COL_ADDRESS: usize = 4;
pub const COL_COUNTRY_NAME: usize = 6;

pub const DEFAULT_COUNTRY_ISO2: &str = "UNKNOWN";
pub const DEFAULT_BANK_NAME: &str = "UNKNOWN BANK";
pub const DEFAULT_ADDRESS: &str = "UNKNOWN ADDRESS";
pub const DEFAULT_COUNTRY_NAME: &str = "UNKNOWN COUNTRY";

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Output of one reconcile run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledBatch {
    /// Surviving rows, input order
    pub records: Vec<SwiftCode>,

    /// Sheet row numbers dropped for lack of a code
    pub skipped_rows: Vec<usize>,

    pub headquarters: usize,
    pub linked_branches: usize,
}

/// What an import did, returned to the caller after the bulk save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub headquarters: usize,
    pub linked_branches: usize,
    pub imported_at: DateTime<Utc>,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        format!(
            "{} SWIFT codes imported ({} headquarters, {} branches linked), {} rows skipped",
            self.imported, self.headquarters, self.linked_branches, self.skipped
        )
    }
}

// ============================================================================
// PERSISTENCE SEAM
// ============================================================================

/// SwiftCodeSink - where a finished batch goes.
///
/// Called exactly once per successful import, never on failure.
pub trait SwiftCodeSink {
    fn save_all(&mut self, records: &[SwiftCode]) -> StoreResult<usize>;
}

// ============================================================================
// RECONCILER
// ============================================================================

/// Treat blank text the same as a missing cell
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Pass 1 for a single row. `None` means the row has no code and is dropped.
fn extract_record(row: &RawRow) -> Option<SwiftCode> {
    let swift_code = non_blank(extract_field(row, COL_SWIFT_CODE))?;

    let country_iso2 = non_blank(extract_field(row, COL_COUNTRY_ISO2))
        .unwrap_or_else(|| DEFAULT_COUNTRY_ISO2.to_string());
    let bank_name = non_blank(extract_field(row, COL_BANK_NAME))
        .unwrap_or_else(|| DEFAULT_BANK_NAME.to_string());
    let address = non_blank(extract_field(row, COL_ADDRESS))
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let country_name = non_blank(extract_field(row, COL_COUNTRY_NAME))
        .unwrap_or_else(|| DEFAULT_COUNTRY_NAME.to_string());

    Some(SwiftCode::new(
        swift_code,
        bank_name,
        country_iso2,
        country_name,
        address,
    ))
}

/// Reconcile one batch of rows. Row 0 is the header and is always skipped.
///
/// Fails only when there are no rows at all.
pub fn reconcile(rows: &[RawRow]) -> Result<ReconciledBatch, ImportError> {
    if rows.is_empty() {
        return Err(ImportError::EmptySource);
    }

    let mut records = Vec::with_capacity(rows.len() - 1);
    let mut skipped_rows = Vec::new();
    let mut hq_index: HashMap<String, String> = HashMap::new();

    // Pass 1: extraction, defaulting, classification, prefix index
    for row in &rows[1..] {
        let Some(record) = extract_record(row) else {
            debug!(row = row.row_number, "skipping row: SWIFT code is missing");
            skipped_rows.push(row.row_number);
            continue;
        };

        if record.is_headquarter {
            if let Some(prefix) = record.prefix() {
                if let Some(previous) = hq_index.insert(prefix.to_string(), record.swift_code.clone()) {
                    warn!(
                        prefix,
                        previous = %previous,
                        current = %record.swift_code,
                        "duplicate headquarters prefix in batch, keeping the later row"
                    );
                }
            }
        }

        records.push(record);
    }

    // Pass 2: branch → headquarters
    for record in records.iter_mut().filter(|r| r.is_branch()) {
        let hq = classifier::institution_prefix(&record.swift_code)
            .and_then(|prefix| hq_index.get(prefix));

        if let Some(hq_code) = hq {
            record.hq_swift_code = Some(hq_code.clone());
        }
    }

    // A code repeated in the batch is stored once (later row wins),
    // so the counters only look at the last occurrence of each code.
    let mut latest: HashMap<&str, &SwiftCode> = HashMap::new();
    for record in &records {
        latest.insert(record.swift_code.as_str(), record);
    }
    if latest.len() < records.len() {
        warn!(
            repeated = records.len() - latest.len(),
            "repeated SWIFT codes in batch, keeping the later rows"
        );
    }
    let headquarters = latest.values().filter(|r| r.is_headquarter).count();
    let linked_branches = latest.values().filter(|r| r.hq_swift_code.is_some()).count();

    if !skipped_rows.is_empty() {
        warn!(count = skipped_rows.len(), "rows skipped for missing SWIFT code");
    }

    Ok(ReconciledBatch {
        records,
        skipped_rows,
        headquarters,
        linked_branches,
    })
}

/// Decode, reconcile, then hand the whole batch to the sink in one call.
pub fn import_swift_codes<S: SwiftCodeSink + ?Sized>(
    bytes: &[u8],
    format: SourceFormat,
    sink: &mut S,
) -> Result<ImportReport, ImportError> {
    let rows = decode_rows(bytes, format)?;
    import_rows(&rows, sink)
}

/// Same as `import_swift_codes` for rows that are already decoded
pub fn import_rows<S: SwiftCodeSink + ?Sized>(
    rows: &[RawRow],
    sink: &mut S,
) -> Result<ImportReport, ImportError> {
    let batch = reconcile(rows)?;

    let imported = sink.save_all(&batch.records)?;

    let report = ImportReport {
        imported,
        skipped: batch.skipped_rows.len(),
        headquarters: batch.headquarters,
        linked_branches: batch.linked_branches,
        imported_at: Utc::now(),
    };
    info!("{}", report.summary());

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CellValue;
    use rust_xlsxwriter::Workbook;

    /// Records every bulk save instead of persisting
    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<Vec<SwiftCode>>,
    }

    impl SwiftCodeSink for RecordingSink {
        fn save_all(&mut self, records: &[SwiftCode]) -> StoreResult<usize> {
            self.calls.push(records.to_vec());
            Ok(records.len())
        }
    }

    fn header() -> RawRow {
        RawRow::from_text(
            0,
            &[
                "COUNTRY ISO2 CODE",
                "SWIFT CODE",
                "CODE TYPE",
                "NAME",
                "ADDRESS",
                "TOWN NAME",
                "COUNTRY NAME",
                "TIME ZONE",
            ],
        )
    }

    fn data_row(n: usize, iso2: &str, code: &str, bank: &str, address: &str, country: &str) -> RawRow {
        RawRow::from_text(n, &[iso2, code, "BIC11", bank, address, "TOWN", country, "Europe/Warsaw"])
    }

    fn codes(batch: &ReconciledBatch) -> Vec<&str> {
        batch.records.iter().map(|r| r.swift_code.as_str()).collect()
    }

    #[test]
    fn test_branch_linked_to_headquarters_by_prefix() {
        let rows = vec![
            header(),
            data_row(1, "US", "HQ000000XXX", "HQ Bank", "1 Main St", "UNITED STATES"),
            data_row(2, "US", "HQ00000012", "HQ Bank", "2 Side St", "UNITED STATES"),
        ];

        let batch = reconcile(&rows).unwrap();

        assert_eq!(batch.records.len(), 2);
        assert!(batch.records[0].is_headquarter);
        assert_eq!(batch.records[0].hq_swift_code, None);
        assert!(!batch.records[1].is_headquarter);
        assert_eq!(batch.records[1].hq_swift_code.as_deref(), Some("HQ000000XXX"));
        assert_eq!(batch.headquarters, 1);
        assert_eq!(batch.linked_branches, 1);
    }

    #[test]
    fn test_branch_before_headquarters_still_linked() {
        let rows = vec![
            header(),
            data_row(1, "PL", "BPKOPLPWWAR", "PKO", "Warsaw", "POLAND"),
            data_row(2, "PL", "BPKOPLPWXXX", "PKO", "Warsaw", "POLAND"),
        ];

        let batch = reconcile(&rows).unwrap();

        assert_eq!(batch.records[0].hq_swift_code.as_deref(), Some("BPKOPLPWXXX"));
    }

    #[test]
    fn test_unmatched_branch_has_no_reference() {
        let rows = vec![
            header(),
            data_row(1, "PL", "BPKOPLPWXXX", "PKO", "Warsaw", "POLAND"),
            data_row(2, "DE", "DEUTDEFF500", "Deutsche", "Frankfurt", "GERMANY"),
        ];

        let batch = reconcile(&rows).unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[1].hq_swift_code, None);
        assert_eq!(batch.linked_branches, 0);
    }

    #[test]
    fn test_missing_code_skips_row() {
        let rows = vec![
            header(),
            data_row(1, "US", "BANKUSXX", "US Bank", "123 Bank St", "United States"),
            data_row(2, "GB", "", "UK Bank", "456 Bank St", "United Kingdom"),
            data_row(3, "GB", "   ", "UK Bank", "456 Bank St", "United Kingdom"),
            RawRow::new(4, vec![CellValue::Text("FR".to_string())]),
        ];

        let batch = reconcile(&rows).unwrap();

        assert_eq!(codes(&batch), vec!["BANKUSXX"]);
        assert_eq!(batch.skipped_rows, vec![2, 3, 4]);
        assert_eq!(batch.records.len(), rows.len() - 1 - batch.skipped_rows.len());
    }

    #[test]
    fn test_missing_optional_fields_get_defaults() {
        let rows = vec![
            header(),
            data_row(1, "MT", "AAAAMTMTXXX", "HQ", "Valletta", "MALTA"),
            RawRow::new(
                2,
                vec![
                    CellValue::Empty,
                    CellValue::Text("AAAAMTMT001".to_string()),
                    CellValue::Empty,
                    CellValue::Text("  ".to_string()),
                ],
            ),
        ];

        let batch = reconcile(&rows).unwrap();
        let branch = &batch.records[1];

        assert_eq!(branch.country_iso2, "UNKNOWN");
        assert_eq!(branch.bank_name, "UNKNOWN BANK");
        assert_eq!(branch.address, "UNKNOWN ADDRESS");
        assert_eq!(branch.country_name, "UNKNOWN COUNTRY");

        // Defaulted rows are still classified and linked
        assert!(!branch.is_headquarter);
        assert_eq!(branch.hq_swift_code.as_deref(), Some("AAAAMTMTXXX"));
    }

    #[test]
    fn test_duplicate_headquarters_prefix_last_write_wins() {
        // Same first 8 characters, both end in XXX: only possible with
        // malformed (longer) codes, but the batch must not fail on it
        let rows = vec![
            header(),
            data_row(1, "PL", "AAAAPLPWXXX", "First", "A", "POLAND"),
            data_row(2, "PL", "AAAAPLPW1XXX", "Second", "B", "POLAND"),
            data_row(3, "PL", "AAAAPLPW123", "Branch", "C", "POLAND"),
        ];

        let batch = reconcile(&rows).unwrap();

        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.records[2].hq_swift_code.as_deref(), Some("AAAAPLPW1XXX"));
    }

    #[test]
    fn test_short_codes_never_linked_or_indexed() {
        let rows = vec![
            header(),
            data_row(1, "PL", "SHORTXXX", "Short HQ", "A", "POLAND"),
            data_row(2, "PL", "SHORT", "Short", "B", "POLAND"),
            data_row(3, "PL", "SHORTXXX123", "Branch", "C", "POLAND"),
        ];

        let batch = reconcile(&rows).unwrap();

        // "SHORTXXX" is 8 chars: it is a headquarters with prefix "SHORTXXX"
        assert_eq!(batch.records[1].hq_swift_code, None);
        assert_eq!(batch.records[2].hq_swift_code.as_deref(), Some("SHORTXXX"));
    }

    #[test]
    fn test_order_preserved() {
        let rows = vec![
            header(),
            data_row(1, "PL", "ZZZZPLPWXXX", "Z", "A", "POLAND"),
            data_row(2, "PL", "", "gone", "A", "POLAND"),
            data_row(3, "PL", "AAAAPLPW001", "A", "A", "POLAND"),
            data_row(4, "PL", "MMMMPLPWXXX", "M", "A", "POLAND"),
        ];

        let batch = reconcile(&rows).unwrap();

        assert_eq!(codes(&batch), vec!["ZZZZPLPWXXX", "AAAAPLPW001", "MMMMPLPWXXX"]);
    }

    #[test]
    fn test_header_only_yields_empty_batch() {
        let batch = reconcile(&[header()]).unwrap();
        assert!(batch.records.is_empty());
        assert!(batch.skipped_rows.is_empty());
    }

    #[test]
    fn test_no_rows_is_fatal() {
        assert!(matches!(reconcile(&[]), Err(ImportError::EmptySource)));
    }

    #[test]
    fn test_header_row_never_becomes_a_record() {
        // Header contains something that looks like a code
        let rows = vec![
            RawRow::from_text(0, &["XX", "HEADERXXXXX", "", "", "", "", ""]),
            data_row(1, "PL", "BPKOPLPWXXX", "PKO", "Warsaw", "POLAND"),
        ];

        let batch = reconcile(&rows).unwrap();
        assert_eq!(codes(&batch), vec!["BPKOPLPWXXX"]);
    }

    #[test]
    fn test_import_saves_exactly_once() {
        let rows = vec![
            header(),
            data_row(1, "US", "BANKUSXX", "US Bank", "123 Bank St", "United States"),
            data_row(2, "GB", "", "UK Bank", "456 Bank St", "United Kingdom"),
        ];
        let mut sink = RecordingSink::default();

        let report = import_rows(&rows, &mut sink).unwrap();

        assert_eq!(sink.calls.len(), 1);
        assert_eq!(sink.calls[0].len(), 1);
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_repeated_code_counted_once_and_later_row_wins() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::setup_database(&conn).unwrap();
        let mut store = conn;

        let rows = vec![
            header(),
            data_row(1, "PL", "BPKOPLPWXXX", "Old Name", "Old Street", "POLAND"),
            data_row(2, "PL", "BPKOPLPWWAR", "PKO", "Warsaw", "POLAND"),
            data_row(3, "PL", "BPKOPLPWXXX", "New Name", "New Street", "POLAND"),
        ];

        let report = import_rows(&rows, &mut store).unwrap();
        let stored = crate::db::count_swift_codes(&store).unwrap();

        assert_eq!(stored, 2);
        assert_eq!(report.imported, stored as usize);
        assert_eq!(report.headquarters, 1);
        assert_eq!(report.linked_branches, 1);

        let hq = crate::db::find_by_code(&store, "BPKOPLPWXXX").unwrap().unwrap();
        assert_eq!(hq.bank_name, "New Name");
        assert_eq!(hq.address, "New Street");
    }

    #[test]
    fn test_empty_file_never_reaches_sink() {
        let mut sink = RecordingSink::default();

        let err = import_swift_codes(&[], SourceFormat::Xlsx, &mut sink).unwrap_err();

        assert!(matches!(err, ImportError::EmptySource));
        assert!(err.to_string().contains("Uploaded file is empty"));
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_corrupt_file_never_reaches_sink() {
        let mut sink = RecordingSink::default();

        let result = import_swift_codes(b"PK\x03\x04 truncated", SourceFormat::Xlsx, &mut sink);

        assert!(matches!(result, Err(ImportError::Unreadable { .. })));
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_import_from_xlsx_workbook() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("SWIFT Codes").unwrap();

        for (col, title) in [(0, "Country ISO2"), (1, "SWIFT Code"), (3, "Bank Name"), (4, "Address"), (6, "Country Name")] {
            sheet.write_string(0, col, title).unwrap();
        }

        sheet.write_string(1, 0, "US").unwrap();
        sheet.write_string(1, 1, "BANKUSXXXXX").unwrap();
        sheet.write_string(1, 3, "US Bank").unwrap();
        sheet.write_string(1, 4, "123 Bank St").unwrap();
        sheet.write_string(1, 6, "United States").unwrap();

        sheet.write_string(2, 0, "US").unwrap();
        sheet.write_string(2, 1, "BANKUSXX001").unwrap();
        sheet.write_string(2, 3, "US Bank").unwrap();

        // Row 3: no SWIFT code
        sheet.write_string(3, 0, "GB").unwrap();
        sheet.write_string(3, 3, "UK Bank").unwrap();

        let bytes = workbook.save_to_buffer().unwrap();
        let mut sink = RecordingSink::default();

        let report = import_swift_codes(&bytes, SourceFormat::Xlsx, &mut sink).unwrap();

        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.headquarters, 1);
        assert_eq!(report.linked_branches, 1);

        let saved = &sink.calls[0];
        assert_eq!(saved[1].hq_swift_code.as_deref(), Some("BANKUSXXXXX"));
        assert_eq!(saved[1].address, "UNKNOWN ADDRESS");
        assert_eq!(saved[1].country_name, "UNKNOWN COUNTRY");
    }

    #[test]
    fn test_import_from_csv() {
        let csv = "COUNTRY ISO2 CODE,SWIFT CODE,CODE TYPE,NAME,ADDRESS,TOWN NAME,COUNTRY NAME,TIME ZONE\n\
                   PL,BPKOPLPWXXX,BIC11,PKO BANK POLSKI,PULAWSKA 15,WARSZAWA,POLAND,Europe/Warsaw\n\
                   PL,BPKOPLPWWAR,BIC11,PKO BANK POLSKI,,WARSZAWA,POLAND,Europe/Warsaw\n";
        let mut sink = RecordingSink::default();

        let report = import_swift_codes(csv.as_bytes(), SourceFormat::Csv, &mut sink).unwrap();

        assert_eq!(report.imported, 2);
        let saved = &sink.calls[0];
        assert_eq!(saved[1].address, "UNKNOWN ADDRESS");
        assert_eq!(saved[1].hq_swift_code.as_deref(), Some("BPKOPLPWXXX"));
    }
}
