// SWIFT Code Registry - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod classifier;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod parser;
pub mod reconciliation;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use classifier::{classify, institution_prefix, is_headquarter, Classification};
pub use config::{init_tracing, Config};
pub use db::{
    count_swift_codes, delete_swift_code, find_by_code, find_by_country, find_by_hq_code,
    insert_swift_code, open_database, save_swift_codes, setup_database,
};
pub use entities::SwiftCode;
pub use error::{ImportError, StoreError};
pub use parser::{
    decode_rows, extract_field, get_decoder, load_source, CellValue, RawRow, SheetDecoder,
    SourceFormat,
};
pub use reconciliation::{
    import_rows, import_swift_codes, reconcile, ImportReport, ReconciledBatch, SwiftCodeSink,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
