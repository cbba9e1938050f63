pub mod adapter;
pub mod error;
pub mod fillins;
pub mod memory;
pub mod pool;
pub mod range;
pub mod workbook;

pub use adapter::{AdapterRegistry, DataSourceAdapter, SourceHandle, filter_by_parameters};
pub use error::{DataSourceError, IngestError, PatternError, Result};
pub use fillins::{date_fill_ins, expand_date_pattern, expand_pattern};
pub use memory::InMemoryAdapter;
pub use pool::{HandleGuard, HandlePool};
pub use range::{CellRef, CsvRangeAdapter, RangeRef};
pub use workbook::{
    BINDINGS_FILE, SOURCES_FILE, load_binding_workbook, load_bindings, load_sources,
    workbook_files,
};
