pub mod export;
pub mod metadata;
pub mod table_csv;

pub use export::export_parquet;
pub use metadata::{load_metadata, metadata_path, save_metadata, CategoryStatus, TableMetadata};
pub use table_csv::{read_header, read_table, write_table};

use std::path::{Path, PathBuf};

/// File locations for one country's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub table: PathBuf,
    pub metadata: PathBuf,
    pub parquet: PathBuf,
}

impl TablePaths {
    pub fn new(output_dir: &Path, country: &str) -> Self {
        let stem = format!("{}_pivot_table", country.to_lowercase());
        Self {
            table: output_dir.join(format!("{}.csv", stem)),
            metadata: metadata_path(output_dir, country),
            parquet: output_dir.join(format!("{}.parquet", stem)),
        }
    }
}
