// src/store/export.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray, UInt32Array, UInt8Array},
    datatypes::{DataType, Field, Schema as ArrowSchema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{fs, fs::File, io::BufWriter, path::Path, sync::Arc};
use tracing::info;

use crate::pivot::{Column, PivotTable};

/// Arrow schema for `table`: `Utf8` key, `UInt8` presence, `UInt32` ranks.
pub fn arrow_schema(table: &PivotTable) -> Arc<ArrowSchema> {
    let fields: Vec<Field> = table
        .columns()
        .iter()
        .map(|col| {
            let dt = match col {
                Column::Term => DataType::Utf8,
                Column::Category(_) => DataType::UInt8,
                Column::Month(_) => DataType::UInt32,
            };
            Field::new(col.to_string(), dt, false)
        })
        .collect();
    Arc::new(ArrowSchema::new(fields))
}

pub fn to_record_batch(table: &PivotTable) -> Result<RecordBatch> {
    let schema = arrow_schema(table);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    arrays.push(Arc::new(StringArray::from_iter_values(
        table.rows().map(|r| r.term()),
    )));
    for idx in 0..table.categories().len() {
        arrays.push(Arc::new(UInt8Array::from_iter_values(
            table.rows().map(|r| r.presence()[idx] as u8),
        )));
    }
    for pos in 0..table.months().len() {
        arrays.push(Arc::new(UInt32Array::from_iter_values(
            table.rows().map(|r| r.ranks()[pos]),
        )));
    }

    RecordBatch::try_new(schema, arrays).context("building pivot record batch")
}

/// Write `table` as a single Snappy-compressed Parquet file.
pub fn export_parquet(path: &Path, table: &PivotTable) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let batch = to_record_batch(table)?;
    let tmp = path.with_extension("parquet.tmp");

    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating Arrow writer for pivot table")?;
    writer.write(&batch).context("writing pivot batch")?;
    writer.close().context("closing pivot writer")?;

    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    info!("exported {} rows to {}", table.row_count(), path.display());
    Ok(())
}
