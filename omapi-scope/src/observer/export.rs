//! JSON export of stored records.
//!
//! The export is a single pretty-printed JSON array of full-verbosity
//! payloads. Each element has the same shape as the objects producers send
//! over the socket.

use omapi_scope_common::{RecordPayload, Verbosity};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::ExportError;
use crate::record::CallRecord;
use crate::transport::encode_payload;

/// Write `records` as a pretty-printed JSON array.
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn export_records<W: Write>(records: &[CallRecord], mut writer: W) -> Result<(), ExportError> {
    let payloads: Vec<RecordPayload> =
        records.iter().map(|r| encode_payload(r, Verbosity::Full)).collect();
    serde_json::to_writer_pretty(&mut writer, &payloads)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Create `path` and export `records` into it.
///
/// # Errors
/// Returns an error if the file can't be created or written.
pub fn export_to_file(records: &[CallRecord], path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    export_records(records, BufWriter::new(file))
}
