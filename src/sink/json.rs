use crate::error::SinkError;
use crate::models::Record;
use std::io::Write;

/// Write records as a pretty-printed JSON array followed by a newline.
pub fn write_records(records: &[Record], writer: &mut impl Write) -> Result<(), SinkError> {
    serde_json::to_writer_pretty(&mut *writer, records)?;
    writer.write_all(b"\n")?;
    Ok(())
}
