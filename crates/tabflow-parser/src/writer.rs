use std::io::Write;

use crate::errors::WriteError;
use crate::model::{Table, Value};

/// Writes a header row followed by every row; nulls become empty fields.
pub fn write_delimited<W: Write>(table: &Table, sink: W) -> Result<(), WriteError> {
    let mut writer = csv::Writer::from_writer(sink);
    if table.width() > 0 {
        writer.write_record(table.column_names())?;
        for row in table.rows()? {
            writer.write_record(row.iter().map(Value::to_string))?;
        }
    }
    writer.flush()?;
    Ok(())
}
