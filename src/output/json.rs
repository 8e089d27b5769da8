//! JSON rendering.

use std::io::Write;

use serde::Serialize;

use crate::error::AtlasError;

/// Writes `value` as pretty-printed JSON followed by a newline.
///
/// # Errors
///
/// Returns [`AtlasError::Io`] if serialization or writing fails.
pub fn write_json<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    value: &T,
) -> Result<(), AtlasError> {
    serde_json::to_writer_pretty(&mut *writer, value).map_err(|e| AtlasError::Io {
        message: format!("JSON serialization failed: {e}"),
    })?;
    writeln!(writer).map_err(|e| AtlasError::io(&e))?;
    Ok(())
}
