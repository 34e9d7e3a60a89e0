//! Diagnostic JSON dump of parsed motion data, for offline inspection.

use crate::{Error, MotionData};
use std::io::Write;

/// Renders a parsed motion as pretty-printed JSON.
pub fn to_json(data: &MotionData) -> Result<String, Error> {
    serde_json::to_string_pretty(data).map_err(|e| Error::DumpEncode {
        message: e.to_string(),
    })
}

/// Writes the JSON dump to `writer`.
pub fn write_to<W: Write>(data: &MotionData, writer: &mut W) -> Result<(), Error> {
    let json = to_json(data)?;
    writer
        .write_all(json.as_bytes())
        .map_err(|e| Error::DumpEncode {
            message: e.to_string(),
        })
}
