//! # Snapshot text format
//!
//! One record per line:
//!
//! ```text
//! <relative_path> <permission_octal> <owner_name> <group_name>
//! ```
//!
//! Fields are separated by a single space and nothing is quoted or escaped,
//! so a path or name containing whitespace cannot be stored. Such records are
//! refused when encoding. Decoding is lenient: a line that does not parse is
//! skipped and reported, the rest of the stream is still read.

use crate::common::{Mode, PathRecord, RelPath, Snapshot};
use crate::error::{CodecError, MalformedRecord, UnencodableRecordError};
use std::io::{self, BufRead, Write};

/// Result of decoding a snapshot stream.
#[derive(Debug, Default)]
pub struct Decoded {
    pub snapshot: Snapshot,
    pub diagnostics: Vec<MalformedRecord>,
}

fn check_field(field: &'static str, value: &str) -> Result<(), UnencodableRecordError> {
    let reason = if value.is_empty() {
        "empty"
    } else if value.chars().any(char::is_whitespace) {
        "contains whitespace"
    } else if value.chars().any(char::is_control) {
        "contains control characters"
    } else {
        return Ok(());
    };
    Err(UnencodableRecordError {
        field,
        value: value.to_string(),
        reason,
    })
}

/// Checks that `record` survives a trip through the line format.
pub fn check_record(record: &PathRecord) -> Result<(), UnencodableRecordError> {
    check_field("path", record.relative_path.as_str())?;
    check_field("owner", &record.owner)?;
    check_field("group", &record.group)
}

/// Renders one record, without the trailing newline.
pub fn encode_line(record: &PathRecord) -> Result<String, UnencodableRecordError> {
    check_record(record)?;
    Ok(format!(
        "{} {} {} {}",
        record.relative_path, record.mode, record.owner, record.group
    ))
}

pub fn encode<W: Write>(snapshot: &Snapshot, mut writer: W) -> Result<(), CodecError> {
    for record in snapshot.records() {
        let line = encode_line(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Parses one line. `Ok(None)` for blank lines.
fn decode_line(line: &str) -> Result<Option<PathRecord>, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        return Ok(None);
    }
    let [path, mode, owner, group] = fields[..] else {
        return Err(format!("expected 4 fields, found {}", fields.len()));
    };
    let relative_path = RelPath::parse(path)?;
    let mode: Mode = mode.parse().map_err(|e: crate::common::ParseModeError| e.to_string())?;
    Ok(Some(PathRecord {
        relative_path,
        mode,
        owner: owner.to_string(),
        group: group.to_string(),
    }))
}

/// Reads a snapshot. Only I/O errors on the stream itself are fatal.
pub fn decode<R: BufRead>(reader: R) -> io::Result<Decoded> {
    let mut decoded = Decoded::default();
    for (idx, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        let line_no = idx + 1;
        let malformed = |line: &str, reason: String| MalformedRecord {
            line_no,
            line: line.to_string(),
            reason,
        };

        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line.trim_end_matches('\r'),
            Err(_) => {
                let lossy = String::from_utf8_lossy(&raw);
                decoded
                    .diagnostics
                    .push(malformed(&lossy, "not valid UTF-8".into()));
                continue;
            }
        };

        match decode_line(line) {
            Ok(Some(record)) => {
                if let Err(dup) = decoded.snapshot.push(record) {
                    decoded.diagnostics.push(malformed(line, dup.to_string()));
                }
            }
            Ok(None) => {}
            Err(reason) => decoded.diagnostics.push(malformed(line, reason)),
        }
    }
    Ok(decoded)
}
