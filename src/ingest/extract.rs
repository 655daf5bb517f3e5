//! Schema-driven record extraction from a cursor window.

use std::fs;

use crate::schema::{FieldKind, FieldRole, Schema};

use super::{Cursor, IngestError};

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl FieldValue {
    /// Numeric view used for gauge publication.
    pub fn as_metric(&self) -> f64 {
        match self {
            FieldValue::Str(_) => 0.0,
            FieldValue::Int(v) => *v as f64,
            FieldValue::Float(v) => *v,
        }
    }

    /// String view, present only for `Str` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// One decoded, schema-typed line of a statistics data file.
///
/// The raw line is preserved for error reporting. Records live for one cycle:
/// they are handed to the sinks (and the relay tracker) and dropped.
#[derive(Debug, Clone)]
pub struct Record {
    pub schema: &'static Schema,
    pub values: Vec<FieldValue>,
    pub raw: String,
}

impl Record {
    /// Label values in schema field order.
    ///
    /// Label columns are always string-typed, so this is total for records
    /// produced by [`extract`].
    pub fn label_values(&self) -> Vec<&str> {
        self.schema
            .label_indices()
            .filter_map(|i| self.values[i].as_str())
            .collect()
    }

    /// Owned label values, for callers that outlive the record.
    pub fn owned_label_values(&self) -> Vec<String> {
        self.label_values().iter().map(|s| s.to_string()).collect()
    }

    /// A field's string value, looked up by column name.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        let idx = self.schema.field_index(name)?;
        self.values[idx].as_str()
    }
}

fn decode(kind: FieldKind, token: &str) -> FieldValue {
    // Tolerant numeric policy: a cell that fails to parse as its declared
    // kind decodes to the type's zero value, and extraction continues. The
    // upstream writer occasionally emits blank or truncated cells.
    match kind {
        FieldKind::Str => FieldValue::Str(token.to_string()),
        FieldKind::Int => FieldValue::Int(token.trim().parse().unwrap_or(0)),
        FieldKind::Float => FieldValue::Float(token.trim().parse().unwrap_or(0.0)),
    }
}

/// Decode every line in the cursor's window against `schema`.
///
/// Lines are returned in file order. The whole window is validated before
/// anything is returned: any line whose token count does not match the schema
/// aborts the extraction, and the caller receives zero records for this
/// cursor. Within a valid line, malformed numeric cells decode to zero and
/// never abort.
///
/// The backing file is re-read on every call; correctness relies on the
/// producer never rewriting lines inside an advertised range.
///
/// # Errors
/// - [`IngestError::DataFileUnreadable`] if the data file cannot be read
/// - [`IngestError::FlagRangeInvalid`] if the window points past the end of
///   the data file
/// - [`IngestError::FieldCountMismatch`] if any line in the window has the
///   wrong number of tokens
pub fn extract(schema: &'static Schema, cursor: &Cursor) -> Result<Vec<Record>, IngestError> {
    if cursor.is_empty() {
        return Ok(Vec::new());
    }

    let content =
        fs::read_to_string(&cursor.data_path).map_err(|source| IngestError::DataFileUnreadable {
            path: cursor.data_path.clone(),
            source,
        })?;
    let lines: Vec<&str> = content.split('\n').collect();

    let mut records = Vec::with_capacity(cursor.len() as usize);
    for line_no in cursor.start..=cursor.end {
        let Some(raw) = lines.get(line_no as usize - 1) else {
            return Err(IngestError::FlagRangeInvalid {
                path: cursor.data_path.clone(),
                reason: format!("line {line_no} is past the end of the data file"),
            });
        };
        let raw = raw.replace('\r', "");

        let tokens: Vec<&str> = raw.split('|').collect();
        if tokens.len() != schema.fields.len() {
            return Err(IngestError::FieldCountMismatch {
                line: line_no,
                expected: schema.fields.len(),
                got: tokens.len(),
            });
        }

        let values = schema
            .fields
            .iter()
            .zip(&tokens)
            .map(|(desc, token)| decode(desc.kind, token))
            .collect();

        records.push(Record {
            schema,
            values,
            raw,
        });
    }

    Ok(records)
}
