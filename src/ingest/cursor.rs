//! Flag-file cursor resolution.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::IngestError;

/// A resolved poll window: the data file to read and the inclusive 1-based
/// line range that is new this cycle.
///
/// `start == end + 1` is a valid empty window meaning "nothing new". The
/// cursor is recomputed fresh every poll and never persisted — the upstream
/// writer owns the flag-file state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub data_path: PathBuf,
    pub start: u64,
    pub end: u64,
}

impl Cursor {
    /// True when the window contains no lines.
    pub fn is_empty(&self) -> bool {
        self.start == self.end + 1
    }

    /// Number of lines in the window.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }
}

/// Resolve a flag file into a [`Cursor`].
///
/// The flag file's first line must be `<dataFileName>|<start>|<end>`; any
/// content after the first newline is ignored. The data file name is joined
/// onto the flag file's directory and must be a bare file name — the producer
/// is not trusted to point the exporter anywhere else on the filesystem.
///
/// # Errors
/// - [`IngestError::FlagFileUnreadable`] if the file cannot be opened or read
/// - [`IngestError::FlagFileMalformed`] if the first line does not split into
///   exactly three tokens, or the file name token is empty or contains path
///   components
/// - [`IngestError::FlagRangeInvalid`] if a numeric token fails to parse, the
///   range is not 1-based, or `start > end + 1`
pub fn resolve(flag_path: &Path) -> Result<Cursor, IngestError> {
    let unreadable = |source| IngestError::FlagFileUnreadable {
        path: flag_path.to_path_buf(),
        source,
    };
    let malformed = |reason: String| IngestError::FlagFileMalformed {
        path: flag_path.to_path_buf(),
        reason,
    };
    let invalid = |reason: String| IngestError::FlagRangeInvalid {
        path: flag_path.to_path_buf(),
        reason,
    };

    let file = File::open(flag_path).map_err(unreadable)?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .map_err(unreadable)?;

    let tokens: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('|').collect();
    if tokens.len() != 3 {
        return Err(malformed(format!(
            "expected 3 '|'-delimited tokens, got {}",
            tokens.len()
        )));
    }

    let name = tokens[0].trim();
    if name.is_empty() {
        return Err(malformed("empty data file name".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(malformed(format!(
            "data file name '{name}' must not contain path components"
        )));
    }

    let start: u64 = tokens[1]
        .trim()
        .parse()
        .map_err(|_| invalid(format!("start line '{}' is not an integer", tokens[1].trim())))?;
    let end: u64 = tokens[2]
        .trim()
        .parse()
        .map_err(|_| invalid(format!("end line '{}' is not an integer", tokens[2].trim())))?;

    if start == 0 {
        return Err(invalid("line numbers are 1-based".to_string()));
    }
    if start > end + 1 {
        return Err(invalid(format!("start {start} > end {end} + 1")));
    }

    let dir = flag_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(Cursor {
        data_path: dir.join(name),
        start,
        end,
    })
}
