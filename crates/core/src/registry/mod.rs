//! Function registry loader.
//!
//! The registry is a plain-text list of declarations, one per line:
//!
//! ```text
//! # comment
//! sceVif1PkInit = 0x20B1D8, 0x10;
//! sceDmaSync    = 0x20C000, 0x48; // HARDWARE
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. The token `HARDWARE`
//! after the terminating `;` marks the entry as hardware-stubbed.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Category, FunctionRecord, INSTRUCTION_WIDTH};

/// Marker token that flags an entry as hardware-stubbed.
pub const HARDWARE_MARKER: &str = "HARDWARE";

/// What to do with a line that is neither blank, a comment, nor a valid entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Fail the whole load on the first bad line.
    #[default]
    Strict,
    /// Log and drop bad lines, keeping them on the registry for reporting.
    Lenient,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("line {line}: malformed registry entry `{content}`: {reason}")]
    MalformedEntry { line: usize, content: String, reason: String },

    #[error("line {line}: duplicate registry entry `{name}` (first declared on line {first_line})")]
    DuplicateEntry { line: usize, name: String, first_line: usize },

    #[error("failed to read registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    fn malformed(line: usize, content: &str, reason: impl Into<String>) -> Self {
        RegistryError::MalformedEntry { line, content: content.to_string(), reason: reason.into() }
    }
}

/// Parsed registry: records in declaration order with unique names.
#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<FunctionRecord>,
    rejected: Vec<RegistryError>,
}

impl Registry {
    /// Build a registry from already-constructed records.
    ///
    /// Later duplicates of a name are dropped.
    pub fn from_records(records: impl IntoIterator<Item = FunctionRecord>) -> Self {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for record in records {
            if seen.insert(record.name.clone()) {
                out.push(record);
            }
        }
        Self { records: out, rejected: Vec::new() }
    }

    /// Read and parse the registry file at `path`.
    pub fn load(path: &Path, mode: ParseMode) -> Result<Self, RegistryError> {
        let body = fs::read_to_string(path)
            .map_err(|source| RegistryError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&body, mode)
    }

    /// Parse registry text.
    pub fn parse(body: &str, mode: ParseMode) -> Result<Self, RegistryError> {
        let mut records = Vec::new();
        let mut rejected = Vec::new();
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for (idx, raw) in body.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parsed = parse_line(line_no, line).and_then(|record| {
                if let Some(&first_line) = first_seen.get(&record.name) {
                    Err(RegistryError::DuplicateEntry { line: line_no, name: record.name, first_line })
                } else {
                    Ok(record)
                }
            });

            match parsed {
                Ok(record) => {
                    first_seen.insert(record.name.clone(), line_no);
                    records.push(record);
                }
                Err(err) => match mode {
                    ParseMode::Strict => return Err(err),
                    ParseMode::Lenient => {
                        log::warn!("skipping registry line: {err}");
                        rejected.push(err);
                    }
                },
            }
        }

        Ok(Self { records, rejected })
    }

    pub fn records(&self) -> &[FunctionRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FunctionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FunctionRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Lines dropped while parsing in lenient mode.
    pub fn rejected(&self) -> &[RegistryError] {
        &self.rejected
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a FunctionRecord;
    type IntoIter = std::slice::Iter<'a, FunctionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<FunctionRecord, RegistryError> {
    let (name, rest) =
        line.split_once('=').ok_or_else(|| RegistryError::malformed(line_no, line, "missing `=`"))?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RegistryError::malformed(line_no, line, "invalid function name"));
    }

    let (body, trailer) = rest
        .split_once(';')
        .ok_or_else(|| RegistryError::malformed(line_no, line, "missing terminating `;`"))?;
    let (address, size) = body
        .split_once(',')
        .ok_or_else(|| RegistryError::malformed(line_no, line, "expected `address, size`"))?;

    let address = parse_hex(address.trim())
        .ok_or_else(|| RegistryError::malformed(line_no, line, "address is not a 0x hex literal"))?;
    let size = parse_hex(size.trim())
        .ok_or_else(|| RegistryError::malformed(line_no, line, "size is not a 0x hex literal"))?;
    if size == 0 {
        return Err(RegistryError::malformed(line_no, line, "size must be non-zero"));
    }
    if size % INSTRUCTION_WIDTH != 0 {
        return Err(RegistryError::malformed(
            line_no,
            line,
            format!("size 0x{size:X} is not a multiple of {INSTRUCTION_WIDTH}"),
        ));
    }

    let category = if has_hardware_marker(trailer) {
        Category::HardwareStubbed
    } else {
        Category::Normal
    };

    Ok(FunctionRecord::new(name, address, size, category))
}

fn has_hardware_marker(trailer: &str) -> bool {
    trailer
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == HARDWARE_MARKER)
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
