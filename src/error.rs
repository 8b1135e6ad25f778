//! Error types for reading VCF and BCF files.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VcfError>;

#[derive(Debug, Error)]
pub enum VcfError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The leading bytes match no supported container or compression.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// The input ended inside a compressed block or a binary record.
    #[error("truncated input: {0}")]
    TruncatedInput(String),

    #[error("decompression error: {0}")]
    Decompression(niffler::Error),

    #[error("malformed header at line {line}: {msg}")]
    MalformedHeader { line: usize, msg: String },

    #[error("duplicate {namespace} field {id}")]
    DuplicateField { namespace: &'static str, id: String },

    #[error("unknown Type '{kind}' for field {id}")]
    UnknownType { id: String, kind: String },

    #[error("line {line}: expected at least 8 columns, found {found}")]
    ColumnCount { line: usize, found: usize },

    #[error("line {line}: invalid position '{value}'")]
    InvalidPosition { line: usize, value: String },

    #[error("line {line}: INFO key {key} is not declared in the header")]
    UnknownInfoKey { line: usize, key: String },

    #[error("line {line}: INFO field {key} expects {expected} values, found {found}")]
    ArityMismatch {
        line: usize,
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid value for {field}: {msg}")]
    InvalidValue {
        line: usize,
        field: String,
        msg: String,
    },
}

impl VcfError {
    /// Whether this error concerns a single record, as opposed to the
    /// container or the header.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            VcfError::ColumnCount { .. }
                | VcfError::InvalidPosition { .. }
                | VcfError::UnknownInfoKey { .. }
                | VcfError::ArityMismatch { .. }
                | VcfError::InvalidValue { .. }
        )
    }

    /// The 1-based line (or, for BCF, record) number the error refers to.
    pub fn line(&self) -> Option<usize> {
        match self {
            VcfError::MalformedHeader { line, .. }
            | VcfError::ColumnCount { line, .. }
            | VcfError::InvalidPosition { line, .. }
            | VcfError::UnknownInfoKey { line, .. }
            | VcfError::ArityMismatch { line, .. }
            | VcfError::InvalidValue { line, .. } => Some(*line),
            _ => None,
        }
    }

    pub(crate) fn invalid_value(line: usize, field: &str, msg: impl Into<String>) -> Self {
        VcfError::InvalidValue {
            line,
            field: field.to_owned(),
            msg: msg.into(),
        }
    }

    pub(crate) fn malformed_header(line: usize, msg: impl Into<String>) -> Self {
        VcfError::MalformedHeader {
            line,
            msg: msg.into(),
        }
    }
}

impl From<niffler::Error> for VcfError {
    fn from(e: niffler::Error) -> Self {
        match e {
            niffler::Error::FileTooShort => {
                VcfError::TruncatedInput("compressed stream is too short".into())
            }
            niffler::Error::IOError(e) => VcfError::Io(e),
            other => VcfError::Decompression(other),
        }
    }
}

/// Maps an I/O error raised while pulling decompressed bytes; a decoder
/// hitting end of input mid-block reports `UnexpectedEof`.
pub(crate) fn from_read_error(e: io::Error) -> VcfError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        VcfError::TruncatedInput(e.to_string())
    } else {
        VcfError::Io(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_errors_are_classified() {
        let e = VcfError::ColumnCount { line: 3, found: 5 };
        assert!(e.is_record_error());
        assert_eq!(e.line(), Some(3));

        let e = VcfError::DuplicateField {
            namespace: "INFO",
            id: "AN".into(),
        };
        assert!(!e.is_record_error());
        assert_eq!(e.line(), None);
    }

    #[test]
    fn test_unexpected_eof_is_truncation() {
        let e = from_read_error(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(e, VcfError::TruncatedInput(_)));
        let e = from_read_error(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(e, VcfError::Io(_)));
    }
}
