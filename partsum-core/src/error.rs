use std::path::PathBuf;
use thiserror::Error;

/// Classification of a [`ChecksumError`], used by callers that decide
/// whether a part should be re-fetched or the failure is fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    HashMismatch,
    SizeMismatch,
    FileMissing,
    UnexpectedFile,
    NoSuchFile,
    CountMismatch,
    FormatTooOld,
    UnknownFormatVersion,
    MalformedStream,
    Io,
}

impl ErrorCode {
    /// True when the part failed integrity verification (as opposed to
    /// an I/O failure or an unreadable manifest).
    pub fn is_bad_checksums(self) -> bool {
        matches!(
            self,
            ErrorCode::HashMismatch
                | ErrorCode::SizeMismatch
                | ErrorCode::UnexpectedFile
                | ErrorCode::NoSuchFile
                | ErrorCode::CountMismatch
        )
    }
}

pub fn is_bad_checksums_error_code(code: ErrorCode) -> bool {
    code.is_bad_checksums()
}

/// One of the aggregate hashes carried by a part fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateHash {
    UncompressedFiles,
    UncompressedHashOfCompressedFiles,
    AllFiles,
}

impl std::fmt::Display for AggregateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AggregateHash::UncompressedFiles => "hash of uncompressed files doesn't match",
            AggregateHash::UncompressedHashOfCompressedFiles => {
                "uncompressed hash of compressed files doesn't match"
            }
            AggregateHash::AllFiles => "total hash of all files doesn't match",
        };
        f.write_str(s)
    }
}

fn side(uncompressed: &bool) -> &'static str {
    if *uncompressed {
        "uncompressed"
    } else {
        "stored"
    }
}

fn join_mismatches(m: &[AggregateHash]) -> String {
    m.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("checksum mismatch for {} file {file} in data part", side(.uncompressed))]
    HashMismatch { file: String, uncompressed: bool },

    #[error("no uncompressed checksum for file {file}")]
    NoUncompressedChecksum { file: String },

    #[error(
        "unexpected {} size of file {file} in data part: {actual} instead of {expected}",
        side(.uncompressed)
    )]
    SizeMismatch { file: String, expected: u64, actual: u64, uncompressed: bool },

    #[error("{} doesn't exist", .path.display())]
    FileMissing { path: PathBuf },

    #[error("unexpected file {file} in data part")]
    UnexpectedFile { file: String },

    #[error("no file {file} in data part")]
    NoSuchFile { file: String },

    #[error(
        "different number of files: {compressed} compressed (expected {expected_compressed}) \
         and {uncompressed} uncompressed ones (expected {expected_uncompressed})"
    )]
    CountMismatch {
        compressed: u64,
        expected_compressed: u64,
        uncompressed: u64,
        expected_uncompressed: u64,
    },

    #[error("checksums of parts don't match: {}", join_mismatches(.mismatches))]
    AggregateMismatch { mismatches: Vec<AggregateHash> },

    #[error("checksums format version {version} is too old")]
    FormatTooOld { version: u64 },

    #[error("unknown checksums format version: {version}")]
    UnknownFormatVersion { version: u64 },

    #[error("malformed checksums stream: {reason}")]
    Malformed { reason: String },

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl ChecksumError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ChecksumError::HashMismatch { .. }
            | ChecksumError::NoUncompressedChecksum { .. }
            | ChecksumError::AggregateMismatch { .. } => ErrorCode::HashMismatch,
            ChecksumError::SizeMismatch { .. } => ErrorCode::SizeMismatch,
            ChecksumError::FileMissing { .. } => ErrorCode::FileMissing,
            ChecksumError::UnexpectedFile { .. } => ErrorCode::UnexpectedFile,
            ChecksumError::NoSuchFile { .. } => ErrorCode::NoSuchFile,
            ChecksumError::CountMismatch { .. } => ErrorCode::CountMismatch,
            ChecksumError::FormatTooOld { .. } => ErrorCode::FormatTooOld,
            ChecksumError::UnknownFormatVersion { .. } => ErrorCode::UnknownFormatVersion,
            ChecksumError::Malformed { .. } => ErrorCode::MalformedStream,
            ChecksumError::Io(_) => ErrorCode::Io,
        }
    }

    pub fn is_bad_checksums(&self) -> bool {
        self.code().is_bad_checksums()
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ChecksumError::Malformed { reason: reason.into() }
    }
}

impl From<std::io::Error> for ChecksumError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ChecksumError::malformed("unexpected end of stream")
        } else {
            ChecksumError::Io(e)
        }
    }
}

pub type Result<T, E = ChecksumError> = std::result::Result<T, E>;
