use crate::disk::DiskQuery;
use crate::error::{ChecksumError, Result};
use std::path::Path;

/// Checksum record for one file of a part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileChecksum {
    /// Byte length as stored.
    pub size: u64,
    /// Hash of the stored (possibly compressed) bytes.
    pub hash: u128,
    pub is_compressed: bool,
    /// Only meaningful when `is_compressed`.
    pub uncompressed_size: u64,
    /// Only meaningful when `is_compressed`.
    pub uncompressed_hash: u128,
    /// Position inside a packed physical object; zero on plain local storage.
    pub offset: u64,
    /// Mutation that produced the entry (remote storage only). Not part of
    /// any equality check.
    pub mutation_version: u64,
    pub is_deleted: bool,
}

impl FileChecksum {
    pub fn new(size: u64, hash: u128) -> Self {
        Self { size, hash, ..Self::default() }
    }

    pub fn with_offset(offset: u64, size: u64, hash: u128) -> Self {
        Self { offset, size, hash, ..Self::default() }
    }

    pub fn compressed(
        size: u64,
        hash: u128,
        uncompressed_size: u64,
        uncompressed_hash: u128,
    ) -> Self {
        Self {
            size,
            hash,
            is_compressed: true,
            uncompressed_size,
            uncompressed_hash,
            ..Self::default()
        }
    }

    /// Compares `other` (the candidate) against `self` (the reference).
    ///
    /// With `compare_uncompressed` and a compressed reference, only the
    /// logical (decompressed) size and hash are compared, so a recompressed
    /// copy still matches. Otherwise the stored bytes are compared.
    pub fn check_equal(
        &self,
        other: &FileChecksum,
        compare_uncompressed: bool,
        name: &str,
    ) -> Result<()> {
        if self.is_compressed && compare_uncompressed {
            if !other.is_compressed {
                return Err(ChecksumError::NoUncompressedChecksum { file: name.to_string() });
            }
            if other.uncompressed_size != self.uncompressed_size {
                return Err(ChecksumError::SizeMismatch {
                    file: name.to_string(),
                    expected: self.uncompressed_size,
                    actual: other.uncompressed_size,
                    uncompressed: true,
                });
            }
            if other.uncompressed_hash != self.uncompressed_hash {
                return Err(ChecksumError::HashMismatch {
                    file: name.to_string(),
                    uncompressed: true,
                });
            }
            return Ok(());
        }
        if other.size != self.size {
            return Err(ChecksumError::SizeMismatch {
                file: name.to_string(),
                expected: self.size,
                actual: other.size,
                uncompressed: false,
            });
        }
        if other.hash != self.hash {
            return Err(ChecksumError::HashMismatch { file: name.to_string(), uncompressed: false });
        }
        Ok(())
    }

    /// Checks the file at `path` exists and has the recorded size.
    /// Directories are projection sub-parts and are not size-checked.
    pub fn check_size<D: DiskQuery + ?Sized>(&self, disk: &D, path: &Path) -> Result<()> {
        if !disk.exists(path) {
            return Err(ChecksumError::FileMissing { path: path.to_path_buf() });
        }
        if disk.is_directory(path) {
            return Ok(());
        }
        let actual = disk.file_size(path)?;
        if actual != self.size {
            return Err(ChecksumError::SizeMismatch {
                file: path.display().to_string(),
                expected: self.size,
                actual,
                uncompressed: false,
            });
        }
        Ok(())
    }
}
