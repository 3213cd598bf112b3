//! Compact aggregate summary of a part's checksums, for comparing copies
//! without shipping every per-file entry.

use crate::config::ManifestConfig;
use crate::error::{AggregateHash, ChecksumError, Result};
use crate::hash::{Blake3Accumulator, HashAccumulator};
use crate::manifest::PartChecksumManifest;
use crate::wire;
use std::io::{BufRead, Write};

/// Header version of the fingerprint blob. Lower header versions carry a
/// full manifest instead.
pub const FINGERPRINT_VERSION: u64 = 5;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartFingerprint {
    pub compressed_file_count: u64,
    pub uncompressed_file_count: u64,
    /// Over (name, stored hash) of every file.
    pub hash_of_all_files: u128,
    /// Over (name, stored hash) of files that are not compressed.
    pub hash_of_uncompressed_files: u128,
    /// Over (name, uncompressed hash) of compressed files.
    pub uncompressed_hash_of_compressed_files: u128,
    /// Present only when decoded from a stream that predates fingerprints.
    pub full: Option<PartChecksumManifest>,
}

impl PartFingerprint {
    /// Single pass over the manifest in name order.
    pub fn compute_total_checksums(manifest: &PartChecksumManifest) -> Self {
        let mut all = Blake3Accumulator::new();
        let mut uncompressed = Blake3Accumulator::new();
        let mut compressed_logical = Blake3Accumulator::new();
        let mut fp = PartFingerprint::default();

        for (name, sum) in manifest.files() {
            all.update_named_hash(name, sum.hash);
            if sum.is_compressed {
                fp.compressed_file_count += 1;
                compressed_logical.update_named_hash(name, sum.uncompressed_hash);
            } else {
                fp.uncompressed_file_count += 1;
                uncompressed.update_named_hash(name, sum.hash);
            }
        }

        fp.hash_of_all_files = all.finalize();
        fp.hash_of_uncompressed_files = uncompressed.finalize();
        fp.uncompressed_hash_of_compressed_files = compressed_logical.finalize();
        fp
    }

    /// Compares `rhs` (the candidate) against `self`. With
    /// `prefer_uncompressed_hash_of_compressed`, compressed files are compared
    /// by logical content, so recompressed copies still match.
    pub fn check_equal(
        &self,
        rhs: &PartFingerprint,
        prefer_uncompressed_hash_of_compressed: bool,
    ) -> Result<()> {
        if let (Some(full), Some(rhs_full)) = (&self.full, &rhs.full) {
            full.check_equal(rhs_full, prefer_uncompressed_hash_of_compressed)?;
        }
        // Aggregates are checked even after a full per-file match.
        self.check_aggregates(rhs, prefer_uncompressed_hash_of_compressed)
    }

    pub fn check_equal_manifest(
        &self,
        rhs: &PartChecksumManifest,
        prefer_uncompressed_hash_of_compressed: bool,
    ) -> Result<()> {
        if let Some(full) = &self.full {
            full.check_equal(rhs, prefer_uncompressed_hash_of_compressed)?;
        }
        let rhs_fp = PartFingerprint::compute_total_checksums(rhs);
        self.check_aggregates(&rhs_fp, prefer_uncompressed_hash_of_compressed)
    }

    fn check_aggregates(&self, rhs: &PartFingerprint, prefer_uncompressed: bool) -> Result<()> {
        if self.compressed_file_count != rhs.compressed_file_count
            || self.uncompressed_file_count != rhs.uncompressed_file_count
        {
            return Err(ChecksumError::CountMismatch {
                compressed: rhs.compressed_file_count,
                expected_compressed: self.compressed_file_count,
                uncompressed: rhs.uncompressed_file_count,
                expected_uncompressed: self.uncompressed_file_count,
            });
        }

        let mut mismatches = Vec::new();
        if self.hash_of_uncompressed_files != rhs.hash_of_uncompressed_files {
            mismatches.push(AggregateHash::UncompressedFiles);
        }
        if prefer_uncompressed {
            let (a, b) = (
                self.uncompressed_hash_of_compressed_files,
                rhs.uncompressed_hash_of_compressed_files,
            );
            if a != b {
                mismatches.push(AggregateHash::UncompressedHashOfCompressedFiles);
            }
        } else if self.hash_of_all_files != rhs.hash_of_all_files {
            mismatches.push(AggregateHash::AllFiles);
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(ChecksumError::AggregateMismatch { mismatches })
        }
    }

    pub fn serialize<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        wire::write_header(w, FINGERPRINT_VERSION)?;
        self.serialize_without_header(w)
    }

    pub fn serialize_without_header<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        wire::write_varint(w, self.compressed_file_count)?;
        wire::write_varint(w, self.uncompressed_file_count)?;
        wire::write_hash(w, self.hash_of_all_files)?;
        wire::write_hash(w, self.hash_of_uncompressed_files)?;
        wire::write_hash(w, self.uncompressed_hash_of_compressed_files)?;
        Ok(())
    }

    /// Reads a fingerprint blob. An older header version holds a full
    /// manifest instead; it is decoded with `config` and kept in `full`.
    pub fn deserialize<R: BufRead + ?Sized>(r: &mut R, config: ManifestConfig) -> Result<Self> {
        let version = wire::read_header(r)?;
        if version < FINGERPRINT_VERSION {
            tracing::warn!(
                version,
                "fingerprint stream holds a full manifest; deriving aggregates"
            );
            let mut full = PartChecksumManifest::new(config);
            full.read_body(r, version)?;
            let mut fp = PartFingerprint::compute_total_checksums(&full);
            fp.full = Some(full);
            return Ok(fp);
        }
        if version > FINGERPRINT_VERSION {
            return Err(ChecksumError::UnknownFormatVersion { version });
        }
        Self::deserialize_without_header(r)
    }

    pub fn deserialize_without_header<R: BufRead + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(PartFingerprint {
            compressed_file_count: wire::read_varint(r)?,
            uncompressed_file_count: wire::read_varint(r)?,
            hash_of_all_files: wire::read_hash(r)?,
            hash_of_uncompressed_files: wire::read_hash(r)?,
            uncompressed_hash_of_compressed_files: wire::read_hash(r)?,
            full: None,
        })
    }

    pub fn serialized_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.serialize(&mut out)?;
        Ok(out)
    }

    /// Decodes a whole buffer; leftover bytes are an error.
    pub fn deserialize_from(bytes: &[u8], config: ManifestConfig) -> Result<Self> {
        let mut r = bytes;
        let fp = Self::deserialize(&mut r, config)?;
        if !wire::at_eof(&mut r)? {
            return Err(ChecksumError::malformed(format!(
                "{} trailing bytes after fingerprint",
                r.len()
            )));
        }
        Ok(fp)
    }

    /// The full manifest (current format) or, with `minimalistic`, its
    /// fingerprint blob.
    pub fn serialized_for(manifest: &PartChecksumManifest, minimalistic: bool) -> Result<Vec<u8>> {
        if minimalistic {
            PartFingerprint::compute_total_checksums(manifest).serialized_bytes()
        } else {
            manifest.serialized_bytes()
        }
    }
}
