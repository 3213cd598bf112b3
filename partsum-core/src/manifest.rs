use crate::checksum::FileChecksum;
use crate::config::ManifestConfig;
use crate::disk::DiskQuery;
use crate::error::{ChecksumError, Result};
use crate::format::{Files, FormatVersion, CURRENT_VERSION, LOCAL_VERSION};
use crate::hash::{to_hex_upper, Blake3Accumulator, HashAccumulator};
use crate::map_layout::{self, ImplicitKeyOffsetReconciler, MergeAdjustment};
use crate::metrics::{GaugeGuard, PART_CHECKSUMS};
use crate::wire;
use std::io::{BufRead, Write};
use std::path::Path;

/// File name of the manifest inside a part directory.
pub const MANIFEST_FILE_NAME: &str = "checksums.txt";

/// Suffix of column data files.
pub const DATA_FILE_SUFFIX: &str = ".bin";

/// Inverted-index artifacts; they have no stable checksum and are never
/// required to match.
pub const EXCLUDED_SUFFIXES: [&str; 4] = [".gin_dict", ".gin_post", ".gin_seg", ".gin_sid"];

pub fn is_excluded_artifact(name: &str) -> bool {
    EXCLUDED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Checksums of every file of one part, keyed and iterated by name.
#[derive(Clone, Debug)]
pub struct PartChecksumManifest {
    files: Files,
    config: ManifestConfig,
    _live: GaugeGuard,
}

impl Default for PartChecksumManifest {
    fn default() -> Self {
        Self::new(ManifestConfig::default())
    }
}

/// Equal when the file sets and every entry match; the config is not compared.
impl PartialEq for PartChecksumManifest {
    fn eq(&self, other: &Self) -> bool {
        self.files == other.files
    }
}

impl PartChecksumManifest {
    pub fn new(config: ManifestConfig) -> Self {
        Self { files: Files::new(), config, _live: PART_CHECKSUMS.acquire() }
    }

    pub fn config(&self) -> &ManifestConfig {
        &self.config
    }

    pub fn files(&self) -> &Files {
        &self.files
    }

    pub(crate) fn files_mut(&mut self) -> &mut Files {
        &mut self.files
    }

    pub fn get(&self, name: &str) -> Option<&FileChecksum> {
        self.files.get(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn add_file(&mut self, name: &str, size: u64, hash: u128) {
        self.files.insert(name.to_string(), FileChecksum::new(size, hash));
    }

    pub fn add_file_at(&mut self, name: &str, offset: u64, size: u64, hash: u128) {
        self.files.insert(name.to_string(), FileChecksum::with_offset(offset, size, hash));
    }

    /// Inserts or overwrites a complete entry.
    pub fn insert(&mut self, name: &str, sum: FileChecksum) {
        self.files.insert(name.to_string(), sum);
    }

    /// Moves every entry of `other` into `self`, overwriting on name
    /// collision. `other` is left empty.
    pub fn add(&mut self, other: &mut PartChecksumManifest) {
        let moved = std::mem::take(&mut other.files);
        self.files.extend(moved);
    }

    /// [`add`](Self::add), then runs each adjustment against `reference`.
    /// Returns true when any adjustment changed an entry.
    pub fn add_with(
        &mut self,
        other: &mut PartChecksumManifest,
        reference: &PartChecksumManifest,
        adjustments: &[&dyn MergeAdjustment],
    ) -> Result<bool> {
        self.add(other);
        let mut changed = false;
        for adj in adjustments {
            changed |= adj.adjust(self, reference)?;
        }
        Ok(changed)
    }

    /// Verifies `rhs` (the candidate) against `self` (the reference).
    ///
    /// Every file of `rhs` must be known here, and every file here, apart
    /// from excluded index artifacts, must be present in `rhs` with a
    /// matching checksum.
    pub fn check_equal(
        &self,
        rhs: &PartChecksumManifest,
        compare_uncompressed: bool,
    ) -> Result<()> {
        if let Some(name) = rhs.files.keys().find(|name| !self.files.contains_key(*name)) {
            return Err(ChecksumError::UnexpectedFile { file: name.clone() });
        }
        for (name, sum) in &self.files {
            if is_excluded_artifact(name) {
                continue;
            }
            let other = rhs
                .files
                .get(name)
                .ok_or_else(|| ChecksumError::NoSuchFile { file: name.clone() })?;
            sum.check_equal(other, compare_uncompressed, name)?;
        }
        Ok(())
    }

    /// True when both manifests hold `name` with the same stored size and hash.
    pub fn is_equal(&self, rhs: &PartChecksumManifest, name: &str) -> bool {
        match (self.files.get(name), rhs.files.get(name)) {
            (Some(a), Some(b)) => a.size == b.size && a.hash == b.hash,
            _ => false,
        }
    }

    /// Checks existence and size of every file under `base`.
    pub fn check_sizes<D: DiskQuery + ?Sized>(&self, disk: &D, base: &Path) -> Result<()> {
        for (name, sum) in &self.files {
            if is_excluded_artifact(name) {
                continue;
            }
            // Implicit map-key files live inside a shared file; the column
            // layer checks those.
            if self.config.compact_map_layout && map_layout::is_map_implicit_key(name) {
                continue;
            }
            sum.check_size(disk, &base.join(name))?;
        }
        Ok(())
    }

    pub fn total_size_on_disk(&self) -> u64 {
        self.files.values().map(|s| s.size).sum()
    }

    /// Feeds name, uncompressed size and uncompressed hash of every column
    /// data file, in name order.
    pub fn compute_total_checksum_data_only<H: HashAccumulator + ?Sized>(&self, hash: &mut H) {
        for (name, sum) in &self.files {
            if !name.ends_with(DATA_FILE_SUFFIX) {
                continue;
            }
            hash.update_str(name);
            hash.update_u64(sum.uncompressed_size);
            hash.update_u128(sum.uncompressed_hash);
        }
    }

    /// Aggregate over (name, stored hash) of every file. Same value as a
    /// fingerprint's `hash_of_all_files`.
    pub fn total_checksum_u128(&self) -> u128 {
        let mut h = Blake3Accumulator::new();
        for (name, sum) in &self.files {
            h.update_named_hash(name, sum.hash);
        }
        h.finalize()
    }

    pub fn total_checksum_hex(&self) -> String {
        to_hex_upper(self.total_checksum_u128())
    }

    /// Replaces the contents with a manifest decoded from `r`; the version
    /// is taken from the header line.
    pub fn read<R: BufRead + ?Sized>(&mut self, r: &mut R) -> Result<()> {
        self.files.clear();
        let version = wire::read_header(r)?;
        self.read_body(r, version)
    }

    /// Decodes a body whose header has already been consumed.
    pub fn read_body<R: BufRead + ?Sized>(&mut self, r: &mut R, version: u64) -> Result<()> {
        self.files = FormatVersion::from_tag(version)?.decode(r, &self.config)?;
        Ok(())
    }

    pub fn decode<R: BufRead + ?Sized>(r: &mut R, config: ManifestConfig) -> Result<Self> {
        let mut m = Self::new(config);
        m.read(r)?;
        Ok(m)
    }

    /// Decodes a whole buffer; leftover bytes are an error.
    pub fn deserialize_from(bytes: &[u8], config: ManifestConfig) -> Result<Self> {
        let mut r = bytes;
        let m = Self::decode(&mut r, config)?;
        if !wire::at_eof(&mut r)? {
            return Err(ChecksumError::malformed(format!(
                "{} trailing bytes after checksums",
                r.len()
            )));
        }
        Ok(m)
    }

    /// Current format (v6).
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.write_version(w, CURRENT_VERSION)
    }

    /// v4, for readers without tombstones or mutation versions.
    pub fn write_local<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.write_version(w, LOCAL_VERSION)
    }

    pub fn write_version<W: Write + ?Sized>(
        &self,
        w: &mut W,
        version: FormatVersion,
    ) -> Result<()> {
        if version == FormatVersion::V1 {
            return Err(ChecksumError::FormatTooOld { version: 1 });
        }
        wire::write_header(w, version.tag())?;
        version.encode(w, &self.files, &self.config)?;
        tracing::debug!(version = version.tag(), files = self.files.len(), "encoded checksums");
        Ok(())
    }

    pub fn serialized_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }

    /// Copies implicit map-key offsets from `rhs` where they differ. Only
    /// active with the compact map layout; returns true when anything changed.
    pub fn adjust_diff_implicit_key_offset(&mut self, rhs: &PartChecksumManifest) -> Result<bool> {
        ImplicitKeyOffsetReconciler.adjust(self, rhs)
    }
}
