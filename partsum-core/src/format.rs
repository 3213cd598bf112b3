//! Manifest wire generations and the per-version body codecs.
//!
//! Each version maps to the exact field set it carries; decoding and
//! encoding share that table, so any version that can be read can also be
//! written back byte-for-byte compatible.

use crate::checksum::FileChecksum;
use crate::config::ManifestConfig;
use crate::error::{ChecksumError, Result};
use crate::hash::{from_halves, halves};
use crate::wire;
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};

/// Version emitted by the current writer.
pub const CURRENT_VERSION: FormatVersion = FormatVersion::V6;
/// Version emitted for readers that predate tombstones and mutation versions.
pub const LOCAL_VERSION: FormatVersion = FormatVersion::V4;
/// Highest version the reader understands.
pub const MAX_KNOWN_VERSION: u64 = 7;

/// zstd level for compressed bodies (0 = library default).
const BODY_ZSTD_LEVEL: i32 = 0;

pub type Files = BTreeMap<String, FileChecksum>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    /// Legacy marker; recognized, never decodable.
    V1,
    /// ASCII body with literal field labels.
    V2,
    /// Binary body, uncompressed.
    V3,
    /// v3 inside a compressed stream.
    V4,
    /// Adds the tombstone flag; offset on remote storage only.
    V5,
    /// Adds the mutation version on remote storage; offset also with the
    /// compact map layout.
    V6,
    /// Adds a per-entry encryption flag that is consumed and dropped;
    /// offset on remote storage only, as in v5.
    V7,
}

/// When the per-entry offset is on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OffsetGate {
    CompactMap,
    Remote,
    RemoteOrCompactMap,
}

impl OffsetGate {
    fn present(self, cfg: &ManifestConfig) -> bool {
        match self {
            OffsetGate::CompactMap => cfg.compact_map_layout,
            OffsetGate::Remote => cfg.is_remote(),
            OffsetGate::RemoteOrCompactMap => cfg.is_remote() || cfg.compact_map_layout,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BinaryLayout {
    compressed: bool,
    offset: OffsetGate,
    /// Mutation version, remote storage only.
    mutation: bool,
    encrypted_flag: bool,
    deleted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Body {
    Legacy,
    Text,
    Binary(BinaryLayout),
}

const V3_LAYOUT: BinaryLayout = BinaryLayout {
    compressed: false,
    offset: OffsetGate::CompactMap,
    mutation: false,
    encrypted_flag: false,
    deleted: false,
};

impl FormatVersion {
    pub fn from_tag(tag: u64) -> Result<Self> {
        Ok(match tag {
            1 => FormatVersion::V1,
            2 => FormatVersion::V2,
            3 => FormatVersion::V3,
            4 => FormatVersion::V4,
            5 => FormatVersion::V5,
            6 => FormatVersion::V6,
            7 => FormatVersion::V7,
            _ => return Err(ChecksumError::UnknownFormatVersion { version: tag }),
        })
    }

    pub fn tag(self) -> u64 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
            FormatVersion::V3 => 3,
            FormatVersion::V4 => 4,
            FormatVersion::V5 => 5,
            FormatVersion::V6 => 6,
            FormatVersion::V7 => 7,
        }
    }

    fn body(self) -> Body {
        match self {
            FormatVersion::V1 => Body::Legacy,
            FormatVersion::V2 => Body::Text,
            FormatVersion::V3 => Body::Binary(V3_LAYOUT),
            FormatVersion::V4 => Body::Binary(BinaryLayout { compressed: true, ..V3_LAYOUT }),
            FormatVersion::V5 => Body::Binary(BinaryLayout {
                compressed: true,
                offset: OffsetGate::Remote,
                deleted: true,
                ..V3_LAYOUT
            }),
            FormatVersion::V6 => Body::Binary(BinaryLayout {
                compressed: true,
                offset: OffsetGate::RemoteOrCompactMap,
                mutation: true,
                deleted: true,
                ..V3_LAYOUT
            }),
            FormatVersion::V7 => Body::Binary(BinaryLayout {
                compressed: true,
                offset: OffsetGate::Remote,
                mutation: true,
                encrypted_flag: true,
                deleted: true,
            }),
        }
    }

    /// Decodes the body that follows the header line.
    pub fn decode<R: BufRead + ?Sized>(self, r: &mut R, cfg: &ManifestConfig) -> Result<Files> {
        let files = match self.body() {
            Body::Legacy => return Err(ChecksumError::FormatTooOld { version: self.tag() }),
            Body::Text => decode_text(r, cfg)?,
            Body::Binary(layout) if layout.compressed => {
                let mut dec = zstd::stream::read::Decoder::with_buffer(&mut *r)?.single_frame();
                let files = decode_binary(&mut dec, layout, cfg)?;
                let mut probe = [0u8; 1];
                if dec.read(&mut probe)? != 0 {
                    return Err(ChecksumError::malformed("trailing bytes in compressed body"));
                }
                files
            }
            Body::Binary(layout) => decode_binary(r, layout, cfg)?,
        };
        tracing::debug!(version = self.tag(), files = files.len(), "decoded checksums body");
        Ok(files)
    }

    /// Encodes the body that follows the header line.
    pub fn encode<W: Write + ?Sized>(
        self,
        w: &mut W,
        files: &Files,
        cfg: &ManifestConfig,
    ) -> Result<()> {
        match self.body() {
            Body::Legacy => Err(ChecksumError::FormatTooOld { version: self.tag() }),
            Body::Text => encode_text(w, files),
            Body::Binary(layout) if layout.compressed => {
                let mut enc = zstd::stream::write::Encoder::new(&mut *w, BODY_ZSTD_LEVEL)?;
                encode_binary(&mut enc, files, layout, cfg)?;
                enc.finish()?;
                Ok(())
            }
            Body::Binary(layout) => encode_binary(w, files, layout, cfg),
        }
    }
}

fn check_count(count: u64, cfg: &ManifestConfig) -> Result<()> {
    if count > cfg.limits.max_files {
        return Err(ChecksumError::malformed(format!(
            "{count} files exceeds limit of {}",
            cfg.limits.max_files
        )));
    }
    Ok(())
}

fn decode_binary<R: Read + ?Sized>(
    r: &mut R,
    layout: BinaryLayout,
    cfg: &ManifestConfig,
) -> Result<Files> {
    let count = wire::read_varint(r)?;
    check_count(count, cfg)?;
    let with_offset = layout.offset.present(cfg);
    let with_mutation = layout.mutation && cfg.is_remote();
    let mut encrypted = 0u64;
    let mut files = Files::new();
    for _ in 0..count {
        let name = wire::read_string(r, cfg.limits.max_name_len)?;
        let mut sum = FileChecksum::default();
        if with_offset {
            sum.offset = wire::read_varint(r)?;
        }
        if with_mutation {
            sum.mutation_version = wire::read_varint(r)?;
        }
        sum.size = wire::read_varint(r)?;
        sum.hash = wire::read_hash(r)?;
        sum.is_compressed = wire::read_bool(r)?;
        if sum.is_compressed {
            sum.uncompressed_size = wire::read_varint(r)?;
            sum.uncompressed_hash = wire::read_hash(r)?;
        }
        if layout.encrypted_flag && wire::read_bool(r)? {
            encrypted += 1;
        }
        if layout.deleted {
            sum.is_deleted = wire::read_bool(r)?;
        }
        files.entry(name).or_insert(sum);
    }
    if encrypted > 0 {
        tracing::warn!(
            entries = encrypted,
            "encryption flag set on decoded entries; flag is not retained"
        );
    }
    Ok(files)
}

fn encode_binary<W: Write + ?Sized>(
    w: &mut W,
    files: &Files,
    layout: BinaryLayout,
    cfg: &ManifestConfig,
) -> Result<()> {
    let with_offset = layout.offset.present(cfg);
    let with_mutation = layout.mutation && cfg.is_remote();
    wire::write_varint(w, files.len() as u64)?;
    for (name, sum) in files {
        wire::write_string(w, name)?;
        if with_offset {
            wire::write_varint(w, sum.offset)?;
        }
        if with_mutation {
            wire::write_varint(w, sum.mutation_version)?;
        }
        wire::write_varint(w, sum.size)?;
        wire::write_hash(w, sum.hash)?;
        wire::write_bool(w, sum.is_compressed)?;
        if sum.is_compressed {
            wire::write_varint(w, sum.uncompressed_size)?;
            wire::write_hash(w, sum.uncompressed_hash)?;
        }
        if layout.encrypted_flag {
            wire::write_bool(w, false)?;
        }
        if layout.deleted {
            wire::write_bool(w, sum.is_deleted)?;
        }
    }
    Ok(())
}

fn read_text_hash<R: BufRead + ?Sized>(r: &mut R) -> Result<u128> {
    let lo = wire::read_text_u64(r)?;
    wire::assert_str(r, " ")?;
    let hi = wire::read_text_u64(r)?;
    Ok(from_halves(lo, hi))
}

fn decode_text<R: BufRead + ?Sized>(r: &mut R, cfg: &ManifestConfig) -> Result<Files> {
    let count = wire::read_text_u64(r)?;
    check_count(count, cfg)?;
    wire::assert_str(r, " files:\n")?;
    let mut files = Files::new();
    for _ in 0..count {
        let name = wire::read_text_string(r, cfg.limits.max_name_len)?;
        let mut sum = FileChecksum::default();
        wire::assert_str(r, "\n\tsize: ")?;
        sum.size = wire::read_text_u64(r)?;
        wire::assert_str(r, "\n\thash: ")?;
        sum.hash = read_text_hash(r)?;
        wire::assert_str(r, "\n\tcompressed: ")?;
        sum.is_compressed = wire::read_text_bool(r)?;
        if sum.is_compressed {
            wire::assert_str(r, "\n\tuncompressed size: ")?;
            sum.uncompressed_size = wire::read_text_u64(r)?;
            wire::assert_str(r, "\n\tuncompressed hash: ")?;
            sum.uncompressed_hash = read_text_hash(r)?;
        }
        wire::assert_str(r, "\n")?;
        files.entry(name).or_insert(sum);
    }
    Ok(files)
}

fn encode_text<W: Write + ?Sized>(w: &mut W, files: &Files) -> Result<()> {
    writeln!(w, "{} files:", files.len())?;
    for (name, sum) in files {
        if name.contains(|c| c == '\t' || c == '\n') {
            return Err(ChecksumError::malformed(format!(
                "file name {:?} cannot be written in the text format",
                name
            )));
        }
        let (lo, hi) = halves(sum.hash);
        write!(
            w,
            "{name}\n\tsize: {}\n\thash: {lo} {hi}\n\tcompressed: {}",
            sum.size,
            u8::from(sum.is_compressed)
        )?;
        if sum.is_compressed {
            let (ulo, uhi) = halves(sum.uncompressed_hash);
            write!(
                w,
                "\n\tuncompressed size: {}\n\tuncompressed hash: {ulo} {uhi}",
                sum.uncompressed_size
            )?;
        }
        w.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip_and_reject_unknown() {
        for tag in 1..=MAX_KNOWN_VERSION {
            assert_eq!(FormatVersion::from_tag(tag).unwrap().tag(), tag);
        }
        assert!(matches!(
            FormatVersion::from_tag(0),
            Err(ChecksumError::UnknownFormatVersion { version: 0 })
        ));
        assert!(matches!(
            FormatVersion::from_tag(8),
            Err(ChecksumError::UnknownFormatVersion { version: 8 })
        ));
    }

    #[test]
    fn offset_gates() {
        let local = ManifestConfig::local();
        let remote = ManifestConfig::remote();
        let map = ManifestConfig::local().with_compact_map_layout(true);
        assert!(!OffsetGate::CompactMap.present(&local));
        assert!(!OffsetGate::CompactMap.present(&remote));
        assert!(OffsetGate::CompactMap.present(&map));
        assert!(OffsetGate::Remote.present(&remote));
        assert!(!OffsetGate::Remote.present(&map));
        assert!(!OffsetGate::Remote.present(&local));
        assert!(OffsetGate::RemoteOrCompactMap.present(&remote));
        assert!(OffsetGate::RemoteOrCompactMap.present(&map));
        assert!(!OffsetGate::RemoteOrCompactMap.present(&local));
    }

    #[test]
    fn text_writer_rejects_tab_in_name() {
        let mut files = Files::new();
        files.insert("a\tb".into(), FileChecksum::new(1, 1));
        let mut out = Vec::new();
        assert!(FormatVersion::V2.encode(&mut out, &files, &ManifestConfig::local()).is_err());
    }
}
