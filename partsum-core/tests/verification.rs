use partsum_core::disk::{DiskQuery, LocalDisk};
use partsum_core::hash::{Blake3Accumulator, HashAccumulator};
use partsum_core::manifest::MANIFEST_FILE_NAME;
use partsum_core::map_layout::{ImplicitKeyOffsetReconciler, MergeAdjustment};
use partsum_core::verify::{load_manifest, verify_part};
use partsum_core::{ChecksumError, ErrorCode, FileChecksum, ManifestConfig, PartChecksumManifest};
use std::fs;
use std::path::Path;

fn part() -> PartChecksumManifest {
    let mut m = PartChecksumManifest::default();
    m.add_file("columns.txt", 30, 1);
    m.insert("id.bin", FileChecksum::compressed(100, 2, 400, 3));
    m.insert("name.bin", FileChecksum::compressed(80, 4, 300, 5));
    m.add_file("primary.idx", 16, 6);
    m
}

#[test]
fn check_equal_is_reflexive() {
    let m = part();
    m.check_equal(&m, true).unwrap();
    m.check_equal(&m, false).unwrap();
}

#[test]
fn size_change_is_reported_for_that_file() {
    let m = part();
    let mut other = part();
    other.add_file("primary.idx", 17, 6);
    let err = m.check_equal(&other, false).unwrap_err();
    match &err {
        ChecksumError::SizeMismatch { file, expected, actual, .. } => {
            assert_eq!(file, "primary.idx");
            assert_eq!((*expected, *actual), (16, 17));
        }
        e => panic!("unexpected error {e:?}"),
    }
    assert!(err.is_bad_checksums());
}

#[test]
fn hash_change_is_reported() {
    let m = part();
    let mut other = part();
    other.add_file("columns.txt", 30, 99);
    let err = m.check_equal(&other, false).unwrap_err();
    assert_eq!(err.code(), ErrorCode::HashMismatch);
    assert!(err.to_string().contains("columns.txt"));
}

#[test]
fn missing_file_is_no_such_file() {
    let m = part();
    let mut other = PartChecksumManifest::default();
    for (name, sum) in m.files() {
        if name != "name.bin" {
            other.insert(name, *sum);
        }
    }
    let err = m.check_equal(&other, false).unwrap_err();
    assert!(matches!(err, ChecksumError::NoSuchFile { ref file } if file == "name.bin"));
}

#[test]
fn extra_file_is_unexpected() {
    let m = part();
    let mut other = part();
    other.add_file("extra.bin", 1, 1);
    let err = m.check_equal(&other, false).unwrap_err();
    assert!(matches!(err, ChecksumError::UnexpectedFile { ref file } if file == "extra.bin"));
    assert_eq!(err.code(), ErrorCode::UnexpectedFile);
}

#[test]
fn recompressed_copy_matches_only_in_uncompressed_mode() {
    let m = part();
    let mut other = part();
    other.insert("id.bin", FileChecksum::compressed(90, 77, 400, 3));
    m.check_equal(&other, true).unwrap();
    assert!(m.check_equal(&other, false).is_err());
}

#[test]
fn index_artifacts_are_never_required() {
    let mut m = part();
    m.add_file("skp_idx_body.gin_dict", 0, 0);
    m.add_file("skp_idx_body.gin_post", 0, 0);
    let mut other = part();
    other.add_file("skp_idx_body.gin_post", 5, 123);
    m.check_equal(&other, false).unwrap();
}

#[test]
fn add_moves_entries_last_write_wins() {
    let mut a = part();
    let mut b = PartChecksumManifest::default();
    b.add_file("primary.idx", 99, 99);
    b.add_file("new.bin", 1, 1);
    a.add(&mut b);
    assert!(b.is_empty());
    assert_eq!(a.get("primary.idx").unwrap().size, 99);
    assert!(a.get("new.bin").is_some());
    assert_eq!(a.total_size_on_disk(), 30 + 100 + 80 + 99 + 1);
}

#[test]
fn data_only_checksum_ignores_marks_and_metadata() {
    let mut a = part();
    let mut b = part();
    b.add_file("id.mrk2", 48, 1);
    b.add_file("columns.txt", 31, 8);
    // Recompression changes the stored bytes but not the logical content.
    b.insert("id.bin", FileChecksum::compressed(90, 77, 400, 3));
    let (mut ha, mut hb) = (Blake3Accumulator::new(), Blake3Accumulator::new());
    a.compute_total_checksum_data_only(&mut ha);
    b.compute_total_checksum_data_only(&mut hb);
    assert_eq!(ha.finalize(), hb.finalize());

    a.insert("name.bin", FileChecksum::compressed(80, 4, 301, 5));
    let mut hc = Blake3Accumulator::new();
    a.compute_total_checksum_data_only(&mut hc);
    assert_ne!(hc.finalize(), hb.finalize());
}

#[test]
fn total_checksum_hex_is_uppercase_128_bit() {
    let hex = part().total_checksum_hex();
    assert_eq!(hex.len(), 32);
    assert!(hex.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    assert_eq!(u128::from_str_radix(&hex, 16).unwrap(), part().total_checksum_u128());
}

fn write_part(dir: &Path, m: &PartChecksumManifest) {
    for (name, sum) in m.files() {
        fs::write(dir.join(name), vec![0u8; sum.size as usize]).unwrap();
    }
    fs::write(dir.join(MANIFEST_FILE_NAME), m.serialized_bytes().unwrap()).unwrap();
}

#[test]
fn check_sizes_on_local_disk() {
    let td = tempfile::tempdir().unwrap();
    let m = part();
    write_part(td.path(), &m);
    m.check_sizes(&LocalDisk, td.path()).unwrap();

    fs::write(td.path().join("id.bin"), vec![0u8; 101]).unwrap();
    let err = m.check_sizes(&LocalDisk, td.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SizeMismatch);

    fs::remove_file(td.path().join("id.bin")).unwrap();
    let err = m.check_sizes(&LocalDisk, td.path()).unwrap_err();
    assert!(matches!(err, ChecksumError::FileMissing { .. }));
    assert!(!err.is_bad_checksums());
}

#[test]
fn directories_are_not_size_checked() {
    let td = tempfile::tempdir().unwrap();
    fs::create_dir(td.path().join("agg.proj")).unwrap();
    let sum = FileChecksum::new(123_456, 1);
    sum.check_size(&LocalDisk, &td.path().join("agg.proj")).unwrap();

    let mut m = PartChecksumManifest::default();
    m.insert("agg.proj", sum);
    m.check_sizes(&LocalDisk, td.path()).unwrap();
}

#[test]
fn check_sizes_skips_artifacts_and_implicit_keys() {
    let td = tempfile::tempdir().unwrap();
    let cfg = ManifestConfig::local().with_compact_map_layout(true);
    let mut m = PartChecksumManifest::new(cfg);
    m.add_file("x.gin_seg", 10, 1);
    m.add_file_at("__attrs__%27a%27.bin", 64, 10, 1);
    m.check_sizes(&LocalDisk, td.path()).unwrap();

    let mut plain = PartChecksumManifest::default();
    plain.add_file_at("__attrs__%27a%27.bin", 64, 10, 1);
    assert!(plain.check_sizes(&LocalDisk, td.path()).is_err());
}

struct FakeDisk;

impl DiskQuery for FakeDisk {
    fn exists(&self, _path: &Path) -> bool {
        true
    }
    fn is_directory(&self, _path: &Path) -> bool {
        false
    }
    fn file_size(&self, _path: &Path) -> std::io::Result<u64> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"))
    }
}

#[test]
fn disk_errors_propagate_as_io() {
    let err = FileChecksum::new(1, 1).check_size(&FakeDisk, Path::new("/p/a.bin")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Io);
}

#[test]
fn verify_part_reads_manifest_and_checks_sizes() {
    let td = tempfile::tempdir().unwrap();
    let mut listed = part();
    write_part(td.path(), &listed);
    let report = verify_part(&LocalDisk, td.path(), ManifestConfig::local()).unwrap();
    assert_eq!(report.files_checked, 4);
    assert_eq!(report.bytes_on_disk, listed.total_size_on_disk());
    assert_eq!(report.total_checksum_hex, listed.total_checksum_hex());

    listed.add_file("gone.bin", 1, 1);
    fs::write(td.path().join(MANIFEST_FILE_NAME), listed.serialized_bytes().unwrap()).unwrap();
    let err = verify_part(&LocalDisk, td.path(), ManifestConfig::local()).unwrap_err();
    assert!(matches!(err, ChecksumError::FileMissing { .. }));
}

#[test]
fn load_manifest_missing_file() {
    let td = tempfile::tempdir().unwrap();
    let err = load_manifest(&td.path().join("nope.txt"), ManifestConfig::local()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FileMissing);
}

#[test]
fn implicit_key_offsets_follow_reference() {
    let cfg = ManifestConfig::local().with_compact_map_layout(true);
    let mut local = PartChecksumManifest::new(cfg);
    local.add_file_at("__m__%27a%27.bin", 0, 10, 1);
    local.add_file_at("__m__%27b%27.bin", 10, 10, 2);
    local.add_file_at("id.bin", 5, 8, 3);
    let mut reference = PartChecksumManifest::new(cfg);
    reference.add_file_at("__m__%27a%27.bin", 20, 10, 1);
    reference.add_file_at("__m__%27b%27.bin", 10, 10, 2);
    reference.add_file_at("id.bin", 9, 99, 3);

    assert!(local.adjust_diff_implicit_key_offset(&reference).unwrap());
    assert_eq!(local.get("__m__%27a%27.bin").unwrap().offset, 20);
    // Non-key entries are untouched, whatever differs.
    assert_eq!(local.get("id.bin").unwrap().offset, 5);
    assert_eq!(local.get("id.bin").unwrap().size, 8);
    assert!(!local.adjust_diff_implicit_key_offset(&reference).unwrap());
}

#[test]
fn implicit_key_adjustment_is_inactive_without_compact_layout() {
    let mut local = PartChecksumManifest::default();
    local.add_file_at("__m__%27a%27.bin", 0, 10, 1);
    let reference = PartChecksumManifest::default();
    assert!(!local.adjust_diff_implicit_key_offset(&reference).unwrap());
}

#[test]
fn implicit_key_adjustment_requires_reference_entries() {
    let cfg = ManifestConfig::local().with_compact_map_layout(true);
    let mut local = PartChecksumManifest::new(cfg);
    local.add_file("id.bin", 8, 3);
    let reference = PartChecksumManifest::new(cfg);
    let err = local.adjust_diff_implicit_key_offset(&reference).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoSuchFile);
}

#[test]
fn add_with_runs_adjustments_after_merge() {
    let cfg = ManifestConfig::local().with_compact_map_layout(true);
    let mut merged = PartChecksumManifest::new(cfg);
    merged.add_file_at("id.bin", 0, 8, 3);
    let mut incoming = PartChecksumManifest::new(cfg);
    incoming.add_file_at("__m__%27a%27.bin", 0, 10, 1);
    let mut reference = PartChecksumManifest::new(cfg);
    reference.add_file_at("id.bin", 0, 8, 3);
    reference.add_file_at("__m__%27a%27.bin", 40, 10, 1);

    let adjustments: [&dyn MergeAdjustment; 1] = [&ImplicitKeyOffsetReconciler];
    let changed = merged.add_with(&mut incoming, &reference, &adjustments).unwrap();
    assert!(changed);
    assert!(incoming.is_empty());
    assert_eq!(merged.get("__m__%27a%27.bin").unwrap().offset, 40);
    merged.check_equal(&reference, false).unwrap();
}
