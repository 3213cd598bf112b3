use crate::config::ManifestConfig;
use crate::disk::DiskQuery;
use crate::error::{ChecksumError, Result};
use crate::manifest::{PartChecksumManifest, MANIFEST_FILE_NAME};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub files_checked: usize,
    pub bytes_on_disk: u64,
    pub total_checksum_hex: String,
}

/// Loads the manifest of the part in `part_dir` and checks every recorded
/// file exists on `disk` with its recorded size.
pub fn verify_part<D: DiskQuery + ?Sized>(
    disk: &D,
    part_dir: &Path,
    config: ManifestConfig,
) -> Result<VerifyReport> {
    verify_part_named(disk, part_dir, MANIFEST_FILE_NAME, config)
}

/// [`verify_part`] with a manifest stored under a different file name.
pub fn verify_part_named<D: DiskQuery + ?Sized>(
    disk: &D,
    part_dir: &Path,
    manifest_name: &str,
    config: ManifestConfig,
) -> Result<VerifyReport> {
    let manifest = load_manifest(&part_dir.join(manifest_name), config)?;
    manifest.check_sizes(disk, part_dir)?;
    tracing::debug!(part = %part_dir.display(), files = manifest.len(), "part sizes verified");
    Ok(VerifyReport {
        files_checked: manifest.len(),
        bytes_on_disk: manifest.total_size_on_disk(),
        total_checksum_hex: manifest.total_checksum_hex(),
    })
}

/// Reads a manifest file of any supported version.
pub fn load_manifest(path: &Path, config: ManifestConfig) -> Result<PartChecksumManifest> {
    let f = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ChecksumError::FileMissing { path: path.to_path_buf() },
        _ => ChecksumError::Io(e),
    })?;
    let mut r = BufReader::new(f);
    let manifest = PartChecksumManifest::decode(&mut r, config)?;
    if !crate::wire::at_eof(&mut r)? {
        return Err(ChecksumError::malformed(format!(
            "trailing bytes after checksums in {}",
            path.display()
        )));
    }
    Ok(manifest)
}
