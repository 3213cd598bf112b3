use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use partsum_core::disk::LocalDisk;
use partsum_core::hash::to_hex_upper;
use partsum_core::manifest::MANIFEST_FILE_NAME;
use partsum_core::verify::{load_manifest, verify_part_named};
use partsum_core::{
    wire, ChecksumError, ErrorCode, FileChecksum, ManifestConfig, PartChecksumManifest,
    PartFingerprint, StorageBackend,
};

mod logging;

/// Exit status for a part that failed integrity verification.
const EXIT_BAD_CHECKSUMS: u8 = 2;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Storage {
    Local,
    Remote,
}

impl From<Storage> for StorageBackend {
    fn from(s: Storage) -> Self {
        match s {
            Storage::Local => StorageBackend::Local,
            Storage::Remote => StorageBackend::RemoteObjectStore,
        }
    }
}

#[derive(Parser)]
#[command(name = "partsum", version, about = "Inspect, verify and convert part checksum manifests")]
struct Cli {
    /// JSON file with a manifest config; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, global = true)]
    storage: Option<Storage>,
    /// Implicit map-key files share one physical file
    #[arg(long, global = true, default_value_t = false)]
    compact_map: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the entries and aggregates of a manifest
    Inspect {
        manifest: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check every file listed in a part's manifest exists with its recorded size
    Check {
        part_dir: PathBuf,
        #[arg(long, default_value = MANIFEST_FILE_NAME)]
        manifest_name: String,
    },
    /// Compare two manifests file by file; the first is the reference
    Compare {
        reference: PathBuf,
        candidate: PathBuf,
        /// Compare compressed files by their decompressed content
        #[arg(long, default_value_t = false)]
        uncompressed: bool,
    },
    /// Write the fingerprint of a manifest
    Fingerprint {
        manifest: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Compare two fingerprints; either side may also be a full manifest
    CompareFingerprint {
        reference: PathBuf,
        candidate: PathBuf,
        #[arg(long, default_value_t = false)]
        prefer_uncompressed: bool,
    },
    /// Re-encode a manifest in the current format
    Rewrite {
        input: PathBuf,
        output: PathBuf,
        /// Emit the local compatibility format instead
        #[arg(long, default_value_t = false)]
        local: bool,
    },
}

fn main() -> ExitCode {
    logging::init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match bad_checksums(&e) {
            Some(reason) => {
                println!("BAD: {reason}");
                ExitCode::from(EXIT_BAD_CHECKSUMS)
            }
            None => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

/// The verification failure carried by `e`, if it is one.
fn bad_checksums(e: &anyhow::Error) -> Option<&ChecksumError> {
    e.chain()
        .find_map(|c| c.downcast_ref::<ChecksumError>())
        .filter(|ce| ce.is_bad_checksums())
}

fn run(cli: Cli) -> Result<()> {
    let cfg = manifest_config(cli.config.as_deref(), cli.storage, cli.compact_map)?;
    match cli.cmd {
        Cmd::Inspect { manifest, json } => inspect(&manifest, json, cfg),
        Cmd::Check { part_dir, manifest_name } => check(&part_dir, &manifest_name, cfg),
        Cmd::Compare { reference, candidate, uncompressed } => {
            compare(&reference, &candidate, uncompressed, cfg)
        }
        Cmd::Fingerprint { manifest, output } => fingerprint(&manifest, &output, cfg),
        Cmd::CompareFingerprint { reference, candidate, prefer_uncompressed } => {
            compare_fingerprint(&reference, &candidate, prefer_uncompressed, cfg)
        }
        Cmd::Rewrite { input, output, local } => rewrite(&input, &output, local, cfg),
    }
}

fn manifest_config(
    path: Option<&Path>,
    storage: Option<Storage>,
    compact_map: bool,
) -> Result<ManifestConfig> {
    let mut cfg = match path {
        Some(p) => ManifestConfig::from_json_file(p)?,
        None => ManifestConfig::default(),
    };
    if let Some(s) = storage {
        cfg.storage = s.into();
    }
    if compact_map {
        cfg.compact_map_layout = true;
    }
    Ok(cfg)
}

#[derive(Serialize)]
struct EntryView<'a> {
    name: &'a str,
    size: u64,
    hash: String,
    compressed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    uncompressed_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uncompressed_hash: Option<String>,
    offset: u64,
    mutation_version: u64,
    deleted: bool,
}

impl<'a> EntryView<'a> {
    fn new(name: &'a str, sum: &FileChecksum) -> Self {
        Self {
            name,
            size: sum.size,
            hash: to_hex_upper(sum.hash),
            compressed: sum.is_compressed,
            uncompressed_size: sum.is_compressed.then_some(sum.uncompressed_size),
            uncompressed_hash: sum.is_compressed.then(|| to_hex_upper(sum.uncompressed_hash)),
            offset: sum.offset,
            mutation_version: sum.mutation_version,
            deleted: sum.is_deleted,
        }
    }
}

#[derive(Serialize)]
struct FingerprintView {
    compressed_files: u64,
    uncompressed_files: u64,
    hash_of_all_files: String,
    hash_of_uncompressed_files: String,
    uncompressed_hash_of_compressed_files: String,
}

impl From<&PartFingerprint> for FingerprintView {
    fn from(fp: &PartFingerprint) -> Self {
        Self {
            compressed_files: fp.compressed_file_count,
            uncompressed_files: fp.uncompressed_file_count,
            hash_of_all_files: to_hex_upper(fp.hash_of_all_files),
            hash_of_uncompressed_files: to_hex_upper(fp.hash_of_uncompressed_files),
            uncompressed_hash_of_compressed_files: to_hex_upper(
                fp.uncompressed_hash_of_compressed_files,
            ),
        }
    }
}

#[derive(Serialize)]
struct ManifestView<'a> {
    version: u64,
    files: Vec<EntryView<'a>>,
    total_size_on_disk: u64,
    total_checksum: String,
    fingerprint: FingerprintView,
}

fn inspect(path: &Path, json: bool, cfg: ManifestConfig) -> Result<()> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let version = wire::read_header(&mut r)?;
    let mut manifest = PartChecksumManifest::new(cfg);
    manifest.read_body(&mut r, version)?;
    if !wire::at_eof(&mut r)? {
        anyhow::bail!("trailing bytes after checksums in {}", path.display());
    }
    let fp = PartFingerprint::compute_total_checksums(&manifest);

    let view = ManifestView {
        version,
        files: manifest.files().iter().map(|(n, s)| EntryView::new(n, s)).collect(),
        total_size_on_disk: manifest.total_size_on_disk(),
        total_checksum: manifest.total_checksum_hex(),
        fingerprint: FingerprintView::from(&fp),
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &view)?;
        writeln!(out)?;
        return Ok(());
    }
    writeln!(out, "format version: {}", view.version)?;
    writeln!(out, "files: {}", view.files.len())?;
    for e in &view.files {
        write!(out, "  {}  size={} hash={}", e.name, e.size, e.hash)?;
        if let (Some(us), Some(uh)) = (e.uncompressed_size, &e.uncompressed_hash) {
            write!(out, " uncompressed_size={us} uncompressed_hash={uh}")?;
        }
        if e.offset != 0 {
            write!(out, " offset={}", e.offset)?;
        }
        if e.mutation_version != 0 {
            write!(out, " mutation={}", e.mutation_version)?;
        }
        if e.deleted {
            write!(out, " deleted")?;
        }
        writeln!(out)?;
    }
    writeln!(out, "total size on disk: {}", view.total_size_on_disk)?;
    writeln!(out, "total checksum: {}", view.total_checksum)?;
    writeln!(
        out,
        "fingerprint: {} compressed, {} uncompressed, all={}",
        view.fingerprint.compressed_files,
        view.fingerprint.uncompressed_files,
        view.fingerprint.hash_of_all_files
    )?;
    Ok(())
}

fn check(part_dir: &Path, manifest_name: &str, cfg: ManifestConfig) -> Result<()> {
    let report = verify_part_named(&LocalDisk, part_dir, manifest_name, cfg)?;
    tracing::info!(part = %part_dir.display(), bytes = report.bytes_on_disk, "part verified");
    println!(
        "OK: {} files, {} bytes, checksum {}",
        report.files_checked, report.bytes_on_disk, report.total_checksum_hex
    );
    Ok(())
}

fn compare(
    reference: &Path,
    candidate: &Path,
    uncompressed: bool,
    cfg: ManifestConfig,
) -> Result<()> {
    let a = load_manifest(reference, cfg)
        .with_context(|| format!("load reference {}", reference.display()))?;
    let b = load_manifest(candidate, cfg)
        .with_context(|| format!("load candidate {}", candidate.display()))?;
    a.check_equal(&b, uncompressed)?;
    println!("OK");
    Ok(())
}

fn fingerprint(manifest: &Path, output: &Path, cfg: ManifestConfig) -> Result<()> {
    let m = load_manifest(manifest, cfg)?;
    let fp = PartFingerprint::compute_total_checksums(&m);
    let mut w = BufWriter::new(
        File::create(output).with_context(|| format!("create {}", output.display()))?,
    );
    fp.serialize(&mut w)?;
    w.flush()?;
    tracing::info!(files = m.len(), output = %output.display(), "fingerprint written");
    Ok(())
}

/// A fingerprint blob, or a manifest of any version whose fingerprint is
/// derived (keeping the manifest for a per-file comparison).
fn load_fingerprint(path: &Path, cfg: ManifestConfig) -> Result<PartFingerprint> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    match PartFingerprint::deserialize_from(&bytes, cfg) {
        Ok(fp) => Ok(fp),
        Err(fp_err) => match PartChecksumManifest::deserialize_from(&bytes, cfg) {
            Ok(m) => {
                let mut fp = PartFingerprint::compute_total_checksums(&m);
                fp.full = Some(m);
                Ok(fp)
            }
            Err(m_err) => {
                // A manifest newer than the fingerprint header fails as unknown there.
                let err = if fp_err.code() == ErrorCode::UnknownFormatVersion {
                    m_err
                } else {
                    fp_err
                };
                Err(err).with_context(|| format!("decode {}", path.display()))
            }
        },
    }
}

fn compare_fingerprint(
    reference: &Path,
    candidate: &Path,
    prefer_uncompressed: bool,
    cfg: ManifestConfig,
) -> Result<()> {
    let a = load_fingerprint(reference, cfg)?;
    let b = load_fingerprint(candidate, cfg)?;
    a.check_equal(&b, prefer_uncompressed)?;
    println!("OK");
    Ok(())
}

fn rewrite(input: &Path, output: &Path, local: bool, cfg: ManifestConfig) -> Result<()> {
    let m = load_manifest(input, cfg)?;
    let mut w = BufWriter::new(
        File::create(output).with_context(|| format!("create {}", output.display()))?,
    );
    if local {
        m.write_local(&mut w)?;
    } else {
        m.write(&mut w)?;
    }
    w.flush()?;
    tracing::info!(files = m.len(), local, output = %output.display(), "manifest rewritten");
    Ok(())
}
