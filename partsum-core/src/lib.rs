pub mod checksum;
pub mod config;
pub mod disk;
pub mod error;
pub mod fingerprint;
pub mod format;
pub mod hash;
pub mod manifest;
pub mod map_layout;
pub mod metrics;
pub mod verify;
pub mod wire;

pub use checksum::FileChecksum;
pub use config::{DecodeLimits, ManifestConfig, StorageBackend};
pub use error::{is_bad_checksums_error_code, ChecksumError, ErrorCode};
pub use fingerprint::PartFingerprint;
pub use manifest::PartChecksumManifest;
