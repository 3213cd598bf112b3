use std::io;
use std::path::Path;

/// The storage queries size verification needs.
pub trait DiskQuery {
    fn exists(&self, path: &Path) -> bool;
    fn is_directory(&self, path: &Path) -> bool;
    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

/// Local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalDisk;

impl DiskQuery for LocalDisk {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}
