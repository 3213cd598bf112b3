/// Incremental, order-sensitive 128-bit hash used for every aggregate over a
/// manifest. Implementations must be deterministic across platforms.
pub trait HashAccumulator {
    fn update(&mut self, bytes: &[u8]);

    fn finalize(&self) -> u128;

    fn update_u64(&mut self, v: u64) {
        self.update(&v.to_le_bytes());
    }

    fn update_u128(&mut self, v: u128) {
        self.update(&v.to_le_bytes());
    }

    /// Length-prefixed string: u64 length, then the raw bytes.
    fn update_str(&mut self, s: &str) {
        self.update_u64(s.len() as u64);
        self.update(s.as_bytes());
    }

    /// One aggregate step: the file name, then one of its hashes.
    fn update_named_hash(&mut self, name: &str, hash: u128) {
        self.update_str(name);
        self.update_u128(hash);
    }
}

/// BLAKE3 truncated to its first 16 output bytes, read little-endian.
#[derive(Clone, Default)]
pub struct Blake3Accumulator {
    inner: blake3::Hasher,
}

impl Blake3Accumulator {
    pub fn new() -> Self {
        Self { inner: blake3::Hasher::new() }
    }
}

impl HashAccumulator for Blake3Accumulator {
    fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    fn finalize(&self) -> u128 {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.inner.finalize().as_bytes()[..16]);
        u128::from_le_bytes(out)
    }
}

/// Hash of a byte slice in one call; the write path uses this for file contents.
pub fn hash128(bytes: &[u8]) -> u128 {
    let mut h = Blake3Accumulator::new();
    h.update(bytes);
    h.finalize()
}

/// Uppercase hex, high 64-bit half first.
pub fn to_hex_upper(v: u128) -> String {
    format!("{:032X}", v)
}

/// Split into the (low, high) halves used by the text manifest format.
pub fn halves(v: u128) -> (u64, u64) {
    (v as u64, (v >> 64) as u64)
}

pub fn from_halves(lo: u64, hi: u64) -> u128 {
    (u128::from(hi) << 64) | u128::from(lo)
}
