use std::sync::atomic::{AtomicI64, Ordering};

/// A process-wide diagnostic gauge.
#[derive(Debug)]
pub struct Gauge {
    name: &'static str,
    value: AtomicI64,
}

impl Gauge {
    pub const fn new(name: &'static str) -> Self {
        Self { name, value: AtomicI64::new(0) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Increments now and decrements when the returned guard drops.
    pub fn acquire(&'static self) -> GaugeGuard {
        self.value.fetch_add(1, Ordering::Relaxed);
        GaugeGuard { gauge: self }
    }
}

/// Number of live checksum manifests.
pub static PART_CHECKSUMS: Gauge = Gauge::new("part_checksums");

/// Holds one unit of a [`Gauge`]. Cloning acquires another unit.
#[derive(Debug)]
pub struct GaugeGuard {
    gauge: &'static Gauge,
}

impl Clone for GaugeGuard {
    fn clone(&self) -> Self {
        self.gauge.acquire()
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.value.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_GAUGE: Gauge = Gauge::new("test");

    #[test]
    fn guard_tracks_lifetime() {
        assert_eq!(TEST_GAUGE.get(), 0);
        let a = TEST_GAUGE.acquire();
        let b = a.clone();
        assert_eq!(TEST_GAUGE.get(), 2);
        drop(a);
        assert_eq!(TEST_GAUGE.get(), 1);
        drop(b);
        assert_eq!(TEST_GAUGE.get(), 0);
        assert_eq!(TEST_GAUGE.name(), "test");
    }
}
