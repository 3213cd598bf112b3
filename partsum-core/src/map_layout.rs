//! Compact map-column layout support.
//!
//! With the compact layout, every implicit key column of a map shares one
//! physical file and each key's entry records its offset inside it. After a
//! merge or fetch those offsets may legitimately differ from the reference
//! copy even though the data is identical.

use crate::error::{ChecksumError, Result};
use crate::manifest::PartChecksumManifest;

/// Prefix shared by every implicit map-key file name.
pub const IMPLICIT_KEY_PREFIX: &str = "__";

pub fn is_map_implicit_key(name: &str) -> bool {
    name.starts_with(IMPLICIT_KEY_PREFIX)
}

/// Post-merge fix-up applied to a manifest against a reference copy.
pub trait MergeAdjustment {
    /// Returns true when `target` was changed.
    fn adjust(
        &self,
        target: &mut PartChecksumManifest,
        reference: &PartChecksumManifest,
    ) -> Result<bool>;
}

/// Copies implicit map-key offsets from the reference where they differ.
/// Other fields are never touched.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImplicitKeyOffsetReconciler;

impl MergeAdjustment for ImplicitKeyOffsetReconciler {
    fn adjust(
        &self,
        target: &mut PartChecksumManifest,
        reference: &PartChecksumManifest,
    ) -> Result<bool> {
        if !target.config().compact_map_layout {
            return Ok(false);
        }
        let mut changed = Vec::new();
        for (name, sum) in target.files_mut().iter_mut() {
            let other = reference
                .get(name)
                .ok_or_else(|| ChecksumError::NoSuchFile { file: name.clone() })?;
            if is_map_implicit_key(name) && sum.offset != other.offset {
                sum.offset = other.offset;
                changed.push(name.clone());
            }
        }
        if !changed.is_empty() {
            tracing::warn!(files = ?changed, "reconciled implicit map-key offsets");
        }
        Ok(!changed.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_key_names() {
        assert!(is_map_implicit_key("__attrs__%27color%27.bin"));
        assert!(!is_map_implicit_key("attrs.bin"));
        assert!(!is_map_implicit_key("_x.bin"));
    }
}
