use std::collections::BTreeSet;

use crate::{Hll, Storage, dense::DenseRegisters, settings::Settings};

/// The EXPLICIT representation: a sorted, deduplicated set of raw 64-bit
/// hashes, ordered under **signed** comparison (invariant 2 in the storage
/// spec — this is what makes the wire form cross-compatible with the
/// reference Java implementation; switching to unsigned ordering would
/// silently break interop without changing anything observable in-process).
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitStorage {
    pub settings: Settings,
    buf: BTreeSet<i64>,
}

impl ExplicitStorage {
    pub fn with_settings(settings: &Settings) -> Self {
        Self {
            settings: *settings,
            buf: BTreeSet::new(),
        }
    }

    pub fn clone_with_settings(&self, settings: &Settings) -> Self {
        Self {
            settings: *settings,
            buf: self.buf.clone(),
        }
    }

    /// Promotes this explicit list into the dense (COMPRESSED) form by
    /// replaying every stored hash through `add_raw`. There is no
    /// in-memory SPARSE state to promote into — SPARSE exists only on the
    /// wire (§3, §9).
    pub fn as_registers(&self) -> Hll {
        let mut storage = Hll::Dense(DenseRegisters::with_settings(&self.settings));

        for value in self.buf.iter() {
            storage.add_raw(*value as u64);
        }

        storage
    }

    pub fn set(&mut self, value: u64) {
        self.buf.insert(value as i64);
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() as u64 > self.settings.explicit_threshold()
    }

    pub fn union_explicit(&mut self, other: &Self) {
        self.buf.extend(other.buf.iter());
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> {
        self.buf.iter().map(|i| *i as u64)
    }

    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Storage for ExplicitStorage {
    fn bytes_size(&self) -> usize {
        size_of::<i64>() * self.buf.len()
    }

    fn to_bytes(&self, buf: &mut [u8]) {
        for (i, value) in self.buf.iter().enumerate() {
            let idx = i * size_of::<i64>();
            buf[idx..(idx + size_of::<i64>())].copy_from_slice(&(*value).to_be_bytes());
        }
    }

    fn from_bytes(settings: &Settings, buf: &[u8]) -> Self {
        let mut res = Self::with_settings(settings);
        let mut idx = 0;

        while idx < buf.len() {
            let s = &buf[idx..(idx + size_of::<i64>())];
            let value = i64::from_be_bytes(s.try_into().unwrap());
            res.buf.insert(value);

            idx += size_of::<i64>();
        }

        res
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Validates that a decoded EXPLICIT payload is strictly ascending under
/// signed 64-bit comparison, as required by invariant 2. The reference
/// implementation's own storage is a sorted set so this can never fail for
/// data it produced; it guards against payloads from other producers.
pub(crate) fn validate_strictly_ascending(values: &[i64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

#[cfg(test)]
mod test {
    use super::*;

    fn settings() -> Settings {
        Settings::new(10, 5, 8, false).unwrap()
    }

    #[test]
    fn set_dedupes_and_sorts() {
        let mut storage = ExplicitStorage::with_settings(&settings());
        storage.set(5);
        storage.set(1);
        storage.set(5);
        storage.set(3);

        let values: Vec<u64> = storage.iter().collect();
        assert_eq!(values, vec![1, 3, 5]);
    }

    #[test]
    fn is_full_respects_effective_threshold() {
        let mut storage = ExplicitStorage::with_settings(&settings());
        for i in 0..8 {
            storage.set(i);
        }
        assert!(!storage.is_full());
        storage.set(8);
        assert!(storage.is_full());
    }

    #[test]
    fn union_explicit_merges_and_dedupes() {
        let mut a = ExplicitStorage::with_settings(&settings());
        a.set(1);
        a.set(2);
        let mut b = ExplicitStorage::with_settings(&settings());
        b.set(2);
        b.set(3);

        a.union_explicit(&b);
        let values: Vec<u64> = a.iter().collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn to_from_bytes_round_trips() {
        let mut storage = ExplicitStorage::with_settings(&settings());
        storage.set(42);
        storage.set(u64::MAX);

        let mut buf = vec![0u8; storage.bytes_size()];
        storage.to_bytes(&mut buf);

        let decoded = ExplicitStorage::from_bytes(&settings(), &buf);
        assert_eq!(decoded, storage);
    }

    #[test]
    fn ascending_validator_detects_disorder() {
        assert!(validate_strictly_ascending(&[1, 2, 3]));
        assert!(!validate_strictly_ascending(&[1, 1, 3]));
        assert!(!validate_strictly_ascending(&[3, 2, 1]));
        assert!(validate_strictly_ascending(&[]));
        assert!(validate_strictly_ascending(&[-5, -1, 0, 1]));
    }
}
