//! The Tombstone Sidecar: a per-segment row-id bitmap for logical delete,
//! consulted at read assembly time. Bound 1:1 to a segment file by the
//! `.tomb` suffix.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use ndts_core::{NdtsError, Result};

const MAGIC: &[u8; 4] = b"TOMB";
const VERSION: u32 = 1;

/// Switches from a sorted id list to a dense bitset once the sparse form
/// would cost more bytes than the bitset: `sparse_len * 4 > capacity/8`,
/// i.e. `sparse_len > capacity / 32`. Dense over small row counts,
/// compressed (sparse) over large sparsely-deleted ranges, per spec.
#[derive(Debug, Clone)]
enum Repr {
    Sparse(BTreeSet<u32>),
    Dense(Vec<u64>),
}

#[derive(Debug, Clone)]
pub struct Tombstone {
    path: PathBuf,
    capacity_hint: usize,
    repr: Repr,
    dirty: bool,
}

impl Tombstone {
    /// `capacity_hint` is the owning segment's row count, used only to pick
    /// the sparse/dense crossover; it does not bound which row ids may be
    /// marked.
    pub fn new(path: impl Into<PathBuf>, capacity_hint: usize) -> Self {
        Tombstone { path: path.into(), capacity_hint, repr: Repr::Sparse(BTreeSet::new()), dirty: false }
    }

    fn threshold(&self) -> usize {
        (self.capacity_hint / 32).max(64)
    }

    pub fn mark(&mut self, row_id: u32) {
        match &mut self.repr {
            Repr::Sparse(set) => {
                let inserted = set.insert(row_id);
                if inserted {
                    self.dirty = true;
                }
                if set.len() > self.threshold() {
                    self.densify();
                }
            }
            Repr::Dense(bits) => {
                let word = row_id as usize / 64;
                if word >= bits.len() {
                    bits.resize(word + 1, 0);
                }
                let mask = 1u64 << (row_id % 64);
                if bits[word] & mask == 0 {
                    self.dirty = true;
                }
                bits[word] |= mask;
            }
        }
    }

    pub fn mark_batch(&mut self, row_ids: &[u32]) {
        for &id in row_ids {
            self.mark(id);
        }
    }

    pub fn contains(&self, row_id: u32) -> bool {
        match &self.repr {
            Repr::Sparse(set) => set.contains(&row_id),
            Repr::Dense(bits) => {
                let word = row_id as usize / 64;
                bits.get(word).is_some_and(|w| w & (1u64 << (row_id % 64)) != 0)
            }
        }
    }

    pub fn cardinality(&self) -> usize {
        match &self.repr {
            Repr::Sparse(set) => set.len(),
            Repr::Dense(bits) => bits.iter().map(|w| w.count_ones() as usize).sum(),
        }
    }

    pub fn to_vec(&self) -> Vec<u32> {
        match &self.repr {
            Repr::Sparse(set) => set.iter().copied().collect(),
            Repr::Dense(bits) => {
                let mut out = Vec::with_capacity(self.cardinality());
                for (word_idx, &word) in bits.iter().enumerate() {
                    let mut w = word;
                    while w != 0 {
                        let bit = w.trailing_zeros();
                        out.push((word_idx * 64 + bit as usize) as u32);
                        w &= w - 1;
                    }
                }
                out
            }
        }
    }

    fn densify(&mut self) {
        if let Repr::Sparse(set) = &self.repr {
            let max_id = set.iter().max().copied().unwrap_or(0);
            let mut bits = vec![0u64; max_id as usize / 64 + 1];
            for &id in set.iter() {
                bits[id as usize / 64] |= 1u64 << (id % 64);
            }
            self.repr = Repr::Dense(bits);
        }
    }

    /// Flushes to `path` if dirty; no-op when clean.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let ids = self.to_vec();
        let mut payload = Vec::with_capacity(4 + ids.len() * 4);
        payload.extend_from_slice(&(ids.len() as u32).to_le_bytes());
        for id in &ids {
            payload.extend_from_slice(&id.to_le_bytes());
        }

        let mut buf = Vec::with_capacity(4 + 4 + 4 + payload.len());
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);

        fs::write(&self.path, &buf).map_err(|e| NdtsError::io(&self.path, e))?;
        self.dirty = false;
        Ok(())
    }

    pub fn load(path: impl Into<PathBuf>, capacity_hint: usize) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Tombstone::new(path, capacity_hint));
        }
        let bytes = fs::read(&path).map_err(|e| NdtsError::io(&path, e))?;
        if bytes.len() < 12 || &bytes[0..4] != MAGIC {
            return Err(NdtsError::corrupt("bad tombstone magic"));
        }
        let _version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let payload_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let payload = bytes
            .get(12..12 + payload_len)
            .ok_or_else(|| NdtsError::corrupt("tombstone payload length mismatch"))?;
        if payload.len() < 4 {
            return Err(NdtsError::corrupt("tombstone payload too short for count"));
        }
        let count = u32::from_le_bytes(payload[0..4].try_into().unwrap()) as usize;
        if payload.len() != 4 + count * 4 {
            return Err(NdtsError::corrupt("tombstone count/payload mismatch"));
        }
        let mut set = BTreeSet::new();
        for i in 0..count {
            let off = 4 + i * 4;
            set.insert(u32::from_le_bytes(payload[off..off + 4].try_into().unwrap()));
        }
        let mut tomb = Tombstone { path, capacity_hint, repr: Repr::Sparse(set), dirty: false };
        if tomb.cardinality() > tomb.threshold() {
            tomb.densify();
        }
        Ok(tomb)
    }

    /// Resets cardinality to 0; marks dirty so the next `save()` persists
    /// the cleared state.
    pub fn clear(&mut self) {
        self.repr = Repr::Sparse(BTreeSet::new());
        self.dirty = true;
    }

    /// Removes the sidecar file entirely.
    pub fn delete(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| NdtsError::io(&self.path, e))?;
        }
        self.repr = Repr::Sparse(BTreeSet::new());
        self.dirty = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_idempotent() {
        let mut t = Tombstone::new("/tmp/does-not-matter.tomb", 100);
        t.mark(5);
        t.mark(5);
        assert_eq!(t.cardinality(), 1);
        assert!(t.contains(5));
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment.ndts.tomb");
        let mut t = Tombstone::new(&path, 1000);
        t.mark_batch(&[1, 5, 10]);
        t.save().unwrap();

        let t2 = Tombstone::load(&path, 1000).unwrap();
        assert!(t2.contains(1));
        assert!(t2.contains(5));
        assert!(t2.contains(10));
        assert_eq!(t2.cardinality(), 3);
    }

    #[test]
    fn densifies_past_threshold() {
        let mut t = Tombstone::new("/tmp/x.tomb", 100); // threshold = max(100/32, 64) = 64
        for id in 0..70u32 {
            t.mark(id);
        }
        assert!(matches!(t.repr, Repr::Dense(_)));
        assert_eq!(t.cardinality(), 70);
        for id in 0..70u32 {
            assert!(t.contains(id));
        }
    }

    #[test]
    fn clear_resets_cardinality() {
        let mut t = Tombstone::new("/tmp/x.tomb", 100);
        t.mark_batch(&[1, 2, 3]);
        t.clear();
        assert_eq!(t.cardinality(), 0);
        assert!(!t.contains(1));
    }

    #[test]
    fn save_is_noop_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.tomb");
        let mut t = Tombstone::new(&path, 10);
        t.save().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.tomb");
        let mut t = Tombstone::new(&path, 10);
        t.mark(1);
        t.save().unwrap();
        assert!(path.exists());
        t.delete().unwrap();
        assert!(!path.exists());
    }
}
