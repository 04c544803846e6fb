//! Name index of the on-disk image cache.
//!
//! An open addressing table keyed by face name. Each name owns a list of
//! cached files (one per checksum seen), newest first.

use cf_core::constants::IMAGE_HASH;

/// Where a cached file lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLocation {
    /// Shipped with the client, relative to the data directory. Read only.
    Public,
    /// Written by this client, relative to `<cache>/image-cache`.
    Private,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub checksum: u32,
    pub path: String,
    pub location: CacheLocation,
}

#[derive(Clone, Debug)]
struct Bucket {
    name: String,
    entries: Vec<CacheEntry>,
}

/// One-at-a-time hash of `name` up to its first `.`.
pub fn hash_name(name: &str, table_size: usize) -> usize {
    let mut hash: u32 = 0;
    for byte in name.bytes().take_while(|&b| b != b'.') {
        hash = hash.wrapping_add(u32::from(byte));
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash as usize % table_size
}

#[derive(Debug)]
pub struct FaceIndex {
    buckets: Vec<Option<Bucket>>,
    len: usize,
}

impl Default for FaceIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceIndex {
    pub fn new() -> Self {
        Self::with_capacity(IMAGE_HASH)
    }

    /// `capacity` is rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: vec![None; capacity.max(1).next_power_of_two()],
            len: 0,
        }
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot holding `name`, or the free slot where it would go.
    fn find_slot(&self, name: &str) -> Option<usize> {
        let size = self.buckets.len();
        let start = hash_name(name, size);
        let mut slot = start;
        loop {
            match &self.buckets[slot] {
                None => return Some(slot),
                Some(bucket) if bucket.name == name => return Some(slot),
                Some(_) => {}
            }
            slot = (slot + 1) & (size - 1);
            if slot == start {
                return None;
            }
        }
    }

    /// Adds a file for `name` in front of the ones already known.
    ///
    /// Returns false when the table is full.
    pub fn insert(&mut self, name: &str, entry: CacheEntry) -> bool {
        let Some(slot) = self.find_slot(name) else {
            log::warn!("face index is full, not caching {name}");
            return false;
        };
        match &mut self.buckets[slot] {
            Some(bucket) => bucket.entries.insert(0, entry),
            empty => {
                *empty = Some(Bucket {
                    name: name.to_string(),
                    entries: vec![entry],
                });
                self.len += 1;
            }
        }
        true
    }

    /// All files known for `name`, newest first.
    pub fn entries(&self, name: &str) -> &[CacheEntry] {
        self.find_slot(name)
            .and_then(|slot| self.buckets[slot].as_ref())
            .map(|bucket| bucket.entries.as_slice())
            .unwrap_or_default()
    }

    /// Newest file for `name` matching `predicate`.
    pub fn find_where(
        &self,
        name: &str,
        predicate: impl Fn(&CacheEntry) -> bool,
    ) -> Option<&CacheEntry> {
        self.entries(name).iter().find(|entry| predicate(entry))
    }

    /// Drops the files of `name` matching `predicate` and returns them.
    ///
    /// The name itself keeps its slot so collision chains through it stay intact.
    pub fn remove_where(
        &mut self,
        name: &str,
        predicate: impl Fn(&CacheEntry) -> bool,
    ) -> Vec<CacheEntry> {
        let Some(Some(bucket)) = self.find_slot(name).map(|slot| self.buckets[slot].as_mut()) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<_>, Vec<_>) =
            bucket.entries.drain(..).partition(|entry| predicate(entry));
        bucket.entries = kept;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(checksum: u32, path: &str) -> CacheEntry {
        CacheEntry {
            checksum,
            path: path.to_string(),
            location: CacheLocation::Private,
        }
    }

    #[test]
    fn hash_stops_at_first_dot() {
        assert_eq!(
            hash_name("dragon.111", IMAGE_HASH),
            hash_name("dragon.112", IMAGE_HASH)
        );
        assert!(hash_name("a", 16) < 16);
    }

    #[test]
    fn hash_matches_reference_values() {
        // one-at-a-time over an empty string is 0
        assert_eq!(hash_name("", IMAGE_HASH), 0);
        assert_eq!(hash_name(".png", IMAGE_HASH), 0);
        let mut expected: u32 = 0;
        expected = expected.wrapping_add(b'a' as u32);
        expected = expected.wrapping_add(expected << 10);
        expected ^= expected >> 6;
        expected = expected.wrapping_add(expected << 3);
        expected ^= expected >> 11;
        expected = expected.wrapping_add(expected << 15);
        assert_eq!(hash_name("a", IMAGE_HASH), expected as usize % IMAGE_HASH);
    }

    #[test]
    fn newest_entry_comes_first() {
        let mut index = FaceIndex::new();
        index.insert("wall.111", entry(1, "wa/wall.111.0"));
        index.insert("wall.111", entry(2, "wa/wall.111.1"));

        assert_eq!(index.len(), 1);
        assert_eq!(index.entries("wall.111")[0].checksum, 2);
        assert_eq!(
            index.find_where("wall.111", |e| e.checksum == 1).unwrap().path,
            "wa/wall.111.0"
        );
        assert!(index.find_where("floor.111", |_| true).is_none());
    }

    #[test]
    fn colliding_names_take_the_next_free_slot() {
        let mut index = FaceIndex::with_capacity(4);
        // same hash, the suffix is ignored
        index.insert("orc.111", entry(1, "a"));
        index.insert("orc.112", entry(2, "b"));
        index.insert("orc.113", entry(3, "c"));

        assert_eq!(index.len(), 3);
        assert_eq!(index.entries("orc.112")[0].path, "b");
        assert_eq!(index.entries("orc.113")[0].path, "c");
    }

    #[test]
    fn full_table_rejects_new_names() {
        let mut index = FaceIndex::with_capacity(2);
        assert!(index.insert("a", entry(1, "a")));
        assert!(index.insert("b", entry(1, "b")));
        assert!(!index.insert("c", entry(1, "c")));
        // existing names still accept entries
        assert!(index.insert("a", entry(2, "a2")));
        assert!(index.entries("c").is_empty());
    }

    #[test]
    fn remove_keeps_collision_chain() {
        let mut index = FaceIndex::with_capacity(4);
        index.insert("orc.111", entry(1, "a"));
        index.insert("orc.112", entry(2, "b"));

        let removed = index.remove_where("orc.111", |_| true);
        assert_eq!(removed, vec![entry(1, "a")]);
        assert!(index.entries("orc.111").is_empty());
        assert_eq!(index.entries("orc.112")[0].path, "b");
    }
}
