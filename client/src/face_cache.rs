use std::collections::{HashMap, VecDeque};

use cf_core::constants::TILE_PIXELS;
use cf_core::types::clamp_face_size;
use image::{ImageFormat, RgbaImage};

use crate::error::CacheError;
use crate::face_index::{CacheEntry, CacheLocation, FaceIndex};
use crate::image_store::{is_storable_name, DiskImageStore, ImageStore};

/// Checksum the server reports for an image: rotate right by one, add the byte.
pub fn image_checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |csum, &byte| csum.rotate_right(1).wrapping_add(u32::from(byte)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceStatus {
    Missing,
    Requested,
    Cached,
}

/// Outcome of [`FaceCache::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Cached,
    /// The image was asked for; it arrives with a later `image2`.
    Pending,
}

#[derive(Clone, Debug)]
pub struct CachedFace {
    pub image: RgbaImage,
    pub checksum: u32,
    /// Size in map tiles.
    pub size: (u8, u8),
}

#[derive(Clone, Debug)]
struct FaceRecord {
    name: String,
    checksum: Option<u32>,
    status: FaceStatus,
    face: Option<CachedFace>,
}

impl FaceRecord {
    fn new(name: &str, checksum: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            checksum,
            status: FaceStatus::Missing,
            face: None,
        }
    }
}

fn decode_png(name: &str, bytes: &[u8]) -> Result<CachedFace, CacheError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|source| CacheError::CorruptImage {
            name: name.to_string(),
            source,
        })?
        .to_rgba8();
    let size = clamp_face_size(
        image.width().div_ceil(TILE_PIXELS),
        image.height().div_ceil(TILE_PIXELS),
    );
    Ok(CachedFace {
        image,
        checksum: image_checksum(bytes),
        size,
    })
}

fn parse_manifest_line(line: &str) -> Option<(&str, u32, &str)> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?;
    let checksum = fields.next()?.parse().ok()?;
    let path = fields.next()?;
    Some((name, checksum, path))
}

/// Face images of one connection, backed by the on-disk image cache.
///
/// Face ids and their request state belong to the server connection; the
/// name index and the files survive reconnects.
#[derive(Debug)]
pub struct FaceCache<S: ImageStore = DiskImageStore> {
    store: S,
    index: FaceIndex,
    faces: HashMap<u32, FaceRecord>,
    requests: VecDeque<u32>,
    use_disk: bool,
    hits: u64,
    misses: u64,
}

impl<S: ImageStore> FaceCache<S> {
    /// Reads the public and private manifests of `store`.
    ///
    /// With `use_disk` off every face is fetched from the server and kept in
    /// memory only.
    pub fn new(store: S, use_disk: bool) -> Self {
        let mut cache = Self {
            store,
            index: FaceIndex::new(),
            faces: HashMap::new(),
            requests: VecDeque::new(),
            use_disk,
            hits: 0,
            misses: 0,
        };
        if use_disk {
            cache.load_manifest(CacheLocation::Public);
            cache.load_manifest(CacheLocation::Private);
        }
        cache
    }

    fn load_manifest(&mut self, location: CacheLocation) {
        let contents = match self.store.manifest(location) {
            Ok(contents) => contents,
            Err(err) => {
                log::warn!("unable to read {location:?} image manifest: {err}");
                return;
            }
        };

        let mut count = 0;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_manifest_line(line) {
                Some((name, checksum, path)) => {
                    let entry = CacheEntry {
                        checksum,
                        path: path.to_string(),
                        location,
                    };
                    if self.index.insert(name, entry) {
                        count += 1;
                    }
                }
                None => log::warn!("malformed image manifest line: {line}"),
            }
        }
        log::info!("loaded {count} {location:?} image cache entries");
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &FaceIndex {
        &self.index
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn status(&self, id: u32) -> FaceStatus {
        self.faces.get(&id).map_or(FaceStatus::Missing, |r| r.status)
    }

    pub fn face(&self, id: u32) -> Option<&CachedFace> {
        self.faces.get(&id).and_then(|r| r.face.as_ref())
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.faces.get(&id).map(|r| r.name.as_str())
    }

    /// Size of a face in tiles; unknown faces count as 1x1.
    pub fn face_size(&self, id: u32) -> (u8, u8) {
        self.face(id).map_or((1, 1), |f| f.size)
    }

    /// Face ids to send `askface` for, oldest first.
    pub fn take_requests(&mut self) -> Vec<u32> {
        self.requests.drain(..).collect()
    }

    pub fn log_statistics(&self) {
        log::info!(
            "image cache: {} hits, {} misses, {} names indexed",
            self.hits,
            self.misses,
            self.index.len()
        );
    }

    /// Makes face `id` (announced by `face2` as `name`) resident.
    ///
    /// Looks at the user's override images, then the image cache, and asks
    /// the server otherwise. Never blocks on the server.
    pub fn resolve(&mut self, id: u32, name: &str, checksum: Option<u32>) -> Resolution {
        let record = self
            .faces
            .entry(id)
            .or_insert_with(|| FaceRecord::new(name, checksum));

        if record.name != name || record.checksum != checksum {
            if record.status == FaceStatus::Requested {
                // The outstanding image2 answers for the new name too.
                log::debug!("face {id} renamed from {:?} to {name} while requested", record.name);
                record.name = name.to_string();
                record.checksum = checksum;
            } else {
                if record.status == FaceStatus::Cached {
                    log::debug!("face {id} changed from {} to {name}, dropping old image", record.name);
                }
                *record = FaceRecord::new(name, checksum);
            }
        }

        match record.status {
            FaceStatus::Cached => {
                self.hits += 1;
                return Resolution::Cached;
            }
            FaceStatus::Requested => return Resolution::Pending,
            FaceStatus::Missing => {}
        }

        if self.use_disk {
            if let Some(face) = self.load_override(name) {
                self.set_cached(id, face);
                return Resolution::Cached;
            }
            if let Some(face) = self.load_from_index(name, checksum) {
                self.set_cached(id, face);
                return Resolution::Cached;
            }
        }

        self.request(id);
        Resolution::Pending
    }

    /// Resolution for an id used by a map record, possibly never announced.
    pub fn ensure(&mut self, id: u32) -> Resolution {
        match self.faces.get(&id) {
            Some(record) if record.status == FaceStatus::Cached => Resolution::Cached,
            Some(record) if record.status == FaceStatus::Requested => Resolution::Pending,
            Some(record) => {
                let (name, checksum) = (record.name.clone(), record.checksum);
                self.resolve(id, &name, checksum)
            }
            None => {
                log::warn!("{}, requesting it", CacheError::UnknownFaceId(id));
                self.faces.insert(id, FaceRecord::new("", None));
                self.request(id);
                Resolution::Pending
            }
        }
    }

    fn set_cached(&mut self, id: u32, face: CachedFace) {
        if let Some(record) = self.faces.get_mut(&id) {
            record.status = FaceStatus::Cached;
            record.face = Some(face);
        }
        self.hits += 1;
    }

    fn request(&mut self, id: u32) {
        if let Some(record) = self.faces.get_mut(&id) {
            if record.status == FaceStatus::Requested {
                return;
            }
            record.status = FaceStatus::Requested;
        }
        self.misses += 1;
        self.requests.push_back(id);
    }

    fn load_override(&self, name: &str) -> Option<CachedFace> {
        let bytes = self.store.read_override(name).ok()?;
        match decode_png(name, &bytes) {
            Ok(face) => Some(face),
            Err(err) => {
                log::warn!("ignoring override image: {err}");
                None
            }
        }
    }

    /// Tries the indexed files for `name`, evicting broken ones.
    fn load_from_index(&mut self, name: &str, checksum: Option<u32>) -> Option<CachedFace> {
        loop {
            let entry = self
                .index
                .find_where(name, |e| checksum.is_none_or(|c| e.checksum == c))?
                .clone();

            match self.load_entry(name, &entry) {
                Ok(face) => return Some(face),
                Err(err @ CacheError::MissingImageFile { .. }) => {
                    log::warn!("{err}, dropping it from the index");
                    self.index.remove_where(name, |e| *e == entry);
                }
                Err(err) => {
                    log::warn!("{err}, evicting {}", entry.path);
                    self.evict(name, &entry);
                }
            }
        }
    }

    fn load_entry(&self, name: &str, entry: &CacheEntry) -> Result<CachedFace, CacheError> {
        let bytes = self
            .store
            .read_entry(entry)
            .map_err(|source| CacheError::MissingImageFile {
                path: entry.path.clone(),
                source,
            })?;

        let actual = image_checksum(&bytes);
        if actual != entry.checksum {
            return Err(CacheError::ChecksumMismatch {
                name: name.to_string(),
                expected: entry.checksum,
                actual,
            });
        }
        decode_png(name, &bytes)
    }

    fn evict(&mut self, name: &str, entry: &CacheEntry) {
        self.index.remove_where(name, |e| e == entry);
        if entry.location == CacheLocation::Private {
            if let Err(err) = self.store.remove(&entry.path) {
                log::warn!("unable to delete {}: {err}", entry.path);
            }
        }
    }

    /// Handles the `image2` answer for face `id`.
    ///
    /// The image is kept in memory; with the disk cache on it is also written
    /// to the image cache and its manifest.
    pub fn on_face_data_received(&mut self, id: u32, bytes: &[u8]) -> Result<(), CacheError> {
        let name = self.faces.get(&id).map(|r| r.name.clone()).unwrap_or_default();
        let face = match decode_png(&name, bytes) {
            Ok(face) => face,
            Err(err) => {
                if let Some(record) = self.faces.get_mut(&id) {
                    record.status = FaceStatus::Missing;
                }
                return Err(err);
            }
        };
        let checksum = face.checksum;

        let record = self
            .faces
            .entry(id)
            .or_insert_with(|| FaceRecord::new("", None));
        record.status = FaceStatus::Cached;
        record.face = Some(face);
        if let Some(expected) = record.checksum {
            if expected != checksum {
                log::warn!("face {id} ({name}): server announced checksum {expected}, image has {checksum}");
            }
        }

        if !self.use_disk {
            return Ok(());
        }
        if !is_storable_name(&name) {
            log::warn!("face {id} has no usable name ({name:?}), keeping it in memory only");
            return Ok(());
        }
        let already_stored = self
            .index
            .find_where(&name, |e| e.checksum == checksum)
            .is_some_and(|e| self.store.read_entry(e).is_ok());
        if already_stored {
            return Ok(());
        }

        let path = self.store.store(&name, bytes)?;
        self.store
            .append_manifest(&format!("{name} {checksum} {path}"))?;
        self.index.insert(
            &name,
            CacheEntry {
                checksum,
                path,
                location: CacheLocation::Private,
            },
        );
        log::debug!("cached face {id} as {name}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_store::MemoryImageStore;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbaImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn checksum_rotates_right() {
        assert_eq!(image_checksum(&[]), 0);
        assert_eq!(image_checksum(&[1]), 1);
        // 1 rotated right sets the high bit
        assert_eq!(image_checksum(&[1, 0]), 0x8000_0000);
        assert_eq!(image_checksum(&[2, 3]), 4);
    }

    #[test]
    fn unknown_face_is_requested_once() {
        let mut cache = FaceCache::new(MemoryImageStore::default(), true);
        for _ in 0..5 {
            assert_eq!(cache.resolve(7, "orc.111", Some(9)), Resolution::Pending);
        }
        assert_eq!(cache.take_requests(), vec![7]);
        assert!(cache.take_requests().is_empty());
        assert_eq!(cache.status(7), FaceStatus::Requested);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn received_face_is_written_and_indexed() {
        let mut cache = FaceCache::new(MemoryImageStore::default(), true);
        cache.resolve(7, "dragon.111", None);
        let bytes = png(64, 96);
        cache.on_face_data_received(7, &bytes).unwrap();

        assert_eq!(cache.status(7), FaceStatus::Cached);
        assert_eq!(cache.face_size(7), (2, 3));
        let checksum = image_checksum(&bytes);
        assert_eq!(
            cache.store().private_manifest,
            format!("dragon.111 {checksum} dr/dragon.111.0\n")
        );
        assert_eq!(cache.index().entries("dragon.111")[0].checksum, checksum);
    }

    #[test]
    fn manifest_entries_resolve_without_request() {
        let bytes = png(32, 32);
        let checksum = image_checksum(&bytes);
        let mut store = MemoryImageStore::default();
        store.private.insert("wa/wall.111.0".into(), bytes);
        store.private_manifest = format!("# comment\nwall.111 {checksum} wa/wall.111.0\nbroken line\n");

        let mut cache = FaceCache::new(store, true);
        assert_eq!(cache.resolve(3, "wall.111", Some(checksum)), Resolution::Cached);
        assert!(cache.take_requests().is_empty());
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn checksum_mismatch_evicts_private_file_and_refetches() {
        let bytes = png(32, 32);
        let mut store = MemoryImageStore::default();
        store.private.insert("wa/wall.111.0".into(), bytes);
        // manifest lies about the checksum
        store.private_manifest = "wall.111 12345 wa/wall.111.0\n".into();

        let mut cache = FaceCache::new(store, true);
        assert_eq!(cache.resolve(3, "wall.111", Some(12345)), Resolution::Pending);
        assert_eq!(cache.take_requests(), vec![3]);
        assert!(cache.index().entries("wall.111").is_empty());
        assert!(cache.store().private.is_empty());
    }

    #[test]
    fn corrupt_public_file_is_dropped_but_not_deleted() {
        let garbage = b"not a png".to_vec();
        let checksum = image_checksum(&garbage);
        let mut store = MemoryImageStore::default();
        store.public.insert("orc.png".into(), garbage);
        store.public_manifest = format!("orc.111 {checksum} orc.png\n");

        let mut cache = FaceCache::new(store, true);
        assert_eq!(cache.resolve(1, "orc.111", None), Resolution::Pending);
        assert!(cache.index().entries("orc.111").is_empty());
        assert!(cache.store().public.contains_key("orc.png"));
    }

    #[test]
    fn missing_file_is_a_miss() {
        let mut store = MemoryImageStore::default();
        store.private_manifest = "orc.111 1 or/orc.111.0\n".into();
        let mut cache = FaceCache::new(store, true);
        assert_eq!(cache.resolve(1, "orc.111", Some(1)), Resolution::Pending);
        assert_eq!(cache.take_requests(), vec![1]);
        assert!(cache.index().entries("orc.111").is_empty());
    }

    #[test]
    fn image_listed_but_missing_is_stored_again() {
        let bytes = png(32, 32);
        let checksum = image_checksum(&bytes);
        let mut store = MemoryImageStore::default();
        store.private_manifest = format!("wall.111 {checksum} wa/wall.111.0\n");

        let mut cache = FaceCache::new(store, true);
        assert_eq!(cache.resolve(4, "wall.111", Some(checksum)), Resolution::Pending);
        assert_eq!(cache.take_requests(), vec![4]);
        cache.on_face_data_received(4, &bytes).unwrap();
        assert_eq!(cache.store().private.len(), 1);

        let mut reopened = FaceCache::new(cache.store().clone(), true);
        assert_eq!(reopened.resolve(4, "wall.111", Some(checksum)), Resolution::Cached);
        assert!(reopened.take_requests().is_empty());
    }

    #[test]
    fn unreadable_public_match_does_not_block_private_copy() {
        let bytes = png(32, 32);
        let checksum = image_checksum(&bytes);
        let mut store = MemoryImageStore::default();
        store.public_manifest = format!("wall.111 {checksum} wall.png\n");

        let mut cache = FaceCache::new(store, true);
        // announced with another checksum, so the public entry is never tried
        assert_eq!(cache.resolve(8, "wall.111", Some(checksum ^ 1)), Resolution::Pending);
        assert_eq!(cache.index().entries("wall.111").len(), 1);
        cache.take_requests();
        cache.on_face_data_received(8, &bytes).unwrap();
        assert_eq!(cache.store().private.len(), 1);
        assert_eq!(cache.index().entries("wall.111")[0].location, CacheLocation::Private);
    }

    #[test]
    fn naming_a_requested_face_keeps_one_request() {
        let mut cache = FaceCache::new(MemoryImageStore::default(), true);
        assert_eq!(cache.ensure(9), Resolution::Pending);
        assert_eq!(cache.resolve(9, "stone.111", Some(5)), Resolution::Pending);
        assert_eq!(cache.resolve(9, "stone.112", Some(6)), Resolution::Pending);
        assert_eq!(cache.take_requests(), vec![9]);
        assert_eq!(cache.name(9), Some("stone.112"));
        assert_eq!(cache.status(9), FaceStatus::Requested);

        let bytes = png(32, 32);
        cache.on_face_data_received(9, &bytes).unwrap();
        assert_eq!(cache.index().entries("stone.112").len(), 1);
    }

    #[test]
    fn override_wins_without_checksum() {
        let mut store = MemoryImageStore::default();
        store.overrides.insert("orc.111".into(), png(32, 64));
        let mut cache = FaceCache::new(store, true);
        assert_eq!(cache.resolve(1, "orc.111", Some(999)), Resolution::Cached);
        assert_eq!(cache.face_size(1), (1, 2));
    }

    #[test]
    fn new_checksum_supersedes_cached_face() {
        let mut cache = FaceCache::new(MemoryImageStore::default(), true);
        cache.resolve(5, "tree.111", None);
        cache.on_face_data_received(5, &png(32, 32)).unwrap();
        cache.take_requests();

        let newer = png(64, 64);
        let checksum = image_checksum(&newer);
        assert_eq!(cache.resolve(5, "tree.111", Some(checksum)), Resolution::Pending);
        cache.on_face_data_received(5, &newer).unwrap();

        assert_eq!(cache.face_size(5), (2, 2));
        let entries = cache.index().entries("tree.111");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].checksum, checksum);
        assert_eq!(entries[0].path, "tr/tree.111.1");
    }

    #[test]
    fn corrupt_image_data_is_rejected() {
        let mut cache = FaceCache::new(MemoryImageStore::default(), true);
        cache.resolve(5, "tree.111", None);
        assert!(matches!(
            cache.on_face_data_received(5, b"garbage"),
            Err(CacheError::CorruptImage { .. })
        ));
        assert_eq!(cache.status(5), FaceStatus::Missing);
    }

    #[test]
    fn unannounced_ids_are_fetched_and_kept_in_memory() {
        let mut cache = FaceCache::new(MemoryImageStore::default(), true);
        assert_eq!(cache.ensure(40), Resolution::Pending);
        assert_eq!(cache.ensure(40), Resolution::Pending);
        assert_eq!(cache.take_requests(), vec![40]);

        cache.on_face_data_received(40, &png(32, 32)).unwrap();
        assert_eq!(cache.ensure(40), Resolution::Cached);
        assert!(cache.store().private.is_empty());
    }

    #[test]
    fn disabled_disk_cache_only_fetches() {
        let bytes = png(32, 32);
        let mut store = MemoryImageStore::default();
        store.private_manifest = format!("wall.111 {} wa/wall.111.0\n", image_checksum(&bytes));
        store.private.insert("wa/wall.111.0".into(), bytes.clone());

        let mut cache = FaceCache::new(store, false);
        assert_eq!(cache.resolve(3, "wall.111", None), Resolution::Pending);
        cache.on_face_data_received(3, &bytes).unwrap();
        assert_eq!(cache.status(3), FaceStatus::Cached);
        assert_eq!(cache.store().private.len(), 1);
    }
}
