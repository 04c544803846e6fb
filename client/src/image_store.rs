use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crate::face_index::{CacheEntry, CacheLocation};

const IMAGE_CACHE_DIR: &str = "image-cache";
const OVERRIDE_DIR: &str = "gfx";
pub const MANIFEST_FILENAME: &str = "bmaps.client";

/// File access of the face cache.
pub trait ImageStore {
    /// Per-user replacement image `gfx/<name>.png`.
    fn read_override(&self, name: &str) -> io::Result<Vec<u8>>;

    /// Bytes of a file listed in a manifest.
    fn read_entry(&self, entry: &CacheEntry) -> io::Result<Vec<u8>>;

    /// Writes a new private file for `name` and returns its manifest path.
    fn store(&mut self, name: &str, bytes: &[u8]) -> io::Result<String>;

    /// Deletes a private file.
    fn remove(&mut self, path: &str) -> io::Result<()>;

    /// Manifest contents; a missing manifest reads as empty.
    fn manifest(&self, location: CacheLocation) -> io::Result<String>;

    fn append_manifest(&mut self, line: &str) -> io::Result<()>;
}

/// Two character subdirectory a face is stored under.
pub fn bucket_dir(name: &str) -> String {
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    let second = chars.next().unwrap_or('_');
    format!("{first}{second}")
}

/// Face names come from the server and end up in file names.
pub fn is_storable_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
}

/// Splits `file@offset:length` used by combined image archives.
fn split_archive_path(path: &str) -> Option<(&str, u64, u64)> {
    let (file, range) = path.split_once('@')?;
    let (offset, length) = range.split_once(':')?;
    Some((file, offset.trim().parse().ok()?, length.trim().parse().ok()?))
}

#[derive(Clone, Debug)]
pub struct DiskImageStore {
    cache_dir: PathBuf,
    data_dir: PathBuf,
}

impl DiskImageStore {
    /// `cache_dir` holds `gfx/` and `image-cache/`, `data_dir` the public
    /// images and their manifest.
    pub fn new(cache_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    fn private_dir(&self) -> PathBuf {
        self.cache_dir.join(IMAGE_CACHE_DIR)
    }

    fn entry_path(&self, location: CacheLocation, path: &str) -> PathBuf {
        match location {
            CacheLocation::Public => self.data_dir.join(path),
            CacheLocation::Private => self.private_dir().join(path),
        }
    }

    fn read_archive_member(file: &Path, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        let mut file = File::open(file)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = Vec::new();
        file.take(length).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("archive member at {offset} is short: {} of {length} bytes", bytes.len()),
            ));
        }
        Ok(bytes)
    }
}

impl ImageStore for DiskImageStore {
    fn read_override(&self, name: &str) -> io::Result<Vec<u8>> {
        if !is_storable_name(name) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad face name"));
        }
        fs::read(self.cache_dir.join(OVERRIDE_DIR).join(format!("{name}.png")))
    }

    fn read_entry(&self, entry: &CacheEntry) -> io::Result<Vec<u8>> {
        match split_archive_path(&entry.path) {
            Some((file, offset, length)) => {
                Self::read_archive_member(&self.entry_path(entry.location, file), offset, length)
            }
            None => fs::read(self.entry_path(entry.location, &entry.path)),
        }
    }

    fn store(&mut self, name: &str, bytes: &[u8]) -> io::Result<String> {
        if !is_storable_name(name) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad face name"));
        }
        let bucket = bucket_dir(name);
        let dir = self.private_dir().join(&bucket);
        fs::create_dir_all(&dir)?;

        // Several servers may use different images under one name.
        let mut n = 0u32;
        loop {
            let file_name = format!("{name}.{n}");
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&file_name))
            {
                Ok(mut file) => {
                    file.write_all(bytes)?;
                    return Ok(format!("{bucket}/{file_name}"));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(err) => return Err(err),
            }
        }
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        fs::remove_file(self.private_dir().join(path))
    }

    fn manifest(&self, location: CacheLocation) -> io::Result<String> {
        let path = match location {
            CacheLocation::Public => self.data_dir.join(MANIFEST_FILENAME),
            CacheLocation::Private => self.private_dir().join(MANIFEST_FILENAME),
        };
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("no manifest at {}", path.display());
                Ok(String::new())
            }
            Err(err) => Err(err),
        }
    }

    fn append_manifest(&mut self, line: &str) -> io::Result<()> {
        let dir = self.private_dir();
        fs::create_dir_all(&dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(MANIFEST_FILENAME))?;
        writeln!(file, "{line}")
    }
}

/// Keeps everything in maps; used where touching the disk is not wanted.
#[derive(Clone, Debug, Default)]
pub struct MemoryImageStore {
    pub overrides: HashMap<String, Vec<u8>>,
    pub public: HashMap<String, Vec<u8>>,
    pub private: HashMap<String, Vec<u8>>,
    pub public_manifest: String,
    pub private_manifest: String,
}

impl ImageStore for MemoryImageStore {
    fn read_override(&self, name: &str) -> io::Result<Vec<u8>> {
        self.overrides
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn read_entry(&self, entry: &CacheEntry) -> io::Result<Vec<u8>> {
        let files = match entry.location {
            CacheLocation::Public => &self.public,
            CacheLocation::Private => &self.private,
        };
        files
            .get(&entry.path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn store(&mut self, name: &str, bytes: &[u8]) -> io::Result<String> {
        if !is_storable_name(name) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "bad face name"));
        }
        let bucket = bucket_dir(name);
        let path = (0u32..)
            .map(|n| format!("{bucket}/{name}.{n}"))
            .find(|path| !self.private.contains_key(path))
            .unwrap_or_default();
        self.private.insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    fn remove(&mut self, path: &str) -> io::Result<()> {
        self.private
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn manifest(&self, location: CacheLocation) -> io::Result<String> {
        Ok(match location {
            CacheLocation::Public => self.public_manifest.clone(),
            CacheLocation::Private => self.private_manifest.clone(),
        })
    }

    fn append_manifest(&mut self, line: &str) -> io::Result<()> {
        self.private_manifest.push_str(line);
        self.private_manifest.push('\n');
        Ok(())
    }
}
