//! On-disk and in-buffer cache formats. A cache directory holds a small text
//! manifest (version and blob count) plus one file per backend-exported blob; the
//! manifest is replaced atomically through a rename so that a crashed writer never
//! leaves a torn manifest behind. The buffer form frames the same blobs with the
//! same version for `export_cache_to_buffer`/`import_cache_from_buffer`.

use std::fs;
use std::path::{Path, PathBuf};

use kitsune_backend::{Error, Result};
use tracing::{debug, error};

use crate::memory::MappedFile;

const MANIFEST: &str = "manifest";
const MANIFEST_TMP: &str = "manifest.tmp";

/// A versioned cache directory.
#[derive(Clone, Debug)]
pub struct CacheDir {
    path: PathBuf,
    version: u32,
}

impl CacheDir {
    pub fn new(path: impl Into<PathBuf>, version: u32) -> Self {
        Self { path: path.into(), version }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// True when the directory holds a finished manifest.
    pub fn is_populated(&self) -> bool {
        self.path.join(MANIFEST).is_file()
    }

    fn blob_path(&self, index: usize) -> PathBuf {
        self.path.join(format!("blob_{index}.bin"))
    }

    /// Persists exported blobs under the directory, finishing with the atomic
    /// manifest rename.
    pub fn save(&self, blobs: &[Vec<u8>]) -> Result<()> {
        fs::create_dir_all(&self.path).map_err(|source| {
            error!("cannot create cache directory {}: {source}", self.path.display());
            Error::InvalidPath(format!("cannot create {}: {source}", self.path.display()))
        })?;

        for (index, blob) in blobs.iter().enumerate() {
            let path = self.blob_path(index);
            fs::write(&path, blob).map_err(|source| {
                error!("cannot write cache blob {}: {source}", path.display());
                Error::InvalidFile(format!("cannot write {}: {source}", path.display()))
            })?;
        }

        let manifest = format!("version {}\nblobs {}\n", self.version, blobs.len());
        let tmp = self.path.join(MANIFEST_TMP);
        fs::write(&tmp, manifest)
            .and_then(|()| fs::rename(&tmp, self.path.join(MANIFEST)))
            .map_err(|source| {
                error!("cannot finish cache manifest in {}: {source}", self.path.display());
                Error::InvalidFile(format!("cannot write manifest: {source}"))
            })?;

        debug!("saved {} cache blobs to {}", blobs.len(), self.path.display());
        Ok(())
    }

    /// Loads the cache back as read-only file mappings, verifying the manifest
    /// version against this directory's configured version.
    pub fn load(&self) -> Result<Vec<MappedFile>> {
        let manifest_path = self.path.join(MANIFEST);
        let manifest = fs::read_to_string(&manifest_path).map_err(|source| {
            Error::InvalidPath(format!("cannot read {}: {source}", manifest_path.display()))
        })?;
        let (version, count) = parse_manifest(&manifest)?;
        if version != self.version {
            error!(
                "cache version mismatch in {}: found {version}, expected {}",
                self.path.display(),
                self.version
            );
            return Err(Error::InvalidFile(format!(
                "cache version mismatch: found {version}, expected {}",
                self.version
            )));
        }

        (0..count).map(|index| MappedFile::open(&self.blob_path(index))).collect()
    }
}

fn parse_manifest(manifest: &str) -> Result<(u32, usize)> {
    let mut version = None;
    let mut blobs = None;
    for line in manifest.lines() {
        match line.split_once(' ') {
            Some(("version", value)) => version = value.trim().parse().ok(),
            Some(("blobs", value)) => blobs = value.trim().parse().ok(),
            _ => {}
        }
    }
    match (version, blobs) {
        (Some(version), Some(blobs)) => Ok((version, blobs)),
        _ => Err(Error::InvalidFile("malformed cache manifest".into())),
    }
}

/// Frames cache blobs into the single-buffer export form.
pub fn pack_blobs(version: u32, blobs: &[Vec<u8>]) -> Result<Vec<u8>> {
    bincode::serialize(&(version, blobs))
        .map_err(|source| Error::Failed(format!("cache buffer encoding: {source}")))
}

/// Splits a buffer produced by [`pack_blobs`] back into its blobs.
pub fn unpack_blobs(buffer: &[u8]) -> Result<(u32, Vec<Vec<u8>>)> {
    bincode::deserialize(buffer)
        .map_err(|source| Error::InvalidFile(format!("malformed cache buffer: {source}")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path().join("model"), 3);
        assert!(!cache.is_populated());

        let blobs = vec![b"first blob".to_vec(), b"second".to_vec()];
        cache.save(&blobs).unwrap();
        assert!(cache.is_populated());

        let restored = cache.load().unwrap();
        let restored: Vec<&[u8]> = restored.iter().map(MappedFile::as_slice).collect();
        assert_eq!(restored, vec![b"first blob".as_slice(), b"second".as_slice()]);
    }

    #[test]
    fn version_mismatch_is_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        CacheDir::new(dir.path(), 1).save(&[b"blob".to_vec()]).unwrap();
        assert!(matches!(
            CacheDir::new(dir.path(), 2).load(),
            Err(Error::InvalidFile(_))
        ));
    }

    #[test]
    fn missing_manifest_is_invalid_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CacheDir::new(dir.path(), 1).load(),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn save_overwrites_previous_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path(), 1);
        cache.save(&[b"one".to_vec(), b"two".to_vec()]).unwrap();
        cache.save(&[b"only".to_vec()]).unwrap();

        let restored = cache.load().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].as_slice(), b"only");
    }

    #[test]
    fn buffer_round_trip() {
        let blobs = vec![vec![1u8, 2, 3], vec![4u8]];
        let packed = pack_blobs(7, &blobs).unwrap();
        let (version, unpacked) = unpack_blobs(&packed).unwrap();
        assert_eq!(version, 7);
        assert_eq!(unpacked, blobs);
        assert!(matches!(unpack_blobs(b"junk"), Err(Error::InvalidFile(_))));
    }
}
