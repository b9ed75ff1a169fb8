//! Blob persistence for worker outputs
//!
//! Workers that cannot hand their results to a transport can spill them to a
//! folder instead. Each value lands in its own file named by a fresh UUID, so
//! concurrent writers never collide.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::Result;

/// Default extension of blob files
pub const DEFAULT_EXTENSION: &str = "dat";

/// A folder of bincode-encoded blobs
#[derive(Debug, Clone)]
pub struct BlobStore {
    folder: PathBuf,
    extension: String,
}

impl BlobStore {
    /// Store rooted at `folder` using the default extension
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Use another file extension, with or without the leading dot
    #[must_use]
    pub fn with_extension(mut self, extension: impl AsRef<str>) -> Self {
        self.extension = extension.as_ref().trim_start_matches('.').to_string();
        self
    }

    /// Root folder
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Serialize `value` into a new file and return its path.
    ///
    /// The folder is created on first write.
    pub fn write<T: Serialize>(&self, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.folder)?;

        let mut path = self.folder.join(Uuid::new_v4().to_string());
        if !self.extension.is_empty() {
            path.set_extension(&self.extension);
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        bincode::serialize_into(&mut writer, value)?;
        writer.flush()?;

        debug!(path = %path.display(), "Wrote blob");
        Ok(path)
    }

    /// Deserialize the blob at `path`
    pub fn read<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> Result<T> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// Like [`read`](Self::read), but a missing or corrupt blob is logged and
    /// yields `T::default()`
    pub fn read_or_default<T: DeserializeOwned + Default>(&self, path: impl AsRef<Path>) -> T {
        let path = path.as_ref();
        self.read(path).unwrap_or_else(|e| {
            error!(path = %path.display(), error = %e, "Unable to read or load the file");
            T::default()
        })
    }

    /// Remove the blob at `path`; returns whether a file was removed.
    ///
    /// A missing file is logged, not an error.
    pub fn delete(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %path.display(), "The file does not exist");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Regular files in the folder, sorted by path
    pub fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.folder)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Detection {
        camera: String,
        boxes: Vec<[f32; 4]>,
    }

    fn detection() -> Detection {
        Detection {
            camera: "camera-1".into(),
            boxes: vec![[0.0, 0.0, 10.0, 20.0], [5.0, 5.0, 6.0, 7.0]],
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let path = store.write(&detection()).unwrap();
        assert_eq!(path.extension().unwrap(), "dat");
        assert_eq!(store.read::<Detection>(&path).unwrap(), detection());
    }

    #[test]
    fn test_write_creates_folder() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("nested").join("results"));

        let path = store.write(&42u64).unwrap();
        assert!(path.starts_with(store.folder()));
        assert_eq!(store.list_files().unwrap(), vec![path]);
    }

    #[test]
    fn test_each_write_gets_its_own_file() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path()).with_extension(".bin");

        let a = store.write(&1u32).unwrap();
        let b = store.write(&1u32).unwrap();
        assert_ne!(a, b);
        assert_eq!(b.extension().unwrap(), "bin");
        assert_eq!(store.list_files().unwrap().len(), 2);
    }

    #[test]
    fn test_read_or_default_on_missing_file() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let value: Detection = store.read_or_default(dir.path().join("missing.dat"));
        assert_eq!(value, Detection::default());
    }

    #[test]
    fn test_read_or_default_on_corrupt_file() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let path = dir.path().join("corrupt.dat");
        fs::write(&path, [0xff, 0xff, 0xff]).unwrap();

        assert!(store.read::<Detection>(&path).is_err());
        let value: Vec<String> = store.read_or_default(&path);
        assert!(value.is_empty());
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let path = store.write(&detection()).unwrap();

        assert!(store.delete(&path).unwrap());
        assert!(!store.delete(&path).unwrap());
        assert!(store.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_list_files_skips_directories() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        fs::create_dir(dir.path().join("sub")).unwrap();
        let path = store.write(&"frame").unwrap();

        assert_eq!(store.list_files().unwrap(), vec![path]);
    }

    #[test]
    fn test_list_files_missing_folder_is_error() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path().join("absent"));
        assert!(store.list_files().is_err());
    }
}
