use crate::{Error, Result, StorageAdapter};
use std::fs;
use std::path::PathBuf;

/// Stores each key as a JSON file under `base_path`.
///
/// Keys are mapped to file names by replacing path separators, so listing
/// returns the sanitized form.
pub struct FileStorageAdapter {
    base_path: PathBuf,
}

impl FileStorageAdapter {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path)
            .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        Ok(Self { base_path })
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", sanitize_key(key)))
    }
}

/// File-name form of a storage key.
pub fn sanitize_key(key: &str) -> String {
    key.replace(['/', '\\', ':'], "_")
}

impl StorageAdapter for FileStorageAdapter {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_to_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read file: {}", e))),
        }
    }

    fn put(&self, key: &str, value: String) -> Result<()> {
        fs::write(self.key_to_path(key), value)
            .map_err(|e| Error::Storage(format!("Failed to write file: {}", e)))
    }

    fn del(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_to_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to delete file: {}", e))),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = sanitize_key(prefix);
        let entries = fs::read_dir(&self.base_path)
            .map_err(|e| Error::Storage(format!("Failed to read directory: {}", e)))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::Storage(format!("Failed to read dir entry: {}", e)))?;
            let file_name = entry.file_name();
            let Some(key) = file_name.to_string_lossy().strip_suffix(".json").map(str::to_string)
            else {
                continue;
            };
            if key.starts_with(&prefix) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
