use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::KeyValueStore;
use crate::config::ConfigProperties;
use crate::error::{AddContext, CacheError};
use crate::Result;

const TEMP_PREFIX: char = '.';

/// One file per entry in the configured cache directory. The key is the file
/// name. Writes land in a uniquely named hidden file that is then renamed
/// over the final name, so a reader never sees a partially written entry.
pub struct FileStore {
    location: PathBuf,
}

impl FileStore {
    pub fn new(config: Arc<dyn ConfigProperties>) -> Result<Self> {
        let location = config
            .cache_location()
            .ok_or(CacheError::ConfigurationNotFound)?;
        Ok(FileStore {
            location: PathBuf::from(location),
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn validate_cache_location(&self) -> Result<()> {
        let cache_location = self.location.to_string_lossy();
        if !self.location.exists() {
            return Err(CacheError::CacheLocationDoesNotExist(format!(
                "Cache directory does not exist: {cache_location}"
            ))
            .into());
        }
        if !self.location.is_dir() {
            return Err(CacheError::CacheLocationIsNotADirectory(format!(
                "Cache location is not a directory: {cache_location}"
            ))
            .into());
        }
        let probe = self.location.join(".write_test_cache_file");
        if let Err(err) = File::create(&probe) {
            return Err(CacheError::CacheLocationIsNotWriteable(format!(
                "No write permission for cache directory {cache_location}: {err}"
            ))
            .into());
        }
        fs::remove_file(&probe).map_err(|err| {
            CacheError::CacheLocationWriteTestFailed(format!(
                "Failed to remove cache test file {}: {}",
                probe.to_string_lossy(),
                err
            ))
        })?;
        Ok(())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.location.join(key)
    }

    /// Total size in bytes of the stored entries.
    pub fn size(&self) -> Result<u64> {
        let mut size = 0;
        for key in self.keys()? {
            size += fs::metadata(self.path(&key))?.len();
        }
        Ok(size)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let f = match File::open(self.path(key)) {
            Ok(f) => f,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut reader = BufReader::new(f);
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .err_context(format!("Could not read cache entry {key}"))?;
        Ok(Some(data))
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        // Unique hidden name per write. Dropped on any error, which removes it.
        let mut temp = tempfile::Builder::new()
            .prefix(&format!("{TEMP_PREFIX}{key}."))
            .suffix(".tmp")
            .tempfile_in(&self.location)
            .err_context(format!("Could not create cache entry {key}"))?;
        temp.write_all(value)?;
        temp.flush()?;
        temp
            .persist(self.path(key))
            .map_err(|err| err.error)
            .err_context(format!("Could not store cache entry {key}"))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn rename(&self, old_key: &str, new_key: &str) -> Result<()> {
        fs::rename(self.path(old_key), self.path(new_key))
            .err_context(format!("Could not rename cache entry {old_key}"))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.location)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(TEMP_PREFIX) {
                keys.push(name);
            }
        }
        Ok(keys)
    }
}
