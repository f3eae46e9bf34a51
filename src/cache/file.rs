use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{CacheError, LocalCache, validate_key};

/// One JSON file per key under a directory. Writes go through a temp file and
/// a rename so a crash never leaves a half-written value behind.
///
/// Compare-and-set is serialized within this process only; two processes
/// sharing the directory can still interleave.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let io = |source| CacheError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::write(&tmp, value).map_err(io)?;
        std::fs::rename(&tmp, &path).map_err(io)
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        validate_key(key)?;
        self.read(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, CacheError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.read(key)?.as_deref() != expected {
            return Ok(false);
        }
        self.write(key, value)?;
        Ok(true)
    }
}
