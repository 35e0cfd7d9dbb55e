//! Query cache persisted as JSON files in a shared directory.
//!
//! Every process pointed at the same directory sees the same entries, which
//! makes evictions from one worker visible to all of them.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::cache::{CacheError, CacheKey, CachedQuery, QueryCache};

const ENTRY_PREFIX: &str = "sql_";
const ENTRY_SUFFIX: &str = ".json";
const TEMP_PREFIX: &str = ".tmp_";

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    entry: CachedQuery,
}

pub struct FileQueryCache {
    directory: PathBuf,
    ttl: Option<Duration>,
}

impl FileQueryCache {
    /// Open (creating if needed) a cache rooted at `directory`.
    pub fn open(directory: impl Into<PathBuf>, ttl: Option<Duration>) -> Result<Self, CacheError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory, ttl })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{ENTRY_PREFIX}{}{ENTRY_SUFFIX}", hash_key(key)))
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut paths = Vec::new();
        for item in fs::read_dir(&self.directory)? {
            let path = item?.path();
            let is_entry = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(ENTRY_PREFIX) && name.ends_with(ENTRY_SUFFIX));
            if is_entry {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Corrupt files are deleted and read as absent.
    fn read_entry(&self, path: &Path) -> Result<Option<StoredEntry>, CacheError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(stored) => Ok(Some(stored)),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Discarding corrupt query cache file"
                );
                discard(path)?;
                Ok(None)
            }
        }
    }
}

impl QueryCache for FileQueryCache {
    fn get(&self, key: &str) -> Result<Option<CachedQuery>, CacheError> {
        let path = self.path_for(key);
        let Some(stored) = self.read_entry(&path)? else {
            return Ok(None);
        };

        if stored.key != key {
            debug!(path = %path.display(), "Query cache file holds a different key");
            return Ok(None);
        }

        if stored.entry.is_expired(self.ttl, OffsetDateTime::now_utc()) {
            discard(&path)?;
            return Ok(None);
        }

        Ok(Some(stored.entry))
    }

    fn put(&self, key: &str, entry: CachedQuery) -> Result<(), CacheError> {
        let stored = StoredEntry {
            key: key.to_string(),
            entry,
        };

        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(ENTRY_SUFFIX)
            .tempfile_in(&self.directory)?;
        serde_json::to_writer(&mut file, &stored)?;
        file.flush()?;
        file.persist(self.path_for(key)).map_err(|err| err.error)?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        match key {
            CacheKey::Query(sql) => discard(&self.path_for(sql)),
            CacheKey::Table(table) => {
                for path in self.entry_paths()? {
                    if let Some(stored) = self.read_entry(&path)?
                        && stored.entry.depends_on(table)
                    {
                        discard(&path)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        for path in self.entry_paths()? {
            discard(&path)?;
        }
        Ok(())
    }
}

fn discard(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
