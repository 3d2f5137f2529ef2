//! Content-addressed blob store on the local filesystem.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;

use super::error::{Result, StoreError};

/// Number of key characters used for the bucket directory.
const BUCKET_CHARS: usize = 2;

/// Directory under the root holding in-flight writes.
const TMP_DIR: &str = "tmp";

/// Deduplicating cache mapping a key (normally a blob hash) to its bytes.
///
/// Layout: `<root>/<first two chars of key>/<key>`.
///
/// Entries are written to `<root>/tmp` first and then moved into place with
/// a no-clobber rename, so readers never observe a partial entry and
/// concurrent writers of the same key (threads or processes) settle on a
/// single file.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        let split = key
            .char_indices()
            .nth(BUCKET_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(key.len());
        Ok(self.root.join(&key[..split]).join(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_ok_and(|p| p.is_file())
    }

    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::io(&path, e),
        })
    }

    /// Copy the entry for `key` to `dest`, returning the number of bytes copied.
    pub fn copy_to(&self, key: &str, dest: &Path) -> Result<u64> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        fs::copy(&path, dest).map_err(|e| StoreError::io(dest, e))
    }

    /// Store `data` under `key`. A no-op when the key is already present.
    pub fn store(&self, key: &str, data: &[u8]) -> Result<()> {
        self.write_entry(key, data)?;
        Ok(())
    }

    /// Store every entry of `items`, skipping keys already present.
    ///
    /// Returns the number of entries actually written.
    pub fn store_batch<K, V>(&self, items: &HashMap<K, V>) -> Result<usize>
    where
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let mut written = 0;
        for (key, data) in items {
            if self.write_entry(key.as_ref(), data.as_ref())? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Remove temp files older than `older_than`, returning how many went.
    ///
    /// In-flight writes are young, so only files abandoned by writers that
    /// died mid-write are touched.
    pub fn purge_stale_temp(&self, older_than: Duration) -> Result<usize> {
        let tmp_dir = self.root.join(TMP_DIR);
        let entries = match fs::read_dir(&tmp_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(&tmp_dir, e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&tmp_dir, e))?;
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if !meta.is_file() || age.is_none_or(|age| age < older_than) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // A concurrent sweep got there first.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        Ok(removed)
    }

    /// Returns `true` if this call created the entry.
    fn write_entry(&self, key: &str, data: &[u8]) -> Result<bool> {
        let path = self.path_for(key)?;
        if path.is_file() {
            tracing::trace!(key, "store hit");
            return Ok(false);
        }

        let bucket = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(bucket).map_err(|e| StoreError::io(bucket, e))?;
        let tmp_dir = self.root.join(TMP_DIR);
        fs::create_dir_all(&tmp_dir).map_err(|e| StoreError::io(&tmp_dir, e))?;

        let mut tmp = NamedTempFile::new_in(&tmp_dir).map_err(|e| StoreError::io(&tmp_dir, e))?;
        // Data must be durable before the rename publishes it under the key.
        tmp.write_all(data)
            .and_then(|_| tmp.flush())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))
                .map_err(|e| StoreError::io(tmp.path(), e))?;
        }

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                tracing::trace!(key, bytes = data.len(), "stored entry");
                Ok(true)
            }
            // Another writer won the race; its bytes are identical by construction.
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(StoreError::io(&path, err.error)),
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HASH: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";

    #[test]
    fn layout_uses_prefix_bucket() {
        let store = ContentStore::new("/cache/store");
        let path = store.path_for(HASH).unwrap();
        assert_eq!(path, Path::new("/cache/store/3b").join(HASH));
    }

    #[test]
    fn short_keys_use_whole_key_as_bucket() {
        let store = ContentStore::new("/cache/store");
        assert_eq!(store.path_for("a").unwrap(), Path::new("/cache/store/a/a"));
    }

    #[test]
    fn rejects_path_like_keys() {
        let store = ContentStore::new("/cache/store");
        for key in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            assert!(
                matches!(store.path_for(key), Err(StoreError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn store_then_read() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        store.store(HASH, b"hello").unwrap();
        assert!(store.contains(HASH));
        assert_eq!(store.read(HASH).unwrap(), b"hello");
    }

    #[test]
    fn store_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        store.store(HASH, b"original").unwrap();
        store.store(HASH, b"original").unwrap();
        // Even differing bytes never overwrite an existing entry.
        store.store(HASH, b"changed").unwrap();
        assert_eq!(store.read(HASH).unwrap(), b"original");
    }

    #[test]
    fn existing_entry_is_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        store.store(HASH, b"data").unwrap();

        let path = store.path_for(HASH).unwrap();
        let past = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&path, past).unwrap();

        store.store(HASH, b"data").unwrap();
        let meta = fs::metadata(&path).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), past);
    }

    #[test]
    fn batch_writes_only_new_keys() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        store.store("aa01", b"old").unwrap();

        let mut items = HashMap::new();
        items.insert("aa01", b"new".to_vec());
        items.insert("bb02", b"two".to_vec());
        items.insert("cc03", b"three".to_vec());

        let written = store.store_batch(&items).unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.read("aa01").unwrap(), b"old");
        assert_eq!(store.read("bb02").unwrap(), b"two");
        assert_eq!(store.read("cc03").unwrap(), b"three");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        store.store(HASH, b"x").unwrap();
        store.store(HASH, b"x").unwrap();
        let leftovers = fs::read_dir(tmp.path().join(TMP_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn stale_temp_files_are_purged() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        assert_eq!(store.purge_stale_temp(Duration::from_secs(60)).unwrap(), 0);

        let tmp_dir = tmp.path().join(TMP_DIR);
        fs::create_dir_all(&tmp_dir).unwrap();
        let abandoned = tmp_dir.join(".tmpabandoned");
        let in_flight = tmp_dir.join(".tmpinflight");
        fs::write(&abandoned, b"trunc").unwrap();
        fs::write(&in_flight, b"writing").unwrap();
        let past = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&abandoned, past).unwrap();

        let removed = store.purge_stale_temp(Duration::from_secs(60 * 60)).unwrap();
        assert_eq!(removed, 1);
        assert!(!abandoned.exists());
        assert!(in_flight.exists());
    }

    #[test]
    fn stored_entry_holds_every_byte() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        let payload = b"module \"vpc\" {}\n".repeat(4096);
        store.store(HASH, &payload).unwrap();

        let meta = fs::metadata(store.path_for(HASH).unwrap()).unwrap();
        assert_eq!(meta.len(), payload.len() as u64);
        assert_eq!(store.read(HASH).unwrap(), payload);
    }

    #[test]
    fn read_missing_entry() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        assert!(matches!(store.read(HASH), Err(StoreError::NotFound(_))));
        assert!(!store.contains(HASH));
    }

    #[test]
    fn copy_to_destination() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path().join("store"));
        store.store(HASH, b"payload").unwrap();

        let dest = tmp.path().join("out.txt");
        let copied = store.copy_to(HASH, &dest).unwrap();
        assert_eq!(copied, 7);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }
}
