use crate::CoreError;
use modorder_schema::{ContentHash, PackageId, UserData};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Per-package user data, one JSON file per package id.
#[derive(Debug, Clone)]
pub struct UserDataStore {
    dir: PathBuf,
}

impl UserDataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &PackageId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Load the record for `id`, verifying its checksum when one is present.
    pub fn get(&self, id: &PackageId) -> Result<Option<UserData>, CoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let data: UserData = serde_json::from_str(&content)?;

        // Hand-written files carry no checksum and are accepted as-is.
        if let Some(ref expected) = data.checksum {
            let actual = data.compute_checksum()?;
            if actual != *expected {
                return Err(CoreError::IntegrityFailure {
                    id: id.to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(Some(data))
    }

    /// Write the record atomically, stamping `updated_at` and the checksum.
    /// An empty record removes the file instead.
    pub fn put(&self, id: &PackageId, data: &UserData) -> Result<(), CoreError> {
        if data.is_empty() {
            return self.remove(id);
        }
        fs::create_dir_all(&self.dir)?;

        let mut record = data.clone();
        record.updated_at = Some(chrono::Utc::now().to_rfc3339());
        record.checksum = Some(record.compute_checksum()?);
        let content = serde_json::to_string_pretty(&record)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(id))
            .map_err(|e| CoreError::Io(e.error))?;
        debug!("wrote user data for {id}");
        Ok(())
    }

    /// Read-modify-write the record for `id`.
    pub fn update(
        &self,
        id: &PackageId,
        f: impl FnOnce(&mut UserData),
    ) -> Result<UserData, CoreError> {
        let mut data = self.get(id)?.unwrap_or_default();
        f(&mut data);
        self.put(id, &data)?;
        Ok(data)
    }

    /// Mark `id` as a local copy of `source`, recording the source's current
    /// content hash.
    pub fn set_source(
        &self,
        id: &PackageId,
        source: &PackageId,
        hash: ContentHash,
    ) -> Result<UserData, CoreError> {
        self.update(id, |d| {
            d.source = Some(source.clone());
            d.source_hash = Some(hash);
        })
    }

    pub fn clear_source(&self, id: &PackageId) -> Result<UserData, CoreError> {
        self.update(id, |d| {
            d.source = None;
            d.source_hash = None;
        })
    }

    pub fn remove(&self, id: &PackageId) -> Result<(), CoreError> {
        let path = self.path_for(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, UserDataStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = UserDataStore::new(dir.path().join("userdata"));
        (dir, store)
    }

    #[test]
    fn missing_record_is_none() {
        let (_dir, store) = store();
        assert!(store.get(&PackageId::new("a.b")).unwrap().is_none());
    }

    #[test]
    fn put_then_get_roundtrip_with_checksum() {
        let (_dir, store) = store();
        let id = PackageId::new("a.b");
        store
            .put(
                &id,
                &UserData {
                    color: Some("blue".to_owned()),
                    ..Default::default()
                },
            )
            .unwrap();

        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.color.as_deref(), Some("blue"));
        assert!(loaded.checksum.is_some());
        assert!(loaded.updated_at.is_some());
    }

    #[test]
    fn tampered_record_fails_integrity_check() {
        let (_dir, store) = store();
        let id = PackageId::new("a.b");
        store
            .set_source(&id, &PackageId::new("src.b"), ContentHash::new("aa"))
            .unwrap();

        let path = store.dir().join("a.b.json");
        let content = fs::read_to_string(&path).unwrap().replace("src.b", "evil.b");
        fs::write(&path, content).unwrap();

        assert!(matches!(
            store.get(&id),
            Err(CoreError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn hand_written_record_without_checksum_loads() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(
            store.dir().join("a.b.json"),
            r#"{"source": "src.b", "source_hash": "abc"}"#,
        )
        .unwrap();
        let data = store.get(&PackageId::new("a.b")).unwrap().unwrap();
        assert_eq!(data.source.unwrap(), "src.b");
    }

    #[test]
    fn clearing_everything_removes_the_file() {
        let (_dir, store) = store();
        let id = PackageId::new("a.b");
        store
            .set_source(&id, &PackageId::new("src.b"), ContentHash::new("aa"))
            .unwrap();
        assert!(store.dir().join("a.b.json").exists());

        store.clear_source(&id).unwrap();
        assert!(!store.dir().join("a.b.json").exists());
        assert!(store.get(&id).unwrap().is_none());
    }
}
