//! Content-addressed profile storage, scoped per client.
//!
//! On disk every profile lives at `<root>/<client_id>/<sha256>.json`. A write
//! whose target already exists is skipped, so saving identical content from
//! several processes needs no locking.

use glob::{glob, Pattern};
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
};
use tracing::{debug, error, info, instrument};

use super::{Profile, ProfileId};
use crate::error::{ConvertError, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage capability the conversion core depends on.
pub trait ProfileStore: Send + Sync {
    /// Store `profile` for `client_id`; idempotent for identical content.
    fn put(&self, client_id: &str, profile: &Profile) -> Result<ProfileId>;

    /// Every stored profile of `client_id`, in a stable order.
    fn list(&self, client_id: &str) -> Result<Vec<Profile>>;
}

/// Client ids name a directory: `[A-Za-z0-9_.-]+`, but not `.` or `..`.
pub fn validate_client_id(client_id: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-');
    if client_id.is_empty()
        || client_id == "."
        || client_id == ".."
        || !client_id.chars().all(allowed)
    {
        return Err(ConvertError::InvalidClient(client_id.to_string()));
    }
    Ok(())
}

/// A directory of canonical JSON documents.
#[derive(Debug, Clone)]
pub struct DirProfileStore {
    root: PathBuf,
}

impl DirProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn client_dir(&self, client_id: &str) -> Result<PathBuf> {
        validate_client_id(client_id)?;
        Ok(self.root.join(client_id))
    }
}

impl ProfileStore for DirProfileStore {
    #[instrument(level = "debug", skip(self, profile), fields(profile_id = %profile.id()))]
    fn put(&self, client_id: &str, profile: &Profile) -> Result<ProfileId> {
        // 1) Build path "<root>/<client>/<hash>.json"
        let dir = self.client_dir(client_id)?;
        let id = profile.id().clone();
        let path = dir.join(format!("{}.json", id));

        // 2) Same content is already stored
        if path.exists() {
            debug!(path = %path.display(), "profile already stored");
            return Ok(id);
        }

        fs::create_dir_all(&dir)
            .map_err(|e| ConvertError::Storage(format!("creating {:?}: {}", dir, e)))?;

        // 3) Write atomically: to a private tmp file, then rename
        let tmp_path = dir.join(format!(
            ".{}.{}-{}.tmp",
            id,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let mut tmp = fs::File::create(&tmp_path)
            .map_err(|e| ConvertError::Storage(format!("creating {:?}: {}", tmp_path, e)))?;
        tmp.write_all(profile.canonical_json().as_bytes())
            .and_then(|_| tmp.sync_all())
            .map_err(|e| ConvertError::Storage(format!("writing {:?}: {}", tmp_path, e)))?;
        drop(tmp);

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            ConvertError::Storage(format!("renaming {:?} -> {:?}: {}", tmp_path, path, e))
        })?;

        info!(client_id, path = %path.display(), "stored profile");
        Ok(id)
    }

    #[instrument(level = "debug", skip(self))]
    fn list(&self, client_id: &str) -> Result<Vec<Profile>> {
        let dir = self.client_dir(client_id)?;
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no profiles for client");
            return Ok(Vec::new());
        }

        let pattern = format!("{}/*.json", Pattern::escape(&dir.to_string_lossy()));
        let entries = glob(&pattern)
            .map_err(|e| ConvertError::Storage(format!("bad pattern {}: {}", pattern, e)))?;

        let mut profiles = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    error!("unreadable profile entry: {}", e);
                    continue;
                }
            };
            match load_profile(&path) {
                Ok(profile) => profiles.push(profile),
                Err(e) => error!(path = %path.display(), "skipping corrupt profile: {}", e),
            }
        }
        debug!(count = profiles.len(), "listed profiles");
        Ok(profiles)
    }
}

fn load_profile(path: &Path) -> std::result::Result<Profile, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let document = serde_json::from_str(&text).map_err(|e| e.to_string())?;
    Profile::from_value(document).map_err(|e| e.to_string())
}

/// In-process store keyed the same way as [`DirProfileStore`].
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    clients: RwLock<BTreeMap<String, BTreeMap<ProfileId, Profile>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn put(&self, client_id: &str, profile: &Profile) -> Result<ProfileId> {
        validate_client_id(client_id)?;
        let mut clients = self
            .clients
            .write()
            .map_err(|_| ConvertError::Storage("profile store lock poisoned".to_string()))?;
        let id = profile.id().clone();
        clients
            .entry(client_id.to_string())
            .or_default()
            .entry(id.clone())
            .or_insert_with(|| profile.clone());
        Ok(id)
    }

    fn list(&self, client_id: &str) -> Result<Vec<Profile>> {
        validate_client_id(client_id)?;
        let clients = self
            .clients
            .read()
            .map_err(|_| ConvertError::Storage("profile store lock poisoned".to_string()))?;
        Ok(clients
            .get(client_id)
            .map(|profiles| profiles.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::test_support::init_test_logging;
    use tempfile::tempdir;

    const PROFILE: &str = r#"{"title": "p", "identifiers": [], "tables": [], "metadata": {"a": 1}}"#;
    const PERMUTED: &str = r#"{"metadata": {"a": 1}, "tables": [], "identifiers": [], "title": "p"}"#;

    fn stored_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            files.push(entry?.path());
        }
        Ok(files)
    }

    #[test]
    fn saving_twice_stores_one_document() -> anyhow::Result<()> {
        init_test_logging();
        let tmp = tempdir()?;
        let store = DirProfileStore::new(tmp.path());
        let profile = Profile::from_json(PROFILE)?;

        let first = store.put("lab", &profile)?;
        let second = store.put("lab", &profile)?;
        assert_eq!(first, second);

        let files = stored_files(&tmp.path().join("lab"))?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0], tmp.path().join("lab").join(format!("{}.json", first)));
        assert_eq!(fs::read_to_string(&files[0])?, profile.canonical_json());
        Ok(())
    }

    #[test]
    fn permuted_keys_land_on_the_same_document() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let store = DirProfileStore::new(tmp.path());

        let a = store.put("lab", &Profile::from_json(PROFILE)?)?;
        let b = store.put("lab", &Profile::from_json(PERMUTED)?)?;
        assert_eq!(a, b);
        assert_eq!(stored_files(&tmp.path().join("lab"))?.len(), 1);
        Ok(())
    }

    #[test]
    fn list_is_scoped_per_client_and_skips_corrupt_files() -> anyhow::Result<()> {
        init_test_logging();
        let tmp = tempdir()?;
        let store = DirProfileStore::new(tmp.path());
        store.put("lab", &Profile::from_json(PROFILE)?)?;
        store.put("other", &Profile::from_json(r#"{"identifiers": [], "tables": [], "metadata": {}}"#)?)?;
        fs::write(tmp.path().join("lab").join("broken.json"), "{ nope")?;
        fs::write(tmp.path().join("lab").join("invalid.json"), r#"{"tables": []}"#)?;

        let profiles = store.list("lab")?;
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].title(), Some("p"));

        assert!(store.list("nobody")?.is_empty());
        Ok(())
    }

    #[test]
    fn client_ids_cannot_escape_the_root() {
        let store = DirProfileStore::new("unused");
        for bad in ["..", ".", "a/b", "", "x y"] {
            let err = store.list(bad).unwrap_err();
            assert_eq!(err.stage(), "InvalidClient", "{}", bad);
        }
        assert!(validate_client_id("lab-1.eu_west").is_ok());
    }

    #[test]
    fn memory_store_deduplicates() -> anyhow::Result<()> {
        let store = MemoryProfileStore::new();
        store.put("lab", &Profile::from_json(PROFILE)?)?;
        store.put("lab", &Profile::from_json(PERMUTED)?)?;
        assert_eq!(store.list("lab")?.len(), 1);
        assert!(store.list("other")?.is_empty());
        assert!(store.put("../etc", &Profile::from_json(PROFILE)?).is_err());
        Ok(())
    }

    #[test]
    fn root_with_glob_metacharacters_is_listed() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let store = DirProfileStore::new(tmp.path().join("lab [2024]*?"));
        let profile = Profile::from_json(PROFILE)?;

        store.put("lab", &profile)?;
        let listed = store.list("lab")?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), profile.id());
        Ok(())
    }
}
