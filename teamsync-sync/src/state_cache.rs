//! State cache: last full sync per organization.
//!
//! Persists one `SyncCacheEntry` JSON document per organization at
//! `<home>/.teamsync/state/<org>.json`.
//! Writes use the atomic `.tmp` + rename pattern.
//!
//! Reads never fail: a missing, unreadable, corrupt or future-dated entry is
//! reported as absent, which makes the next run a full sync.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use teamsync_core::{config, OrgName};

use crate::error::{io_err, SyncError};

/// On-disk cache payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCacheEntry {
    pub organization: OrgName,
    pub last_full_sync: DateTime<Utc>,
}

/// File-backed cache rooted at a state directory.
#[derive(Debug, Clone)]
pub struct StateCache {
    dir: PathBuf,
}

impl StateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache under `<home>/.teamsync/state/`.
    pub fn at_home(home: &Path) -> Self {
        Self::new(config::state_dir_at(home))
    }

    /// `<dir>/<org>.json`
    pub fn entry_path(&self, org: &OrgName) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(org.as_str())))
    }

    /// Timestamp of the last full sync of `org`, if one was recorded.
    pub fn get(&self, org: &OrgName) -> Option<DateTime<Utc>> {
        self.get_entry(org).map(|e| e.last_full_sync)
    }

    fn get_entry(&self, org: &OrgName) -> Option<SyncCacheEntry> {
        let path = self.entry_path(org);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(org = %org, path = %path.display(), error = %err, "unreadable state cache entry");
                return None;
            }
        };
        let entry: SyncCacheEntry = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(org = %org, path = %path.display(), error = %err, "corrupt state cache entry");
                return None;
            }
        };
        if entry.last_full_sync > Utc::now() {
            tracing::warn!(org = %org, at = %entry.last_full_sync, "state cache entry is in the future");
            return None;
        }
        Some(entry)
    }

    /// Record a completed full sync of `org` at `at`.
    ///
    /// Writes to `<path>.tmp` then renames to `<path>`.
    pub fn set(&self, org: &OrgName, at: DateTime<Utc>) -> Result<(), SyncError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;

        let entry = SyncCacheEntry {
            organization: org.clone(),
            last_full_sync: at,
        };
        let path = self.entry_path(org);
        let json = serde_json::to_string_pretty(&entry)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        Ok(())
    }

    /// Every readable entry, sorted by organization.
    pub fn entries(&self) -> Vec<SyncCacheEntry> {
        let Ok(dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut entries: Vec<SyncCacheEntry> = dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| std::fs::read_to_string(p).ok())
            .filter_map(|s| serde_json::from_str(&s).ok())
            .collect();
        entries.sort_by(|a, b| a.organization.cmp(&b.organization));
        entries
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn org() -> OrgName {
        OrgName::from("zalando")
    }

    #[test]
    fn absent_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let cache = StateCache::at_home(tmp.path());
        assert!(cache.get(&org()).is_none());
    }

    #[test]
    fn roundtrip_set_get() {
        let tmp = TempDir::new().unwrap();
        let cache = StateCache::at_home(tmp.path());
        let at = Utc::now() - Duration::minutes(5);
        cache.set(&org(), at).unwrap();
        assert_eq!(cache.get(&org()), Some(at));
    }

    #[test]
    fn tmp_file_cleaned_up_after_set() {
        let tmp = TempDir::new().unwrap();
        let cache = StateCache::at_home(tmp.path());
        cache.set(&org(), Utc::now()).unwrap();
        let tmp_path = cache.entry_path(&org()).with_extension("json.tmp");
        assert!(!tmp_path.exists(), "tmp file should be removed after atomic rename");
    }

    #[test]
    fn corrupt_entry_reads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = StateCache::at_home(tmp.path());
        let path = cache.entry_path(&org());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(cache.get(&org()).is_none());
    }

    #[test]
    fn future_entry_reads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = StateCache::at_home(tmp.path());
        cache.set(&org(), Utc::now() + Duration::days(1)).unwrap();
        assert!(cache.get(&org()).is_none());
    }

    #[test]
    fn entries_are_per_organization() {
        let tmp = TempDir::new().unwrap();
        let cache = StateCache::at_home(tmp.path());
        let now = Utc::now();
        cache.set(&OrgName::from("b-org"), now).unwrap();
        cache.set(&OrgName::from("a-org"), now).unwrap();

        let orgs: Vec<_> = cache
            .entries()
            .into_iter()
            .map(|e| e.organization.0)
            .collect();
        assert_eq!(orgs, vec!["a-org", "b-org"]);
    }

    #[test]
    fn odd_org_names_stay_inside_state_dir() {
        let tmp = TempDir::new().unwrap();
        let cache = StateCache::at_home(tmp.path());
        let path = cache.entry_path(&OrgName::from("../escape"));
        assert!(path.starts_with(config::state_dir_at(tmp.path())));
        assert!(path.ends_with(".._escape.json"));
    }
}
