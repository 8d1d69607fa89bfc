//! File-per-key snapshot store.
//!
//! Layout under the data directory:
//! ```text
//!  {data_dir}/{league}/{slot}.json                     current record
//!  {data_dir}/{league}/{slot}_{YYYYMMDD_HHMMSS}.json   archive (base slots only)
//! ```
//!
//! Every record is an envelope `{league, data_type, harvested_at, data}`.
//! Writes go to a temporary file that is hard-linked to its archive name and
//! then renamed over the current record, so readers never observe a partial
//! file. Writers to the same key are serialised only for the duration of that
//! single write.

pub mod mirror;

pub use mirror::{NoMirror, SnapshotMirror};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::{HarvestError, Result};
use crate::leagues::{League, Slot};

/// The persisted unit: one harvested payload plus its capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub league: League,
    /// Slot name (`teams`, `scoreboard_20241019`, `summary_401`, ...)
    pub data_type: String,
    pub harvested_at: DateTime<Utc>,
    pub data: Value,
}

/// Per-key write guard, held for the duration of one write.
type KeyLock = Arc<Mutex<()>>;

#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    data_dir: PathBuf,
    mirror: Arc<dyn SnapshotMirror>,
    key_locks: Mutex<HashMap<(League, String), KeyLock>>,
    /// Latest stamp handed out by any writer.
    last_stamp: Mutex<Option<DateTime<Utc>>>,
    tmp_seq: AtomicU64,
}

impl SnapshotStore {
    /// Open (or create) a store rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>, mirror: Arc<dyn SnapshotMirror>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| HarvestError::storage(&data_dir, e))?;
        Ok(SnapshotStore {
            inner: Arc::new(StoreInner {
                data_dir,
                mirror,
                key_locks: Mutex::new(HashMap::new()),
                last_stamp: Mutex::new(None),
                tmp_seq: AtomicU64::new(0),
            }),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub fn current_path(&self, league: League, slot: &Slot) -> PathBuf {
        self.league_dir(league).join(format!("{}.json", slot.name()))
    }

    fn league_dir(&self, league: League) -> PathBuf {
        self.inner.data_dir.join(league.id())
    }

    fn key_lock(&self, league: League, name: &str) -> KeyLock {
        let mut locks = self
            .inner
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry((league, name.to_string()))
            .or_default()
            .clone()
    }

    /// Wall-clock now, never earlier than a stamp already handed out.
    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = self
            .inner
            .last_stamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Utc::now();
        let stamp = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// Forget the lock of a key nobody else is waiting on.
    fn release_key(&self, league: League, name: &str, lock: KeyLock) {
        let mut locks = self
            .inner
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Map entry plus ours: no other writer holds a clone.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&(league, name.to_string()));
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.inner
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Write `data` as the current record for `(league, slot)`, plus an
    /// archive copy when the slot is a base type. Returns the current path.
    pub fn write(&self, league: League, slot: &Slot, data: &Value) -> Result<PathBuf> {
        let name = slot.name();
        let dir = self.league_dir(league);
        std::fs::create_dir_all(&dir).map_err(|e| HarvestError::storage(&dir, e))?;

        let lock = self.key_lock(league, &name);
        let result = self.write_locked(league, slot, &name, &dir, &lock, data);
        self.release_key(league, &name, lock);
        result
    }

    /// [`SnapshotStore::write`] on the blocking pool, for async callers.
    pub async fn save(&self, league: League, slot: Slot, data: Value) -> Result<PathBuf> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write(league, &slot, &data)).await?
    }

    fn write_locked(
        &self,
        league: League,
        slot: &Slot,
        name: &str,
        dir: &Path,
        lock: &KeyLock,
        data: &Value,
    ) -> Result<PathBuf> {
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Stamp under the key lock: completion order == stamp order.
        let harvested_at = self.next_stamp();

        let snapshot = Snapshot {
            league,
            data_type: name.to_string(),
            harvested_at,
            data: data.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            name,
            std::process::id(),
            self.inner.tmp_seq.fetch_add(1, Ordering::Relaxed)
        ));
        let current = dir.join(format!("{name}.json"));

        let result = write_tmp(&tmp, &bytes)
            .and_then(|_| {
                if slot.is_archived() {
                    link_archive(&tmp, dir, name, harvested_at).map(|_| ())
                } else {
                    Ok(())
                }
            })
            .and_then(|_| {
                std::fs::rename(&tmp, &current).map_err(|e| HarvestError::storage(&current, e))
            });
        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        self.inner.mirror.upsert(&snapshot)?;
        debug!("Saved {}/{} ({} bytes)", league, name, bytes.len());
        Ok(current)
    }

    /// Read the current record for `(league, slot)`. A missing file is `None`.
    pub fn read(&self, league: League, slot: &Slot) -> Result<Option<Snapshot>> {
        let path = self.current_path(league, slot);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HarvestError::storage(&path, e)),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Payload of the current record, without the envelope.
    pub fn read_data(&self, league: League, slot: &Slot) -> Result<Option<Value>> {
        Ok(self.read(league, slot)?.map(|s| s.data))
    }

    /// Current record of one slot for every league that has it.
    pub fn read_all_leagues(&self, slot: &Slot) -> Vec<(League, Snapshot)> {
        League::ALL
            .iter()
            .filter_map(|&league| match self.read(league, slot) {
                Ok(found) => found.map(|s| (league, s)),
                Err(e) => {
                    warn!("Unreadable snapshot {}/{}: {}", league, slot, e);
                    None
                }
            })
            .collect()
    }

    /// Archive files for a base slot, oldest first.
    pub fn list_archives(&self, league: League, slot: &Slot) -> Result<Vec<PathBuf>> {
        let dir = self.league_dir(league);
        let prefix = format!("{}_", slot.name());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(HarvestError::storage(&dir, e)),
        };

        let mut archives: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix(&prefix))
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .map(is_archive_stamp)
                    .unwrap_or(false)
            })
            .collect();
        archives.sort();
        Ok(archives)
    }
}

fn write_tmp(tmp: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(tmp).map_err(|e| HarvestError::storage(tmp, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| HarvestError::storage(tmp, e))
}

/// Hard-link the finished temp file under a fresh archive name. Existing
/// archives are never replaced; a same-second clash gets a numeric suffix.
fn link_archive(
    tmp: &Path,
    dir: &Path,
    name: &str,
    harvested_at: DateTime<Utc>,
) -> Result<PathBuf> {
    let stamp = harvested_at.format("%Y%m%d_%H%M%S");
    let mut attempt = 0u32;
    loop {
        let file_name = if attempt == 0 {
            format!("{name}_{stamp}.json")
        } else {
            format!("{name}_{stamp}_{attempt}.json")
        };
        let archive = dir.join(file_name);
        match std::fs::hard_link(tmp, &archive) {
            Ok(()) => return Ok(archive),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(HarvestError::storage(&archive, e)),
        }
    }
}

/// `YYYYMMDD_HHMMSS` optionally followed by `_N`.
fn is_archive_stamp(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    if bytes.len() < 15 || bytes[8] != b'_' {
        return false;
    }
    let digits = |s: &[u8]| !s.is_empty() && s.iter().all(u8::is_ascii_digit);
    if !digits(&bytes[..8]) || !digits(&bytes[9..15]) {
        return false;
    }
    match &bytes[15..] {
        [] => true,
        [b'_', suffix @ ..] => digits(suffix),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::tempdir;

    fn store(dir: &Path) -> SnapshotStore {
        SnapshotStore::open(dir, Arc::new(NoMirror)).unwrap()
    }

    fn json_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".json"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_round_trip_preserves_payload() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let payload = json!({
            "events": [{"id": "401", "name": "Celtics at Knicks", "score": 1.5e-3}],
            "day": {"date": "2024-10-22"},
            "unicode": "Montréal Canadiens",
            "nested": {"empty": [], "null": null, "flag": true}
        });

        store.write(League::Nba, &Slot::Scoreboard, &payload).unwrap();
        let snap = store.read(League::Nba, &Slot::Scoreboard).unwrap().unwrap();

        assert_eq!(snap.data, payload);
        assert_eq!(snap.league, League::Nba);
        assert_eq!(snap.data_type, "scoreboard");
    }

    #[test]
    fn test_base_slot_writes_current_and_archive() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.write(League::Nhl, &Slot::Teams, &json!({"sports": []})).unwrap();

        let files = json_files(&dir.path().join("nhl"));
        assert_eq!(files.len(), 2, "files: {:?}", files);
        assert!(files.contains(&"teams.json".to_string()));
        assert_eq!(store.list_archives(League::Nhl, &Slot::Teams).unwrap().len(), 1);
    }

    #[test]
    fn test_parameterized_slots_are_not_archived() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let date = NaiveDate::from_ymd_opt(2024, 10, 19).unwrap();
        store
            .write(League::Nfl, &Slot::GameSummary("401671".into()), &json!({"boxscore": {}}))
            .unwrap();
        store
            .write(League::Nfl, &Slot::DatedScoreboard(date), &json!({"events": []}))
            .unwrap();

        let files = json_files(&dir.path().join("nfl"));
        assert_eq!(files, vec!["scoreboard_20241019.json", "summary_401671.json"]);
    }

    #[test]
    fn test_repeated_writes_keep_every_archive() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        for i in 0..3 {
            store.write(League::Mlb, &Slot::Standings, &json!({"v": i})).unwrap();
        }

        assert_eq!(store.list_archives(League::Mlb, &Slot::Standings).unwrap().len(), 3);
        let current = store.read_data(League::Mlb, &Slot::Standings).unwrap().unwrap();
        assert_eq!(current, json!({"v": 2}));
    }

    #[test]
    fn test_dated_scoreboard_is_not_listed_as_archive() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let date = NaiveDate::from_ymd_opt(2024, 10, 19).unwrap();
        store
            .write(League::Nba, &Slot::DatedScoreboard(date), &json!({"events": []}))
            .unwrap();
        assert!(store.list_archives(League::Nba, &Slot::Scoreboard).unwrap().is_empty());
    }

    #[test]
    fn test_harvested_at_is_monotonic_per_key() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut last = None;
        for i in 0..5 {
            store.write(League::Nba, &Slot::Schedule, &json!({"v": i})).unwrap();
            let at = store.read(League::Nba, &Slot::Schedule).unwrap().unwrap().harvested_at;
            if let Some(prev) = last {
                assert!(at >= prev);
            }
            last = Some(at);
        }
    }

    #[test]
    fn test_key_locks_are_released_after_writes() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        for day in 1..=20 {
            let date = NaiveDate::from_ymd_opt(2024, 10, day).unwrap();
            store
                .write(League::Nba, &Slot::DatedScoreboard(date), &json!({"d": day}))
                .unwrap();
        }
        store
            .write(League::Nhl, &Slot::GameSummary("401".into()), &json!({}))
            .unwrap();
        assert_eq!(store.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_save_writes_from_async_context() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let path = store
            .save(League::Mlb, Slot::Standings, json!({"al": []}))
            .await
            .unwrap();
        assert_eq!(path, store.current_path(League::Mlb, &Slot::Standings));
        assert_eq!(
            store.read_data(League::Mlb, &Slot::Standings).unwrap(),
            Some(json!({"al": []}))
        );
        assert_eq!(store.list_archives(League::Mlb, &Slot::Standings).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_snapshot_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.read(League::Nba, &Slot::Teams).unwrap().is_none());
        assert!(store.list_archives(League::Nba, &Slot::Teams).unwrap().is_empty());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.write(League::Nba, &Slot::News, &json!([])).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nba"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_concurrent_writers_never_tear_the_current_record() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let big: Vec<u32> = (0..2_000).collect();

        let handles: Vec<_> = (0..8)
            .map(|writer| {
                let store = store.clone();
                let big = big.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store
                            .write(League::Nfl, &Slot::Teams, &json!({"writer": writer, "rows": big}))
                            .unwrap();
                        // Every read must parse as a complete record.
                        let snap = store.read(League::Nfl, &Slot::Teams).unwrap().unwrap();
                        assert_eq!(snap.data["rows"].as_array().unwrap().len(), 2_000);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.list_archives(League::Nfl, &Slot::Teams).unwrap().len(), 80);
    }

    #[test]
    fn test_writes_are_mirrored_to_sqlite() {
        let dir = tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let store = SnapshotStore::open(dir.path(), Arc::new(db.clone())).unwrap();

        store.write(League::Nba, &Slot::Teams, &json!({"v": 1})).unwrap();
        store.write(League::Nba, &Slot::Teams, &json!({"v": 2})).unwrap();

        let (_, json) = db.get_harvest("nba", "teams").unwrap().unwrap();
        assert_eq!(json, r#"{"v":2}"#);
        assert_eq!(db.list_harvests().unwrap().len(), 1);
    }

    #[test]
    fn test_archive_stamp_pattern() {
        assert!(is_archive_stamp("20241019_101500"));
        assert!(is_archive_stamp("20241019_101500_2"));
        assert!(!is_archive_stamp("20241019"));
        assert!(!is_archive_stamp("20241019_1015"));
        assert!(!is_archive_stamp("20241019_101500_x"));
    }
}
