use crate::db::Database;
use crate::error::Result;

use super::Snapshot;

/// Optional secondary sink that receives every "current" snapshot write.
///
/// Only the current generation is mirrored; archive copies stay on disk.
pub trait SnapshotMirror: Send + Sync {
    fn upsert(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Mirror used when the structured mirror is disabled.
pub struct NoMirror;

impl SnapshotMirror for NoMirror {
    fn upsert(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }
}

impl SnapshotMirror for Database {
    fn upsert(&self, snapshot: &Snapshot) -> Result<()> {
        let data_json = serde_json::to_string(&snapshot.data)?;
        self.upsert_harvest(
            snapshot.league.id(),
            &snapshot.data_type,
            snapshot.harvested_at,
            &data_json,
        )
    }
}
