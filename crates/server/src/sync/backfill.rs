// crates/server/src/sync/backfill.rs
//! Where backfilled operations come from.

use std::path::PathBuf;

use async_trait::async_trait;
use jobdeck_core::{CrdtOperation, SyncError, SyncResult};

/// Source of historical operations replayed into the log by a backfill.
#[async_trait]
pub trait BackfillSource: Send + Sync {
    async fn load(&self) -> SyncResult<Vec<CrdtOperation>>;

    /// Short description used in logs.
    fn describe(&self) -> String;
}

/// A fixed set of operations held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    operations: Vec<CrdtOperation>,
}

impl MemorySource {
    pub fn new(operations: Vec<CrdtOperation>) -> Self {
        Self { operations }
    }
}

#[async_trait]
impl BackfillSource for MemorySource {
    async fn load(&self) -> SyncResult<Vec<CrdtOperation>> {
        Ok(self.operations.clone())
    }

    fn describe(&self) -> String {
        format!("memory ({} operations)", self.operations.len())
    }
}

/// A JSON array of operations on disk, re-read on every backfill.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BackfillSource for JsonFileSource {
    async fn load(&self) -> SyncResult<Vec<CrdtOperation>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SyncError::Unavailable(format!("backfill file {} not found", self.path.display()))
            } else {
                SyncError::Internal(format!("reading {}: {e}", self.path.display()))
            }
        })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Internal(format!("parsing {}: {e}", self.path.display())))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobdeck_core::CrdtOperationData;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_file_source_reads_wire_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ops.json");
        std::fs::write(
            &path,
            r#"[
                {"model":"tag","record_id":1,"data":"c","timestamp":10},
                {"model":"tag","record_id":1,"data":{"u":{"field":"name","value":"x"}},"timestamp":11}
            ]"#,
        )
        .unwrap();

        let ops = JsonFileSource::new(&path).load().await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].data, CrdtOperationData::Create);
        assert_eq!(
            ops[1].data,
            CrdtOperationData::Update {
                field: "name".into(),
                value: json!("x")
            }
        );
    }

    #[tokio::test]
    async fn test_json_file_source_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = JsonFileSource::new(dir.path().join("nope.json"))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_json_file_source_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonFileSource::new(&path).load().await.unwrap_err();
        assert!(matches!(err, SyncError::Internal(_)));
    }
}
