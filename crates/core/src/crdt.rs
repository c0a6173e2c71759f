// crates/core/src/crdt.rs
//! Replication operations and the contiguous-run grouping used by the sync
//! debug view.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Logical timestamp of an operation.
pub type Timestamp = u64;

/// What an operation did to its record.
///
/// Wire form: `"c"` for create, `"d"` for delete and
/// `{"u": {"field": .., "value": ..}}` for an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub enum CrdtOperationData {
    #[serde(rename = "c")]
    Create,
    #[serde(rename = "d")]
    Delete,
    #[serde(rename = "u")]
    Update {
        field: String,
        #[serde(default)]
        value: Value,
    },
}

impl CrdtOperationData {
    /// Short human label, e.g. `Create` or `Update - name`.
    pub fn label(&self) -> String {
        match self {
            Self::Create => "Create".to_string(),
            Self::Delete => "Delete".to_string(),
            Self::Update { field, .. } => format!("Update - {field}"),
        }
    }
}

/// One replicated mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub struct CrdtOperation {
    pub model: String,
    pub record_id: Value,
    pub data: CrdtOperationData,
    pub timestamp: Timestamp,
}

impl CrdtOperation {
    /// `(model, record_id)` identity. The record id is rendered as JSON text
    /// so structured ids compare by value.
    pub fn record_key(&self) -> (String, String) {
        (self.model.clone(), self.record_id.to_string())
    }

    /// Identity used to recognise an operation that is already logged.
    pub fn dedup_key(&self) -> String {
        let data = serde_json::to_string(&self.data).unwrap_or_default();
        format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.model, self.record_id, self.timestamp, data
        )
    }
}

/// An operation submitted for appending; the log assigns `timestamp` when it
/// is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCrdtOperation {
    pub model: String,
    pub record_id: Value,
    pub data: CrdtOperationData,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl From<CrdtOperation> for NewCrdtOperation {
    fn from(op: CrdtOperation) -> Self {
        Self {
            model: op.model,
            record_id: op.record_id,
            data: op.data,
            timestamp: Some(op.timestamp),
        }
    }
}

/// A message inside a [`MessageGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub struct GroupedMessage {
    pub data: CrdtOperationData,
    pub timestamp: Timestamp,
}

/// A contiguous run of operations on the same `(model, record_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../src/types/generated/"))]
pub struct MessageGroup {
    pub model: String,
    /// Record id rendered as JSON text.
    pub id: String,
    pub messages: Vec<GroupedMessage>,
}

/// Split `operations` into contiguous runs sharing `(model, record_id)`.
///
/// This is a single linear scan in log order, not a group-by: the same key
/// separated by another key's operation starts a new group.
pub fn group_messages(operations: &[CrdtOperation]) -> Vec<MessageGroup> {
    let mut groups: Vec<MessageGroup> = Vec::new();

    for op in operations {
        let id = op.record_id.to_string();
        let message = GroupedMessage {
            data: op.data.clone(),
            timestamp: op.timestamp,
        };

        match groups.last_mut() {
            Some(latest) if latest.model == op.model && latest.id == id => {
                latest.messages.push(message);
            }
            _ => groups.push(MessageGroup {
                model: op.model.clone(),
                id,
                messages: vec![message],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(model: &str, id: Value, ts: Timestamp) -> CrdtOperation {
        CrdtOperation {
            model: model.to_string(),
            record_id: id,
            data: CrdtOperationData::Create,
            timestamp: ts,
        }
    }

    #[test]
    fn test_contiguous_runs_not_partition() {
        let ops = vec![
            op("A", json!(1), 1),
            op("A", json!(1), 2),
            op("B", json!(1), 3),
            op("A", json!(1), 4),
        ];
        let groups = group_messages(&ops);
        let sizes: Vec<usize> = groups.iter().map(|g| g.messages.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
        assert_eq!(groups[2].model, "A");
        assert_eq!(groups[2].messages[0].timestamp, 4);
    }

    #[test]
    fn test_same_model_different_record_splits() {
        let ops = vec![op("tag", json!("a"), 1), op("tag", json!("b"), 2)];
        let groups = group_messages(&ops);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "\"a\"");
    }

    #[test]
    fn test_structured_record_ids_compare_by_value() {
        let ops = vec![
            op("file_path", json!({"pub_id": [1, 2]}), 1),
            op("file_path", json!({"pub_id": [1, 2]}), 2),
        ];
        assert_eq!(group_messages(&ops).len(), 1);
    }

    #[test]
    fn test_empty_log() {
        assert!(group_messages(&[]).is_empty());
    }

    #[test]
    fn test_data_wire_format() {
        assert_eq!(serde_json::to_value(CrdtOperationData::Create).unwrap(), json!("c"));
        assert_eq!(serde_json::to_value(CrdtOperationData::Delete).unwrap(), json!("d"));

        let update: CrdtOperationData =
            serde_json::from_value(json!({"u": {"field": "name", "value": "x"}})).unwrap();
        match &update {
            CrdtOperationData::Update { field, value } => {
                assert_eq!(field, "name");
                assert_eq!(value, &json!("x"));
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(update.label(), "Update - name");
    }

    #[test]
    fn test_dedup_key_covers_data() {
        let a = op("A", json!(1), 7);
        let mut b = a.clone();
        assert_eq!(a.dedup_key(), b.dedup_key());
        b.data = CrdtOperationData::Delete;
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
