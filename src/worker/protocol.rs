// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Messages exchanged with the background analytics thread

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::tracking::AnalysisInput;

/// Request posted to the worker, correlated by `cache_key`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub cache_key: String,
    pub payload: WorkerPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPayload {
    pub inputs: AnalysisInput,
    pub config: Config,
}

/// Reply from the worker.
///
/// Progress carries nothing the coordinator relies on. Complete carries the
/// loosely shaped result payload, normalized on receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Progress {
        #[serde(default, rename = "cacheKey", skip_serializing_if = "Option::is_none")]
        cache_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
    Complete {
        #[serde(rename = "cacheKey")]
        cache_key: String,
        payload: Value,
    },
    Error {
        #[serde(rename = "cacheKey")]
        cache_key: String,
        error: String,
    },
}

impl WorkerMessage {
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            WorkerMessage::Progress { cache_key, .. } => cache_key.as_deref(),
            WorkerMessage::Complete { cache_key, .. } | WorkerMessage::Error { cache_key, .. } => Some(cache_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_progress_is_accepted() {
        let msg: WorkerMessage = serde_json::from_value(json!({"type": "progress"})).unwrap();
        assert_eq!(
            msg,
            WorkerMessage::Progress {
                cache_key: None,
                stage: None
            }
        );
        assert_eq!(msg.cache_key(), None);
    }

    #[test]
    fn test_complete_wire_shape() {
        let msg = WorkerMessage::Complete {
            cache_key: "analytics:s1:ab".into(),
            payload: json!({"patterns": []}),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["cacheKey"], "analytics:s1:ab");
        assert_eq!(msg.cache_key(), Some("analytics:s1:ab"));
    }
}
