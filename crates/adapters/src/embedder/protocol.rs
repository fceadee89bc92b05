// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker wire protocol: line-delimited JSON over stdin/stdout.
//!
//! Requests carry a correlation id; responses echo it with either a
//! payload or an error. The worker's internal threading is opaque — the
//! daemon only assumes responses eventually arrive, in any order.

use fidx_core::ModelId;
use serde::{Deserialize, Serialize};

/// Request body sent to a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    LoadModel { model_id: ModelId },
    Embed { texts: Vec<String> },
    Health {},
    Shutdown {},
}

/// One request line: correlation id plus body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    pub id: String,
    #[serde(flatten)]
    pub body: WorkerRequest,
}

/// Error payload reported by a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerWireError {
    pub kind: String,
    pub message: String,
}

/// One response line from a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkerWireError>,
}

/// Payload of a successful `load_model`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadModelPayload {
    pub dimensions: usize,
}

/// Payload of a successful `embed`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedPayload {
    pub vectors: Vec<Vec<f32>>,
}
