/// Wire messages between sync clients and the document server.
/// The model is snapshot-based: the server pushes the full latest value of
/// a document on every change, including back to the writer.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trip::Identity;

use crate::{DocumentSnapshot, QuerySpec};

/// Messages sent by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "hello")]
    Hello { identity: Option<Identity> },

    #[serde(rename = "subscribe_doc")]
    SubscribeDoc { path: String },

    #[serde(rename = "unsubscribe_doc")]
    UnsubscribeDoc { path: String },

    #[serde(rename = "subscribe_query")]
    SubscribeQuery { query: QuerySpec },

    #[serde(rename = "unsubscribe_query")]
    UnsubscribeQuery { collection: String },

    #[serde(rename = "write_doc")]
    WriteDoc {
        path: String,
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_revision: Option<u64>,
    },

    #[serde(rename = "delete_doc")]
    DeleteDoc { path: String },

    #[serde(rename = "append")]
    Append { collection: String, payload: Value },

    #[serde(rename = "ping")]
    Ping,
}

/// Messages pushed by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "snapshot")]
    Snapshot { snapshot: DocumentSnapshot },

    #[serde(rename = "query_snapshot")]
    QuerySnapshot {
        collection: String,
        docs: Vec<DocumentSnapshot>,
    },

    #[serde(rename = "ack")]
    Ack { path: String, revision: u64 },

    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },

    #[serde(rename = "pong")]
    Pong,
}

/// Stable error codes clients can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    NotFound,
    PermissionDenied,
    Conflict,
    InvalidPayload,
    Internal,
}

impl From<&crate::StoreError> for ErrorCode {
    fn from(err: &crate::StoreError) -> Self {
        match err {
            crate::StoreError::NotFound(_) => ErrorCode::NotFound,
            crate::StoreError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            crate::StoreError::Conflict { .. } => ErrorCode::Conflict,
            crate::StoreError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            crate::StoreError::Unavailable(_) => ErrorCode::Internal,
        }
    }
}
