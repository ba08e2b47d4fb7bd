/**
 * Wire Protocol
 *
 * JSON messages exchanged over the WebSocket, one message per text frame.
 * Every message carries an action tag `a`. Document addresses use `c`
 * (collection) and `d` (id); versions use `v`.
 *
 * # Client Requests
 *
 * - `fetch` - read a snapshot (optionally at a past version)
 * - `subscribe` - read a snapshot and receive every later committed op
 * - `unsubscribe` - stop receiving ops
 * - `op` - submit a create, edit or delete against base version `v`
 *
 * # Server Messages
 *
 * - `init` - first message on a connection; carries the client id used as `src`
 * - `fetch` / `subscribe` / `unsubscribe` - replies
 * - `ack` - the client's op committed at version `v`
 * - `op` - an op committed by someone else
 * - `error` - a request failed; `code` follows the backend error codes
 */

use serde::{Deserialize, Serialize};

use crate::shared::document::{RawOp, Snapshot};

/// Protocol revision announced in `init`
pub const PROTOCOL_VERSION: u32 = 1;

/// Request sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "a", rename_all = "snake_case")]
pub enum ClientRequest {
    Fetch {
        c: String,
        d: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        v: Option<u64>,
    },
    Subscribe {
        c: String,
        d: String,
    },
    Unsubscribe {
        c: String,
        d: String,
    },
    Op {
        c: String,
        d: String,
        v: u64,
        seq: u64,
        #[serde(flatten)]
        body: RawOp,
    },
}

impl ClientRequest {
    pub fn collection(&self) -> &str {
        match self {
            ClientRequest::Fetch { c, .. }
            | ClientRequest::Subscribe { c, .. }
            | ClientRequest::Unsubscribe { c, .. }
            | ClientRequest::Op { c, .. } => c,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ClientRequest::Fetch { d, .. }
            | ClientRequest::Subscribe { d, .. }
            | ClientRequest::Unsubscribe { d, .. }
            | ClientRequest::Op { d, .. } => d,
        }
    }

    pub fn seq(&self) -> Option<u64> {
        match self {
            ClientRequest::Op { seq, .. } => Some(*seq),
            _ => None,
        }
    }
}

/// `{ code, message }` error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: u16,
    pub message: String,
}

/// Message sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "a", rename_all = "snake_case")]
pub enum ServerMessage {
    Init {
        protocol: u32,
        id: String,
    },
    Fetch {
        c: String,
        d: String,
        data: Snapshot,
    },
    Subscribe {
        c: String,
        d: String,
        data: Snapshot,
    },
    Unsubscribe {
        c: String,
        d: String,
    },
    Ack {
        c: String,
        d: String,
        /// Version the op was committed at
        v: u64,
        seq: u64,
    },
    Op {
        c: String,
        d: String,
        v: u64,
        src: String,
        seq: u64,
        #[serde(flatten)]
        body: RawOp,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        c: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        d: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        error: ErrorObject,
    },
}

impl ServerMessage {
    pub fn error(request: Option<&ClientRequest>, code: u16, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            c: request.map(|r| r.collection().to_string()),
            d: request.map(|r| r.id().to_string()),
            seq: request.and_then(ClientRequest::seq),
            error: ErrorObject {
                code,
                message: message.into(),
            },
        }
    }
}
