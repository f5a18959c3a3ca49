//! Wire messages of the synchronization channel.
//!
//! Transport-agnostic JSON envelopes; binary bodies (deltas, snapshots) ride
//! as base64 strings so any text transport can carry them. Acks mirror the
//! channel contract: `{ok, permission}` on success, `{error}` with a stable
//! code otherwise.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use gridsync_core::{CellRef, Permission, SheetId, UserId};

use crate::error::SyncError;

/// Binary payload, base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Blob)
            .map_err(|e| D::Error::custom(format!("invalid base64: {e}")))
    }
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Join { sheet_id: SheetId },
    Edit { delta: Blob },
    Presence { cell: Option<CellRef> },
}

impl ClientMessage {
    pub fn from_json(raw: &str) -> Result<Self, SyncError> {
        serde_json::from_str(raw).map_err(|e| SyncError::InvalidPayload(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::InvalidPayload(e.to_string()))
    }
}

/// Server → client. Delivered through each connection's mailbox; per
/// document, every peer sees edit broadcasts in the order the handler
/// accepted them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full state to initialize a fresh replica from.
    Snapshot { sheet_id: SheetId, state: Blob },
    /// A peer's delta, forwarded verbatim.
    EditBroadcast { sheet_id: SheetId, delta: Blob },
    PresenceJoin {
        user_id: UserId,
        display_name: String,
        cell: Option<CellRef>,
    },
    PresenceLeave {
        user_id: UserId,
        display_name: String,
    },
    PresenceUpdate {
        user_id: UserId,
        display_name: String,
        cell: Option<CellRef>,
    },
}

/// Successful join: the permission the caller holds right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    pub permission: Permission,
}

/// Per-request acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub permission: Option<Permission>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            ok: true,
            permission: None,
            error: None,
        }
    }

    pub fn joined(ack: JoinAck) -> Self {
        Self {
            ok: true,
            permission: Some(ack.permission),
            error: None,
        }
    }

    pub fn error(err: &SyncError) -> Self {
        Self {
            ok: false,
            permission: None,
            error: Some(err.code().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrips_through_base64() {
        let blob = Blob::new(vec![0, 1, 2, 0xff, 0x80]);
        let json = serde_json::to_string(&blob).unwrap();
        assert!(json.starts_with('"'));
        let back: Blob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blob);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let result: Result<Blob, _> = serde_json::from_str("\"not base64!!\"");
        assert!(result.is_err());
    }

    #[test]
    fn client_messages_are_tagged() {
        let msg = ClientMessage::Join {
            sheet_id: SheetId::new(7),
        };
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"type":"join","sheet_id":7}"#);
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);

        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"join","sheet_id":"abc"}"#),
            Err(SyncError::InvalidPayload(_))
        ));
    }

    #[test]
    fn server_messages_roundtrip() {
        let messages = vec![
            ServerMessage::Snapshot {
                sheet_id: SheetId::new(1),
                state: Blob::new(vec![1, 2, 3]),
            },
            ServerMessage::EditBroadcast {
                sheet_id: SheetId::new(1),
                delta: Blob::new(vec![9]),
            },
            ServerMessage::PresenceJoin {
                user_id: UserId::new(2),
                display_name: "bob".into(),
                cell: Some(CellRef::new(0, 0)),
            },
            ServerMessage::PresenceLeave {
                user_id: UserId::new(2),
                display_name: "bob".into(),
            },
        ];
        for msg in messages {
            let json = serde_json::to_string(&msg).unwrap();
            let back: ServerMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn ack_shapes() {
        let ok = serde_json::to_string(&Ack::joined(JoinAck {
            permission: Permission::Edit,
        }))
        .unwrap();
        assert_eq!(ok, r#"{"ok":true,"permission":"edit"}"#);

        let err = serde_json::to_string(&Ack::error(&SyncError::PermissionDenied)).unwrap();
        assert_eq!(err, r#"{"ok":false,"error":"permission-denied"}"#);
    }
}
