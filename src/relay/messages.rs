//! Relay wire messages.
//!
//! JSON objects discriminated by `type`. The relay forwards `payload` objects
//! opaquely; on our side they are decoded into [`NodePayload`] so unknown
//! payload kinds fail at the boundary instead of deep in a handler.

use crate::clock::Millis;
use crate::registration::{RegistrationBlock, RegistrationStatus};
use serde::{Deserialize, Serialize};

/// Entry in a relay peer roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub node_id: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_height: Option<u64>,
}

/// Peer-to-peer payload carried inside `broadcast`, `relayMessage` and
/// `nodeMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodePayload {
    ChatMessage {
        from: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        timestamp: Millis,
    },
    ActionMessage {
        from: String,
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        timestamp: Millis,
    },
    BlockchainPing {
        from: String,
        ping_id: String,
        timestamp: Millis,
    },
    BlockchainPong {
        from: String,
        ping_id: String,
        original_timestamp: Millis,
        timestamp: Millis,
    },
}

impl NodePayload {
    /// Whether this payload is user-authored content subject to timeouts.
    pub fn is_user_content(&self) -> bool {
        matches!(
            self,
            NodePayload::ChatMessage { .. } | NodePayload::ActionMessage { .. }
        )
    }
}

/// Every message exchanged with the relay, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum RelayMessage {
    #[serde(rename = "register")]
    Register {
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default)]
        port: u16,
        #[serde(default)]
        blockchain_height: u64,
    },

    #[serde(rename = "registered")]
    Registered {
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assigned_ip: Option<String>,
        #[serde(default)]
        timestamp: Option<Millis>,
    },

    #[serde(rename = "getPeers")]
    GetPeers,

    #[serde(rename = "peerList")]
    PeerList { peers: Vec<PeerInfo> },

    #[serde(rename = "peerListUpdate")]
    PeerListUpdate { peers: Vec<PeerInfo> },

    #[serde(rename = "broadcast")]
    Broadcast { payload: NodePayload },

    #[serde(rename = "nodeMessage")]
    NodeMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_node_id: Option<String>,
        payload: NodePayload,
        #[serde(default)]
        broadcast: bool,
        #[serde(default)]
        timestamp: Option<Millis>,
    },

    #[serde(rename = "relayMessage")]
    RelayMessage {
        target_node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_address: Option<String>,
        payload: NodePayload,
    },

    #[serde(rename = "relaySuccess")]
    RelaySuccess {
        #[serde(default)]
        bridged: bool,
        #[serde(default)]
        timestamp: Option<Millis>,
    },

    #[serde(rename = "relayFailed")]
    RelayFailed { reason: String },

    #[serde(rename = "registration_submit")]
    RegistrationSubmit { payload: Box<RegistrationBlock> },

    #[serde(rename = "registration_received")]
    RegistrationReceived {
        #[serde(default)]
        block_id: Option<String>,
    },

    #[serde(rename = "registration_queued")]
    RegistrationQueued {
        #[serde(default)]
        block_id: Option<String>,
    },

    #[serde(rename = "registration_error")]
    RegistrationError {
        #[serde(default)]
        error: Option<String>,
    },

    /// Admin decision pushed to the registering peer.
    #[serde(rename = "registration_status")]
    RegistrationStatus {
        block_id: String,
        status: RegistrationStatus,
        #[serde(default)]
        updated_by: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl RelayMessage {
    /// Wire discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::Register { .. } => "register",
            RelayMessage::Registered { .. } => "registered",
            RelayMessage::GetPeers => "getPeers",
            RelayMessage::PeerList { .. } => "peerList",
            RelayMessage::PeerListUpdate { .. } => "peerListUpdate",
            RelayMessage::Broadcast { .. } => "broadcast",
            RelayMessage::NodeMessage { .. } => "nodeMessage",
            RelayMessage::RelayMessage { .. } => "relayMessage",
            RelayMessage::RelaySuccess { .. } => "relaySuccess",
            RelayMessage::RelayFailed { .. } => "relayFailed",
            RelayMessage::RegistrationSubmit { .. } => "registration_submit",
            RelayMessage::RegistrationReceived { .. } => "registration_received",
            RelayMessage::RegistrationQueued { .. } => "registration_queued",
            RelayMessage::RegistrationError { .. } => "registration_error",
            RelayMessage::RegistrationStatus { .. } => "registration_status",
            RelayMessage::Error { .. } => "error",
        }
    }

    /// Outbound messages that deliver a payload to other peers.
    pub fn outbound_payload(&self) -> Option<&NodePayload> {
        match self {
            RelayMessage::Broadcast { payload } | RelayMessage::RelayMessage { payload, .. } => {
                Some(payload)
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_relay_broadcast_of_chat() {
        let raw = json!({
            "type": "nodeMessage",
            "from": "Ranger-M3",
            "fromNodeId": "node_7",
            "payload": {
                "type": "chatMessage",
                "from": "Ranger-M3",
                "message": "hello rangers",
                "timestamp": 1700000000000u64
            },
            "broadcast": true,
            "timestamp": 1700000000001u64
        });

        let msg: RelayMessage = serde_json::from_value(raw).unwrap();
        match msg {
            RelayMessage::NodeMessage {
                from_node_id,
                payload: NodePayload::ChatMessage { message, .. },
                broadcast,
                ..
            } => {
                assert_eq!(from_node_id.as_deref(), Some("node_7"));
                assert_eq!(message, "hello rangers");
                assert!(broadcast);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_encode_ping_relay_message() {
        let msg = RelayMessage::RelayMessage {
            target_node_id: "node_2".to_string(),
            target_address: None,
            payload: NodePayload::BlockchainPing {
                from: "node_1".to_string(),
                ping_id: "ping-1".to_string(),
                timestamp: 5,
            },
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "relayMessage");
        assert_eq!(value["targetNodeId"], "node_2");
        assert_eq!(value["payload"]["type"], "blockchainPing");
        assert_eq!(value["payload"]["pingId"], "ping-1");
        assert!(value.get("targetAddress").is_none());
    }

    #[test]
    fn test_decode_control_messages() {
        let peers = RelayMessage::from_json(
            r#"{"type":"peerList","peers":[{"nodeId":"n1","address":"A","ip":"10.0.0.1"}],"count":1}"#,
        )
        .unwrap();
        assert!(matches!(peers, RelayMessage::PeerList { ref peers } if peers[0].node_id == "n1"));

        let failed = RelayMessage::from_json(r#"{"type":"relayFailed","reason":"Target not found"}"#)
            .unwrap();
        assert_eq!(
            failed,
            RelayMessage::RelayFailed {
                reason: "Target not found".to_string()
            }
        );

        let queued = RelayMessage::from_json(r#"{"type":"registration_queued"}"#).unwrap();
        assert_eq!(queued.kind(), "registration_queued");

        assert_eq!(
            RelayMessage::from_json(r#"{"type":"getPeers"}"#).unwrap(),
            RelayMessage::GetPeers
        );
    }

    #[test]
    fn test_registration_status_message() {
        let msg = RelayMessage::from_json(
            r#"{"type":"registration_status","blockId":"reg_01","status":"approved","updatedBy":"rb_admin"}"#,
        )
        .unwrap();

        assert_eq!(
            msg,
            RelayMessage::RegistrationStatus {
                block_id: "reg_01".to_string(),
                status: RegistrationStatus::Approved,
                updated_by: Some("rb_admin".to_string()),
                reason: None,
            }
        );
    }

    #[test]
    fn test_unknown_payload_type_is_rejected() {
        let raw = r#"{"type":"broadcast","payload":{"type":"mysteryMessage","from":"x"}}"#;
        assert!(RelayMessage::from_json(raw).is_err());
        assert!(RelayMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_outbound_payload_classification() {
        let chat = NodePayload::ChatMessage {
            from: "a".to_string(),
            message: "hi".to_string(),
            nickname: None,
            channel: None,
            timestamp: 0,
        };
        let broadcast = RelayMessage::Broadcast {
            payload: chat.clone(),
        };

        assert_eq!(broadcast.outbound_payload(), Some(&chat));
        assert!(chat.is_user_content());
        assert!(RelayMessage::GetPeers.outbound_payload().is_none());
    }
}
