//! Wire protocol
//!
//! Tagged JSON messages exchanged over the WebSocket. Inbound actions each
//! receive a direct [`ServerMessage::Ack`]; room events arrive as
//! [`ServerMessage::Event`] envelopes.

use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;
use crate::events::{BroadcastEvent, RoomId};
use crate::registry::RegistryStats;
use crate::session::{CallId, CampaignId, LeadId, QueueId, TenantId, TransferKind};

/// Client -> server messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Dial {
        phone_number: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lead_id: Option<LeadId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        campaign_id: Option<CampaignId>,
    },
    #[serde(rename_all = "camelCase")]
    Answer { call_id: CallId },
    #[serde(rename_all = "camelCase")]
    Hold { call_id: CallId },
    #[serde(rename_all = "camelCase")]
    Unhold { call_id: CallId },
    #[serde(rename_all = "camelCase")]
    Mute { call_id: CallId, muted: bool },
    #[serde(rename_all = "camelCase")]
    Hangup { call_id: CallId },
    #[serde(rename_all = "camelCase")]
    Transfer {
        call_id: CallId,
        target: String,
        #[serde(rename = "type")]
        kind: TransferKind,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom { room: RoomRequest },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room: RoomRequest },
    GetStats,
}

/// Wire form of a room reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RoomRequest {
    Tenant(TenantId),
    Queue(QueueId),
    Campaign(CampaignId),
    Dashboard(TenantId),
}

impl From<RoomRequest> for RoomId {
    fn from(request: RoomRequest) -> Self {
        match request {
            RoomRequest::Tenant(id) => RoomId::Tenant(id),
            RoomRequest::Queue(id) => RoomId::Queue(id),
            RoomRequest::Campaign(id) => RoomId::Campaign(id),
            RoomRequest::Dashboard(id) => RoomId::Dashboard(id),
        }
    }
}

/// Server -> client messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Direct acknowledgement of an inbound action
    #[serde(rename_all = "camelCase")]
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<CallId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A room event this connection is subscribed to
    Event(BroadcastEvent),
    /// Registry statistics, in response to `get_stats`
    Stats { stats: RegistryStats },
}

impl ServerMessage {
    /// Successful ack, optionally carrying the call id of a dial
    pub fn ack_ok(call_id: Option<CallId>) -> Self {
        ServerMessage::Ack {
            success: true,
            call_id,
            error: None,
        }
    }

    /// Failure ack carrying the error text
    pub fn ack_err(error: &CoordinatorError) -> Self {
        ServerMessage::Ack {
            success: false,
            call_id: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_shape() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"dial","phoneNumber":"+15551234567","leadId":"lead-7"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Dial {
                phone_number: "+15551234567".to_string(),
                lead_id: Some(LeadId("lead-7".to_string())),
                campaign_id: None,
            }
        );

        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"transfer","callId":"c-1","target":"+15550000000","type":"blind"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Transfer {
                kind: TransferKind::Blind,
                ..
            }
        ));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"join_room","room":{"kind":"queue","id":"q-1"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room: RoomRequest::Queue(QueueId("q-1".to_string()))
            }
        );
    }

    #[test]
    fn test_ack_wire_shape() {
        let ack = ServerMessage::ack_ok(Some(CallId("c-1".to_string())));
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["success"], true);
        assert_eq!(json["callId"], "c-1");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_event_envelope_shape() {
        let msg = ServerMessage::Event(BroadcastEvent::CallRinging {
            call_id: CallId("c-1".to_string()),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"], "call:ringing");
        assert_eq!(json["data"]["callId"], "c-1");
    }
}
