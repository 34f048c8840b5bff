//! Event Broadcaster
//!
//! Room-scoped fan-out of call and agent state changes using
//! `tokio::sync::broadcast`, one channel per room. Publishing is
//! fire-and-forget: a room with no subscribers drops the event, and a lagged
//! subscriber drops the oldest events per broadcast-channel semantics.
//! Direct acknowledgements to the initiating connection do not go through
//! here; they are the return value of the control action itself.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::{
    AgentId, AgentState, CallDirection, CallId, CampaignId, QueueId, TenantId,
};

/// A named broadcast scope
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RoomId {
    /// Every connection of a tenant; joined automatically on connect
    Tenant(TenantId),
    /// Watchers of one queue
    Queue(QueueId),
    /// Watchers of one campaign
    Campaign(CampaignId),
    /// Aggregate dashboards of a tenant
    Dashboard(TenantId),
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomId::Tenant(id) => write!(f, "tenant:{}", id),
            RoomId::Queue(id) => write!(f, "queue:{}", id),
            RoomId::Campaign(id) => write!(f, "campaign:{}", id),
            RoomId::Dashboard(id) => write!(f, "dashboard:{}", id),
        }
    }
}

/// Events fanned out to subscribed rooms
///
/// Per-call ordering matches mutation commit order because the control
/// handler publishes synchronously after each registry mutation returns; no
/// ordering holds across different calls or tenants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum BroadcastEvent {
    #[serde(rename = "call:started")]
    #[serde(rename_all = "camelCase")]
    CallStarted {
        call_id: CallId,
        tenant_id: TenantId,
        agent_id: AgentId,
        phone_number: String,
        direction: CallDirection,
        #[serde(skip_serializing_if = "Option::is_none")]
        queue_id: Option<QueueId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        campaign_id: Option<CampaignId>,
    },

    #[serde(rename = "call:ringing")]
    #[serde(rename_all = "camelCase")]
    CallRinging { call_id: CallId },

    #[serde(rename = "call:answered")]
    #[serde(rename_all = "camelCase")]
    CallAnswered { call_id: CallId, agent_id: AgentId },

    #[serde(rename = "call:held")]
    #[serde(rename_all = "camelCase")]
    CallHeld { call_id: CallId, is_on_hold: bool },

    #[serde(rename = "call:ended")]
    #[serde(rename_all = "camelCase")]
    CallEnded {
        call_id: CallId,
        agent_id: AgentId,
        duration: i64,
    },

    #[serde(rename = "call:transferred")]
    #[serde(rename_all = "camelCase")]
    CallTransferred { call_id: CallId, target: String },

    #[serde(rename = "agent:state-changed")]
    #[serde(rename_all = "camelCase")]
    AgentStateChanged {
        agent_id: AgentId,
        previous_state: AgentState,
        new_state: AgentState,
    },

    #[serde(rename = "agent:logout")]
    #[serde(rename_all = "camelCase")]
    AgentLogout { agent_id: AgentId },
}

/// Delivers state-change notifications to scoped subscriber groups
#[derive(Debug)]
pub struct EventBroadcaster {
    rooms: DashMap<RoomId, broadcast::Sender<BroadcastEvent>>,
    capacity: usize,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given per-room channel capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to a room, creating it on first use
    pub fn subscribe(&self, room: RoomId) -> broadcast::Receiver<BroadcastEvent> {
        self.rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish an event to a room, returning how many subscribers received it
    ///
    /// A room nobody has joined, or whose last subscriber left, swallows the
    /// event; delivery to disconnected subscribers is simply dropped.
    pub fn publish(&self, room: &RoomId, event: BroadcastEvent) -> usize {
        match self.rooms.get(room) {
            Some(tx) => {
                let delivered = tx.send(event).unwrap_or(0);
                tracing::trace!("Published to {}: {} subscriber(s)", room, delivered);
                delivered
            }
            None => 0,
        }
    }

    /// Current subscriber count of a room
    pub fn subscriber_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map(|tx| tx.receiver_count()).unwrap_or(0)
    }
}
