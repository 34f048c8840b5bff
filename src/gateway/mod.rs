//! Connection Gateway
//!
//! Authenticates incoming WebSocket connections, attaches their identity,
//! manages room membership, and routes inbound action messages to the call
//! control handler. The message dispatch itself is transport-independent:
//! [`ConnectionGateway::handle_message`] takes a decoded [`ClientMessage`]
//! and returns the direct acknowledgement, so the WebSocket loop is a thin
//! adapter around it.

pub mod auth;
pub mod protocol;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::control::{CallControlHandler, DialRequest};
use crate::error::{CoordinatorError, Result};
use crate::events::{BroadcastEvent, EventBroadcaster, RoomId};
use crate::registry::SessionRegistry;
use crate::session::CallDirection;

pub use auth::{ConnectionIdentity, Role, StaticTokenVerifier, TokenVerifier};
pub use protocol::{ClientMessage, RoomRequest, ServerMessage};

/// Per-connection state: identity, room memberships, and the outbound queue
pub struct ConnectionContext {
    pub identity: ConnectionIdentity,
    outbound: mpsc::Sender<ServerMessage>,
    rooms: HashMap<RoomId, JoinHandle<()>>,
}

impl ConnectionContext {
    pub fn new(identity: ConnectionIdentity, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            identity,
            outbound,
            rooms: HashMap::new(),
        }
    }

    /// Join a room: one forwarding task per membership pumps room events
    /// into this connection's outbound queue
    pub fn join(&mut self, room: RoomId, broadcaster: &EventBroadcaster) {
        if self.rooms.contains_key(&room) {
            return;
        }

        let mut rx = broadcaster.subscribe(room.clone());
        let tx = self.outbound.clone();
        let room_name = room.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(ServerMessage::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Subscriber of {} lagged, dropped {} events", room_name, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        tracing::debug!("Connection joined {}", room);
        self.rooms.insert(room, handle);
    }

    /// Leave a room, stopping its forwarding task
    pub fn leave(&mut self, room: &RoomId) {
        if let Some(handle) = self.rooms.remove(room) {
            handle.abort();
            tracing::debug!("Connection left {}", room);
        }
    }

    /// Tear down all memberships and announce agent logout if applicable
    ///
    /// Active sessions are deliberately NOT swept here; the reaper is the
    /// single reclamation path for sessions orphaned by a disconnect.
    pub fn close(&mut self, broadcaster: &EventBroadcaster) {
        for (_, handle) in self.rooms.drain() {
            handle.abort();
        }

        if let Some(agent_id) = &self.identity.agent_id {
            let event = BroadcastEvent::AgentLogout {
                agent_id: agent_id.clone(),
            };
            broadcaster.publish(&RoomId::Tenant(self.identity.tenant_id.clone()), event.clone());
            broadcaster.publish(&RoomId::Dashboard(self.identity.tenant_id.clone()), event);
            tracing::info!("Agent {} disconnected", agent_id);
        }
    }
}

/// Routes authenticated connections to the control handler and rooms
pub struct ConnectionGateway {
    control: Arc<CallControlHandler>,
    broadcaster: Arc<EventBroadcaster>,
    registry: Arc<SessionRegistry>,
    verifier: Arc<dyn TokenVerifier>,
    outbound_queue_depth: usize,
}

impl ConnectionGateway {
    pub fn new(
        control: Arc<CallControlHandler>,
        broadcaster: Arc<EventBroadcaster>,
        registry: Arc<SessionRegistry>,
        verifier: Arc<dyn TokenVerifier>,
        outbound_queue_depth: usize,
    ) -> Self {
        Self {
            control,
            broadcaster,
            registry,
            verifier,
            outbound_queue_depth,
        }
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Handle one decoded client message and produce its acknowledgement
    pub async fn handle_message(
        &self,
        ctx: &mut ConnectionContext,
        msg: ClientMessage,
    ) -> ServerMessage {
        match msg {
            ClientMessage::Dial {
                phone_number,
                lead_id,
                campaign_id,
            } => {
                let request = DialRequest {
                    phone_number,
                    lead_id,
                    campaign_id,
                    queue_id: None,
                    direction: CallDirection::Outbound,
                };
                match self.as_agent(ctx) {
                    Ok(agent) => match self.control.dial(&agent, request).await {
                        Ok(call_id) => ServerMessage::ack_ok(Some(call_id)),
                        Err(e) => ServerMessage::ack_err(&e),
                    },
                    Err(e) => ServerMessage::ack_err(&e),
                }
            }

            ClientMessage::Answer { call_id } => {
                self.run_action(ctx, |agent, control| async move {
                    control.answer(&agent, &call_id).await
                })
                .await
            }

            ClientMessage::Hold { call_id } => {
                self.run_action(ctx, |agent, control| async move {
                    control.hold(&agent, &call_id).await
                })
                .await
            }

            ClientMessage::Unhold { call_id } => {
                self.run_action(ctx, |agent, control| async move {
                    control.unhold(&agent, &call_id).await
                })
                .await
            }

            ClientMessage::Mute { call_id, muted } => {
                self.run_action(ctx, |agent, control| async move {
                    control.set_mute(&agent, &call_id, muted).await
                })
                .await
            }

            ClientMessage::Hangup { call_id } => {
                self.run_action(ctx, |agent, control| async move {
                    control.hangup(&agent, &call_id).await
                })
                .await
            }

            ClientMessage::Transfer {
                call_id,
                target,
                kind,
            } => {
                self.run_action(ctx, |agent, control| async move {
                    control.transfer(&agent, &call_id, &target, kind).await
                })
                .await
            }

            ClientMessage::JoinRoom { room } => match self.authorize_room(ctx, room) {
                Ok(room_id) => {
                    ctx.join(room_id, &self.broadcaster);
                    ServerMessage::ack_ok(None)
                }
                Err(e) => ServerMessage::ack_err(&e),
            },

            ClientMessage::LeaveRoom { room } => {
                ctx.leave(&RoomId::from(room));
                ServerMessage::ack_ok(None)
            }

            ClientMessage::GetStats => ServerMessage::Stats {
                stats: self.registry.stats().await,
            },
        }
    }

    fn as_agent(&self, ctx: &ConnectionContext) -> Result<crate::session::AgentIdentity> {
        ctx.identity.agent_identity()
    }

    async fn run_action<F, Fut>(&self, ctx: &ConnectionContext, action: F) -> ServerMessage
    where
        F: FnOnce(crate::session::AgentIdentity, Arc<CallControlHandler>) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        match self.as_agent(ctx) {
            Ok(agent) => match action(agent, self.control.clone()).await {
                Ok(()) => ServerMessage::ack_ok(None),
                Err(e) => ServerMessage::ack_err(&e),
            },
            Err(e) => ServerMessage::ack_err(&e),
        }
    }

    /// Tenant and dashboard rooms are restricted to the connection's own
    /// tenant; queue and campaign rooms are open within the deployment.
    fn authorize_room(&self, ctx: &ConnectionContext, room: RoomRequest) -> Result<RoomId> {
        match &room {
            RoomRequest::Tenant(tenant_id) | RoomRequest::Dashboard(tenant_id) => {
                if *tenant_id != ctx.identity.tenant_id {
                    return Err(CoordinatorError::forbidden("room belongs to another tenant"));
                }
            }
            RoomRequest::Queue(_) | RoomRequest::Campaign(_) => {}
        }
        Ok(RoomId::from(room))
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthParams {
    pub token: String,
}

/// WebSocket upgrade handler
///
/// Token verification happens before the upgrade; a bad token never gets a
/// socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<AuthParams>,
    State(gateway): State<Arc<ConnectionGateway>>,
) -> Response {
    match gateway.verifier.verify(&params.token).await {
        Ok(identity) => {
            ws.on_upgrade(move |socket| handle_socket(socket, gateway, identity))
        }
        Err(e) => {
            tracing::warn!("Rejected connection: {}", e);
            (StatusCode::UNAUTHORIZED, e.to_string()).into_response()
        }
    }
}

/// Drive one accepted connection until it closes
async fn handle_socket(
    socket: WebSocket,
    gateway: Arc<ConnectionGateway>,
    identity: ConnectionIdentity,
) {
    tracing::info!(
        "Connection accepted: user {} on tenant {}",
        identity.user_id,
        identity.tenant_id
    );

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) =
        mpsc::channel::<ServerMessage>(gateway.outbound_queue_depth);

    // One pump serializes everything this connection receives: acks and
    // room events share the channel, so per-call ordering is preserved.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json)).await.is_err() {
                        tracing::debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server message: {}", e);
                }
            }
        }
    });

    let mut ctx = ConnectionContext::new(identity.clone(), outbound_tx.clone());
    ctx.join(RoomId::Tenant(identity.tenant_id.clone()), &gateway.broadcaster);

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                tracing::debug!("Client sent close frame");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => gateway.handle_message(&mut ctx, msg).await,
            Err(e) => {
                tracing::warn!("Failed to parse client message: {}", e);
                ServerMessage::ack_err(&CoordinatorError::transport(e.to_string()))
            }
        };

        if outbound_tx.send(reply).await.is_err() {
            break;
        }
    }

    ctx.close(&gateway.broadcaster);
    send_task.abort();
    tracing::info!("Connection closed: user {}", ctx.identity.user_id);
}
