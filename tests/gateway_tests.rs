//! Gateway message dispatch
//!
//! `ConnectionGateway::handle_message` is transport-independent; these tests
//! drive it with decoded messages and a captive outbound channel, the same
//! way the WebSocket loop does.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use dialer_engine::gateway::ConnectionContext;
use dialer_engine::prelude::*;

struct Harness {
    gateway: Arc<ConnectionGateway>,
    broadcaster: Arc<EventBroadcaster>,
}

async fn harness() -> Harness {
    let registry = Arc::new(SessionRegistry::new());
    let broadcaster = Arc::new(EventBroadcaster::new(64));
    let store = Arc::new(SqliteCallStore::new("sqlite::memory:").await.unwrap());
    let (persistence, _writer) = PersistenceGateway::spawn(store);

    let control = Arc::new(CallControlHandler::new(
        registry.clone(),
        broadcaster.clone(),
        persistence,
        Duration::from_secs(30),
    ));

    let verifier: Arc<dyn TokenVerifier> = Arc::new(StaticTokenVerifier::new());
    let gateway = Arc::new(ConnectionGateway::new(
        control,
        broadcaster.clone(),
        registry,
        verifier,
        64,
    ));

    Harness {
        gateway,
        broadcaster,
    }
}

fn agent_identity(tenant: &str, agent: &str) -> ConnectionIdentity {
    ConnectionIdentity {
        user_id: UserId(format!("u-{}", agent)),
        tenant_id: TenantId(tenant.to_string()),
        agent_id: Some(AgentId(agent.to_string())),
        role: Role::Agent,
    }
}

fn supervisor_identity(tenant: &str) -> ConnectionIdentity {
    ConnectionIdentity {
        user_id: UserId("u-sup".to_string()),
        tenant_id: TenantId(tenant.to_string()),
        agent_id: None,
        role: Role::Supervisor,
    }
}

fn connection(identity: ConnectionIdentity) -> (ConnectionContext, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(64);
    (ConnectionContext::new(identity, tx), rx)
}

fn dial_message() -> ClientMessage {
    ClientMessage::Dial {
        phone_number: "+15551234567".to_string(),
        lead_id: None,
        campaign_id: None,
    }
}

#[tokio::test]
async fn test_dial_ack_carries_call_id() {
    let h = harness().await;
    let (mut ctx, _rx) = connection(agent_identity("t-1", "agt-1"));

    let reply = h.gateway.handle_message(&mut ctx, dial_message()).await;
    match reply {
        ServerMessage::Ack {
            success: true,
            call_id: Some(_),
            error: None,
        } => {}
        other => panic!("expected successful dial ack, got {:?}", other),
    }
}

#[tokio::test]
async fn test_call_actions_require_agent_seat() {
    let h = harness().await;
    let (mut ctx, _rx) = connection(supervisor_identity("t-1"));

    let reply = h.gateway.handle_message(&mut ctx, dial_message()).await;
    match reply {
        ServerMessage::Ack {
            success: false,
            error: Some(error),
            ..
        } => assert!(error.contains("not logged in as an agent")),
        other => panic!("expected failure ack, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_ack_for_unknown_call() {
    let h = harness().await;
    let (mut ctx, _rx) = connection(agent_identity("t-1", "agt-1"));

    let reply = h
        .gateway
        .handle_message(
            &mut ctx,
            ClientMessage::Hangup {
                call_id: CallId("no-such-call".to_string()),
            },
        )
        .await;
    match reply {
        ServerMessage::Ack {
            success: false,
            error: Some(error),
            ..
        } => assert!(error.contains("not found")),
        other => panic!("expected failure ack, got {:?}", other),
    }
}

#[tokio::test]
async fn test_joined_room_receives_events() {
    let h = harness().await;

    // A supervisor joins the tenant dashboard; an agent dials.
    let (mut sup_ctx, mut sup_rx) = connection(supervisor_identity("t-1"));
    let reply = h
        .gateway
        .handle_message(
            &mut sup_ctx,
            ClientMessage::JoinRoom {
                room: RoomRequest::Dashboard(TenantId("t-1".to_string())),
            },
        )
        .await;
    assert!(matches!(reply, ServerMessage::Ack { success: true, .. }));

    let (mut agent_ctx, _agent_rx) = connection(agent_identity("t-1", "agt-1"));
    h.gateway.handle_message(&mut agent_ctx, dial_message()).await;

    let forwarded = tokio::time::timeout(Duration::from_secs(1), sup_rx.recv())
        .await
        .expect("timed out waiting for room event")
        .expect("channel closed");
    assert!(matches!(
        forwarded,
        ServerMessage::Event(BroadcastEvent::CallStarted { .. })
    ));
}

#[tokio::test]
async fn test_leave_room_stops_events() {
    let h = harness().await;
    let (mut sup_ctx, mut sup_rx) = connection(supervisor_identity("t-1"));
    let room = RoomRequest::Queue(QueueId("q-1".to_string()));

    h.gateway
        .handle_message(&mut sup_ctx, ClientMessage::JoinRoom { room: room.clone() })
        .await;
    h.gateway
        .handle_message(&mut sup_ctx, ClientMessage::LeaveRoom { room })
        .await;

    // Give the aborted forwarding task a beat to wind down before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.broadcaster.publish(
        &RoomId::Queue(QueueId("q-1".to_string())),
        BroadcastEvent::CallRinging {
            call_id: CallId("c-1".to_string()),
        },
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sup_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_foreign_tenant_rooms_are_refused() {
    let h = harness().await;
    let (mut ctx, _rx) = connection(agent_identity("t-1", "agt-1"));

    for room in [
        RoomRequest::Tenant(TenantId("t-2".to_string())),
        RoomRequest::Dashboard(TenantId("t-2".to_string())),
    ] {
        let reply = h
            .gateway
            .handle_message(&mut ctx, ClientMessage::JoinRoom { room })
            .await;
        match reply {
            ServerMessage::Ack {
                success: false,
                error: Some(error),
                ..
            } => assert!(error.contains("another tenant")),
            other => panic!("expected failure ack, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_get_stats_reports_registry() {
    let h = harness().await;
    let (mut ctx, _rx) = connection(agent_identity("t-1", "agt-1"));

    h.gateway.handle_message(&mut ctx, dial_message()).await;
    let reply = h.gateway.handle_message(&mut ctx, ClientMessage::GetStats).await;
    match reply {
        ServerMessage::Stats { stats } => {
            assert_eq!(stats.total, 1);
            assert_eq!(stats.dialing, 1);
        }
        other => panic!("expected stats, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_broadcasts_agent_logout() {
    let h = harness().await;
    let mut tenant_rx = h
        .broadcaster
        .subscribe(RoomId::Tenant(TenantId("t-1".to_string())));

    let (mut ctx, _rx) = connection(agent_identity("t-1", "agt-1"));
    ctx.close(&h.broadcaster);

    match tenant_rx.try_recv().unwrap() {
        BroadcastEvent::AgentLogout { agent_id } => {
            assert_eq!(agent_id, AgentId("agt-1".to_string()));
        }
        other => panic!("expected agent:logout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_supervisor_disconnect_is_silent() {
    let h = harness().await;
    let mut tenant_rx = h
        .broadcaster
        .subscribe(RoomId::Tenant(TenantId("t-1".to_string())));

    let (mut ctx, _rx) = connection(supervisor_identity("t-1"));
    ctx.close(&h.broadcaster);

    assert!(tenant_rx.try_recv().is_err());
}
