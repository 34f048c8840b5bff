//! Stale session reaper behavior

use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dialer_engine::prelude::*;

fn session_aged(age: Duration) -> CallSession {
    let mut session = CallSession::new(
        TenantId("t-1".to_string()),
        AgentId("agt-1".to_string()),
        UserId("u-1".to_string()),
        "+15551234567".to_string(),
        CallDirection::Outbound,
    );
    session.created_at = Instant::now() - age;
    session
}

#[tokio::test]
#[serial]
async fn test_sweep_removes_only_expired_sessions() {
    let registry = Arc::new(SessionRegistry::new());
    let old = session_aged(Duration::from_secs(10));
    let young = session_aged(Duration::ZERO);
    let old_id = old.call_id.clone();
    let young_id = young.call_id.clone();
    registry.create(old).await.unwrap();
    registry.create(young).await.unwrap();

    let reaper = Arc::new(StaleSessionReaper::new(
        registry.clone(),
        Duration::from_secs(60),
        Duration::from_secs(5),
    ));

    assert_eq!(reaper.run_sweep().await, 1);
    assert!(!registry.contains(&old_id).await);
    assert!(registry.contains(&young_id).await);

    // A second sweep finds nothing left to do.
    assert_eq!(reaper.run_sweep().await, 0);
}

#[tokio::test]
#[serial]
async fn test_sweep_ignores_state() {
    let registry = Arc::new(SessionRegistry::new());
    let mut answered = session_aged(Duration::from_secs(10));
    answered.state = CallState::Answered;
    let call_id = answered.call_id.clone();
    registry.create(answered).await.unwrap();

    let reaper = Arc::new(StaleSessionReaper::new(
        registry.clone(),
        Duration::from_secs(60),
        Duration::from_secs(5),
    ));

    // Age alone decides; an answered call past the lifetime still goes.
    assert_eq!(reaper.run_sweep().await, 1);
    assert!(!registry.contains(&call_id).await);
}

#[tokio::test]
#[serial]
async fn test_periodic_sweep_reclaims_within_one_interval() {
    let registry = Arc::new(SessionRegistry::new());
    let old = session_aged(Duration::from_secs(10));
    let old_id = old.call_id.clone();
    registry.create(old).await.unwrap();

    let reaper = Arc::new(StaleSessionReaper::new(
        registry.clone(),
        Duration::from_millis(50),
        Duration::from_secs(5),
    ));
    reaper.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!registry.contains(&old_id).await);

    reaper.shutdown();
}

#[tokio::test]
#[serial]
async fn test_reaped_session_makes_hangup_not_found() {
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

    let identity = AgentIdentity {
        tenant_id: TenantId("t-1".to_string()),
        agent_id: AgentId("agt-1".to_string()),
        user_id: UserId("u-1".to_string()),
    };
    let call_id = control
        .dial(&identity, DialRequest::outbound("+15551234567"))
        .await
        .unwrap();

    // Backdate the session so the sweep takes it, as if the client vanished
    // hours ago.
    registry
        .mutate(&call_id, |s| {
            s.created_at = Instant::now() - Duration::from_secs(10);
            Ok(())
        })
        .await
        .unwrap();

    let reaper = Arc::new(StaleSessionReaper::new(
        registry.clone(),
        Duration::from_secs(60),
        Duration::from_secs(5),
    ));
    let mut rx = broadcaster.subscribe(RoomId::Tenant(TenantId("t-1".to_string())));
    assert_eq!(reaper.run_sweep().await, 1);

    // The sweep is silent and the late hang-up resolves to NotFound.
    assert!(rx.try_recv().is_err());
    assert!(matches!(
        control.hangup(&identity, &call_id).await,
        Err(CoordinatorError::NotFound { .. })
    ));
}
