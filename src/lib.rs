//! # dialer-engine
//!
//! Real-time call-session coordination for outbound dialer deployments.
//! This crate tracks the live state of every telephone call an agent is
//! handling, validates and applies agent-initiated control actions (dial,
//! answer, hold, mute, transfer, hang up), and fans the resulting state
//! changes out to every interested subscriber: the owning agent's own
//! client, supervisors watching a tenant, dashboards watching aggregate
//! stats, and queue or campaign watchers.
//!
//! ## Architecture
//!
//! - [`registry::SessionRegistry`]: authoritative, process-local store of
//!   active sessions, keyed by call id. All mutation serializes through a
//!   single per-registry point, closing same-call races between handlers.
//! - [`control::CallControlHandler`]: the session state machine. Validates
//!   ownership and preconditions, mutates the registry, dispatches
//!   persistence and broadcast side effects, and owns the dial-to-ringing
//!   deferred timer.
//! - [`events::EventBroadcaster`]: room-scoped fan-out (tenant, queue,
//!   campaign, dashboard) over per-room broadcast channels; fire-and-forget.
//! - [`persistence`]: the durable call-record contract, consumed through a
//!   one-way command channel so writes never block the real-time path.
//! - [`gateway::ConnectionGateway`]: authenticates WebSocket connections,
//!   manages room membership, and adapts the wire protocol onto the control
//!   handler.
//! - [`reaper::StaleSessionReaper`]: periodic sweep bounding memory growth
//!   from sessions orphaned by unclean disconnects.
//!
//! Session state is authoritative in exactly one process; cross-process
//! consistency and exactly-once durable delivery are out of scope.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dialer_engine::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let verifier = StaticTokenVerifier::new().with_token(
//!     "agent-token",
//!     ConnectionIdentity {
//!         user_id: UserId("u-1".to_string()),
//!         tenant_id: TenantId("t-1".to_string()),
//!         agent_id: Some(AgentId("agt-1".to_string())),
//!         role: Role::Agent,
//!     },
//! );
//!
//! let server = CoordinatorServer::builder()
//!     .with_config(CoordinatorConfig::default())
//!     .with_verifier(Arc::new(verifier))
//!     .with_in_memory_database()
//!     .build()
//!     .await?;
//!
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod gateway;
pub mod persistence;
pub mod prelude;
pub mod reaper;
pub mod registry;
pub mod server;
pub mod session;

pub use config::CoordinatorConfig;
pub use control::CallControlHandler;
pub use error::{CoordinatorError, Result};
pub use events::EventBroadcaster;
pub use gateway::ConnectionGateway;
pub use registry::SessionRegistry;
pub use reaper::StaleSessionReaper;
pub use server::CoordinatorServer;
pub use session::CallSession;
