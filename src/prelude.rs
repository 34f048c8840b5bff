//! Convenience re-exports for consumers of the coordinator

pub use crate::config::{CoordinatorConfig, EventConfig, GeneralConfig, TimerConfig};
pub use crate::control::{CallControlHandler, DialRequest};
pub use crate::error::{CoordinatorError, Result};
pub use crate::events::{BroadcastEvent, EventBroadcaster, RoomId};
pub use crate::gateway::{
    ClientMessage, ConnectionGateway, ConnectionIdentity, Role, RoomRequest, ServerMessage,
    StaticTokenVerifier, TokenVerifier,
};
pub use crate::persistence::{
    CallRecord, CallRecordStore, NewCallRecord, PersistCommand, PersistenceGateway,
    SqliteCallStore,
};
pub use crate::registry::{RegistryStats, SessionRegistry};
pub use crate::reaper::StaleSessionReaper;
pub use crate::server::{CoordinatorServer, CoordinatorServerBuilder};
pub use crate::session::{
    AgentId, AgentIdentity, AgentState, CallDirection, CallId, CallSession, CallState, CampaignId,
    LeadId, QueueId, TenantId, TransferKind, UserId,
};
