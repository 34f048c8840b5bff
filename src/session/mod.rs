//! Call session entity and shared types

pub mod session;
pub mod types;

pub use session::CallSession;
pub use types::{
    AgentId, AgentIdentity, AgentState, CallDirection, CallId, CallState, CampaignId, LeadId,
    QueueId, TenantId, TransferKind, UserId,
};
