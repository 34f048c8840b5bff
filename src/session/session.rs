//! Call session entity
//!
//! The in-memory record of one live telephone interaction between an agent
//! and an external party. The registry is the single owner of these; every
//! other component sees clones taken under the registry lock.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use super::types::{
    AgentId, CallDirection, CallId, CallState, CampaignId, LeadId, QueueId, TenantId, UserId,
};

/// One live call session
#[derive(Debug, Clone)]
pub struct CallSession {
    /// Unique call identifier (primary key)
    pub call_id: CallId,

    /// Tenant that owns the call; immutable, scopes broadcast rooms
    pub tenant_id: TenantId,

    /// The sole authorized mutator; immutable
    pub agent_id: AgentId,

    /// The human identity behind the agent seat
    pub user_id: UserId,

    /// External party number
    pub phone_number: String,

    /// Contextual linkage, never re-validated after creation
    pub lead_id: Option<LeadId>,
    pub campaign_id: Option<CampaignId>,
    pub queue_id: Option<QueueId>,

    /// Direction of the call; immutable
    pub direction: CallDirection,

    /// Current state, mutated only by the control handler
    pub state: CallState,

    /// When the call was created
    pub start_time: DateTime<Utc>,

    /// Set on transition to answered
    pub answer_time: Option<DateTime<Utc>>,

    /// Set on transition to ended
    pub end_time: Option<DateTime<Utc>>,

    /// Orthogonal to state
    pub muted: bool,

    /// Monotonic creation instant, used by the reaper for age checks
    pub created_at: Instant,
}

impl CallSession {
    /// Create a new session in the dialing state
    pub fn new(
        tenant_id: TenantId,
        agent_id: AgentId,
        user_id: UserId,
        phone_number: String,
        direction: CallDirection,
    ) -> Self {
        Self {
            call_id: CallId::new(),
            tenant_id,
            agent_id,
            user_id,
            phone_number,
            lead_id: None,
            campaign_id: None,
            queue_id: None,
            direction,
            state: CallState::Dialing,
            start_time: Utc::now(),
            answer_time: None,
            end_time: None,
            muted: false,
            created_at: Instant::now(),
        }
    }

    /// Attach a lead id
    pub fn with_lead(mut self, lead_id: Option<LeadId>) -> Self {
        self.lead_id = lead_id;
        self
    }

    /// Attach a campaign id
    pub fn with_campaign(mut self, campaign_id: Option<CampaignId>) -> Self {
        self.campaign_id = campaign_id;
        self
    }

    /// Attach a queue id
    pub fn with_queue(mut self, queue_id: Option<QueueId>) -> Self {
        self.queue_id = queue_id;
        self
    }

    /// Update the call state
    pub fn set_state(&mut self, new_state: CallState) {
        let old_state = self.state;
        self.state = new_state;
        tracing::debug!("Call {} state: {} -> {}", self.call_id, old_state, new_state);
    }

    /// Monotonic age of the session
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Reported call duration in whole seconds
    ///
    /// Duration is end minus answer; a call that was never answered reports 0.
    pub fn duration_seconds(&self) -> i64 {
        match (self.answer_time, self.end_time) {
            (Some(answered), Some(ended)) => (ended - answered).num_seconds().max(0),
            _ => 0,
        }
    }
}
