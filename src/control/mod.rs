//! Call Control Handler
//!
//! Implements the session state machine: validates ownership and
//! preconditions, mutates the registry, and triggers persistence and
//! broadcast side effects. Every action returns a synchronous `Result`;
//! the transport adapter (gateway) turns that into an acknowledgement for
//! the issuing connection.
//!
//! Transition graph:
//!
//! ```text
//! dial ──> dialing ──(ring timer)──> ringing
//!             │                         │
//!             └────────── answer ───────┴──> answered <──unhold── held
//!                                               │          ▲
//!                                               └── hold ──┘
//!             hangup (any non-ended) ──> ended ──> removed
//! ```
//!
//! Guards run before any field is written: the session must exist and the
//! requester must be the agent recorded at dial time. Guard failures leave
//! the registry untouched and surface only to the caller, never to rooms.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{CoordinatorError, Result};
use crate::events::{BroadcastEvent, EventBroadcaster, RoomId};
use crate::persistence::{NewCallRecord, PersistCommand, PersistenceGateway};
use crate::registry::SessionRegistry;
use crate::session::{
    AgentIdentity, AgentState, CallDirection, CallId, CallSession, CallState, CampaignId, LeadId,
    QueueId, TransferKind,
};

/// Parameters of a dial action
#[derive(Debug, Clone)]
pub struct DialRequest {
    pub phone_number: String,
    pub lead_id: Option<LeadId>,
    pub campaign_id: Option<CampaignId>,
    pub queue_id: Option<QueueId>,
    pub direction: CallDirection,
}

impl DialRequest {
    /// An outbound agent-initiated dial
    pub fn outbound(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            lead_id: None,
            campaign_id: None,
            queue_id: None,
            direction: CallDirection::Outbound,
        }
    }
}

/// Validates and applies agent-initiated call actions
pub struct CallControlHandler {
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    persistence: PersistenceGateway,
    ring_timers: Arc<DashMap<CallId, JoinHandle<()>>>,
    ringing_delay: Duration,
}

impl CallControlHandler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<EventBroadcaster>,
        persistence: PersistenceGateway,
        ringing_delay: Duration,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            persistence,
            ring_timers: Arc::new(DashMap::new()),
            ringing_delay,
        }
    }

    /// Create a session and start the dial flow
    pub async fn dial(&self, identity: &AgentIdentity, request: DialRequest) -> Result<CallId> {
        let session = CallSession::new(
            identity.tenant_id.clone(),
            identity.agent_id.clone(),
            identity.user_id.clone(),
            request.phone_number,
            request.direction,
        )
        .with_lead(request.lead_id)
        .with_campaign(request.campaign_id)
        .with_queue(request.queue_id);

        let call_id = session.call_id.clone();
        self.registry.create(session.clone()).await?;
        tracing::info!(
            "Agent {} dialing {} (call {})",
            identity.agent_id,
            session.phone_number,
            call_id
        );

        self.persistence
            .dispatch(PersistCommand::Insert(NewCallRecord::from(&session)));

        self.fan_out(
            &session,
            BroadcastEvent::CallStarted {
                call_id: call_id.clone(),
                tenant_id: session.tenant_id.clone(),
                agent_id: session.agent_id.clone(),
                phone_number: session.phone_number.clone(),
                direction: session.direction,
                queue_id: session.queue_id.clone(),
                campaign_id: session.campaign_id.clone(),
            },
        );
        self.publish_agent_state(&session, AgentState::Available, AgentState::OnCall);

        self.schedule_ringing(&session);
        Ok(call_id)
    }

    /// Transition a dialing or ringing call to answered
    pub async fn answer(&self, identity: &AgentIdentity, call_id: &CallId) -> Result<()> {
        let answer_time = Utc::now();
        let session = self
            .registry
            .mutate(call_id, |s| {
                Self::owner_guard(s, identity)?;
                match s.state {
                    CallState::Dialing | CallState::Ringing => {
                        s.set_state(CallState::Answered);
                        s.answer_time = Some(answer_time);
                        Ok(s.clone())
                    }
                    other => Err(CoordinatorError::invalid_state(
                        call_id.as_str(),
                        other.as_str(),
                        "answer",
                    )),
                }
            })
            .await?;

        self.cancel_ringing(call_id);
        self.persistence.dispatch(PersistCommand::Answered {
            call_id: call_id.clone(),
            answer_time,
        });
        self.fan_out(
            &session,
            BroadcastEvent::CallAnswered {
                call_id: call_id.clone(),
                agent_id: session.agent_id.clone(),
            },
        );
        Ok(())
    }

    /// Place an answered call on hold
    pub async fn hold(&self, identity: &AgentIdentity, call_id: &CallId) -> Result<()> {
        let session = self
            .registry
            .mutate(call_id, |s| {
                Self::owner_guard(s, identity)?;
                match s.state {
                    CallState::Answered => {
                        s.set_state(CallState::Held);
                        Ok(s.clone())
                    }
                    other => Err(CoordinatorError::invalid_state(
                        call_id.as_str(),
                        other.as_str(),
                        "hold",
                    )),
                }
            })
            .await?;

        self.fan_out(
            &session,
            BroadcastEvent::CallHeld {
                call_id: call_id.clone(),
                is_on_hold: true,
            },
        );
        self.publish_agent_state(&session, AgentState::OnCall, AgentState::OnHold);
        Ok(())
    }

    /// Resume a held call
    pub async fn unhold(&self, identity: &AgentIdentity, call_id: &CallId) -> Result<()> {
        let session = self
            .registry
            .mutate(call_id, |s| {
                Self::owner_guard(s, identity)?;
                match s.state {
                    CallState::Held => {
                        s.set_state(CallState::Answered);
                        Ok(s.clone())
                    }
                    other => Err(CoordinatorError::invalid_state(
                        call_id.as_str(),
                        other.as_str(),
                        "unhold",
                    )),
                }
            })
            .await?;

        self.fan_out(
            &session,
            BroadcastEvent::CallHeld {
                call_id: call_id.clone(),
                is_on_hold: false,
            },
        );
        self.publish_agent_state(&session, AgentState::OnHold, AgentState::OnCall);
        Ok(())
    }

    /// Set the mute flag; valid in any live state, no broadcast
    pub async fn set_mute(
        &self,
        identity: &AgentIdentity,
        call_id: &CallId,
        muted: bool,
    ) -> Result<()> {
        self.registry
            .mutate(call_id, |s| {
                Self::owner_guard(s, identity)?;
                if s.state.is_terminal() {
                    return Err(CoordinatorError::invalid_state(
                        call_id.as_str(),
                        s.state.as_str(),
                        "mute",
                    ));
                }
                s.muted = muted;
                tracing::debug!("Call {} muted={}", call_id, muted);
                Ok(())
            })
            .await
    }

    /// Transfer an answered call
    ///
    /// Blind transfer hands the session off immediately: the call stays
    /// answered, re-pointed at the target. Warm transfer is acknowledged
    /// without a transition; completing it needs a media bridge this
    /// subsystem does not own.
    pub async fn transfer(
        &self,
        identity: &AgentIdentity,
        call_id: &CallId,
        target: &str,
        kind: TransferKind,
    ) -> Result<()> {
        let target = target.to_string();
        let transferred = self
            .registry
            .mutate(call_id, |s| {
                Self::owner_guard(s, identity)?;
                if s.state != CallState::Answered {
                    return Err(CoordinatorError::invalid_state(
                        call_id.as_str(),
                        s.state.as_str(),
                        "transfer",
                    ));
                }
                match kind {
                    TransferKind::Blind => {
                        s.phone_number = target.clone();
                        Ok(Some(s.clone()))
                    }
                    TransferKind::Warm => Ok(None),
                }
            })
            .await?;

        match transferred {
            Some(session) => {
                tracing::info!("Call {} blind-transferred to {}", call_id, target);
                self.fan_out(
                    &session,
                    BroadcastEvent::CallTransferred {
                        call_id: call_id.clone(),
                        target,
                    },
                );
            }
            None => {
                tracing::debug!("Call {} warm transfer to {} acknowledged", call_id, target);
            }
        }
        Ok(())
    }

    /// End a call and remove it from the registry
    pub async fn hangup(&self, identity: &AgentIdentity, call_id: &CallId) -> Result<()> {
        let end_time = Utc::now();
        let (session, was_held) = self
            .registry
            .mutate(call_id, |s| {
                Self::owner_guard(s, identity)?;
                if s.state.is_terminal() {
                    return Err(CoordinatorError::invalid_state(
                        call_id.as_str(),
                        s.state.as_str(),
                        "hangup",
                    ));
                }
                let was_held = s.state == CallState::Held;
                s.set_state(CallState::Ended);
                s.end_time = Some(end_time);
                Ok((s.clone(), was_held))
            })
            .await?;

        self.cancel_ringing(call_id);

        // Terminal side effects belong to whoever wins the removal; a
        // concurrent reaper sweep losing the race stays silent.
        if self.registry.delete(call_id).await {
            let duration = session.duration_seconds();
            tracing::info!("Call {} ended after {}s", call_id, duration);

            self.persistence.dispatch(PersistCommand::Completed {
                call_id: call_id.clone(),
                end_time,
                duration_seconds: duration,
            });
            self.fan_out(
                &session,
                BroadcastEvent::CallEnded {
                    call_id: call_id.clone(),
                    agent_id: session.agent_id.clone(),
                    duration,
                },
            );
            let previous = if was_held {
                AgentState::OnHold
            } else {
                AgentState::OnCall
            };
            self.publish_agent_state(&session, previous, AgentState::Available);
        } else {
            tracing::debug!("Call {} already removed; skipping terminal broadcast", call_id);
        }
        Ok(())
    }

    fn owner_guard(session: &CallSession, identity: &AgentIdentity) -> Result<()> {
        if session.agent_id != identity.agent_id {
            return Err(CoordinatorError::forbidden("not your call"));
        }
        Ok(())
    }

    /// Publish a call event to every room scoped to this session
    fn fan_out(&self, session: &CallSession, event: BroadcastEvent) {
        let tenant = RoomId::Tenant(session.tenant_id.clone());
        self.broadcaster.publish(&tenant, event.clone());
        self.broadcaster
            .publish(&RoomId::Dashboard(session.tenant_id.clone()), event.clone());
        if let Some(queue_id) = &session.queue_id {
            self.broadcaster
                .publish(&RoomId::Queue(queue_id.clone()), event.clone());
        }
        if let Some(campaign_id) = &session.campaign_id {
            self.broadcaster
                .publish(&RoomId::Campaign(campaign_id.clone()), event);
        }
    }

    fn publish_agent_state(
        &self,
        session: &CallSession,
        previous_state: AgentState,
        new_state: AgentState,
    ) {
        let event = BroadcastEvent::AgentStateChanged {
            agent_id: session.agent_id.clone(),
            previous_state,
            new_state,
        };
        self.broadcaster
            .publish(&RoomId::Tenant(session.tenant_id.clone()), event.clone());
        self.broadcaster
            .publish(&RoomId::Dashboard(session.tenant_id.clone()), event);
    }

    /// Schedule the deferred dialing -> ringing transition
    ///
    /// The timer re-validates state before acting; aborting it on answer or
    /// hang-up is an optimization, the re-check is the guarantee (abort can
    /// itself race the firing).
    fn schedule_ringing(&self, session: &CallSession) {
        let call_id = session.call_id.clone();
        let registry = self.registry.clone();
        let broadcaster = self.broadcaster.clone();
        let timers = self.ring_timers.clone();
        let delay = self.ringing_delay;
        let tenant_id = session.tenant_id.clone();
        let queue_id = session.queue_id.clone();
        let campaign_id = session.campaign_id.clone();

        let task_call_id = call_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            timers.remove(&task_call_id);

            let transitioned = registry
                .mutate(&task_call_id, |s| {
                    if s.state == CallState::Dialing {
                        s.set_state(CallState::Ringing);
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                })
                .await;

            match transitioned {
                Ok(true) => {
                    let event = BroadcastEvent::CallRinging {
                        call_id: task_call_id.clone(),
                    };
                    broadcaster.publish(&RoomId::Tenant(tenant_id.clone()), event.clone());
                    broadcaster.publish(&RoomId::Dashboard(tenant_id), event.clone());
                    if let Some(queue_id) = queue_id {
                        broadcaster.publish(&RoomId::Queue(queue_id), event.clone());
                    }
                    if let Some(campaign_id) = campaign_id {
                        broadcaster.publish(&RoomId::Campaign(campaign_id), event);
                    }
                }
                // Answered, hung up, or reaped first: stale timer, stay silent.
                Ok(false) | Err(_) => {
                    tracing::trace!("Ring timer for {} found a stale session", task_call_id);
                }
            }
        });

        self.ring_timers.insert(call_id, handle);
    }

    fn cancel_ringing(&self, call_id: &CallId) {
        if let Some((_, handle)) = self.ring_timers.remove(call_id) {
            handle.abort();
        }
    }
}
