//! Connection identity and token verification
//!
//! Token issuance lives elsewhere; the gateway only verifies. A token that
//! verifies is trusted from then on: the resulting [`ConnectionIdentity`]
//! rides the connection for its whole lifetime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CoordinatorError, Result};
use crate::session::{AgentId, AgentIdentity, TenantId, UserId};

/// Role attached to a verified connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    Supervisor,
    Dashboard,
}

/// Identity attached to a connection after token verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionIdentity {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    /// Present only when the connection is a logged-in agent seat
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    pub role: Role,
}

impl ConnectionIdentity {
    /// The identity required for call-control actions
    pub fn agent_identity(&self) -> Result<AgentIdentity> {
        match &self.agent_id {
            Some(agent_id) => Ok(AgentIdentity {
                tenant_id: self.tenant_id.clone(),
                agent_id: agent_id.clone(),
                user_id: self.user_id.clone(),
            }),
            None => Err(CoordinatorError::forbidden("not logged in as an agent")),
        }
    }
}

/// Verifies connection tokens
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<ConnectionIdentity>;
}

/// Static token table, for tests and single-box deployments
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, ConnectionIdentity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token
    pub fn with_token(mut self, token: impl Into<String>, identity: ConnectionIdentity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Load a token table from its JSON representation
    pub fn from_json(json: &str) -> Result<Self> {
        let tokens: HashMap<String, ConnectionIdentity> = serde_json::from_str(json)
            .map_err(|e| CoordinatorError::auth(format!("invalid token table: {}", e)))?;
        Ok(Self { tokens })
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<ConnectionIdentity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| CoordinatorError::auth("unknown token"))
    }
}
