//! Coordinator server
//!
//! Wires the registry, broadcaster, persistence writer, control handler,
//! reaper, and WebSocket gateway into one deployable unit.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            CoordinatorServer             │
//! ├──────────────────────────────────────────┤
//! │   ConnectionGateway (axum WebSocket)     │
//! ├──────────────────────────────────────────┤
//! │  CallControlHandler │ EventBroadcaster   │
//! ├──────────────────────────────────────────┤
//! │  SessionRegistry │ Persistence │ Reaper  │
//! └──────────────────────────────────────────┘
//! ```

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::CoordinatorConfig;
use crate::control::CallControlHandler;
use crate::error::{CoordinatorError, Result};
use crate::events::EventBroadcaster;
use crate::gateway::{ws_handler, ConnectionGateway, TokenVerifier};
use crate::persistence::{CallRecordStore, PersistenceGateway, SqliteCallStore};
use crate::registry::SessionRegistry;
use crate::reaper::StaleSessionReaper;

/// Builder for [`CoordinatorServer`]
pub struct CoordinatorServerBuilder {
    config: CoordinatorConfig,
    verifier: Option<Arc<dyn TokenVerifier>>,
    store: Option<Arc<dyn CallRecordStore>>,
    database_url: Option<String>,
}

impl CoordinatorServerBuilder {
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::default(),
            verifier: None,
            store: None,
            database_url: None,
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Use an already-constructed record store
    pub fn with_store(mut self, store: Arc<dyn CallRecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an in-memory SQLite database
    pub fn with_in_memory_database(mut self) -> Self {
        self.database_url = Some("sqlite::memory:".to_string());
        self
    }

    /// Use a SQLite database at the given path
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_url = Some(format!("sqlite://{}?mode=rwc", path.into()));
        self
    }

    pub async fn build(self) -> Result<CoordinatorServer> {
        let verifier = self
            .verifier
            .ok_or_else(|| CoordinatorError::config("a token verifier is required"))?;

        let store: Arc<dyn CallRecordStore> = match (self.store, self.database_url) {
            (Some(store), _) => store,
            (None, Some(url)) => Arc::new(SqliteCallStore::new(&url).await?),
            (None, None) => {
                return Err(CoordinatorError::config(
                    "a call record store or database url is required",
                ))
            }
        };

        Ok(CoordinatorServer::assemble(self.config, verifier, store))
    }
}

/// The assembled call-session coordinator
pub struct CoordinatorServer {
    config: CoordinatorConfig,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    control: Arc<CallControlHandler>,
    gateway: Arc<ConnectionGateway>,
    reaper: Arc<StaleSessionReaper>,
    persistence_writer: JoinHandle<()>,
    persistence: PersistenceGateway,
}

impl std::fmt::Debug for CoordinatorServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorServer").finish_non_exhaustive()
    }
}

impl CoordinatorServer {
    /// Start building a server
    pub fn builder() -> CoordinatorServerBuilder {
        CoordinatorServerBuilder::new()
    }

    fn assemble(
        config: CoordinatorConfig,
        verifier: Arc<dyn TokenVerifier>,
        store: Arc<dyn CallRecordStore>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new(config.events.room_capacity));
        let (persistence, persistence_writer) = PersistenceGateway::spawn(store);

        let control = Arc::new(CallControlHandler::new(
            registry.clone(),
            broadcaster.clone(),
            persistence.clone(),
            config.timers.ringing_delay,
        ));

        let gateway = Arc::new(ConnectionGateway::new(
            control.clone(),
            broadcaster.clone(),
            registry.clone(),
            verifier,
            config.events.outbound_queue_depth,
        ));

        let reaper = Arc::new(StaleSessionReaper::new(
            registry.clone(),
            config.timers.reaper_interval,
            config.timers.max_session_age,
        ));
        reaper.start();

        Self {
            config,
            registry,
            broadcaster,
            control,
            gateway,
            reaper,
            persistence_writer,
            persistence,
        }
    }

    /// The axum router exposing the WebSocket endpoint
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.gateway.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until the process is stopped
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.general.bind_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CoordinatorError::transport(e.to_string()))?;

        tracing::info!(
            "Call-session coordinator listening on {} (soft cap {} sessions)",
            addr,
            self.config.general.max_sessions
        );
        axum::serve(listener, self.router())
            .await
            .map_err(|e| CoordinatorError::transport(e.to_string()))
    }

    /// Stop background work and drain queued persistence writes
    pub async fn shutdown(self) {
        self.reaper.shutdown();
        drop(self.control);
        drop(self.gateway);
        drop(self.persistence);
        if let Err(e) = self.persistence_writer.await {
            if !e.is_cancelled() {
                tracing::warn!("Persistence writer ended abnormally: {}", e);
            }
        }
        tracing::info!("Coordinator shut down");
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    pub fn control(&self) -> &Arc<CallControlHandler> {
        &self.control
    }

    pub fn reaper(&self) -> &Arc<StaleSessionReaper> {
        &self.reaper
    }
}
