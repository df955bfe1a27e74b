//! Composition root.
//!
//! Builds one [`ConnectionManager`] and hands it to every component that
//! needs the vector backend.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::WeaviateConnector;
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::AppResult;
use crate::gateway::StorageGateway;
use crate::retry::RetryPolicy;
use crate::schema::SchemaManager;
use crate::search::{MemoryIndex, SearchAggregator};
use crate::ticketing::{TicketingMirror, ZephyrClient};

/// Point-in-time view of backend health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Connection state after probing.
    pub connection: ConnectionState,
    /// Whether the readiness probe passed.
    pub healthy: bool,
    /// Whether the schema was verified by this process.
    pub schema_initialized: bool,
    /// Whether the stored schema version matches this build.
    pub schema_current: bool,
    /// Whether a ticketing mirror is configured.
    pub ticketing_configured: bool,
    /// Records held in the memory index.
    pub cached_records: usize,
}

/// Shared application state.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Vector backend connection.
    pub connection: Arc<ConnectionManager>,
    /// Schema manager for the record and metadata classes.
    pub schema: Arc<SchemaManager>,
    /// In-memory keyword index shared by the gateway and the aggregator.
    pub index: Arc<MemoryIndex>,
    /// Dual-write gateway.
    pub gateway: StorageGateway,
    /// Search aggregator.
    pub search: SearchAggregator,
}

impl AppState {
    /// Wire every component from configuration. Performs no network I/O.
    pub fn from_config(config: Config) -> AppResult<Self> {
        let connector = Arc::new(WeaviateConnector::new(
            &config.weaviate,
            config.request.clone(),
        ));
        let connection = Arc::new(ConnectionManager::new(
            connector,
            RetryPolicy::from_config(&config.request),
        ));
        let schema = Arc::new(SchemaManager::from_config(
            connection.clone(),
            &config.weaviate,
        ));
        let index = Arc::new(MemoryIndex::new(config.search.memory_capacity));

        let mirror = match &config.zephyr {
            Some(zephyr) => {
                let client = ZephyrClient::new(zephyr, &config.request)?;
                info!(project = %client.project_key(), "Ticketing mirror enabled");
                Some(Arc::new(client) as Arc<dyn TicketingMirror>)
            }
            None => {
                info!("No ticketing mirror configured");
                None
            }
        };

        let gateway = StorageGateway::new(connection.clone(), schema.clone(), mirror, index.clone());
        let search = SearchAggregator::new(
            connection.clone(),
            index.clone(),
            schema.class_name(),
            schema.record_fields(),
            config.search.mode,
        );

        Ok(Self {
            config,
            connection,
            schema,
            index,
            gateway,
            search,
        })
    }

    /// Connect and verify the schema.
    ///
    /// Failures are logged, not returned: the process keeps serving with
    /// memory-only search and retries the connection on the next store.
    pub async fn startup(&self) -> ConnectionState {
        if let Err(e) = self.connection.connect().await {
            error!(error = %e, url = %self.config.weaviate.url, "Vector backend unavailable, running degraded");
            return self.connection.state();
        }

        match self.schema.ensure_schema().await {
            Ok(()) => info!(class = %self.schema.class_name(), "Schema ready"),
            Err(e) => error!(error = %e, "Schema setup failed, storage writes will retry it"),
        }

        self.connection.state()
    }

    /// Probe the backend and report overall health.
    pub async fn health(&self) -> HealthReport {
        if self.connection.current_backend().await.is_none() {
            if let Err(e) = self.connection.ensure_connected().await {
                warn!(error = %e, "Health check could not connect");
            }
        }
        let healthy = self.connection.health_check().await;
        let schema_current = healthy && self.schema.check_version().await;

        HealthReport {
            connection: self.connection.state(),
            healthy,
            schema_initialized: self.schema.is_initialized(),
            schema_current,
            ticketing_configured: self.gateway.has_mirror(),
            cached_records: self.index.len(),
        }
    }

    /// Release the backend connection.
    pub async fn shutdown(&self) {
        self.connection.close().await;
        info!("Shutdown complete");
    }
}
