//! # testcase-vault
//!
//! Storage and search layer for generated test cases.
//!
//! Records are written to a Weaviate vector backend and, optionally,
//! mirrored into Zephyr Scale. Searches merge semantic hits from the
//! backend with a local keyword index, so the layer keeps answering while
//! the backend is unreachable or still indexing fresh writes.
//!
//! ## Architecture
//!
//! ```text
//! StorageGateway ──┬─▶ ConnectionManager ─▶ Weaviate (HTTP)
//!                  ├─▶ SchemaManager ────────┘
//!                  ├─▶ TicketingMirror ──────▶ Zephyr Scale (HTTP)
//!                  └─▶ MemoryIndex ◀── SearchAggregator
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use testcase_vault::{AppState, Config, TestCaseRecord};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let state = AppState::from_config(Config::from_env()?)?;
//!     state.startup().await;
//!
//!     let record = TestCaseRecord::new("Password Reset Test", "Verify reset email is sent");
//!     let stored = state.gateway.store(record).await?;
//!     println!("{:?}", stored.outcome());
//!
//!     let found = state.search.search("password reset", 5).await;
//!     println!("{} results", found.results.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Vector backend abstraction and the Weaviate client.
pub mod backend;
/// Configuration loaded from the environment.
pub mod config;
/// Backend connection lifecycle and state machine.
pub mod connection;
/// Error types and result aliases for the application.
pub mod error;
/// Dual-write storage gateway.
pub mod gateway;
/// Test case record model and validation.
pub mod records;
/// Exponential backoff policy.
pub mod retry;
/// Backend schema definition, creation and versioning.
pub mod schema;
/// Search aggregation over the backend and the memory index.
pub mod search;
/// Composition root.
pub mod state;
/// Ticketing-system mirror and the Zephyr Scale client.
pub mod ticketing;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{AppError, AppResult};
pub use gateway::{BackendName, StorageGateway, StorageResult, StoreOutcome};
pub use records::{AutomationStatus, Priority, TestCaseRecord, TestStep};
pub use search::{SearchAggregator, SearchResponse, SearchResult, SearchSource, SearchStatus};
pub use state::{AppState, HealthReport};
