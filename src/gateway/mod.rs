//! Dual-write storage gateway.
//!
//! A record is validated once, then written to the vector backend and (when
//! configured) the ticketing mirror. The two writes are independent: each
//! backend reports its own outcome and neither is rolled back when the other
//! fails.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::error::{StoreError, ValidationError};
use crate::records::TestCaseRecord;
use crate::schema::SchemaManager;
use crate::search::MemoryIndex;
use crate::ticketing::TicketingMirror;

/// Backends a record can be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendName {
    /// The vector-search backend.
    Vector,
    /// The ticketing-system mirror.
    Ticketing,
}

impl BackendName {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendName::Vector => "vector",
            BackendName::Ticketing => "ticketing",
        }
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome across all attempted backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    /// Every attempted backend accepted the record.
    FullyStored,
    /// At least one backend accepted it and at least one refused.
    PartiallyStored,
    /// No backend accepted it.
    Failed,
}

/// Per-backend result of a single `store` call.
#[derive(Debug, Clone)]
pub struct StorageResult {
    /// Id assigned to the record before any write.
    pub record_id: String,
    /// Backend-side id (vector object id or ticket key), or the write error.
    pub per_backend: BTreeMap<BackendName, Result<String, StoreError>>,
}

impl StorageResult {
    /// Classify the per-backend map.
    pub fn outcome(&self) -> StoreOutcome {
        let ok = self.per_backend.values().filter(|r| r.is_ok()).count();
        if ok == 0 {
            StoreOutcome::Failed
        } else if ok == self.per_backend.len() {
            StoreOutcome::FullyStored
        } else {
            StoreOutcome::PartiallyStored
        }
    }

    /// Whether at least one backend accepted the record.
    pub fn any_succeeded(&self) -> bool {
        self.per_backend.values().any(Result::is_ok)
    }

    /// Whether every attempted backend accepted the record.
    pub fn is_fully_stored(&self) -> bool {
        self.outcome() == StoreOutcome::FullyStored
    }

    /// Result for one backend, if it was attempted.
    pub fn get(&self, backend: BackendName) -> Option<&Result<String, StoreError>> {
        self.per_backend.get(&backend)
    }
}

/// Writes records to every configured backend.
pub struct StorageGateway {
    connection: Arc<ConnectionManager>,
    schema: Arc<SchemaManager>,
    mirror: Option<Arc<dyn TicketingMirror>>,
    index: Arc<MemoryIndex>,
}

impl StorageGateway {
    /// Create a gateway. `mirror` is `None` when no ticketing system is configured.
    pub fn new(
        connection: Arc<ConnectionManager>,
        schema: Arc<SchemaManager>,
        mirror: Option<Arc<dyn TicketingMirror>>,
        index: Arc<MemoryIndex>,
    ) -> Self {
        Self {
            connection,
            schema,
            mirror,
            index,
        }
    }

    /// Whether a ticketing mirror is configured.
    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// Validate and write `record` to every backend.
    ///
    /// Only validation failures are returned as `Err`; backend failures are
    /// reported per backend in the [`StorageResult`]. Successfully stored
    /// records are also cached in the memory index.
    pub async fn store(&self, mut record: TestCaseRecord) -> Result<StorageResult, ValidationError> {
        record.validate()?;
        let record_id = record.ensure_id();
        let start = Instant::now();

        let (vector, ticketing) = tokio::join!(self.write_vector(&record), self.write_mirror(&record));

        let mut per_backend = BTreeMap::new();
        per_backend.insert(BackendName::Vector, vector);
        if let Some(ticketing) = ticketing {
            per_backend.insert(BackendName::Ticketing, ticketing);
        }

        let result = StorageResult {
            record_id,
            per_backend,
        };

        for (backend, outcome) in &result.per_backend {
            if let Err(e) = outcome {
                warn!(backend = %backend, record_id = %result.record_id, error = %e, "Backend write failed");
            }
        }

        if result.any_succeeded() {
            self.index.insert(record);
        }

        info!(
            record_id = %result.record_id,
            outcome = ?result.outcome(),
            latency_ms = start.elapsed().as_millis(),
            "Stored test case"
        );
        Ok(result)
    }

    async fn write_vector(&self, record: &TestCaseRecord) -> Result<String, StoreError> {
        self.connection.ensure_connected().await?;
        self.schema.ensure_schema().await?;
        let backend = self.connection.backend().await?;

        let id = backend
            .insert_object(
                self.schema.class_name(),
                record.id.as_deref(),
                &record.to_properties(),
            )
            .await?;
        debug!(id = %id, "Vector backend accepted record");
        Ok(id)
    }

    async fn write_mirror(&self, record: &TestCaseRecord) -> Option<Result<String, StoreError>> {
        let mirror = self.mirror.as_ref()?;
        Some(
            mirror
                .create_test_case(record)
                .await
                .map_err(StoreError::from),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fakes::{FakeBackend, FakeConnector};
    use crate::error::TicketingError;
    use crate::records::TestStep;
    use crate::retry::RetryPolicy;
    use crate::schema::{metadata_class, test_case_class};
    use crate::ticketing::MockTicketingMirror;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        backend: Arc<FakeBackend>,
        connector: Arc<FakeConnector>,
        index: Arc<MemoryIndex>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_failures(0)
        }

        fn with_failures(failures: u32) -> Self {
            let backend = FakeBackend::new();
            Self {
                connector: FakeConnector::failing(backend.clone(), failures),
                backend,
                index: Arc::new(MemoryIndex::new(100)),
            }
        }

        fn gateway(&self, mirror: Option<Arc<dyn TicketingMirror>>) -> StorageGateway {
            let connection = Arc::new(ConnectionManager::new(
                self.connector.clone(),
                RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
            ));
            let schema = Arc::new(SchemaManager::new(
                connection.clone(),
                test_case_class("TestCase", "text2vec-openai"),
                metadata_class("Metadata"),
            ));
            StorageGateway::new(connection, schema, mirror, self.index.clone())
        }
    }

    fn record() -> TestCaseRecord {
        TestCaseRecord::new("Password Reset Test", "Verify reset email is sent").with_step(
            TestStep::new("Click forgot password", "", "Reset email sent"),
        )
    }

    fn mirror_returning(key: &'static str) -> Arc<dyn TicketingMirror> {
        let mut mock = MockTicketingMirror::new();
        mock.expect_create_test_case()
            .times(1)
            .returning(move |_| Ok(key.to_string()));
        Arc::new(mock)
    }

    fn failing_mirror() -> Arc<dyn TicketingMirror> {
        let mut mock = MockTicketingMirror::new();
        mock.expect_create_test_case().times(1).returning(|_| {
            Err(TicketingError::Api {
                status: 401,
                message: "unauthorized".to_string(),
            })
        });
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_empty_title_makes_no_backend_calls() {
        let harness = Harness::new();
        let mut mock = MockTicketingMirror::new();
        mock.expect_create_test_case().times(0);
        let gateway = harness.gateway(Some(Arc::new(mock)));

        let err = gateway
            .store(TestCaseRecord::new("", "desc"))
            .await
            .unwrap_err();

        assert_eq!(err.field, "title");
        assert_eq!(harness.backend.total_calls(), 0);
        assert_eq!(harness.connector.calls(), 0);
        assert!(harness.index.is_empty());
    }

    #[tokio::test]
    async fn test_vector_only_fully_stored() {
        let harness = Harness::new();
        let gateway = harness.gateway(None);

        let result = gateway.store(record()).await.unwrap();

        assert_eq!(result.outcome(), StoreOutcome::FullyStored);
        assert!(result.get(BackendName::Ticketing).is_none());
        let id = result.get(BackendName::Vector).unwrap().as_ref().unwrap();
        assert_eq!(id, &result.record_id);

        let stored = harness.backend.object("TestCase", id).unwrap();
        assert_eq!(stored["title"], "Password Reset Test");
        assert_eq!(harness.index.len(), 1);
    }

    #[tokio::test]
    async fn test_both_backends_succeed() {
        let harness = Harness::new();
        let gateway = harness.gateway(Some(mirror_returning("QADEMO-T1")));

        let result = gateway.store(record()).await.unwrap();

        assert!(result.is_fully_stored());
        assert_eq!(
            result.get(BackendName::Ticketing).unwrap().as_deref().ok(),
            Some("QADEMO-T1")
        );
    }

    #[tokio::test]
    async fn test_mirror_failure_is_partial() {
        let harness = Harness::new();
        let gateway = harness.gateway(Some(failing_mirror()));

        let result = gateway.store(record()).await.unwrap();

        assert_eq!(result.outcome(), StoreOutcome::PartiallyStored);
        assert!(result.get(BackendName::Vector).unwrap().is_ok());
        assert!(matches!(
            result.get(BackendName::Ticketing),
            Some(Err(StoreError::Ticketing { .. }))
        ));
        // Vector write is kept
        assert_eq!(harness.backend.insert_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.index.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_with_mirror_is_partial() {
        let harness = Harness::with_failures(10);
        let gateway = harness.gateway(Some(mirror_returning("QADEMO-T2")));

        let result = gateway.store(record()).await.unwrap();

        assert_eq!(result.outcome(), StoreOutcome::PartiallyStored);
        assert!(matches!(
            result.get(BackendName::Vector),
            Some(Err(StoreError::Connection(_)))
        ));
        assert_eq!(harness.index.len(), 1);
    }

    #[tokio::test]
    async fn test_everything_down_is_failed() {
        let harness = Harness::with_failures(10);
        let gateway = harness.gateway(Some(failing_mirror()));

        let result = gateway.store(record()).await.unwrap();

        assert_eq!(result.outcome(), StoreOutcome::Failed);
        assert!(!result.any_succeeded());
        assert!(harness.index.is_empty());
    }

    #[tokio::test]
    async fn test_write_rejection_reported() {
        let harness = Harness::new();
        let gateway = harness.gateway(None);
        gateway.schema.ensure_schema().await.unwrap();
        harness.backend.fail_writes.store(true, Ordering::SeqCst);

        let result = gateway.store(record()).await.unwrap();

        assert_eq!(result.outcome(), StoreOutcome::Failed);
        assert!(matches!(
            result.get(BackendName::Vector),
            Some(Err(StoreError::Backend { .. }))
        ));
    }

    #[tokio::test]
    async fn test_schema_failure_reported_per_backend() {
        let harness = Harness::new();
        harness.backend.fail_create_class.store(true, Ordering::SeqCst);
        let gateway = harness.gateway(Some(mirror_returning("QADEMO-T3")));

        let result = gateway.store(record()).await.unwrap();

        assert!(matches!(
            result.get(BackendName::Vector),
            Some(Err(StoreError::Schema(_)))
        ));
        assert!(result.get(BackendName::Ticketing).unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_schema_initialized_once_across_stores() {
        let harness = Harness::new();
        let gateway = harness.gateway(None);

        gateway.store(record()).await.unwrap();
        gateway
            .store(TestCaseRecord::new("Second", "Another record"))
            .await
            .unwrap();

        assert_eq!(harness.backend.create_class_calls.load(Ordering::SeqCst), 2);
        assert_eq!(harness.backend.insert_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_outcome_classification() {
        let mut per_backend = BTreeMap::new();
        per_backend.insert(BackendName::Vector, Ok("a".to_string()));
        let result = StorageResult {
            record_id: "a".to_string(),
            per_backend,
        };
        assert_eq!(result.outcome(), StoreOutcome::FullyStored);
        assert_eq!(BackendName::Ticketing.to_string(), "ticketing");
    }
}
