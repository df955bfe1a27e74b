//! Record schema declaration and versioning.
//!
//! Initialization checks for the classes first and only creates what is
//! missing, so concurrent process starts never depend on swallowing an
//! "already exists" error.

use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{ClassDefinition, PropertyDefinition, VectorBackend};
use crate::config::WeaviateConfig;
use crate::connection::ConnectionManager;
use crate::error::SchemaError;

/// Version of the declared record schema.
pub const SCHEMA_VERSION: &str = "1.0.0";

const VERSION_KEY: &str = "schema_version";

/// The marker object stored in the metadata class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub key: String,
    pub value: String,
}

impl SchemaVersion {
    /// Marker for the given version string.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            key: VERSION_KEY.to_string(),
            value: value.into(),
        }
    }

    /// Deterministic object id, so rewriting the marker overwrites it.
    pub fn object_id() -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, VERSION_KEY.as_bytes())
    }
}

/// Declared property set of the record class.
pub fn test_case_properties() -> Vec<PropertyDefinition> {
    vec![
        PropertyDefinition::new("title", "text")
            .with_description("Name of the test case")
            .with_tokenization("field"),
        PropertyDefinition::new("description", "text").with_description("Test case objective"),
        PropertyDefinition::new("preconditions", "text[]"),
        PropertyDefinition::new("steps", "text[]")
            .with_description("Steps with test data and expected results"),
        PropertyDefinition::new("tags", "text[]"),
        PropertyDefinition::new("priority", "text"),
        PropertyDefinition::new("automationStatus", "text"),
        PropertyDefinition::new("createdAt", "date"),
        PropertyDefinition::new("updatedAt", "date"),
    ]
}

/// The record class definition.
pub fn test_case_class(name: &str, vectorizer: &str) -> ClassDefinition {
    ClassDefinition {
        name: name.to_string(),
        description: Some("Generated test case with steps".to_string()),
        vectorizer: Some(vectorizer.to_string()),
        properties: test_case_properties(),
    }
}

/// The metadata class holding the version marker.
pub fn metadata_class(name: &str) -> ClassDefinition {
    ClassDefinition {
        name: name.to_string(),
        description: Some("Schema bookkeeping".to_string()),
        vectorizer: Some("none".to_string()),
        properties: vec![
            PropertyDefinition::new("key", "text"),
            PropertyDefinition::new("value", "text"),
        ],
    }
}

/// Creates, upgrades and versions the backend schema.
pub struct SchemaManager {
    connection: Arc<ConnectionManager>,
    test_case_class: ClassDefinition,
    metadata_class: ClassDefinition,
    expected_version: String,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
}

impl SchemaManager {
    /// Create a manager for the given class definitions.
    pub fn new(
        connection: Arc<ConnectionManager>,
        test_case_class: ClassDefinition,
        metadata_class: ClassDefinition,
    ) -> Self {
        Self {
            connection,
            test_case_class,
            metadata_class,
            expected_version: SCHEMA_VERSION.to_string(),
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
        }
    }

    /// Create a manager from backend configuration.
    pub fn from_config(connection: Arc<ConnectionManager>, config: &WeaviateConfig) -> Self {
        Self::new(
            connection,
            test_case_class(&config.class_name, &config.vectorizer),
            metadata_class(&config.metadata_class),
        )
    }

    /// Override the expected version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = version.into();
        self
    }

    /// Name of the record class.
    pub fn class_name(&self) -> &str {
        &self.test_case_class.name
    }

    /// Property names selected when reading records back.
    pub fn record_fields(&self) -> Vec<String> {
        self.test_case_class
            .property_names()
            .map(str::to_string)
            .collect()
    }

    /// Whether this process has already verified the schema.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(atomic::Ordering::Acquire)
    }

    /// Make sure both classes exist at the expected version.
    ///
    /// Cheap no-op once it has succeeded in this process. A marker newer than
    /// the expected version is left in place.
    pub async fn ensure_schema(&self) -> Result<(), SchemaError> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let backend = self.connection.backend().await?;
        let classes = list_classes(backend.as_ref()).await?;

        let existing = classes.iter().find(|c| c.name == self.test_case_class.name);
        let has_metadata = classes.iter().any(|c| c.name == self.metadata_class.name);

        if existing.is_some() && has_metadata {
            if let Some(stored) = self.stored_version(backend.as_ref()).await? {
                match compare_versions(&stored, &self.expected_version) {
                    Ordering::Equal => {
                        info!(class = %self.test_case_class.name, "Schema already present");
                        self.initialized.store(true, atomic::Ordering::Release);
                        return Ok(());
                    }
                    Ordering::Greater => {
                        warn!(
                            stored = %stored,
                            expected = %self.expected_version,
                            "Stored schema is newer than this build, leaving it unchanged"
                        );
                        self.initialized.store(true, atomic::Ordering::Release);
                        return Ok(());
                    }
                    Ordering::Less => {}
                }
            }
        }

        match existing {
            Some(live) => {
                self.add_missing_properties(backend.as_ref(), live).await?;
            }
            None => self.create_class(backend.as_ref(), &self.test_case_class).await?,
        }
        if !has_metadata {
            self.create_class(backend.as_ref(), &self.metadata_class)
                .await?;
        }
        self.advance_version(backend.as_ref()).await?;

        self.initialized.store(true, atomic::Ordering::Release);
        Ok(())
    }

    /// Whether the stored version marker matches the expected version.
    pub async fn check_version(&self) -> bool {
        let backend = match self.connection.backend().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Cannot check schema version");
                return false;
            }
        };
        match self.stored_version(backend.as_ref()).await {
            Ok(stored) => stored.as_deref() == Some(self.expected_version.as_str()),
            Err(e) => {
                warn!(error = %e, "Cannot check schema version");
                false
            }
        }
    }

    /// Add any declared properties missing from the live class, then move
    /// the version marker forward. Returns how many properties were added.
    pub async fn upgrade(&self) -> Result<usize, SchemaError> {
        let backend = self.connection.backend().await?;
        let classes = list_classes(backend.as_ref()).await?;
        let live = classes
            .iter()
            .find(|c| c.name == self.test_case_class.name)
            .ok_or_else(|| SchemaError::Introspection {
                message: format!("class {} does not exist", self.test_case_class.name),
            })?;

        let added = self.add_missing_properties(backend.as_ref(), live).await?;
        self.advance_version(backend.as_ref()).await?;
        Ok(added)
    }

    /// Create `class`. A failed create still succeeds when a fresh listing
    /// shows the class with every declared property.
    async fn create_class(
        &self,
        backend: &dyn VectorBackend,
        class: &ClassDefinition,
    ) -> Result<(), SchemaError> {
        let error = match backend.create_class(class).await {
            Ok(()) => {
                info!(class = %class.name, properties = class.properties.len(), "Created class");
                return Ok(());
            }
            Err(e) => e,
        };

        let live = list_classes(backend)
            .await
            .ok()
            .and_then(|classes| classes.into_iter().find(|c| c.name == class.name));
        match live {
            Some(live) if class.property_names().all(|p| live.has_property(p)) => {
                info!(class = %class.name, "Class was created by another process");
                Ok(())
            }
            _ => Err(SchemaError::Creation {
                class: class.name.clone(),
                message: error.to_string(),
            }),
        }
    }

    async fn add_missing_properties(
        &self,
        backend: &dyn VectorBackend,
        live: &ClassDefinition,
    ) -> Result<usize, SchemaError> {
        let missing: Vec<&PropertyDefinition> = self
            .test_case_class
            .properties
            .iter()
            .filter(|p| !live.has_property(&p.name))
            .collect();

        for property in &missing {
            backend
                .add_property(&live.name, property)
                .await
                .map_err(|e| SchemaError::Upgrade {
                    class: live.name.clone(),
                    property: property.name.clone(),
                    message: e.to_string(),
                })?;
        }

        if !missing.is_empty() {
            info!(class = %live.name, added = missing.len(), "Upgraded class properties");
        }
        Ok(missing.len())
    }

    /// Read the marker. A missing or malformed marker is `None`.
    async fn stored_version(
        &self,
        backend: &dyn VectorBackend,
    ) -> Result<Option<String>, SchemaError> {
        let id = SchemaVersion::object_id().to_string();
        let props = backend
            .get_object(&self.metadata_class.name, &id)
            .await
            .map_err(|e| SchemaError::Introspection {
                message: format!("cannot read version marker: {}", e),
            })?;

        Ok(props.and_then(|props| match serde_json::from_value::<SchemaVersion>(props) {
            Ok(marker) => Some(marker.value),
            Err(e) => {
                debug!(error = %e, "Schema version marker malformed");
                None
            }
        }))
    }

    /// Write the expected version unless the stored one is already at or past it.
    async fn advance_version(&self, backend: &dyn VectorBackend) -> Result<(), SchemaError> {
        if let Some(stored) = self.stored_version(backend).await? {
            if compare_versions(&stored, &self.expected_version) != Ordering::Less {
                debug!(stored = %stored, "Schema version marker already current");
                return Ok(());
            }
        }

        let marker = SchemaVersion::new(&self.expected_version);
        backend
            .put_object(
                &self.metadata_class.name,
                &SchemaVersion::object_id().to_string(),
                &json!({ "key": marker.key, "value": marker.value }),
            )
            .await
            .map_err(|e| SchemaError::VersionMarker {
                message: e.to_string(),
            })?;
        info!(version = %self.expected_version, "Recorded schema version");
        Ok(())
    }
}

async fn list_classes(backend: &dyn VectorBackend) -> Result<Vec<ClassDefinition>, SchemaError> {
    backend
        .list_classes()
        .await
        .map_err(|e| SchemaError::Introspection {
            message: e.to_string(),
        })
}

/// Order dotted numeric versions. Unparseable versions that differ from the
/// expected one sort before it, so they get rewritten.
fn compare_versions(stored: &str, expected: &str) -> Ordering {
    match (parse_version(stored), parse_version(expected)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ if stored == expected => Ordering::Equal,
        _ => Ordering::Less,
    }
}

fn parse_version(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse().ok())
        .collect()
}
