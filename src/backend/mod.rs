//! Vector-search backend client.
//!
//! [`BackendConnector`] dials the backend and hands back a live
//! [`VectorBackend`] handle; the connection manager owns that handle and
//! drops it on close. `weaviate` is the REST/GraphQL implementation.

mod weaviate;

#[cfg(test)]
pub(crate) mod fakes;

pub use weaviate::{WeaviateBackend, WeaviateConnector};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendResult;

/// A property in a class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(rename = "dataType")]
    pub data_type: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inverted-index tokenization, e.g. `field` for whole-value matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenization: Option<String>,
}

impl PropertyDefinition {
    /// Create a property with a single data type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: vec![data_type.into()],
            description: None,
            tokenization: None,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the tokenization used by filters on this property.
    pub fn with_tokenization(mut self, tokenization: impl Into<String>) -> Self {
        self.tokenization = Some(tokenization.into());
        self
    }
}

/// A collection/class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefinition {
    #[serde(rename = "class")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectorizer: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

impl ClassDefinition {
    /// Names of all declared properties.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    /// Whether a property with this name is declared.
    pub fn has_property(&self, name: &str) -> bool {
        self.property_names().any(|n| n == name)
    }
}

/// How a similarity query is issued.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryKind {
    /// Semantic nearest-neighbour on the text
    NearText { concepts: Vec<String> },
    /// Keyword + vector fusion
    Hybrid { query: String, alpha: f64 },
}

/// A similarity or filter query.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectQuery {
    pub class: String,
    pub fields: Vec<String>,
    pub kind: Option<QueryKind>,
    /// Equality filter `(property, value)`
    pub equals: Option<(String, String)>,
    pub limit: usize,
}

impl ObjectQuery {
    /// Create a query returning `fields` from `class`.
    pub fn new(class: impl Into<String>, fields: Vec<String>, limit: usize) -> Self {
        Self {
            class: class.into(),
            fields,
            kind: None,
            equals: None,
            limit,
        }
    }

    /// Semantic query on the given text.
    pub fn near_text(mut self, text: impl Into<String>) -> Self {
        self.kind = Some(QueryKind::NearText {
            concepts: vec![text.into()],
        });
        self
    }

    /// Hybrid keyword/vector query.
    pub fn hybrid(mut self, text: impl Into<String>, alpha: f64) -> Self {
        self.kind = Some(QueryKind::Hybrid {
            query: text.into(),
            alpha,
        });
        self
    }

    /// Restrict to objects whose `property` equals `value`.
    pub fn where_equal(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals = Some((property.into(), value.into()));
        self
    }
}

/// One object returned by a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectHit {
    pub id: Option<String>,
    pub properties: Value,
    pub distance: Option<f64>,
    pub certainty: Option<f64>,
    /// Fusion score from hybrid queries
    pub score: Option<f64>,
}

impl ObjectHit {
    /// Similarity normalized to `[0, 1]`.
    ///
    /// Prefers `1 - distance`, then certainty, then the hybrid score.
    pub fn normalized_score(&self) -> f64 {
        let raw = self
            .distance
            .map(|d| 1.0 - d)
            .or(self.certainty)
            .or(self.score)
            .unwrap_or(0.0);
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }
}

/// Operations the storage layer needs from a connected vector backend.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Readiness probe. `Ok(false)` means reachable but not ready.
    async fn is_ready(&self) -> BackendResult<bool>;

    /// List all class definitions.
    async fn list_classes(&self) -> BackendResult<Vec<ClassDefinition>>;

    /// Create a class.
    async fn create_class(&self, class: &ClassDefinition) -> BackendResult<()>;

    /// Add a property to an existing class.
    async fn add_property(&self, class: &str, property: &PropertyDefinition) -> BackendResult<()>;

    /// Insert an object, returning the id the backend assigned or accepted.
    async fn insert_object(
        &self,
        class: &str,
        id: Option<&str>,
        properties: &Value,
    ) -> BackendResult<String>;

    /// Create or replace the object at `id`.
    async fn put_object(&self, class: &str, id: &str, properties: &Value) -> BackendResult<()>;

    /// Fetch an object's properties by id.
    async fn get_object(&self, class: &str, id: &str) -> BackendResult<Option<Value>>;

    /// Run a similarity and/or filter query.
    async fn query(&self, query: &ObjectQuery) -> BackendResult<Vec<ObjectHit>>;
}

/// Establishes connections to the vector backend.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Perform the handshake and return a live handle.
    async fn connect(&self) -> BackendResult<Arc<dyn VectorBackend>>;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> &str;
}
