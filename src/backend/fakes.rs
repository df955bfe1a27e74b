//! In-process backend doubles for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{
    BackendConnector, ClassDefinition, ObjectHit, ObjectQuery, PropertyDefinition, VectorBackend,
};
use crate::error::{BackendError, BackendResult};

fn unavailable(message: &str) -> BackendError {
    BackendError::Api {
        status: 503,
        message: message.to_string(),
    }
}

/// Vector backend held entirely in memory, counting every call.
pub struct FakeBackend {
    pub classes: Mutex<Vec<ClassDefinition>>,
    pub objects: Mutex<HashMap<(String, String), Value>>,
    pub canned_hits: Mutex<Vec<ObjectHit>>,
    pub ready: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_queries: AtomicBool,
    pub fail_create_class: AtomicBool,
    pub fail_reads: AtomicBool,
    /// Listings still to answer with an empty schema
    pub stale_lists: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub create_class_calls: AtomicUsize,
    pub add_property_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            classes: Mutex::new(Vec::new()),
            objects: Mutex::new(HashMap::new()),
            canned_hits: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
            fail_create_class: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            stale_lists: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            create_class_calls: AtomicUsize::new(0),
            add_property_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_hits(&self, hits: Vec<ObjectHit>) {
        *self.canned_hits.lock().unwrap() = hits;
    }

    pub fn object(&self, class: &str, id: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&(class.to_string(), id.to_string()))
            .cloned()
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.create_class_calls.load(Ordering::SeqCst)
            + self.add_property_calls.load(Ordering::SeqCst)
            + self.insert_calls.load(Ordering::SeqCst)
            + self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorBackend for FakeBackend {
    async fn is_ready(&self) -> BackendResult<bool> {
        Ok(self.ready.load(Ordering::SeqCst))
    }

    async fn list_classes(&self) -> BackendResult<Vec<ClassDefinition>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let stale = self
            .stale_lists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(Vec::new());
        }
        Ok(self.classes.lock().unwrap().clone())
    }

    async fn create_class(&self, class: &ClassDefinition) -> BackendResult<()> {
        self.create_class_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_class.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 422,
                message: "invalid dataType".to_string(),
            });
        }
        let mut classes = self.classes.lock().unwrap();
        if classes.iter().any(|c| c.name == class.name) {
            return Err(BackendError::Api {
                status: 422,
                message: format!("class {} already exists", class.name),
            });
        }
        classes.push(class.clone());
        Ok(())
    }

    async fn add_property(&self, class: &str, property: &PropertyDefinition) -> BackendResult<()> {
        self.add_property_calls.fetch_add(1, Ordering::SeqCst);
        let mut classes = self.classes.lock().unwrap();
        let target = classes
            .iter_mut()
            .find(|c| c.name == class)
            .ok_or_else(|| unavailable("no such class"))?;
        target.properties.push(property.clone());
        Ok(())
    }

    async fn insert_object(
        &self,
        class: &str,
        id: Option<&str>,
        properties: &Value,
    ) -> BackendResult<String> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("write refused"));
        }
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.objects
            .lock()
            .unwrap()
            .insert((class.to_string(), id.clone()), properties.clone());
        Ok(id)
    }

    async fn put_object(&self, class: &str, id: &str, properties: &Value) -> BackendResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable("write refused"));
        }
        self.objects
            .lock()
            .unwrap()
            .insert((class.to_string(), id.to_string()), properties.clone());
        Ok(())
    }

    async fn get_object(&self, class: &str, id: &str) -> BackendResult<Option<Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable("read refused"));
        }
        Ok(self.object(class, id))
    }

    async fn query(&self, query: &ObjectQuery) -> BackendResult<Vec<ObjectHit>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(unavailable("query refused"));
        }

        if let Some((field, value)) = &query.equals {
            let objects = self.objects.lock().unwrap();
            return Ok(objects
                .iter()
                .filter(|((class, _), props)| {
                    class == &query.class
                        && props.get(field).and_then(Value::as_str) == Some(value.as_str())
                })
                .take(query.limit)
                .map(|((_, id), props)| ObjectHit {
                    id: Some(id.clone()),
                    properties: props.clone(),
                    ..Default::default()
                })
                .collect());
        }

        let hits = self.canned_hits.lock().unwrap();
        Ok(hits.iter().take(query.limit).cloned().collect())
    }
}

/// Connector that fails a scripted number of times before succeeding.
pub struct FakeConnector {
    pub backend: Arc<FakeBackend>,
    pub failures_remaining: AtomicU32,
    pub connect_calls: AtomicU32,
}

impl FakeConnector {
    pub fn new(backend: Arc<FakeBackend>) -> Arc<Self> {
        Self::failing(backend, 0)
    }

    pub fn failing(backend: Arc<FakeBackend>, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            backend,
            failures_remaining: AtomicU32::new(failures),
            connect_calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendConnector for FakeConnector {
    async fn connect(&self) -> BackendResult<Arc<dyn VectorBackend>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(unavailable("connection refused"));
        }
        Ok(self.backend.clone())
    }

    fn endpoint(&self) -> &str {
        "fake://backend"
    }
}
