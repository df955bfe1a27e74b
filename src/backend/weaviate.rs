use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{
    BackendConnector, ClassDefinition, ObjectHit, ObjectQuery, PropertyDefinition, QueryKind,
    VectorBackend,
};
use crate::config::{RequestConfig, WeaviateConfig};
use crate::error::{BackendError, BackendResult};

/// Dials a Weaviate instance over REST
#[derive(Clone)]
pub struct WeaviateConnector {
    base_url: String,
    api_key: Option<String>,
    vectorizer_api_key: Option<String>,
    request_config: RequestConfig,
}

impl WeaviateConnector {
    /// Create a new connector
    pub fn new(config: &WeaviateConfig, request_config: RequestConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            vectorizer_api_key: config.vectorizer_api_key.clone(),
            request_config,
        }
    }
}

#[async_trait]
impl BackendConnector for WeaviateConnector {
    async fn connect(&self) -> BackendResult<Arc<dyn VectorBackend>> {
        let client = Client::builder()
            .connect_timeout(self.request_config.connect_timeout())
            .timeout(self.request_config.timeout())
            .build()
            .map_err(BackendError::Http)?;

        let backend = WeaviateBackend {
            client,
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            vectorizer_api_key: self.vectorizer_api_key.clone(),
            timeout_ms: self.request_config.timeout_ms,
        };

        let start = Instant::now();
        let meta = backend.meta().await?;
        let version = meta
            .get("version")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        info!(
            url = %self.base_url,
            version,
            latency_ms = start.elapsed().as_millis(),
            "Weaviate handshake succeeded"
        );

        Ok(Arc::new(backend))
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

/// A live Weaviate client. Dropping it releases the connection pool.
pub struct WeaviateBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    vectorizer_api_key: Option<String>,
    timeout_ms: u64,
}

impl WeaviateBackend {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(key) = &self.vectorizer_api_key {
            builder = builder.header("X-OpenAI-Api-Key", key);
        }
        builder
    }

    /// Send a request, mapping transport failures and non-2xx statuses
    async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                BackendError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(response)
    }

    async fn json(response: Response, what: &str) -> BackendResult<Value> {
        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                message: format!("Failed to parse {} response: {}", what, e),
            })
    }

    async fn meta(&self) -> BackendResult<Value> {
        let response = self.send(self.request(Method::GET, "/v1/meta")).await?;
        Self::json(response, "meta").await
    }
}

#[async_trait]
impl VectorBackend for WeaviateBackend {
    async fn is_ready(&self) -> BackendResult<bool> {
        match self
            .send(self.request(Method::GET, "/v1/.well-known/ready"))
            .await
        {
            Ok(_) => Ok(true),
            Err(BackendError::Api { status: 503, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_classes(&self) -> BackendResult<Vec<ClassDefinition>> {
        let response = self.send(self.request(Method::GET, "/v1/schema")).await?;
        let body = Self::json(response, "schema").await?;

        match body.get("classes") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(classes) => serde_json::from_value(classes.clone()).map_err(|e| {
                BackendError::InvalidResponse {
                    message: format!("Malformed class list: {}", e),
                }
            }),
        }
    }

    async fn create_class(&self, class: &ClassDefinition) -> BackendResult<()> {
        info!(class = %class.name, "Creating Weaviate class");
        self.send(self.request(Method::POST, "/v1/schema").json(class))
            .await?;
        Ok(())
    }

    async fn add_property(&self, class: &str, property: &PropertyDefinition) -> BackendResult<()> {
        info!(class = %class, property = %property.name, "Adding Weaviate property");
        let path = format!("/v1/schema/{}/properties", class);
        self.send(self.request(Method::POST, &path).json(property))
            .await?;
        Ok(())
    }

    async fn insert_object(
        &self,
        class: &str,
        id: Option<&str>,
        properties: &Value,
    ) -> BackendResult<String> {
        let mut body = json!({ "class": class, "properties": properties });
        if let Some(id) = id {
            body["id"] = json!(id);
        }

        let response = self
            .send(self.request(Method::POST, "/v1/objects").json(&body))
            .await?;
        let created = Self::json(response, "object create").await?;

        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::InvalidResponse {
                message: "create response has no id".to_string(),
            })
    }

    async fn put_object(&self, class: &str, id: &str, properties: &Value) -> BackendResult<()> {
        let path = format!("/v1/objects/{}/{}", class, id);
        let exists = match self.send(self.request(Method::HEAD, &path)).await {
            Ok(_) => true,
            Err(BackendError::Api { status: 404, .. }) => false,
            Err(e) => return Err(e),
        };

        if exists {
            let body = json!({ "class": class, "id": id, "properties": properties });
            self.send(self.request(Method::PUT, &path).json(&body))
                .await?;
        } else {
            self.insert_object(class, Some(id), properties).await?;
        }
        Ok(())
    }

    async fn get_object(&self, class: &str, id: &str) -> BackendResult<Option<Value>> {
        let path = format!("/v1/objects/{}/{}", class, id);
        match self.send(self.request(Method::GET, &path)).await {
            Ok(response) => {
                let body = Self::json(response, "object").await?;
                Ok(body.get("properties").cloned())
            }
            Err(BackendError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn query(&self, query: &ObjectQuery) -> BackendResult<Vec<ObjectHit>> {
        let graphql = build_graphql(query);
        debug!(class = %query.class, limit = query.limit, "Running Weaviate query");

        let response = self
            .send(
                self.request(Method::POST, "/v1/graphql")
                    .json(&json!({ "query": graphql })),
            )
            .await?;
        let body = Self::json(response, "graphql").await?;

        parse_hits(&body, &query.class)
    }
}

fn quote(s: &str) -> String {
    // GraphQL string literals share JSON's escaping rules
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Render an [`ObjectQuery`] as a GraphQL `Get` query.
pub(crate) fn build_graphql(query: &ObjectQuery) -> String {
    let mut args = vec![format!("limit: {}", query.limit)];

    let additional = match &query.kind {
        Some(QueryKind::NearText { concepts }) => {
            let concepts: Vec<String> = concepts.iter().map(|c| quote(c)).collect();
            args.push(format!("nearText: {{concepts: [{}]}}", concepts.join(", ")));
            "id distance certainty"
        }
        Some(QueryKind::Hybrid { query: text, alpha }) => {
            args.push(format!("hybrid: {{query: {}, alpha: {}}}", quote(text), alpha));
            "id score"
        }
        None => "id",
    };

    if let Some((path, value)) = &query.equals {
        args.push(format!(
            "where: {{path: [{}], operator: Equal, valueText: {}}}",
            quote(path),
            quote(value)
        ));
    }

    format!(
        "{{ Get {{ {}({}) {{ {} _additional {{ {} }} }} }} }}",
        query.class,
        args.join(", "),
        query.fields.join(" "),
        additional
    )
}

fn parse_hits(body: &Value, class: &str) -> BackendResult<Vec<ObjectHit>> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BackendError::Query { message });
        }
    }

    let Some(items) = body
        .get("data")
        .and_then(|d| d.get("Get"))
        .and_then(|g| g.get(class))
    else {
        return Err(BackendError::InvalidResponse {
            message: format!("graphql response has no data.Get.{}", class),
        });
    };

    let items = match items {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => {
            return Err(BackendError::InvalidResponse {
                message: format!("data.Get.{} is not a list", class),
            })
        }
    };

    Ok(items.iter().map(parse_hit).collect())
}

fn parse_hit(item: &Value) -> ObjectHit {
    let mut properties = item.clone();
    let additional = properties
        .as_object_mut()
        .and_then(|obj| obj.remove("_additional"))
        .unwrap_or(Value::Null);

    // Weaviate renders some scores as strings
    let number = |key: &str| match additional.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };

    ObjectHit {
        id: additional
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string),
        properties,
        distance: number("distance"),
        certainty: number("certainty"),
        score: number("score"),
    }
}
