use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::TicketingMirror;
use crate::config::{RequestConfig, ZephyrConfig};
use crate::error::{TicketingError, TicketingResult};
use crate::records::TestCaseRecord;
use crate::retry::RetryPolicy;

/// Step in the Zephyr Scale payload shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZephyrStep {
    pub description: String,
    pub test_data: String,
    pub expected_result: String,
}

/// Test case in the Zephyr Scale payload shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZephyrTestCase {
    pub project_key: String,
    pub name: String,
    pub objective: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precondition: Option<String>,
    pub priority_name: String,
    pub status_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    pub steps: Vec<ZephyrStep>,
}

impl ZephyrTestCase {
    /// Map a record into the Zephyr shape for `project_key`
    pub fn from_record(record: &TestCaseRecord, project_key: &str) -> Self {
        let precondition = if record.preconditions.is_empty() {
            None
        } else {
            Some(record.preconditions.join("\n"))
        };

        Self {
            project_key: project_key.to_string(),
            name: record.title.clone(),
            objective: record.description.clone(),
            precondition,
            priority_name: record.priority.as_str().to_uppercase(),
            status_name: "Draft".to_string(),
            labels: record.tags.iter().cloned().collect(),
            steps: record
                .steps
                .iter()
                .map(|s| ZephyrStep {
                    description: s.action.clone(),
                    test_data: s.test_data.clone(),
                    expected_result: s.expected_result.clone(),
                })
                .collect(),
        }
    }
}

/// Client for the Zephyr Scale REST API
#[derive(Clone)]
pub struct ZephyrClient {
    client: Client,
    base_url: String,
    api_key: String,
    project_key: String,
    timeout_ms: u64,
    retry: RetryPolicy,
}

impl ZephyrClient {
    /// Create a new Zephyr client
    pub fn new(config: &ZephyrConfig, request_config: &RequestConfig) -> TicketingResult<Self> {
        let client = Client::builder()
            .connect_timeout(request_config.connect_timeout())
            .timeout(request_config.timeout())
            .build()
            .map_err(TicketingError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            project_key: config.project_key.clone(),
            timeout_ms: request_config.timeout_ms,
            retry: RetryPolicy::from_config(request_config),
        })
    }

    /// Get the project key
    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    async fn send(&self, builder: RequestBuilder) -> TicketingResult<Response> {
        let response = builder
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TicketingError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    TicketingError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(TicketingError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }
        Ok(response)
    }

    async fn create_once(&self, payload: &ZephyrTestCase) -> TicketingResult<String> {
        let url = format!("{}/testcases", self.base_url);
        let response = self.send(self.client.post(&url).json(payload)).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| TicketingError::InvalidResponse {
                message: format!("Failed to parse create response: {}", e),
            })?;

        body.get("key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TicketingError::InvalidResponse {
                message: "create response has no key".to_string(),
            })
    }
}

#[async_trait]
impl TicketingMirror for ZephyrClient {
    async fn create_test_case(&self, record: &TestCaseRecord) -> TicketingResult<String> {
        let payload = ZephyrTestCase::from_record(record, &self.project_key);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let start = Instant::now();

            match self.create_once(&payload).await {
                Ok(key) => {
                    info!(
                        key = %key,
                        project = %self.project_key,
                        latency_ms = start.elapsed().as_millis(),
                        "Created Zephyr test case"
                    );
                    return Ok(key);
                }
                Err(e) => {
                    let decision = self.retry.after_failures(attempts);
                    if !e.is_retryable() || !decision.should_retry {
                        error!(
                            error = %e,
                            attempts,
                            latency_ms = start.elapsed().as_millis(),
                            "Zephyr create failed"
                        );
                        return Err(e);
                    }
                    warn!(
                        error = %e,
                        attempt = attempts,
                        delay_ms = decision.delay.as_millis(),
                        "Retrying Zephyr create"
                    );
                    tokio::time::sleep(decision.delay).await;
                }
            }
        }
    }

    async fn get_test_case(&self, key: &str) -> TicketingResult<Option<Value>> {
        let url = format!("{}/testcases/{}", self.base_url, key);
        debug!(key = %key, "Fetching Zephyr test case");

        match self
            .send(self.client.get(&url).header("Accept", "application/json"))
            .await
        {
            Ok(response) => {
                let body = response
                    .json()
                    .await
                    .map_err(|e| TicketingError::InvalidResponse {
                        message: format!("Failed to parse test case: {}", e),
                    })?;
                Ok(Some(body))
            }
            Err(TicketingError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
