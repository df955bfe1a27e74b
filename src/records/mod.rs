//! Test case records and their persisted shape.
//!
//! A [`TestCaseRecord`] is produced by the generation layer, validated once,
//! and written to every configured backend. Steps are persisted as readable
//! `Step / Test Data / Expected Result` text blocks so the backend's vectorizer
//! sees natural language.

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{BackendError, BackendResult, ValidationError};

const STEP_MARKER: &str = "Step: ";
const TEST_DATA_MARKER: &str = "\nTest Data: ";
const EXPECTED_MARKER: &str = "\nExpected Result: ";

/// A single test step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    /// What the tester does.
    pub action: String,
    /// Input data for the step (may be empty).
    pub test_data: String,
    /// Observable outcome.
    pub expected_result: String,
}

impl TestStep {
    /// Create a new step.
    pub fn new(
        action: impl Into<String>,
        test_data: impl Into<String>,
        expected_result: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            test_data: test_data.into(),
            expected_result: expected_result.into(),
        }
    }

    /// Render the step in its stored text form.
    pub fn to_stored(&self) -> String {
        format!(
            "{}{}{}{}{}{}",
            STEP_MARKER,
            self.action,
            TEST_DATA_MARKER,
            self.test_data,
            EXPECTED_MARKER,
            self.expected_result
        )
    }

    /// Parse a step from its stored text form.
    ///
    /// Text without markers is treated as a bare action.
    pub fn parse_stored(text: &str) -> Self {
        let Some(body) = text.strip_prefix(STEP_MARKER) else {
            return Self::new(text, "", "");
        };

        let (head, expected) = split_once_marker(body, EXPECTED_MARKER);
        let (action, test_data) = split_once_marker(head, TEST_DATA_MARKER);

        Self::new(action, test_data, expected)
    }

    fn has_reserved_marker(&self) -> bool {
        [&self.action, &self.test_data, &self.expected_result]
            .iter()
            .any(|field| field.contains(TEST_DATA_MARKER) || field.contains(EXPECTED_MARKER))
    }
}

fn split_once_marker<'a>(text: &'a str, marker: &str) -> (&'a str, &'a str) {
    text.split_once(marker).unwrap_or((text, ""))
}

/// Test case priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Normal => "Normal",
            Priority::High => "High",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" | "medium" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Automation status of a test case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutomationStatus {
    #[default]
    NotStarted,
    Recommended,
    Automated,
    #[serde(rename = "TBD")]
    Tbd,
}

impl AutomationStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationStatus::NotStarted => "Not Started",
            AutomationStatus::Recommended => "Recommended",
            AutomationStatus::Automated => "Automated",
            AutomationStatus::Tbd => "TBD",
        }
    }
}

impl std::fmt::Display for AutomationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AutomationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "").as_str() {
            "notstarted" | "no" => Ok(AutomationStatus::NotStarted),
            "recommended" | "yes" => Ok(AutomationStatus::Recommended),
            "automated" => Ok(AutomationStatus::Automated),
            "tbd" => Ok(AutomationStatus::Tbd),
            _ => Err(format!("Unknown automation status: {}", s)),
        }
    }
}

/// The unit of storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseRecord {
    /// Backend object id. Generated client-side on first write when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub steps: Vec<TestStep>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub automation_status: AutomationStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl TestCaseRecord {
    /// Create a new record with the given title and description.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            title: title.into(),
            description: description.into(),
            preconditions: Vec::new(),
            steps: Vec::new(),
            tags: BTreeSet::new(),
            priority: Priority::default(),
            automation_status: AutomationStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set an explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append a precondition.
    pub fn with_precondition(mut self, precondition: impl Into<String>) -> Self {
        self.preconditions.push(precondition.into());
        self
    }

    /// Append a step.
    pub fn with_step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the automation status.
    pub fn with_automation_status(mut self, status: AutomationStatus) -> Self {
        self.automation_status = status;
        self
    }

    /// Return the id, assigning a fresh UUID if none is set.
    pub fn ensure_id(&mut self) -> String {
        self.id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    /// Check the write invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::new("title", "must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::new("description", "must not be empty"));
        }
        if let Some(idx) = self.steps.iter().position(TestStep::has_reserved_marker) {
            return Err(ValidationError::new(
                format!("steps[{}]", idx),
                "contains a reserved line marker",
            ));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::new("tags", "must not contain empty tags"));
        }
        if let Some(id) = &self.id {
            if Uuid::parse_str(id).is_err() {
                return Err(ValidationError::new("id", "must be a UUID"));
            }
        }
        Ok(())
    }

    /// Map into the backend's property object.
    pub fn to_properties(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "preconditions": self.preconditions,
            "steps": self.steps.iter().map(TestStep::to_stored).collect::<Vec<_>>(),
            "tags": self.tags.iter().collect::<Vec<_>>(),
            "priority": self.priority.as_str(),
            "automationStatus": self.automation_status.as_str(),
            "createdAt": self.created_at.to_rfc3339(),
            "updatedAt": self.updated_at.to_rfc3339(),
        })
    }

    /// Rebuild a record from a backend property object.
    ///
    /// Only `title` is mandatory; partial projections fill the rest with defaults.
    pub fn from_properties(id: Option<String>, props: &Value) -> BackendResult<Self> {
        let title = props
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::InvalidResponse {
                message: "object is missing title".to_string(),
            })?;

        let text = |key: &str| {
            props
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let list = |key: &str| -> Vec<String> {
            props
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        let timestamp = |key: &str| {
            props
                .get(key)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now)
        };

        Ok(Self {
            id,
            title: title.to_string(),
            description: text("description"),
            preconditions: list("preconditions"),
            steps: list("steps")
                .iter()
                .map(|s| TestStep::parse_stored(s))
                .collect(),
            tags: list("tags").into_iter().collect(),
            priority: text("priority").parse().unwrap_or_default(),
            automation_status: text("automationStatus").parse().unwrap_or_default(),
            created_at: timestamp("createdAt"),
            updated_at: timestamp("updatedAt"),
        })
    }
}
