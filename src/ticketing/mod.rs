//! Ticketing-system mirror.
//!
//! Each stored record is also written to an external test-management
//! service. The mirror is an independent sibling of the vector backend:
//! its failures are reported, never rolled back across.

mod zephyr;

pub use zephyr::{ZephyrClient, ZephyrStep, ZephyrTestCase};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TicketingResult;
use crate::records::TestCaseRecord;

/// Write side of the ticketing mirror.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketingMirror: Send + Sync {
    /// Create the test case, returning the created item key.
    async fn create_test_case(&self, record: &TestCaseRecord) -> TicketingResult<String>;

    /// Fetch a mirrored item by key.
    async fn get_test_case(&self, key: &str) -> TicketingResult<Option<Value>>;
}
