//! Unit tests for record types.
//!
//! Covers validation, enum string forms, the stored step format and the
//! backend property mapping.

use super::*;
use pretty_assertions::assert_eq;

fn password_reset() -> TestCaseRecord {
    TestCaseRecord::new("Password Reset Test", "Verify reset email is sent").with_step(
        TestStep::new("Click forgot password", "", "Reset email sent"),
    )
}

// Validation tests
#[test]
fn test_valid_record_passes() {
    assert!(password_reset().validate().is_ok());
}

#[test]
fn test_empty_title_rejected() {
    let record = TestCaseRecord::new("   ", "desc");
    let err = record.validate().unwrap_err();
    assert_eq!(err.field, "title");
}

#[test]
fn test_empty_description_rejected() {
    let record = TestCaseRecord::new("Title", "");
    let err = record.validate().unwrap_err();
    assert_eq!(err.field, "description");
}

#[test]
fn test_empty_steps_allowed() {
    let record = TestCaseRecord::new("Title", "desc");
    assert!(record.steps.is_empty());
    assert!(record.validate().is_ok());
}

#[test]
fn test_step_with_empty_fields_allowed() {
    let record = TestCaseRecord::new("Title", "desc").with_step(TestStep::new("", "", ""));
    assert!(record.validate().is_ok());
}

#[test]
fn test_step_with_reserved_marker_rejected() {
    let record = TestCaseRecord::new("Title", "desc")
        .with_step(TestStep::new("ok", "", "fine"))
        .with_step(TestStep::new("a\nExpected Result: b", "", ""));
    let err = record.validate().unwrap_err();
    assert_eq!(err.field, "steps[1]");
}

#[test]
fn test_blank_tag_rejected() {
    let record = TestCaseRecord::new("Title", "desc").with_tag(" ");
    assert_eq!(record.validate().unwrap_err().field, "tags");
}

#[test]
fn test_non_uuid_id_rejected() {
    let record = TestCaseRecord::new("Title", "desc").with_id("not-a-uuid");
    assert_eq!(record.validate().unwrap_err().field, "id");
}

#[test]
fn test_ensure_id_is_stable() {
    let mut record = TestCaseRecord::new("Title", "desc");
    let first = record.ensure_id();
    let second = record.ensure_id();
    assert_eq!(first, second);
    assert!(Uuid::parse_str(&first).is_ok());
}

// Enum tests
#[test]
fn test_priority_parsing() {
    assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
    assert_eq!("Medium".parse::<Priority>().unwrap(), Priority::Normal);
    assert_eq!("LOW".parse::<Priority>().unwrap(), Priority::Low);
    assert!("urgent".parse::<Priority>().is_err());
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn test_automation_status_parsing() {
    assert_eq!(
        "Not Started".parse::<AutomationStatus>().unwrap(),
        AutomationStatus::NotStarted
    );
    assert_eq!(
        "not_started".parse::<AutomationStatus>().unwrap(),
        AutomationStatus::NotStarted
    );
    assert_eq!(
        "Yes".parse::<AutomationStatus>().unwrap(),
        AutomationStatus::Recommended
    );
    assert_eq!("tbd".parse::<AutomationStatus>().unwrap(), AutomationStatus::Tbd);
    assert_eq!(AutomationStatus::Tbd.to_string(), "TBD");
}

#[test]
fn test_automation_status_serde() {
    let json = serde_json::to_string(&AutomationStatus::Tbd).unwrap();
    assert_eq!(json, "\"TBD\"");
    let parsed: AutomationStatus = serde_json::from_str("\"Automated\"").unwrap();
    assert_eq!(parsed, AutomationStatus::Automated);
}

// Stored step format tests
#[test]
fn test_step_stored_form() {
    let step = TestStep::new("Click forgot password", "user@example.com", "Reset email sent");
    assert_eq!(
        step.to_stored(),
        "Step: Click forgot password\nTest Data: user@example.com\nExpected Result: Reset email sent"
    );
}

#[test]
fn test_step_parse_with_empty_test_data() {
    let step = TestStep::new("Click forgot password", "", "Reset email sent");
    assert_eq!(TestStep::parse_stored(&step.to_stored()), step);
}

#[test]
fn test_step_parse_bare_text() {
    let step = TestStep::parse_stored("Open the login page");
    assert_eq!(step, TestStep::new("Open the login page", "", ""));
}

#[test]
fn test_step_parse_without_test_data_block() {
    let step = TestStep::parse_stored("Step: Submit\nExpected Result: Saved");
    assert_eq!(step, TestStep::new("Submit", "", "Saved"));
}

// Property mapping tests
#[test]
fn test_to_properties_shape() {
    let record = password_reset()
        .with_precondition("User has an account")
        .with_tag("auth")
        .with_priority(Priority::High);
    let props = record.to_properties();

    assert_eq!(props["title"], "Password Reset Test");
    assert_eq!(props["priority"], "High");
    assert_eq!(props["automationStatus"], "Not Started");
    assert_eq!(props["preconditions"][0], "User has an account");
    assert_eq!(props["tags"][0], "auth");
    assert!(props["steps"][0]
        .as_str()
        .unwrap()
        .starts_with("Step: Click forgot password"));
    assert!(props.get("id").is_none());
}

#[test]
fn test_from_properties_restores_record() {
    let record = password_reset()
        .with_tag("auth")
        .with_automation_status(AutomationStatus::Automated);
    let props = record.to_properties();

    let restored =
        TestCaseRecord::from_properties(Some("abc".to_string()), &props).unwrap();
    assert_eq!(restored.id.as_deref(), Some("abc"));
    assert_eq!(restored.title, record.title);
    assert_eq!(restored.steps, record.steps);
    assert_eq!(restored.tags, record.tags);
    assert_eq!(restored.automation_status, AutomationStatus::Automated);
    assert_eq!(restored.created_at.timestamp(), record.created_at.timestamp());
}

#[test]
fn test_from_properties_requires_title() {
    let props = serde_json::json!({ "description": "orphan" });
    assert!(TestCaseRecord::from_properties(None, &props).is_err());
}

#[test]
fn test_from_properties_partial_projection() {
    let props = serde_json::json!({ "title": "Only a title" });
    let record = TestCaseRecord::from_properties(None, &props).unwrap();
    assert_eq!(record.description, "");
    assert!(record.steps.is_empty());
    assert_eq!(record.priority, Priority::Normal);
}

#[test]
fn test_record_deserializes_with_defaults() {
    let record: TestCaseRecord = serde_json::from_str(
        r#"{"title": "Login Functionality Test", "description": "Valid credentials log in",
            "steps": [{"action": "Enter credentials", "test_data": "alice", "expected_result": "Dashboard"}]}"#,
    )
    .unwrap();
    assert!(record.id.is_none());
    assert_eq!(record.steps.len(), 1);
    assert_eq!(record.priority, Priority::Normal);
}

#[test]
fn test_step_missing_field_rejected_by_serde() {
    let result: Result<TestCaseRecord, _> = serde_json::from_str(
        r#"{"title": "T", "description": "D", "steps": [{"action": "a", "test_data": ""}]}"#,
    );
    assert!(result.is_err());
}
