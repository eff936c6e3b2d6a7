use statement_engine::native::FailurePoint;
use statement_engine::{ErrorCategory, StatementError, StatementState};

mod helpers;
use helpers::{scripted_statement, two_column_native, TWO_COLUMN_QUERY};

#[test]
fn test_prepare_then_clean_matches_fresh_statement() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);

    stmt.prepare(TWO_COLUMN_QUERY).expect("prepare");
    assert!(!stmt.is_clean());
    assert_eq!(stmt.state(), StatementState::Prepared);
    assert_eq!(probe.live_statements(), 1);

    stmt.clean();
    assert!(stmt.is_clean());
    assert_eq!(probe.live_statements(), 0);
}

#[test]
fn test_clean_after_execute_and_fetch_releases_everything() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);

    stmt.execute(Some(TWO_COLUMN_QUERY), None).expect("execute");
    assert!(stmt.simple_fetch_row().is_some());
    let schema = stmt.schema().expect("schema");

    stmt.clean();
    assert!(stmt.is_clean());
    assert!(stmt.schema().is_none());
    assert_eq!(probe.live_statements(), 0);
    // The caller's handle on the schema outlives the statement's.
    assert_eq!(schema.field_count(), 2);
}

#[test]
fn test_clean_is_idempotent() {
    let mut stmt = scripted_statement(two_column_native());
    stmt.clean();
    stmt.clean();
    assert!(stmt.is_clean());

    stmt.prepare(TWO_COLUMN_QUERY).expect("prepare");
    stmt.clean();
    stmt.clean();
    assert!(stmt.is_clean());
}

#[test]
fn test_prepare_twice_without_clean_fails() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);

    stmt.prepare(TWO_COLUMN_QUERY).expect("prepare");
    match stmt.prepare(TWO_COLUMN_QUERY) {
        Err(StatementError::Preparation(d)) => {
            assert!(d.message.contains("already prepared"));
        }
        other => panic!("Expected Preparation error, got {:?}", other.err()),
    }
    assert_eq!(probe.allocated_total(), 1);
    let diagnostic = stmt.session().last_diagnostic().expect("diagnostic");
    assert_eq!(diagnostic.context, "Prepare");
}

#[test]
fn test_prepare_after_clean_succeeds() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);

    stmt.prepare(TWO_COLUMN_QUERY).expect("prepare");
    stmt.clean();
    stmt.prepare(TWO_COLUMN_QUERY).expect("prepare again");
    assert_eq!(probe.allocated_total(), 2);
    assert_eq!(probe.live_statements(), 1);
}

#[test]
fn test_prepare_empty_sql_fails() {
    let mut stmt = scripted_statement(two_column_native());
    let err = stmt.prepare("   ").unwrap_err();
    assert!(matches!(err, StatementError::Preparation(_)));
    assert_eq!(err.error_category(), ErrorCategory::Validation);
    assert!(stmt.is_clean());
}

#[test]
fn test_prepare_allocation_failure() {
    let native = two_column_native().fail_at(FailurePoint::AllocStatement, 4031, "out of memory");
    let mut stmt = scripted_statement(native);

    let err = stmt.prepare(TWO_COLUMN_QUERY).unwrap_err();
    assert!(matches!(err, StatementError::Preparation(_)));
    assert_eq!(err.native_code(), 4031);
    assert_eq!(err.error_category(), ErrorCategory::Fatal);
    assert!(stmt.is_clean());
}

#[test]
fn test_prepare_compile_failure_frees_handle() {
    let native = two_column_native().fail_at(FailurePoint::Prepare, 900, "invalid SQL statement");
    let probe = native.probe();
    let mut stmt = scripted_statement(native);

    let err = stmt.prepare(TWO_COLUMN_QUERY).unwrap_err();
    let diagnostic = err.diagnostic().expect("diagnostic");
    assert_eq!(diagnostic.context, TWO_COLUMN_QUERY);
    assert_eq!(diagnostic.native_code, 900);
    assert_eq!(probe.live_statements(), 0);
    assert!(stmt.is_clean());
}

#[test]
fn test_execute_without_prepare_fails() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);

    match stmt.execute(None, None) {
        Err(StatementError::Execution(d)) => {
            assert_eq!(d.message, "no prepared statement");
        }
        other => panic!("Expected Execution error, got {:?}", other.err()),
    }
    assert!(probe.executions().is_empty());
}

#[test]
fn test_execute_with_text_replaces_prepared_statement() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);

    stmt.prepare(TWO_COLUMN_QUERY).expect("prepare");
    stmt.execute(Some("UPDATE T SET A = 1 WHERE B IS NULL"), None)
        .expect("execute");
    assert_eq!(stmt.command_text(), Some("UPDATE T SET A = 1 WHERE B IS NULL"));
    assert_eq!(probe.live_statements(), 1);
    assert_eq!(probe.allocated_total(), 2);
}

#[test]
fn test_statement_reusable_after_exhaustion() {
    let mut stmt = scripted_statement(two_column_native());
    stmt.execute(Some(TWO_COLUMN_QUERY), None).expect("execute");
    while stmt.simple_fetch_row().is_some() {}
    assert_eq!(stmt.state(), StatementState::Exhausted);

    stmt.execute(Some(TWO_COLUMN_QUERY), None).expect("execute again");
    assert_eq!(stmt.state(), StatementState::Executed);
    assert!(stmt.simple_fetch_row().is_some());
}

#[test]
fn test_drop_releases_native_handle() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);
    stmt.execute(Some(TWO_COLUMN_QUERY), None).expect("execute");
    assert_eq!(probe.live_statements(), 1);

    drop(stmt);
    assert_eq!(probe.live_statements(), 0);
}
