use statement_engine::native::{ColumnDescriptor, FailurePoint};
use statement_engine::{ScriptedNative, StatementError, StatementState};

mod helpers;
use helpers::{catalog_native, scripted_statement, two_column_native, CATALOG_QUERY, TWO_COLUMN_QUERY};

#[test]
fn test_select_two_columns_end_to_end() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);
    stmt.execute(Some(TWO_COLUMN_QUERY), None).expect("execute");

    let row = stmt.simple_fetch_row().expect("first row");
    assert_eq!(row.len(), 2);
    assert_eq!(row.get(0).as_deref(), Some("x"));
    assert_eq!(row.get(1).as_deref(), Some("y"));

    assert!(stmt.simple_fetch_row().is_none());
    assert_eq!(probe.fetch_calls(), 2);
    assert!(stmt.session().last_diagnostic().is_none());
}

#[test]
fn test_end_of_data_is_terminal() {
    let native = two_column_native();
    let probe = native.probe();
    let mut stmt = scripted_statement(native);
    stmt.execute(Some(TWO_COLUMN_QUERY), None).expect("execute");

    assert!(stmt.simple_fetch_row().is_some());
    assert!(stmt.simple_fetch_row().is_none());
    let calls = probe.fetch_calls();

    for _ in 0..3 {
        assert!(stmt.simple_fetch_row().is_none());
        assert!(matches!(stmt.fetch_row(), Ok(None)));
    }
    assert_eq!(probe.fetch_calls(), calls);
    assert_eq!(stmt.state(), StatementState::Exhausted);
}

#[test]
fn test_null_values_follow_indicators() {
    let mut stmt = scripted_statement(catalog_native());
    stmt.execute(Some(CATALOG_QUERY), None).expect("execute");

    // RAW_COL is not in the schema, so rows carry three fields.
    let first = stmt.simple_fetch_row().expect("row").to_vec();
    assert_eq!(
        first,
        vec![Some("ID".to_string()), None, Some("22".to_string())]
    );

    let second = stmt.simple_fetch_row().expect("row");
    assert_eq!(second.get(1).as_deref(), Some("SYSDATE"));
    assert!(!second.is_null(1));
    assert!(second.is_null(3));

    assert!(stmt.simple_fetch_row().is_none());
    assert_eq!(stmt.rows_fetched(), 2);
}

#[test]
fn test_values_longer_than_buffer_are_truncated() {
    let sql = "SELECT CODE FROM CODES";
    let native = ScriptedNative::new().with_query(
        sql,
        vec![ColumnDescriptor::varchar("CODE", 2)],
        vec![vec![Some("ABCDEFG")]],
    );
    let mut stmt = scripted_statement(native);
    stmt.execute(Some(sql), None).expect("execute");

    let row = stmt.simple_fetch_row().expect("row");
    // Width 2 + 3 leaves room for four characters and the terminator.
    assert_eq!(row.get(0).as_deref(), Some("ABCD"));
    assert!(row.is_truncated(0));
}

#[test]
fn test_fetch_failure_surfaces_diagnostic() {
    let native = two_column_native().fail_at(FailurePoint::Fetch, 1013, "user requested cancel");
    let mut stmt = scripted_statement(native);
    stmt.execute(Some(TWO_COLUMN_QUERY), None).expect("execute");

    assert!(stmt.simple_fetch_row().is_none());
    let diagnostic = stmt.session().take_diagnostic().expect("diagnostic");
    assert_eq!(diagnostic.native_code, 1013);
    assert_eq!(diagnostic.context, TWO_COLUMN_QUERY);

    // A failed fetch is not end-of-data; the row is still there.
    assert_eq!(stmt.state(), StatementState::Executed);
    assert!(stmt.simple_fetch_row().is_some());
}

#[test]
fn test_fetch_row_distinguishes_failure_from_end() {
    let native = two_column_native().fail_at_call(FailurePoint::Fetch, 2, 3113, "end-of-file on communication channel");
    let mut stmt = scripted_statement(native);
    stmt.execute(Some(TWO_COLUMN_QUERY), None).expect("execute");

    assert!(matches!(stmt.fetch_row(), Ok(Some(_))));
    match stmt.fetch_row() {
        Err(StatementError::Fetch(d)) => assert_eq!(d.native_code, 3113),
        other => panic!("Expected Fetch error, got {:?}", other.map(|r| r.map(|r| r.to_vec()))),
    }
    assert!(matches!(stmt.fetch_row(), Ok(None)));
}

#[test]
fn test_fetch_before_execute() {
    let mut stmt = scripted_statement(two_column_native());
    assert!(stmt.simple_fetch_row().is_none());
    assert!(stmt.session().last_diagnostic().is_some());

    stmt.prepare(TWO_COLUMN_QUERY).expect("prepare");
    assert!(matches!(stmt.fetch_row(), Err(StatementError::Fetch(_))));
}

#[test]
fn test_fetch_after_failed_execute() {
    let native = two_column_native().fail_at(FailurePoint::Execute, 942, "table or view does not exist");
    let probe = native.probe();
    let mut stmt = scripted_statement(native);
    assert!(stmt.execute(Some(TWO_COLUMN_QUERY), None).is_err());
    assert!(stmt.simple_fetch_row().is_none());
    assert_eq!(probe.fetch_calls(), 0);
}

#[test]
fn test_empty_result_set() {
    let sql = "SELECT A FROM EMPTY";
    let native = ScriptedNative::new().with_query(sql, vec![ColumnDescriptor::varchar("A", 1)], vec![]);
    let mut stmt = scripted_statement(native);
    stmt.execute(Some(sql), None).expect("execute");
    assert!(stmt.simple_fetch_row().is_none());
    assert_eq!(stmt.state(), StatementState::Exhausted);
    assert_eq!(stmt.rows_fetched(), 0);
}
