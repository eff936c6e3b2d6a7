//! Scripted native clients shared by the integration tests.

use statement_engine::native::{ColumnDescriptor, NativeType, ScriptedNative, StatementKind};
use statement_engine::{Session, Statement};
use std::sync::Arc;

pub const TWO_COLUMN_QUERY: &str = "SELECT A, B FROM T";

/// Column catalog query: a LONG `DATA_DEFAULT` column next to a RAW one.
pub const CATALOG_QUERY: &str =
    "SELECT COLUMN_NAME, DATA_DEFAULT, RAW_COL, DATA_LENGTH FROM ALL_TAB_COLUMNS";

#[allow(dead_code)]
pub fn catalog_native() -> ScriptedNative {
    ScriptedNative::new().with_query(
        CATALOG_QUERY,
        vec![
            ColumnDescriptor::varchar("COLUMN_NAME", 128).not_null(),
            ColumnDescriptor::new("DATA_DEFAULT", NativeType::Lng),
            ColumnDescriptor {
                length: 16,
                ..ColumnDescriptor::new("RAW_COL", NativeType::Bin)
            },
            ColumnDescriptor::number("DATA_LENGTH", 0, 0),
        ],
        vec![
            vec![Some("ID"), None, Some("00ff"), Some("22")],
            vec![Some("CREATED"), Some("SYSDATE"), None, Some("7")],
        ],
    )
}

#[allow(dead_code)]
pub fn two_column_native() -> ScriptedNative {
    ScriptedNative::new()
        .with_query(
            TWO_COLUMN_QUERY,
            vec![
                ColumnDescriptor::varchar("A", 10),
                ColumnDescriptor::varchar("B", 10),
            ],
            vec![vec![Some("x"), Some("y")]],
        )
        .with_command("UPDATE T SET A = 1 WHERE B IS NULL", StatementKind::Update, 3)
        .with_command(
            "UPDATE T SET A = :val WHERE B = :key",
            StatementKind::Update,
            1,
        )
}

#[allow(dead_code)]
pub fn scripted_statement(native: ScriptedNative) -> Statement {
    let _ = env_logger::builder().is_test(true).try_init();
    Statement::new(Arc::new(Session::new(native)))
}
