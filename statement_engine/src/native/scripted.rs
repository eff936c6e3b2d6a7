use super::{
    write_fetch_target, BindHandle, BindValue, ColumnDescriptor, ExecuteMode, FetchTarget,
    NativeApi, NativeResult, NativeStatus, NativeType, ObjectRef, StatementKind, StmtHandle,
    TypeDescriptor,
};
use crate::error::NativeError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const ERR_TABLE_NOT_FOUND: i32 = 942;
const ERR_NOT_IN_SELECT_LIST: i32 = 1007;
const ERR_ILLEGAL_VARIABLE: i32 = 1036;
const ERR_ZERO_ITERATIONS: i32 = 24333;
const ERR_NO_DESCRIPTOR: i32 = 24334;
const ERR_NOT_PREPARED: i32 = 24337;
const ERR_FETCH_OUT_OF_SEQUENCE: i32 = 1002;

/// Native call that can be made to fail on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    AllocStatement,
    Prepare,
    StatementKind,
    BindByName,
    BindObject,
    Execute,
    RowCount,
    ParamGet,
    DefineByPos,
    Fetch,
}

#[derive(Clone, Debug)]
enum Script {
    Query {
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Vec<Option<String>>>,
    },
    Command {
        kind: StatementKind,
        affected_rows: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedExecution {
    pub sql: String,
    pub iterations: u32,
    pub mode: ExecuteMode,
}

#[derive(Debug, Default)]
struct ProbeState {
    live_statements: usize,
    allocated_total: usize,
    binds: Vec<(String, BindValue)>,
    object_binds: Vec<(TypeDescriptor, Vec<ObjectRef>, Vec<i16>)>,
    executions: Vec<RecordedExecution>,
    defines: Vec<(u32, usize, NativeType)>,
    fetch_calls: usize,
}

/// Read-only view on what a [`ScriptedNative`] has been asked to do. Stays
/// usable after the native client has been moved into a session.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl ScriptedProbe {
    fn with<T>(&self, f: impl FnOnce(&ProbeState) -> T) -> T {
        match self.state.lock() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut ProbeState)) {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Statement handles allocated and not yet freed.
    pub fn live_statements(&self) -> usize {
        self.with(|s| s.live_statements)
    }

    pub fn allocated_total(&self) -> usize {
        self.with(|s| s.allocated_total)
    }

    pub fn bound_parameters(&self) -> Vec<(String, BindValue)> {
        self.with(|s| s.binds.clone())
    }

    pub fn object_bind_count(&self) -> usize {
        self.with(|s| s.object_binds.len())
    }

    pub fn executions(&self) -> Vec<RecordedExecution> {
        self.with(|s| s.executions.clone())
    }

    /// `(position, width, output type)` of every define call, in order.
    pub fn defines(&self) -> Vec<(u32, usize, NativeType)> {
        self.with(|s| s.defines.clone())
    }

    pub fn fetch_calls(&self) -> usize {
        self.with(|s| s.fetch_calls)
    }
}

#[derive(Debug, Default)]
struct ScriptedStatement {
    sql: Option<String>,
    executed: bool,
    cursor: usize,
    defines: HashMap<u32, NativeType>,
}

struct InjectedFailure {
    on_call: usize,
    error: NativeError,
}

/// In-memory native client answering registered statements.
///
/// Queries are registered with their column descriptors and text rows,
/// commands with their statement kind and affected-row count. Statements
/// are matched on their text with whitespace runs collapsed.
pub struct ScriptedNative {
    scripts: HashMap<String, Script>,
    statements: HashMap<u32, ScriptedStatement>,
    next_handle: u32,
    next_bind: u32,
    failures: HashMap<FailurePoint, InjectedFailure>,
    calls: HashMap<FailurePoint, usize>,
    last_error: Option<NativeError>,
    probe: ScriptedProbe,
}

impl Default for ScriptedNative {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl ScriptedNative {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            statements: HashMap::new(),
            next_handle: 1,
            next_bind: 1,
            failures: HashMap::new(),
            calls: HashMap::new(),
            last_error: None,
            probe: ScriptedProbe::default(),
        }
    }

    pub fn with_query(
        mut self,
        sql: &str,
        columns: Vec<ColumnDescriptor>,
        rows: Vec<Vec<Option<&str>>>,
    ) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.map(str::to_string)).collect())
            .collect();
        self.scripts
            .insert(normalize_sql(sql), Script::Query { columns, rows });
        self
    }

    pub fn with_command(mut self, sql: &str, kind: StatementKind, affected_rows: u64) -> Self {
        self.scripts.insert(
            normalize_sql(sql),
            Script::Command {
                kind,
                affected_rows,
            },
        );
        self
    }

    /// Makes the first call of `point` fail with the given native error.
    pub fn fail_at(self, point: FailurePoint, native_code: i32, message: &str) -> Self {
        self.fail_at_call(point, 1, native_code, message)
    }

    /// Makes the `nth` (1-based) call of `point` fail with the given native
    /// error. Other calls succeed.
    pub fn fail_at_call(
        mut self,
        point: FailurePoint,
        nth: usize,
        native_code: i32,
        message: &str,
    ) -> Self {
        self.failures.insert(
            point,
            InjectedFailure {
                on_call: nth.max(1),
                error: NativeError::new(native_code, message),
            },
        );
        self
    }

    pub fn probe(&self) -> ScriptedProbe {
        self.probe.clone()
    }

    fn fail(&mut self, native_code: i32, message: impl Into<String>) -> NativeStatus {
        self.last_error = Some(NativeError::new(native_code, message));
        NativeStatus::Error
    }

    fn checkpoint(&mut self, point: FailurePoint) -> NativeResult<()> {
        let count = self.calls.entry(point).or_insert(0);
        *count += 1;
        let count = *count;
        if let Some(failure) = self.failures.get(&point) {
            if failure.on_call == count {
                self.last_error = Some(failure.error.clone());
                return Err(NativeStatus::Error);
            }
        }
        Ok(())
    }

    fn prepared_script(&mut self, stmt: StmtHandle) -> NativeResult<(String, Script)> {
        let sql = match self.statements.get(&stmt.0) {
            None => return Err(NativeStatus::InvalidHandle),
            Some(s) => s.sql.clone(),
        };
        let Some(sql) = sql else {
            return Err(self.fail(ERR_NOT_PREPARED, "statement handle not prepared"));
        };
        let script = self.scripts.get(&normalize_sql(&sql)).cloned();
        match script {
            Some(script) => Ok((sql, script)),
            None => Err(self.fail(ERR_TABLE_NOT_FOUND, "table or view does not exist")),
        }
    }

    fn executed_query(
        &mut self,
        stmt: StmtHandle,
    ) -> NativeResult<(Vec<ColumnDescriptor>, Vec<Vec<Option<String>>>)> {
        let executed = self
            .statements
            .get(&stmt.0)
            .map(|s| s.executed)
            .ok_or(NativeStatus::InvalidHandle)?;
        let (_, script) = self.prepared_script(stmt)?;
        match script {
            Script::Query { columns, rows } if executed => Ok((columns, rows)),
            Script::Query { .. } => {
                Err(self.fail(ERR_FETCH_OUT_OF_SEQUENCE, "fetch out of sequence"))
            }
            Script::Command { .. } => {
                Err(self.fail(ERR_NO_DESCRIPTOR, "no descriptor for this position"))
            }
        }
    }
}

fn contains_placeholder(sql: &str, placeholder: &str) -> bool {
    let wanted = placeholder.trim_start_matches(':').to_ascii_uppercase();
    let upper = sql.to_ascii_uppercase();
    let mut rest = upper.as_str();
    while let Some(pos) = rest.find(':') {
        let after = &rest[pos + 1..];
        let name: String = after
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if !name.is_empty() && name == wanted {
            return true;
        }
        rest = after;
    }
    false
}

impl NativeApi for ScriptedNative {
    fn alloc_statement(&mut self) -> NativeResult<StmtHandle> {
        self.checkpoint(FailurePoint::AllocStatement)?;
        let handle = StmtHandle(self.next_handle);
        self.next_handle += 1;
        self.statements
            .insert(handle.0, ScriptedStatement::default());
        self.probe.update(|s| {
            s.live_statements += 1;
            s.allocated_total += 1;
        });
        Ok(handle)
    }

    fn free_statement(&mut self, stmt: StmtHandle) -> NativeResult<()> {
        if self.statements.remove(&stmt.0).is_none() {
            return Err(NativeStatus::InvalidHandle);
        }
        self.probe
            .update(|s| s.live_statements = s.live_statements.saturating_sub(1));
        Ok(())
    }

    fn prepare(&mut self, stmt: StmtHandle, sql: &str) -> NativeResult<()> {
        self.checkpoint(FailurePoint::Prepare)?;
        if !self.statements.contains_key(&stmt.0) {
            return Err(NativeStatus::InvalidHandle);
        }
        if !self.scripts.contains_key(&normalize_sql(sql)) {
            return Err(self.fail(ERR_TABLE_NOT_FOUND, "table or view does not exist"));
        }
        if let Some(s) = self.statements.get_mut(&stmt.0) {
            *s = ScriptedStatement {
                sql: Some(sql.to_string()),
                ..ScriptedStatement::default()
            };
        }
        Ok(())
    }

    fn statement_kind(&mut self, stmt: StmtHandle) -> NativeResult<StatementKind> {
        self.checkpoint(FailurePoint::StatementKind)?;
        let (_, script) = self.prepared_script(stmt)?;
        Ok(match script {
            Script::Query { .. } => StatementKind::Select,
            Script::Command { kind, .. } => kind,
        })
    }

    fn bind_by_name(
        &mut self,
        stmt: StmtHandle,
        placeholder: &str,
        value: &BindValue,
    ) -> NativeResult<BindHandle> {
        self.checkpoint(FailurePoint::BindByName)?;
        let (sql, _) = self.prepared_script(stmt)?;
        if !contains_placeholder(&sql, placeholder) {
            return Err(self.fail(ERR_ILLEGAL_VARIABLE, "illegal variable name/number"));
        }
        let handle = BindHandle(self.next_bind);
        self.next_bind += 1;
        let name = placeholder.to_string();
        let value = value.clone();
        self.probe.update(|s| s.binds.push((name, value)));
        Ok(handle)
    }

    fn bind_object(
        &mut self,
        _bind: BindHandle,
        type_descriptor: TypeDescriptor,
        objects: &[ObjectRef],
        indicators: &[i16],
    ) -> NativeResult<()> {
        self.checkpoint(FailurePoint::BindObject)?;
        let objects = objects.to_vec();
        let indicators = indicators.to_vec();
        self.probe
            .update(|s| s.object_binds.push((type_descriptor, objects, indicators)));
        Ok(())
    }

    fn execute(
        &mut self,
        stmt: StmtHandle,
        iterations: u32,
        mode: ExecuteMode,
    ) -> NativeResult<()> {
        self.checkpoint(FailurePoint::Execute)?;
        let (sql, script) = self.prepared_script(stmt)?;
        if matches!(script, Script::Command { .. }) && iterations == 0 {
            return Err(self.fail(ERR_ZERO_ITERATIONS, "iteration count is zero"));
        }
        if let Some(s) = self.statements.get_mut(&stmt.0) {
            s.executed = true;
            s.cursor = 0;
        }
        self.probe.update(|s| {
            s.executions.push(RecordedExecution {
                sql,
                iterations,
                mode,
            })
        });
        Ok(())
    }

    fn row_count(&mut self, stmt: StmtHandle) -> NativeResult<u64> {
        self.checkpoint(FailurePoint::RowCount)?;
        let (_, script) = self.prepared_script(stmt)?;
        let statement = self
            .statements
            .get(&stmt.0)
            .ok_or(NativeStatus::InvalidHandle)?;
        Ok(match script {
            Script::Command { affected_rows, .. } if statement.executed => affected_rows,
            Script::Command { .. } => 0,
            Script::Query { .. } => statement.cursor as u64,
        })
    }

    fn param_get(&mut self, stmt: StmtHandle, position: u32) -> NativeResult<ColumnDescriptor> {
        self.checkpoint(FailurePoint::ParamGet)?;
        let (columns, _) = self.executed_query(stmt)?;
        let index = (position as usize).checked_sub(1);
        match index.and_then(|i| columns.get(i)) {
            Some(column) => Ok(column.clone()),
            None => Err(self.fail(ERR_NO_DESCRIPTOR, "no descriptor for this position")),
        }
    }

    fn define_by_pos(
        &mut self,
        stmt: StmtHandle,
        position: u32,
        width: usize,
        output_type: NativeType,
    ) -> NativeResult<()> {
        self.checkpoint(FailurePoint::DefineByPos)?;
        let (columns, _) = self.executed_query(stmt)?;
        if position == 0 || position as usize > columns.len() {
            return Err(self.fail(ERR_NOT_IN_SELECT_LIST, "variable not in select list"));
        }
        if let Some(s) = self.statements.get_mut(&stmt.0) {
            s.defines.insert(position, output_type);
        }
        self.probe
            .update(|s| s.defines.push((position, width, output_type)));
        Ok(())
    }

    fn fetch(&mut self, stmt: StmtHandle, targets: &mut [FetchTarget<'_>]) -> NativeResult<()> {
        self.probe.update(|s| s.fetch_calls += 1);
        self.checkpoint(FailurePoint::Fetch)?;
        let (_, rows) = self.executed_query(stmt)?;
        let (cursor, defines) = match self.statements.get(&stmt.0) {
            Some(s) => (s.cursor, s.defines.clone()),
            None => return Err(NativeStatus::InvalidHandle),
        };
        let Some(row) = rows.get(cursor) else {
            return Err(NativeStatus::NoData);
        };

        for target in targets.iter_mut() {
            match defines.get(&target.position) {
                Some(NativeType::Str) => {}
                Some(other) => {
                    return Err(self.fail(
                        ERR_NOT_IN_SELECT_LIST,
                        format!("unsupported output conversion to {:?}", other),
                    ))
                }
                None => {
                    return Err(self.fail(ERR_NOT_IN_SELECT_LIST, "variable not in select list"))
                }
            }
            let value = (target.position as usize)
                .checked_sub(1)
                .and_then(|i| row.get(i))
                .and_then(|v| v.as_deref());
            write_fetch_target(target, value.map(str::as_bytes));
        }

        if let Some(s) = self.statements.get_mut(&stmt.0) {
            s.cursor += 1;
        }
        Ok(())
    }

    fn last_error(&self) -> Option<NativeError> {
        self.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{IND_NOT_NULL, IND_NULL};

    fn two_column_native() -> ScriptedNative {
        ScriptedNative::new().with_query(
            "SELECT A, B FROM T",
            vec![
                ColumnDescriptor::varchar("A", 10),
                ColumnDescriptor::varchar("B", 10),
            ],
            vec![vec![Some("x"), None]],
        )
    }

    #[test]
    fn test_alloc_and_free_tracks_live_handles() {
        let mut native = ScriptedNative::new();
        let probe = native.probe();
        let h1 = native.alloc_statement().unwrap();
        let h2 = native.alloc_statement().unwrap();
        assert_ne!(h1, h2);
        assert_eq!(probe.live_statements(), 2);
        native.free_statement(h1).unwrap();
        assert_eq!(probe.live_statements(), 1);
        assert_eq!(native.free_statement(h1), Err(NativeStatus::InvalidHandle));
        assert_eq!(probe.allocated_total(), 2);
    }

    #[test]
    fn test_prepare_unknown_sql_fails() {
        let mut native = ScriptedNative::new();
        let h = native.alloc_statement().unwrap();
        assert_eq!(native.prepare(h, "SELECT * FROM nope"), Err(NativeStatus::Error));
        assert_eq!(native.last_error().unwrap().native_code, 942);
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let mut native = two_column_native();
        let h = native.alloc_statement().unwrap();
        native.prepare(h, "  SELECT A,  B\nFROM T ").unwrap();
        assert_eq!(native.statement_kind(h), Ok(StatementKind::Select));
    }

    #[test]
    fn test_fetch_writes_targets_and_ends_with_no_data() {
        let mut native = two_column_native();
        let h = native.alloc_statement().unwrap();
        native.prepare(h, "SELECT A, B FROM T").unwrap();
        native.execute(h, 0, ExecuteMode::Default).unwrap();
        native.define_by_pos(h, 1, 13, NativeType::Str).unwrap();
        native.define_by_pos(h, 2, 13, NativeType::Str).unwrap();

        let mut a = vec![0u8; 13];
        let mut b = vec![0u8; 13];
        let (mut ia, mut ib) = (0i16, 0i16);
        {
            let mut targets = [
                FetchTarget {
                    position: 1,
                    buffer: &mut a,
                    indicator: &mut ia,
                },
                FetchTarget {
                    position: 2,
                    buffer: &mut b,
                    indicator: &mut ib,
                },
            ];
            native.fetch(h, &mut targets).unwrap();
            assert_eq!(native.fetch(h, &mut targets), Err(NativeStatus::NoData));
        }
        assert_eq!(&a[..2], b"x\0");
        assert_eq!(ia, IND_NOT_NULL);
        assert_eq!(ib, IND_NULL);
    }

    #[test]
    fn test_param_get_past_last_column_fails() {
        let mut native = two_column_native();
        let h = native.alloc_statement().unwrap();
        native.prepare(h, "SELECT A, B FROM T").unwrap();
        native.execute(h, 0, ExecuteMode::Default).unwrap();
        assert!(native.param_get(h, 2).is_ok());
        assert_eq!(native.param_get(h, 3), Err(NativeStatus::Error));
        assert_eq!(native.param_get(h, 0), Err(NativeStatus::Error));
    }

    #[test]
    fn test_command_requires_iterations() {
        let mut native =
            ScriptedNative::new().with_command("UPDATE T SET A=1", StatementKind::Update, 3);
        let h = native.alloc_statement().unwrap();
        native.prepare(h, "UPDATE T SET A=1").unwrap();
        assert_eq!(
            native.execute(h, 0, ExecuteMode::CommitOnSuccess),
            Err(NativeStatus::Error)
        );
        native.execute(h, 1, ExecuteMode::CommitOnSuccess).unwrap();
        assert_eq!(native.row_count(h), Ok(3));
    }

    #[test]
    fn test_bind_checks_placeholder() {
        let mut native = ScriptedNative::new().with_command(
            "UPDATE T SET A=:val WHERE B=:key",
            StatementKind::Update,
            1,
        );
        let probe = native.probe();
        let h = native.alloc_statement().unwrap();
        native.prepare(h, "UPDATE T SET A=:val WHERE B=:key").unwrap();
        let value = BindValue {
            data: b"1\0".to_vec(),
            sql_type: NativeType::Str,
            indicator: None,
        };
        assert!(native.bind_by_name(h, ":val", &value).is_ok());
        assert!(native.bind_by_name(h, "key", &value).is_ok());
        assert_eq!(native.bind_by_name(h, ":other", &value), Err(NativeStatus::Error));
        assert_eq!(native.last_error().unwrap().native_code, 1036);
        assert_eq!(probe.bound_parameters().len(), 2);
    }

    #[test]
    fn test_fail_at_call_targets_nth_call() {
        let mut native = ScriptedNative::new().fail_at_call(FailurePoint::AllocStatement, 2, 4031, "out of memory");
        assert!(native.alloc_statement().is_ok());
        assert_eq!(native.alloc_statement(), Err(NativeStatus::Error));
        assert_eq!(native.last_error().unwrap().native_code, 4031);
        assert!(native.alloc_statement().is_ok());
    }

    #[test]
    fn test_contains_placeholder() {
        assert!(contains_placeholder("SELECT * FROM t WHERE a = :id", ":ID"));
        assert!(contains_placeholder("SELECT * FROM t WHERE a = :id", "id"));
        assert!(!contains_placeholder("SELECT * FROM t WHERE a = :identifier", ":id"));
        assert!(!contains_placeholder("SELECT 1 FROM dual", ":id"));
    }
}
