use super::{
    write_fetch_target, BindHandle, BindValue, ColumnDescriptor, ExecuteMode, FetchTarget,
    NativeApi, NativeResult, NativeStatus, NativeType, ObjectRef, StatementKind, StmtHandle,
    TypeDescriptor,
};
use crate::config::SessionConfig;
use crate::error::{Diagnostic, NativeError, Result, StatementError};
use odbc_api::parameter::VarCharBox;
use odbc_api::{Connection, ConnectionOptions, Cursor, DataType, Environment, ResultSetMetadata};
use std::collections::{HashMap, VecDeque};

type TextRow = Vec<Option<Vec<u8>>>;

/// Process-wide ODBC environment.
pub struct OdbcEnvironment {
    env: Option<&'static Environment>,
}

impl Default for OdbcEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl OdbcEnvironment {
    pub fn new() -> Self {
        Self { env: None }
    }

    pub fn init(&mut self) -> Result<()> {
        let env = Environment::new().map_err(|e| {
            StatementError::Connection(Diagnostic::from_native(
                "SQLAllocHandle(Environment)",
                NativeStatus::Error,
                Some(NativeError::from(&e)),
            ))
        })?;

        // Connections borrow the environment, which lives until process exit.
        let env_static = Box::leak(Box::new(env));
        self.env = Some(env_static);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.env.is_some()
    }

    pub fn connect(&self, config: &SessionConfig) -> Result<OdbcNative> {
        let env = self.env.ok_or(StatementError::EnvironmentNotInitialized)?;
        let conn_str = config
            .connection_string
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(StatementError::EmptyConnectionString)?;

        let opts = ConnectionOptions {
            login_timeout_sec: config.login_timeout_secs,
            ..ConnectionOptions::default()
        };
        let connection = env
            .connect_with_connection_string(conn_str, opts)
            .map_err(|e| {
                StatementError::Connection(Diagnostic::from_native(
                    "SQLDriverConnect",
                    NativeStatus::Error,
                    Some(NativeError::from(&e)),
                ))
            })?;

        log::debug!("ODBC connection established");
        Ok(OdbcNative::new(connection))
    }
}

#[derive(Default)]
struct OdbcStatement {
    original_sql: Option<String>,
    sql: String,
    placeholders: Vec<String>,
    params: HashMap<String, Option<String>>,
    executed: bool,
    columns: Vec<ColumnDescriptor>,
    rows: VecDeque<TextRow>,
    defines: HashMap<u32, NativeType>,
    affected_rows: u64,
}

/// Native client on top of an odbc-api connection.
///
/// Named placeholders (`:name`) are rewritten to positional `?` markers and
/// bound as text. Query results are read as text when the statement is
/// executed and handed out row by row through define/fetch.
pub struct OdbcNative {
    connection: Connection<'static>,
    statements: HashMap<u32, OdbcStatement>,
    next_handle: u32,
    next_bind: u32,
    last_error: Option<NativeError>,
}

impl OdbcNative {
    pub fn new(connection: Connection<'static>) -> Self {
        Self {
            connection,
            statements: HashMap::new(),
            next_handle: 1,
            next_bind: 1,
            last_error: None,
        }
    }

    fn record(&mut self, err: &odbc_api::Error) -> NativeStatus {
        self.last_error = Some(NativeError::from(err));
        NativeStatus::Error
    }

    fn fail(&mut self, sqlstate: &[u8; 5], message: impl Into<String>) -> NativeStatus {
        self.last_error = Some(NativeError::new(0, message).with_sqlstate(*sqlstate));
        NativeStatus::Error
    }

    fn statement(&self, stmt: StmtHandle) -> NativeResult<&OdbcStatement> {
        self.statements
            .get(&stmt.0)
            .ok_or(NativeStatus::InvalidHandle)
    }

    fn statement_mut(&mut self, stmt: StmtHandle) -> NativeResult<&mut OdbcStatement> {
        self.statements
            .get_mut(&stmt.0)
            .ok_or(NativeStatus::InvalidHandle)
    }

    fn executed_columns(&mut self, stmt: StmtHandle) -> NativeResult<usize> {
        let (executed, count) = {
            let s = self.statement(stmt)?;
            (s.executed, s.columns.len())
        };
        if !executed {
            return Err(self.fail(b"HY010", "function sequence error"));
        }
        Ok(count)
    }
}

/// Rewrites `:name` placeholders to `?` and returns the upper-cased names in
/// order of appearance. Quoted literals and `::` casts are left alone.
pub fn rewrite_named_placeholders(sql: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '_') =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                names.push(name.to_ascii_uppercase());
                out.push('?');
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    (out, names)
}

fn placeholder_key(placeholder: &str) -> String {
    placeholder.trim_start_matches(':').to_ascii_uppercase()
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|x| format!("{:02x}", x)).collect()
}

/// Text form of a bound value, `None` for NULL.
pub fn bind_value_text(value: &BindValue) -> std::result::Result<Option<String>, String> {
    if value.is_null() {
        return Ok(None);
    }
    let data = value.data.as_slice();
    let text = match value.sql_type {
        NativeType::Str => {
            let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
            String::from_utf8_lossy(&data[..end]).into_owned()
        }
        NativeType::Chr | NativeType::Afc | NativeType::Lng | NativeType::Clob => {
            String::from_utf8_lossy(data).into_owned()
        }
        NativeType::Int => match data.len() {
            1 => i8::from_le_bytes([data[0]]).to_string(),
            2 => i16::from_le_bytes([data[0], data[1]]).to_string(),
            4 => i32::from_le_bytes([data[0], data[1], data[2], data[3]]).to_string(),
            8 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(data);
                i64::from_le_bytes(bytes).to_string()
            }
            n => return Err(format!("invalid integer bind length {}", n)),
        },
        NativeType::Flt | NativeType::BFloat | NativeType::BDouble => match data.len() {
            4 => f32::from_le_bytes([data[0], data[1], data[2], data[3]]).to_string(),
            8 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(data);
                f64::from_le_bytes(bytes).to_string()
            }
            n => return Err(format!("invalid float bind length {}", n)),
        },
        NativeType::Bin | NativeType::Lbi | NativeType::Blob => hex(data),
        other => return Err(format!("bind type {:?} is not supported", other)),
    };
    Ok(Some(text))
}

/// Native column description for an ODBC result column.
pub fn descriptor_from_data_type(name: String, data_type: &DataType) -> ColumnDescriptor {
    let len = |l: Option<std::num::NonZeroUsize>| l.map(|v| v.get() as u32).unwrap_or(0);
    let (native_type, length, precision, scale) = match *data_type {
        DataType::Char { length } | DataType::WChar { length } => {
            (NativeType::Afc, len(length), 0, 0)
        }
        DataType::Varchar { length } | DataType::WVarchar { length } => {
            (NativeType::Chr, len(length), 0, 0)
        }
        DataType::LongVarchar { length } | DataType::WLongVarchar { length } => {
            (NativeType::Clob, len(length), 0, 0)
        }
        DataType::Binary { length } | DataType::Varbinary { length } => {
            (NativeType::Bin, len(length), 0, 0)
        }
        DataType::LongVarbinary { length } => (NativeType::Lbi, len(length), 0, 0),
        DataType::Integer | DataType::SmallInt | DataType::TinyInt | DataType::Bit => {
            (NativeType::Int, 4, 0, 0)
        }
        DataType::BigInt => (NativeType::Num, 22, 19, 0),
        DataType::Numeric { precision, scale } | DataType::Decimal { precision, scale } => (
            NativeType::Num,
            22,
            precision.min(i16::MAX as usize) as i16,
            scale.clamp(i8::MIN as i16, i8::MAX as i16) as i8,
        ),
        DataType::Float { .. } | DataType::Real | DataType::Double => (NativeType::Flt, 8, 0, 0),
        DataType::Date => (NativeType::Date, 7, 0, 0),
        DataType::Time { .. } | DataType::Timestamp { .. } => (NativeType::Timestamp, 11, 0, 0),
        _ => (NativeType::Chr, 0, 0, 0),
    };

    ColumnDescriptor {
        name,
        native_type,
        length,
        precision,
        scale,
        nullable: true,
    }
}

fn describe_columns(
    meta: &mut impl ResultSetMetadata,
) -> std::result::Result<Vec<ColumnDescriptor>, odbc_api::Error> {
    let cols_i16 = meta.num_result_cols()?;
    let cols_u16 = u16::try_from(cols_i16).unwrap_or(0);
    let mut columns = Vec::with_capacity(cols_u16 as usize);
    for col_idx in 1..=cols_u16 {
        let col_name = meta.col_name(col_idx)?;
        let col_type = meta.col_data_type(col_idx)?;
        columns.push(descriptor_from_data_type(col_name.to_string(), &col_type));
    }
    Ok(columns)
}

fn run_query(
    connection: &Connection<'static>,
    sql: &str,
    params: &[VarCharBox],
) -> std::result::Result<(Vec<ColumnDescriptor>, VecDeque<TextRow>), odbc_api::Error> {
    let Some(mut cursor) = connection.execute(sql, params, None)? else {
        return Ok((Vec::new(), VecDeque::new()));
    };

    let columns = describe_columns(&mut cursor)?;
    let mut rows = VecDeque::new();
    while let Some(mut row) = cursor.next_row()? {
        let mut values: TextRow = Vec::with_capacity(columns.len());
        for col_idx in 1..=columns.len() as u16 {
            let mut buf: Vec<u8> = Vec::new();
            let has_value = row.get_text(col_idx, &mut buf)?;
            values.push(if has_value { Some(buf) } else { None });
        }
        rows.push_back(values);
    }
    Ok((columns, rows))
}

fn run_describe(
    connection: &Connection<'static>,
    sql: &str,
) -> std::result::Result<Vec<ColumnDescriptor>, odbc_api::Error> {
    let mut prepared = connection.prepare(sql)?;
    describe_columns(&mut prepared)
}

fn run_command(
    connection: &Connection<'static>,
    sql: &str,
    params: &[VarCharBox],
) -> std::result::Result<u64, odbc_api::Error> {
    let mut statement = connection.preallocate()?;
    statement.execute(sql, params)?;
    Ok(statement.row_count()?.map(|n| n as u64).unwrap_or(0))
}

impl NativeApi for OdbcNative {
    fn alloc_statement(&mut self) -> NativeResult<StmtHandle> {
        let handle = StmtHandle(self.next_handle);
        self.next_handle += 1;
        self.statements.insert(handle.0, OdbcStatement::default());
        Ok(handle)
    }

    fn free_statement(&mut self, stmt: StmtHandle) -> NativeResult<()> {
        self.statements
            .remove(&stmt.0)
            .map(|_| ())
            .ok_or(NativeStatus::InvalidHandle)
    }

    fn prepare(&mut self, stmt: StmtHandle, sql: &str) -> NativeResult<()> {
        self.statement(stmt)?;
        let (rewritten, placeholders) = rewrite_named_placeholders(sql);

        // Compiled once to surface syntax errors at prepare time.
        let compiled = self.connection.prepare(&rewritten).map(|_| ());
        if let Err(e) = compiled {
            return Err(self.record(&e));
        }

        let s = self.statement_mut(stmt)?;
        *s = OdbcStatement {
            original_sql: Some(sql.to_string()),
            sql: rewritten,
            placeholders,
            ..OdbcStatement::default()
        };
        Ok(())
    }

    fn statement_kind(&mut self, stmt: StmtHandle) -> NativeResult<StatementKind> {
        let original = self.statement(stmt)?.original_sql.clone();
        match original {
            Some(sql) => Ok(StatementKind::classify(&sql)),
            None => Err(self.fail(b"HY010", "function sequence error")),
        }
    }

    fn bind_by_name(
        &mut self,
        stmt: StmtHandle,
        placeholder: &str,
        value: &BindValue,
    ) -> NativeResult<BindHandle> {
        let key = placeholder_key(placeholder);
        let known = self.statement(stmt)?.placeholders.contains(&key);
        if !known {
            return Err(self.fail(b"07009", format!("unknown placeholder {}", placeholder)));
        }
        let text = match bind_value_text(value) {
            Ok(text) => text,
            Err(message) => return Err(self.fail(b"HYC00", message)),
        };
        self.statement_mut(stmt)?.params.insert(key, text);

        let handle = BindHandle(self.next_bind);
        self.next_bind += 1;
        Ok(handle)
    }

    fn bind_object(
        &mut self,
        _bind: BindHandle,
        _type_descriptor: TypeDescriptor,
        _objects: &[ObjectRef],
        _indicators: &[i16],
    ) -> NativeResult<()> {
        Err(self.fail(b"HYC00", "object binding is not supported over ODBC"))
    }

    fn execute(
        &mut self,
        stmt: StmtHandle,
        _iterations: u32,
        mode: ExecuteMode,
    ) -> NativeResult<()> {
        let (sql, kind, values) = {
            let s = self.statement(stmt)?;
            let kind = s
                .original_sql
                .as_deref()
                .map(StatementKind::classify)
                .unwrap_or(StatementKind::Other);
            let values: Vec<Option<Option<String>>> = s
                .placeholders
                .iter()
                .map(|name| s.params.get(name).cloned())
                .collect();
            (s.sql.clone(), kind, values)
        };

        let mut parameters = Vec::with_capacity(values.len());
        for value in values {
            match value {
                Some(Some(text)) => parameters.push(VarCharBox::from_string(text)),
                Some(None) => parameters.push(VarCharBox::null()),
                None => return Err(self.fail(b"07002", "not all variables bound")),
            }
        }

        if mode != ExecuteMode::DescribeOnly {
            let autocommit = mode == ExecuteMode::CommitOnSuccess;
            if let Err(e) = self.connection.set_autocommit(autocommit) {
                return Err(self.record(&e));
            }
        }

        let outcome = match (mode, kind.is_row_producing()) {
            (ExecuteMode::DescribeOnly, _) => {
                run_describe(&self.connection, &sql).map(|columns| (columns, VecDeque::new(), 0))
            }
            (_, true) => run_query(&self.connection, &sql, &parameters)
                .map(|(columns, rows)| (columns, rows, 0)),
            (_, false) => run_command(&self.connection, &sql, &parameters)
                .map(|affected| (Vec::new(), VecDeque::new(), affected)),
        };

        let (columns, rows, affected_rows) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.record(&e)),
        };

        let s = self.statement_mut(stmt)?;
        s.executed = true;
        s.columns = columns;
        s.rows = rows;
        s.defines.clear();
        s.affected_rows = affected_rows;
        Ok(())
    }

    fn row_count(&mut self, stmt: StmtHandle) -> NativeResult<u64> {
        Ok(self.statement(stmt)?.affected_rows)
    }

    fn param_get(&mut self, stmt: StmtHandle, position: u32) -> NativeResult<ColumnDescriptor> {
        self.executed_columns(stmt)?;
        let column = (position as usize)
            .checked_sub(1)
            .and_then(|i| self.statements.get(&stmt.0)?.columns.get(i).cloned());
        match column {
            Some(column) => Ok(column),
            None => Err(self.fail(b"07009", "invalid descriptor index")),
        }
    }

    fn define_by_pos(
        &mut self,
        stmt: StmtHandle,
        position: u32,
        _width: usize,
        output_type: NativeType,
    ) -> NativeResult<()> {
        let count = self.executed_columns(stmt)?;
        if position == 0 || position as usize > count {
            return Err(self.fail(b"07009", "invalid descriptor index"));
        }
        if output_type != NativeType::Str {
            return Err(self.fail(b"HYC00", format!("output conversion to {:?}", output_type)));
        }
        self.statement_mut(stmt)?.defines.insert(position, output_type);
        Ok(())
    }

    fn fetch(&mut self, stmt: StmtHandle, targets: &mut [FetchTarget<'_>]) -> NativeResult<()> {
        self.executed_columns(stmt)?;
        let s = self.statement_mut(stmt)?;
        if let Some(target) = targets.iter().find(|t| !s.defines.contains_key(&t.position)) {
            let position = target.position;
            return Err(self.fail(b"07009", format!("column {} is not bound", position)));
        }
        let Some(row) = s.rows.pop_front() else {
            return Err(NativeStatus::NoData);
        };
        for target in targets.iter_mut() {
            let value = (target.position as usize)
                .checked_sub(1)
                .and_then(|i| row.get(i))
                .and_then(|v| v.as_deref());
            write_fetch_target(target, value);
        }
        Ok(())
    }

    fn last_error(&self) -> Option<NativeError> {
        self.last_error.clone()
    }
}
