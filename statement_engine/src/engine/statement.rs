use super::buffers::{buffer_width, ColumnBuffer};
use super::field_map::FieldMap;
use super::row::FetchedRow;
use crate::error::{Diagnostic, Result, StatementError};
use crate::native::{
    BindHandle, BindValue, ExecuteMode, FetchTarget, NativeApi, NativeResult, NativeStatus,
    NativeType, ObjectRef, StmtHandle, TypeDescriptor,
};
use crate::schema::{FeatureDefn, FieldType};
use crate::session::Session;
use log::Level;
use std::sync::Arc;

/// Column whose LONG metadata is reported as binary but holds text.
const DATA_DEFAULT_COLUMN: &str = "DATA_DEFAULT";

const STATEMENT_KIND_CONTEXT: &str = "OCIAttrGet(ATTR_STMT_TYPE)";
const ROW_COUNT_CONTEXT: &str = "OCIAttrGet(OCI_ATTR_ROW_COUNT)";
const PARAM_GET_CONTEXT: &str = "OCIParamGet";
const DEFINE_CONTEXT: &str = "OCIDefineByPos";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Idle,
    Prepared,
    Executed,
    Exhausted,
}

/// One prepared command: text, native handle, derived schema and the
/// buffers rows are fetched into.
pub struct Statement {
    session: Arc<Session>,
    command_text: Option<String>,
    handle: Option<StmtHandle>,
    schema: Option<Arc<FeatureDefn>>,
    raw_column_count: usize,
    field_map: FieldMap,
    columns: Vec<ColumnBuffer>,
    affected_rows: Option<u64>,
    bindings: Vec<BindHandle>,
    rows_fetched: u64,
    state: StatementState,
}

impl Statement {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            command_text: None,
            handle: None,
            schema: None,
            raw_column_count: 0,
            field_map: FieldMap::new(),
            columns: Vec::new(),
            affected_rows: None,
            bindings: Vec::new(),
            rows_fetched: 0,
            state: StatementState::Idle,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn command_text(&self) -> Option<&str> {
        self.command_text.as_deref()
    }

    pub fn is_prepared(&self) -> bool {
        self.handle.is_some()
    }

    /// Shared handle on the schema of the last executed query.
    pub fn schema(&self) -> Option<Arc<FeatureDefn>> {
        self.schema.clone()
    }

    pub fn field_schema(&self) -> Option<&FeatureDefn> {
        self.schema.as_deref()
    }

    pub fn raw_column_count(&self) -> usize {
        self.raw_column_count
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    /// Buffer width of every included field, in schema order.
    pub fn column_widths(&self) -> Vec<usize> {
        self.columns.iter().map(ColumnBuffer::width).collect()
    }

    /// Rows affected by the last executed non-query statement.
    pub fn affected_row_count(&self) -> Option<u64> {
        self.affected_rows
    }

    pub fn rows_fetched(&self) -> u64 {
        self.rows_fetched
    }

    pub fn bind_count(&self) -> usize {
        self.bindings.len()
    }

    /// True when nothing is held: no text, handle, schema, buffers or
    /// bindings.
    pub fn is_clean(&self) -> bool {
        self.state == StatementState::Idle
            && self.command_text.is_none()
            && self.handle.is_none()
            && self.schema.is_none()
            && self.raw_column_count == 0
            && self.field_map.is_empty()
            && self.columns.is_empty()
            && self.affected_rows.is_none()
            && self.bindings.is_empty()
            && self.rows_fetched == 0
    }

    /// Releases everything the statement holds and frees the native handle.
    /// Safe to call at any time, any number of times.
    pub fn clean(&mut self) {
        self.command_text = None;
        self.columns.clear();
        self.field_map.clear();
        self.raw_column_count = 0;
        self.schema = None;
        self.bindings.clear();
        self.affected_rows = None;
        self.rows_fetched = 0;
        self.state = StatementState::Idle;

        if let Some(handle) = self.handle.take() {
            match self
                .session
                .with_native(|native| native.free_statement(handle))
            {
                Ok(Ok(())) => {}
                Ok(Err(status)) => log::warn!("Failed to free statement handle: {:?}", status),
                Err(e) => log::warn!("Failed to free statement handle: {}", e),
            }
        }
    }

    /// Runs one native call and turns a failure into a recorded diagnostic
    /// wrapped by `wrap`.
    fn native_call<T>(
        &self,
        context: &str,
        wrap: fn(Diagnostic) -> StatementError,
        f: impl FnOnce(&mut dyn NativeApi) -> NativeResult<T>,
    ) -> Result<T> {
        let result = self.session.with_native(f)?;
        self.session.check(result, context).map_err(wrap)
    }

    fn misuse(
        &self,
        wrap: fn(Diagnostic) -> StatementError,
        context: &str,
        message: &str,
    ) -> StatementError {
        let diagnostic = Diagnostic::new(context, message);
        self.session.record_diagnostic(diagnostic.clone());
        wrap(diagnostic)
    }

    /// Compiles `sql` into a fresh native handle.
    ///
    /// Fails when a handle already exists; call [`Statement::clean`] first,
    /// or use [`Statement::execute`] with a command text.
    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        if self.handle.is_some() {
            return Err(self.misuse(
                StatementError::Preparation,
                "Prepare",
                "statement already prepared",
            ));
        }
        if sql.trim().is_empty() {
            return Err(self.misuse(StatementError::Preparation, "Prepare", "empty command text"));
        }

        self.clean();
        self.session
            .logger()
            .log_statement(Level::Debug, "Prepare", sql);
        self.command_text = Some(sql.to_string());

        let handle = match self.native_call(sql, StatementError::Preparation, |native| {
            native.alloc_statement()
        }) {
            Ok(handle) => handle,
            Err(e) => {
                self.clean();
                return Err(e);
            }
        };
        self.handle = Some(handle);

        if let Err(e) = self.native_call(sql, StatementError::Preparation, |native| {
            native.prepare(handle, sql)
        }) {
            self.clean();
            return Err(e);
        }

        self.state = StatementState::Prepared;
        Ok(())
    }

    fn bind_value(&mut self, name: &str, value: &BindValue) -> Result<BindHandle> {
        let Some(handle) = self.handle else {
            return Err(self.misuse(
                StatementError::Binding,
                &format!("BindByName({})", name),
                "no prepared statement",
            ));
        };
        let bind = self.native_call(
            &format!("BindByName({})", name),
            StatementError::Binding,
            |native| native.bind_by_name(handle, name, value),
        )?;
        self.bindings.push(bind);
        Ok(bind)
    }

    /// Binds `data` of native type `sql_type` to the placeholder `name`.
    /// The native layer copies the value.
    pub fn bind_scalar(
        &mut self,
        name: &str,
        data: &[u8],
        sql_type: NativeType,
        indicator: Option<i16>,
    ) -> Result<BindHandle> {
        let value = BindValue {
            data: data.to_vec(),
            sql_type,
            indicator,
        };
        self.bind_value(name, &value)
    }

    /// Binds `text` as a NUL-terminated string.
    pub fn bind_string(
        &mut self,
        name: &str,
        text: &str,
        indicator: Option<i16>,
    ) -> Result<BindHandle> {
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(0);
        self.bind_scalar(name, &data, NativeType::Str, indicator)
    }

    /// Binds structured objects of the named type `type_descriptor` to the
    /// placeholder `name`.
    pub fn bind_object(
        &mut self,
        name: &str,
        objects: &[ObjectRef],
        type_descriptor: TypeDescriptor,
        indicators: &[i16],
    ) -> Result<BindHandle> {
        if !indicators.is_empty() && indicators.len() != objects.len() {
            return Err(StatementError::ValidationError(format!(
                "{} indicators for {} objects",
                indicators.len(),
                objects.len()
            )));
        }

        let value = BindValue {
            data: Vec::new(),
            sql_type: NativeType::NamedType,
            indicator: None,
        };
        let bind = self.bind_value(name, &value)?;
        self.native_call(
            &format!("BindObject({})", name),
            StatementError::Binding,
            |native| native.bind_object(bind, type_descriptor, objects, indicators),
        )?;
        Ok(bind)
    }

    /// Executes the prepared statement, or `sql` after cleaning and
    /// preparing it. With `mode` unset, queries run in the default mode and
    /// everything else commits on success.
    ///
    /// A query derives the field schema from its result columns and defines
    /// a text buffer for every included field. Other statements record
    /// their affected-row count.
    pub fn execute(&mut self, sql: Option<&str>, mode: Option<ExecuteMode>) -> Result<()> {
        if let Some(sql) = sql {
            self.clean();
            self.prepare(sql)?;
        }

        let Some(handle) = self.handle else {
            return Err(self.misuse(
                StatementError::Execution,
                "Execute",
                "no prepared statement",
            ));
        };
        let context = self.command_text.clone().unwrap_or_default();

        self.schema = None;
        self.raw_column_count = 0;
        self.field_map.clear();
        self.columns.clear();
        self.affected_rows = None;
        self.rows_fetched = 0;
        self.state = StatementState::Prepared;

        let kind = self.native_call(
            STATEMENT_KIND_CONTEXT,
            StatementError::Execution,
            |native| native.statement_kind(handle),
        )?;
        let row_producing = kind.is_row_producing();
        let mode = ExecuteMode::resolve(mode, kind);
        let iterations = if row_producing { 0 } else { 1 };

        self.session
            .logger()
            .log_statement(Level::Trace, "Execute", &context);
        self.native_call(&context, StatementError::Execution, |native| {
            native.execute(handle, iterations, mode)
        })?;

        if !row_producing {
            let affected =
                self.native_call(ROW_COUNT_CONTEXT, StatementError::Execution, |native| {
                    native.row_count(handle)
                })?;
            self.affected_rows = Some(affected);
            self.state = StatementState::Executed;
            return Ok(());
        }

        self.describe_result(handle, &context)?;
        self.state = StatementState::Executed;
        Ok(())
    }

    /// Same as [`Statement::execute`] with the mode given as a raw flag,
    /// `-1` meaning "infer from the statement kind".
    pub fn execute_with_flag(&mut self, sql: Option<&str>, flag: i32) -> Result<()> {
        let mode = ExecuteMode::from_flag(flag).map_err(|flag| {
            StatementError::ValidationError(format!("unknown execute mode 0x{:x}", flag))
        })?;
        self.execute(sql, mode)
    }

    fn count_result_columns(&self, handle: StmtHandle) -> Result<usize> {
        // Probes positions until the native layer has no descriptor left.
        // That failure marks the end of the column list and is not reported.
        self.session.with_native(|native| {
            let mut count = 0usize;
            while native.param_get(handle, count as u32 + 1).is_ok() {
                count += 1;
            }
            count
        })
    }

    fn describe_result(&mut self, handle: StmtHandle, context: &str) -> Result<()> {
        let raw_column_count = self.count_result_columns(handle)?;

        let mut schema = FeatureDefn::new(context);
        let mut field_map = FieldMap::with_capacity(raw_column_count);
        let mut columns = Vec::with_capacity(raw_column_count);

        for raw_index in 0..raw_column_count {
            let position = raw_index as u32 + 1;
            let descriptor =
                self.native_call(PARAM_GET_CONTEXT, StatementError::Execution, |native| {
                    native.param_get(handle, position)
                })?;
            let mut info = self.session.get_param_info(&descriptor);

            if info.field.field_type == FieldType::Binary {
                if info.field.name.eq_ignore_ascii_case(DATA_DEFAULT_COLUMN)
                    && info.native_type == NativeType::Lng
                {
                    info.field.field_type = FieldType::String;
                } else {
                    log::debug!(
                        "Skipping column {} ({:?}) of {}",
                        info.field.name,
                        info.native_type,
                        context
                    );
                    field_map.push_excluded();
                    continue;
                }
            }

            let width = buffer_width(&info.field);
            schema.add_field(info.field);
            field_map.push_included();
            columns.push(ColumnBuffer::new(position, width));
        }

        for column in &columns {
            let (position, width) = (column.position(), column.width());
            self.native_call(DEFINE_CONTEXT, StatementError::Execution, |native| {
                native.define_by_pos(handle, position, width, NativeType::Str)
            })?;
        }

        self.raw_column_count = raw_column_count;
        self.field_map = field_map;
        self.columns = columns;
        self.schema = Some(Arc::new(schema));
        Ok(())
    }

    fn no_result_set(&self) -> StatementError {
        let context = self.command_text.as_deref().unwrap_or("Fetch");
        self.misuse(StatementError::Fetch, context, "no result set to fetch from")
    }

    /// Advances to the next row.
    ///
    /// `Ok(None)` at the end of the result set; the statement then stays
    /// exhausted and later calls return `Ok(None)` without a native call.
    pub fn fetch_row(&mut self) -> Result<Option<FetchedRow<'_>>> {
        match self.state {
            StatementState::Exhausted => return Ok(None),
            StatementState::Executed if self.schema.is_some() => {}
            _ => return Err(self.no_result_set()),
        }
        let Some(handle) = self.handle else {
            return Err(self.no_result_set());
        };

        let status = {
            let mut targets: Vec<FetchTarget<'_>> =
                self.columns.iter_mut().map(ColumnBuffer::as_target).collect();
            self.session
                .with_native(|native| native.fetch(handle, &mut targets))?
        };

        match status {
            Ok(()) => {
                self.rows_fetched += 1;
                Ok(Some(FetchedRow::new(&self.columns)))
            }
            Err(NativeStatus::NoData) => {
                self.state = StatementState::Exhausted;
                self.session
                    .logger()
                    .log_metric("rows_fetched", self.rows_fetched as f64, "");
                Ok(None)
            }
            Err(status) => {
                let context = self.command_text.clone().unwrap_or_default();
                let diagnostic = self
                    .session
                    .failed(status, &context)
                    .unwrap_or_else(|| Diagnostic::from_native(context.as_str(), status, None));
                Err(StatementError::Fetch(diagnostic))
            }
        }
    }

    /// Advances to the next row, `None` at the end of the result set or on
    /// failure. A failure leaves its diagnostic on the session.
    pub fn simple_fetch_row(&mut self) -> Option<FetchedRow<'_>> {
        self.fetch_row().ok().flatten()
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        self.clean();
    }
}
