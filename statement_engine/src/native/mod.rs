//! Native client layer.
//!
//! The statement layer talks to the database only through [`NativeApi`].
//! Its calls mirror a classic handle-based client library: allocate a
//! statement handle, prepare, bind by name, execute, describe result
//! columns by 1-based position, define output buffers by position and
//! fetch. Every call reports a [`NativeStatus`]; the details of a failure
//! are read back through [`NativeApi::last_error`].

pub mod odbc;
pub mod scripted;

use crate::error::NativeError;

pub use odbc::{OdbcEnvironment, OdbcNative};
pub use scripted::{FailurePoint, ScriptedNative, ScriptedProbe};

/// Indicator value written by a fetch for a NULL column.
pub const IND_NULL: i16 = -1;
/// Indicator value written by a fetch for a complete, non-NULL column.
pub const IND_NOT_NULL: i16 = 0;

/// Status code returned by a native call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeStatus {
    Success,
    SuccessWithInfo,
    NeedData,
    NoData,
    Error,
    InvalidHandle,
    StillExecuting,
}

impl NativeStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::SuccessWithInfo => 1,
            Self::NeedData => 99,
            Self::NoData => 100,
            Self::Error => -1,
            Self::InvalidHandle => -2,
            Self::StillExecuting => -3123,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::SuccessWithInfo,
            99 => Self::NeedData,
            100 => Self::NoData,
            -2 => Self::InvalidHandle,
            -3123 => Self::StillExecuting,
            _ => Self::Error,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SuccessWithInfo)
    }
}

/// Result of a native call: the produced value, or the non-success status.
pub type NativeResult<T> = std::result::Result<T, NativeStatus>;

/// External data type codes understood by the native layer.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NativeType {
    Unsupported = 0,
    Chr = 1,
    Num = 2,
    Int = 3,
    Flt = 4,
    Str = 5,
    Lng = 8,
    Dat = 12,
    BFloat = 21,
    BDouble = 22,
    Bin = 23,
    Lbi = 24,
    Afc = 96,
    NamedType = 108,
    Ref = 110,
    Clob = 112,
    Blob = 113,
    Date = 184,
    Timestamp = 187,
    TimestampTz = 188,
    TimestampLtz = 232,
}

impl NativeType {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Chr,
            2 => Self::Num,
            3 => Self::Int,
            4 => Self::Flt,
            5 => Self::Str,
            8 => Self::Lng,
            12 => Self::Dat,
            21 => Self::BFloat,
            22 => Self::BDouble,
            23 => Self::Bin,
            24 => Self::Lbi,
            96 => Self::Afc,
            108 => Self::NamedType,
            110 => Self::Ref,
            112 => Self::Clob,
            113 => Self::Blob,
            184 => Self::Date,
            187 => Self::Timestamp,
            188 => Self::TimestampTz,
            232 => Self::TimestampLtz,
            _ => Self::Unsupported,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Kind of statement as reported by the native statement-type attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Update,
    Delete,
    Insert,
    Create,
    Drop,
    Alter,
    Begin,
    Declare,
    Other,
}

impl StatementKind {
    /// Classifies a statement by its leading keyword.
    pub fn classify(sql: &str) -> Self {
        let keyword: String = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" => Self::Select,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "INSERT" | "MERGE" => Self::Insert,
            "CREATE" => Self::Create,
            "DROP" => Self::Drop,
            "ALTER" => Self::Alter,
            "BEGIN" => Self::Begin,
            "DECLARE" => Self::Declare,
            _ => Self::Other,
        }
    }

    pub fn is_row_producing(self) -> bool {
        self == Self::Select
    }
}

/// Execution mode passed to the native execute call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteMode {
    Default,
    DescribeOnly,
    CommitOnSuccess,
}

impl ExecuteMode {
    /// Maps a raw mode flag. `-1` means "infer from the statement kind" and
    /// yields `Ok(None)`.
    pub fn from_flag(flag: i32) -> std::result::Result<Option<Self>, i32> {
        match flag {
            -1 => Ok(None),
            0x00 => Ok(Some(Self::Default)),
            0x10 => Ok(Some(Self::DescribeOnly)),
            0x20 => Ok(Some(Self::CommitOnSuccess)),
            other => Err(other),
        }
    }

    pub fn flag(self) -> i32 {
        match self {
            Self::Default => 0x00,
            Self::DescribeOnly => 0x10,
            Self::CommitOnSuccess => 0x20,
        }
    }

    /// Row-producing statements run without committing, everything else
    /// commits on success.
    pub fn resolve(requested: Option<Self>, kind: StatementKind) -> Self {
        match requested {
            Some(mode) => mode,
            None if kind.is_row_producing() => Self::Default,
            None => Self::CommitOnSuccess,
        }
    }
}

/// Opaque native statement handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StmtHandle(pub u32);

/// Opaque native bind handle produced by a bind-by-name call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindHandle(pub u32);

/// Native descriptor of a structured (named) type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeDescriptor(pub u32);

/// Native reference to a structured object instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub u64);

/// Value handed to a bind-by-name call. The native layer copies it.
#[derive(Clone, Debug, PartialEq)]
pub struct BindValue {
    pub data: Vec<u8>,
    pub sql_type: NativeType,
    pub indicator: Option<i16>,
}

impl BindValue {
    pub fn is_null(&self) -> bool {
        self.indicator == Some(IND_NULL)
    }
}

/// Native description of one result column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub native_type: NativeType,
    pub length: u32,
    pub precision: i16,
    pub scale: i8,
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            native_type,
            length: 0,
            precision: 0,
            scale: 0,
            nullable: true,
        }
    }

    pub fn varchar(name: impl Into<String>, length: u32) -> Self {
        Self {
            length,
            ..Self::new(name, NativeType::Chr)
        }
    }

    pub fn number(name: impl Into<String>, precision: i16, scale: i8) -> Self {
        Self {
            length: 22,
            precision,
            scale,
            ..Self::new(name, NativeType::Num)
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Output slot handed to a fetch: the defined buffer of one column and its
/// indicator. Text is written NUL-terminated and truncated to fit.
pub struct FetchTarget<'a> {
    pub position: u32,
    pub buffer: &'a mut [u8],
    pub indicator: &'a mut i16,
}

/// Writes one fetched value into a target, following the indicator
/// convention: `-1` NULL, `0` complete, original length when truncated.
pub fn write_fetch_target(target: &mut FetchTarget<'_>, value: Option<&[u8]>) {
    let Some(value) = value else {
        if let Some(first) = target.buffer.first_mut() {
            *first = 0;
        }
        *target.indicator = IND_NULL;
        return;
    };

    let capacity = target.buffer.len().saturating_sub(1);
    let copied = value.len().min(capacity);
    target.buffer[..copied].copy_from_slice(&value[..copied]);
    if let Some(terminator) = target.buffer.get_mut(copied) {
        *terminator = 0;
    }
    *target.indicator = if copied < value.len() {
        i16::try_from(value.len()).unwrap_or(i16::MAX)
    } else {
        IND_NOT_NULL
    };
}

/// Handle-based native client calls used by a statement.
///
/// `Err` never carries [`NativeStatus::Success`]. It carries `Error`,
/// `InvalidHandle` or another failure status, with the details left for
/// [`NativeApi::last_error`]. `NoData` only comes from [`NativeApi::fetch`]
/// at end of data. `SuccessWithInfo` is reported as `Ok`.
pub trait NativeApi: Send {
    fn alloc_statement(&mut self) -> NativeResult<StmtHandle>;

    fn free_statement(&mut self, stmt: StmtHandle) -> NativeResult<()>;

    fn prepare(&mut self, stmt: StmtHandle, sql: &str) -> NativeResult<()>;

    fn statement_kind(&mut self, stmt: StmtHandle) -> NativeResult<StatementKind>;

    fn bind_by_name(
        &mut self,
        stmt: StmtHandle,
        placeholder: &str,
        value: &BindValue,
    ) -> NativeResult<BindHandle>;

    fn bind_object(
        &mut self,
        bind: BindHandle,
        type_descriptor: TypeDescriptor,
        objects: &[ObjectRef],
        indicators: &[i16],
    ) -> NativeResult<()>;

    fn execute(&mut self, stmt: StmtHandle, iterations: u32, mode: ExecuteMode)
        -> NativeResult<()>;

    /// Rows affected by the last executed non-query statement.
    fn row_count(&mut self, stmt: StmtHandle) -> NativeResult<u64>;

    /// Describes the result column at 1-based `position`.
    fn param_get(&mut self, stmt: StmtHandle, position: u32) -> NativeResult<ColumnDescriptor>;

    /// Registers an output buffer of `width` bytes for the column at
    /// `position`, converted to `output_type`.
    fn define_by_pos(
        &mut self,
        stmt: StmtHandle,
        position: u32,
        width: usize,
        output_type: NativeType,
    ) -> NativeResult<()>;

    /// Fetches the next row into `targets`. `Err(NativeStatus::NoData)` at
    /// the end of the result set.
    fn fetch(&mut self, stmt: StmtHandle, targets: &mut [FetchTarget<'_>]) -> NativeResult<()>;

    /// Error record of the last failed call.
    fn last_error(&self) -> Option<NativeError>;
}
