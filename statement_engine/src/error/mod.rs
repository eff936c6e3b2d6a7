use crate::native::NativeStatus;
use odbc_api::handles::Record as OdbcRecord;
use std::fmt;
use thiserror::Error;

/// Error category for decision-making (abort, reconnect, fix input).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fatal error - should abort operation
    Fatal,
    /// Validation error - misuse of the statement API or invalid input
    Validation,
    /// Connection lost - should reconnect
    ConnectionLost,
}

/// Native error record as reported by the client library's error handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub native_code: i32,
    pub sqlstate: [u8; 5],
    pub message: String,
}

impl NativeError {
    pub fn new(native_code: i32, message: impl Into<String>) -> Self {
        Self {
            native_code,
            sqlstate: [0u8; 5],
            message: message.into(),
        }
    }

    pub fn with_sqlstate(mut self, sqlstate: [u8; 5]) -> Self {
        self.sqlstate = sqlstate;
        self
    }
}

impl From<&odbc_api::Error> for NativeError {
    fn from(err: &odbc_api::Error) -> Self {
        use odbc_api::Error as OdbcErr;
        let record = match err {
            OdbcErr::Diagnostics { record, .. } => record,
            OdbcErr::UnsupportedOdbcApiVersion(record) => record,
            OdbcErr::InvalidRowArraySize { record, .. } => record,
            OdbcErr::UnableToRepresentNull(record) => record,
            OdbcErr::OracleOdbcDriverDoesNotSupport64Bit(record) => record,
            _ => return NativeError::new(0, err.to_string()),
        };
        native_error_from_odbc_record(record)
    }
}

fn native_error_from_odbc_record(record: &OdbcRecord) -> NativeError {
    NativeError {
        native_code: record.native_error,
        sqlstate: record.state.0,
        message: record.to_string(),
    }
}

/// A failed native call, with the context string of the operation that
/// caused it (the SQL text or the native operation name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub context: String,
    pub status: NativeStatus,
    pub native_code: i32,
    pub sqlstate: [u8; 5],
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic for a failure detected by the statement layer itself,
    /// without a native call behind it.
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            status: NativeStatus::Error,
            native_code: 0,
            sqlstate: [0u8; 5],
            message: message.into(),
        }
    }

    pub fn from_native(
        context: impl Into<String>,
        status: NativeStatus,
        error: Option<NativeError>,
    ) -> Self {
        let context = context.into();
        match error {
            Some(e) => Self {
                context,
                status,
                native_code: e.native_code,
                sqlstate: e.sqlstate,
                message: e.message,
            },
            None => Self {
                context,
                status,
                native_code: 0,
                sqlstate: [0u8; 5],
                message: format!("native call returned {:?}", status),
            },
        }
    }

    pub fn sqlstate_str(&self) -> Option<&str> {
        if self.sqlstate == [0u8; 5] {
            return None;
        }
        std::str::from_utf8(&self.sqlstate).ok()
    }

    fn is_connection_loss(&self) -> bool {
        if self.sqlstate[0] == b'0' && self.sqlstate[1] == b'8' {
            return true;
        }
        // ORA-03113 end-of-file on channel, ORA-03114 not connected,
        // ORA-12541 no listener, ORA-12545 target host does not exist
        matches!(self.native_code, 3113 | 3114 | 12541 | 12545)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)?;
        if self.native_code != 0 {
            write!(f, " (native code {})", self.native_code)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone)]
pub enum StatementError {
    #[error("Preparation error: {0}")]
    Preparation(Diagnostic),

    #[error("Binding error: {0}")]
    Binding(Diagnostic),

    #[error("Execution error: {0}")]
    Execution(Diagnostic),

    #[error("Fetch error: {0}")]
    Fetch(Diagnostic),

    #[error("Connection error: {0}")]
    Connection(Diagnostic),

    #[error("Connection string is empty")]
    EmptyConnectionString,

    #[error("Environment not initialized")]
    EnvironmentNotInitialized,

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
}

impl StatementError {
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            StatementError::Preparation(d)
            | StatementError::Binding(d)
            | StatementError::Execution(d)
            | StatementError::Fetch(d)
            | StatementError::Connection(d) => Some(d),
            _ => None,
        }
    }

    pub fn native_code(&self) -> i32 {
        self.diagnostic().map(|d| d.native_code).unwrap_or(0)
    }

    pub fn sqlstate(&self) -> [u8; 5] {
        self.diagnostic().map(|d| d.sqlstate).unwrap_or([0u8; 5])
    }

    /// Returns true if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        match self {
            StatementError::EmptyConnectionString
            | StatementError::EnvironmentNotInitialized
            | StatementError::Connection(_) => true,
            other => other
                .diagnostic()
                .map(Diagnostic::is_connection_loss)
                .unwrap_or(false),
        }
    }

    /// Returns the error category for decision-making
    pub fn error_category(&self) -> ErrorCategory {
        if matches!(self, StatementError::ValidationError(_)) {
            return ErrorCategory::Validation;
        }
        if self.is_connection_error() {
            return ErrorCategory::ConnectionLost;
        }
        // Failures detected before any native call (double prepare, no
        // statement to execute) carry no native code.
        if let Some(d) = self.diagnostic() {
            if d.native_code == 0 && d.sqlstate == [0u8; 5] && d.status == NativeStatus::Error {
                return ErrorCategory::Validation;
            }
        }
        ErrorCategory::Fatal
    }
}

pub type Result<T> = std::result::Result<T, StatementError>;
