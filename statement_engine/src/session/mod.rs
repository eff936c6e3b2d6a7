//! Database session: owns the native client and turns its status codes
//! into diagnostics.

use crate::config::SessionConfig;
use crate::error::{Diagnostic, Result, StatementError};
use crate::native::{ColumnDescriptor, NativeApi, NativeResult, NativeStatus, NativeType};
use crate::observability::StructuredLogger;
use crate::schema::{FieldDefn, FieldType};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Widest character column still given a declared field width.
const MAX_DECLARED_STRING_WIDTH: u32 = 4000;

/// Scale reported for floating NUMBER columns.
const FLOATING_NUMBER_SCALE: i8 = -127;

/// Field derived from a native column, with the native type and length it
/// was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub field: FieldDefn,
    pub native_type: NativeType,
    pub native_length: u32,
}

pub struct Session {
    native: Mutex<Box<dyn NativeApi>>,
    last_diagnostic: Mutex<Option<Diagnostic>>,
    logger: StructuredLogger,
    config: SessionConfig,
}

impl Session {
    pub fn new(native: impl NativeApi + 'static) -> Self {
        Self::with_config(native, SessionConfig::default())
    }

    pub fn with_config(native: impl NativeApi + 'static, config: SessionConfig) -> Self {
        Self {
            native: Mutex::new(Box::new(native)),
            last_diagnostic: Mutex::new(None),
            logger: StructuredLogger::new(config.log_statements),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Runs `f` with exclusive access to the native client.
    pub fn with_native<T>(&self, f: impl FnOnce(&mut dyn NativeApi) -> T) -> Result<T> {
        let mut native = self
            .native
            .lock()
            .map_err(|_| StatementError::InternalError("Native client lock poisoned".to_string()))?;
        Ok(f(native.as_mut()))
    }

    fn diagnostic_slot(&self) -> MutexGuard<'_, Option<Diagnostic>> {
        match self.last_diagnostic.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the diagnostic for `status` when it is a failure. Failures are
    /// logged and kept as the session's last diagnostic, with the details
    /// read from the native error record. `None` means the call did not fail.
    pub fn failed(&self, status: NativeStatus, context: &str) -> Option<Diagnostic> {
        match status {
            NativeStatus::Success | NativeStatus::NoData => None,
            NativeStatus::SuccessWithInfo => {
                log::warn!("{}: native call succeeded with info", context);
                None
            }
            _ => {
                let error = self.with_native(|native| native.last_error()).ok().flatten();
                let diagnostic = Diagnostic::from_native(context, status, error);
                self.record_diagnostic(diagnostic.clone());
                Some(diagnostic)
            }
        }
    }

    /// Unwraps a native result, turning a failure into a recorded
    /// [`Diagnostic`]. A non-failure status in `Err` (end of data, success
    /// with info) comes back as a diagnostic for this call only and leaves
    /// the session's last diagnostic untouched.
    pub fn check<T>(
        &self,
        result: NativeResult<T>,
        context: &str,
    ) -> std::result::Result<T, Diagnostic> {
        match result {
            Ok(value) => Ok(value),
            Err(status) => Err(self
                .failed(status, context)
                .unwrap_or_else(|| Diagnostic::from_native(context, status, None))),
        }
    }

    /// Logs and stores a diagnostic raised by the statement layer.
    pub fn record_diagnostic(&self, diagnostic: Diagnostic) {
        let mut metadata = HashMap::new();
        metadata.insert("status".to_string(), diagnostic.status.code().to_string());
        self.logger.log_native_failure(&diagnostic, &metadata);
        *self.diagnostic_slot() = Some(diagnostic);
    }

    pub fn last_diagnostic(&self) -> Option<Diagnostic> {
        self.diagnostic_slot().clone()
    }

    pub fn take_diagnostic(&self) -> Option<Diagnostic> {
        self.diagnostic_slot().take()
    }

    pub fn clear_diagnostic(&self) {
        *self.diagnostic_slot() = None;
    }

    /// Maps a native column descriptor to a field definition.
    pub fn get_param_info(&self, column: &ColumnDescriptor) -> ParamInfo {
        ParamInfo {
            field: field_from_column(column),
            native_type: column.native_type,
            native_length: column.length,
        }
    }
}

fn positive(value: i16) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn field_from_column(column: &ColumnDescriptor) -> FieldDefn {
    let field = FieldDefn::new(column.name.clone(), FieldType::Binary).with_nullable(column.nullable);

    match column.native_type {
        NativeType::Chr | NativeType::Afc | NativeType::Str => {
            let field = FieldDefn {
                field_type: FieldType::String,
                ..field
            };
            if column.length <= MAX_DECLARED_STRING_WIDTH {
                field.with_width(column.length)
            } else {
                field
            }
        }
        NativeType::Num => {
            if column.precision == 0 || column.scale == FLOATING_NUMBER_SCALE {
                FieldDefn {
                    field_type: FieldType::Real,
                    ..field
                }
            } else if column.scale > 0 {
                FieldDefn {
                    field_type: FieldType::Real,
                    ..field
                }
                .with_width(positive(column.precision))
                .with_precision(positive(column.scale.into()))
            } else if column.precision < 10 {
                FieldDefn {
                    field_type: FieldType::Integer,
                    ..field
                }
                .with_width(positive(column.precision))
            } else {
                FieldDefn {
                    field_type: FieldType::Integer64,
                    ..field
                }
                .with_width(positive(column.precision))
            }
        }
        NativeType::Int => FieldDefn {
            field_type: FieldType::Integer,
            ..field
        },
        NativeType::Flt | NativeType::BFloat | NativeType::BDouble => FieldDefn {
            field_type: FieldType::Real,
            ..field
        },
        NativeType::Dat | NativeType::Date => FieldDefn {
            field_type: FieldType::Date,
            ..field
        },
        NativeType::Timestamp | NativeType::TimestampTz | NativeType::TimestampLtz => FieldDefn {
            field_type: FieldType::DateTime,
            ..field
        },
        NativeType::Clob => FieldDefn {
            field_type: FieldType::String,
            ..field
        },
        NativeType::Lng
        | NativeType::Bin
        | NativeType::Lbi
        | NativeType::Blob
        | NativeType::NamedType
        | NativeType::Ref
        | NativeType::Unsupported => field,
    }
}
