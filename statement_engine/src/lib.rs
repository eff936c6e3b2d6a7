pub mod config;
pub mod engine;
mod error;
pub mod native;
pub mod observability;
pub mod schema;
pub mod session;
#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use config::SessionConfig;
pub use engine::{FetchedRow, FieldMap, FieldSlot, Statement, StatementState};
pub use error::{Diagnostic, ErrorCategory, NativeError, Result, StatementError};
pub use native::{
    ColumnDescriptor, ExecuteMode, NativeApi, NativeStatus, NativeType, OdbcEnvironment,
    OdbcNative, ScriptedNative, StatementKind,
};
pub use schema::{FeatureDefn, FieldDefn, FieldType};
pub use session::{ParamInfo, Session};
