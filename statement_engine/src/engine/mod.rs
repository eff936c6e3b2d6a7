pub mod buffers;
pub mod field_map;
pub mod row;
pub mod statement;

pub use buffers::{buffer_width, ColumnBuffer};
pub use field_map::{FieldMap, FieldSlot};
pub use row::FetchedRow;
pub use statement::{Statement, StatementState};
