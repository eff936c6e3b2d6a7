use crate::native::{FetchTarget, IND_NULL};
use crate::schema::{FieldDefn, FieldType};

const INTEGER_TEXT_WIDTH: usize = 22;
const REAL_TEXT_WIDTH: usize = 36;
const DATETIME_TEXT_WIDTH: usize = 40;
const DATE_TEXT_WIDTH: usize = 20;
const DEFAULT_TEXT_WIDTH: usize = 256;

/// Size of the text buffer a field is fetched into. A declared width gets
/// three extra bytes for sign, decimal separator and terminator.
pub fn buffer_width(field: &FieldDefn) -> usize {
    if field.width > 0 {
        return field.width as usize + 3;
    }
    match field.field_type {
        FieldType::Integer => INTEGER_TEXT_WIDTH,
        FieldType::Real => REAL_TEXT_WIDTH,
        FieldType::DateTime => DATETIME_TEXT_WIDTH,
        FieldType::Date => DATE_TEXT_WIDTH,
        _ => DEFAULT_TEXT_WIDTH,
    }
}

/// Output buffer of one included column, defined by its 1-based raw
/// position.
#[derive(Debug, Clone)]
pub struct ColumnBuffer {
    position: u32,
    data: Vec<u8>,
    indicator: i16,
}

impl ColumnBuffer {
    pub fn new(position: u32, width: usize) -> Self {
        Self {
            position,
            data: vec![0u8; width],
            indicator: IND_NULL,
        }
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn width(&self) -> usize {
        self.data.len()
    }

    pub fn indicator(&self) -> i16 {
        self.indicator
    }

    pub fn is_null(&self) -> bool {
        self.indicator == IND_NULL
    }

    pub fn is_truncated(&self) -> bool {
        self.indicator > 0
    }

    /// Fetched text up to the terminator, `None` for NULL.
    pub fn value(&self) -> Option<&[u8]> {
        if self.is_null() {
            return None;
        }
        let end = self
            .data
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.data.len());
        Some(&self.data[..end])
    }

    pub fn as_target(&mut self) -> FetchTarget<'_> {
        FetchTarget {
            position: self.position,
            buffer: &mut self.data,
            indicator: &mut self.indicator,
        }
    }
}
