use super::buffers::ColumnBuffer;
use std::borrow::Cow;

/// The current row of a statement, one entry per schema field.
///
/// Borrows the statement's column buffers, so it cannot outlive the next
/// fetch, execute or prepare.
#[derive(Debug, Clone, Copy)]
pub struct FetchedRow<'a> {
    columns: &'a [ColumnBuffer],
}

impl<'a> FetchedRow<'a> {
    pub(crate) fn new(columns: &'a [ColumnBuffer]) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// True for NULL values and for indices past the last field.
    pub fn is_null(&self, index: usize) -> bool {
        self.get_bytes(index).is_none()
    }

    pub fn get_bytes(&self, index: usize) -> Option<&'a [u8]> {
        self.columns.get(index).and_then(ColumnBuffer::value)
    }

    /// Text of field `index`. Invalid UTF-8 is replaced.
    pub fn get(&self, index: usize) -> Option<Cow<'a, str>> {
        self.get_bytes(index).map(String::from_utf8_lossy)
    }

    pub fn is_truncated(&self, index: usize) -> bool {
        self.columns
            .get(index)
            .map(ColumnBuffer::is_truncated)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&'a [u8]>> + 'a {
        self.columns.iter().map(ColumnBuffer::value)
    }

    pub fn to_vec(&self) -> Vec<Option<String>> {
        self.columns
            .iter()
            .map(|c| c.value().map(|v| String::from_utf8_lossy(v).into_owned()))
            .collect()
    }
}
