/// Where one raw result column lands in the field schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    pub included: bool,
    pub schema_index: usize,
}

impl FieldSlot {
    pub const EXCLUDED: FieldSlot = FieldSlot {
        included: false,
        schema_index: 0,
    };

    pub fn included(schema_index: usize) -> Self {
        Self {
            included: true,
            schema_index,
        }
    }

    pub fn schema_index(&self) -> Option<usize> {
        self.included.then_some(self.schema_index)
    }
}

/// Raw column position (0-based) to schema field index.
///
/// Included indices are dense and increase with the raw position, so the
/// n-th included slot always maps to field n.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    slots: Vec<FieldSlot>,
    included: usize,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(raw_columns: usize) -> Self {
        Self {
            slots: Vec::with_capacity(raw_columns),
            included: 0,
        }
    }

    /// Appends the next raw column as a schema field and returns its index.
    pub fn push_included(&mut self) -> usize {
        let index = self.included;
        self.slots.push(FieldSlot::included(index));
        self.included += 1;
        index
    }

    pub fn push_excluded(&mut self) {
        self.slots.push(FieldSlot::EXCLUDED);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn included_count(&self) -> usize {
        self.included
    }

    pub fn get(&self, raw_index: usize) -> Option<FieldSlot> {
        self.slots.get(raw_index).copied()
    }

    pub fn schema_index(&self, raw_index: usize) -> Option<usize> {
        self.get(raw_index).and_then(|slot| slot.schema_index())
    }

    /// Raw position of the column feeding schema field `schema_index`.
    pub fn raw_index(&self, schema_index: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.schema_index() == Some(schema_index))
    }

    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.included = 0;
    }
}
