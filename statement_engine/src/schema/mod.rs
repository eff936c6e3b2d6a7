//! Field schema derived from the result columns of a query.

use serde::{Deserialize, Serialize};

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Integer,
    Integer64,
    Real,
    Date,
    DateTime,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefn {
    pub name: String,
    pub field_type: FieldType,
    /// Declared width, 0 when unknown.
    pub width: u32,
    pub precision: u32,
    pub nullable: bool,
}

impl FieldDefn {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            width: 0,
            precision: 0,
            nullable: true,
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// Ordered set of fields describing one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDefn {
    name: String,
    geometry_type: Option<String>,
    fields: Vec<FieldDefn>,
}

impl FeatureDefn {
    /// Empty definition without geometry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            geometry_type: None,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry_type(&self) -> Option<&str> {
        self.geometry_type.as_deref()
    }

    /// Appends a field and returns its index.
    pub fn add_field(&mut self, field: FieldDefn) -> usize {
        self.fields.push(field);
        self.fields.len() - 1
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&FieldDefn> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[FieldDefn] {
        &self.fields
    }

    /// Index of the first field named `name`, compared case-insensitively.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
