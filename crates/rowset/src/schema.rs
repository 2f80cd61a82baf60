use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

/// ColumnType is the declared type of a cursor column.
///
/// Types outside the primitive set are carried as `Other` with the driver's
/// own type name, and are served by the engine's fallback codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    Float32,
    Float64,
    Decimal,
    Timestamp,
    Uuid,
    String,
    Char,
    Other(String),
}

impl ColumnType {
    pub fn as_str(&self) -> &str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::Int8 => "int8",
            ColumnType::Int16 => "int16",
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::UInt8 => "uint8",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::Decimal => "decimal",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Uuid => "uuid",
            ColumnType::String => "string",
            ColumnType::Char => "char",
            ColumnType::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column of a cursor schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Schema is the ordered set of columns a cursor exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, ordinal: usize) -> Option<&Column> {
        self.columns.get(ordinal)
    }

    /// Resolve a column name to its ordinal. Names are matched exactly;
    /// the first occurrence wins if a source exposes duplicates.
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// A stable digest over `(name, declared type)` pairs in ordinal order.
    /// Two cursors with equal fingerprints are plan-compatible.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for column in &self.columns {
            hasher.update(&(column.name.len() as u64).to_le_bytes());
            hasher.update(column.name.as_bytes());
            let ty = column.ty.as_str();
            hasher.update(&(ty.len() as u64).to_le_bytes());
            hasher.update(ty.as_bytes());
        }
        hasher.digest()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("Id", ColumnType::Int64),
            Column::new("Name", ColumnType::String),
            Column::new("Price", ColumnType::Decimal),
        ])
    }

    #[test]
    fn test_ordinal_resolution() {
        let schema = schema();
        assert_eq!(schema.ordinal_of("Id"), Some(0));
        assert_eq!(schema.ordinal_of("Price"), Some(2));
        assert_eq!(schema.ordinal_of("Missing"), None);
        assert_eq!(schema.ordinal_of("id"), None); // names are exact
    }

    #[test]
    fn test_fingerprint_tracks_names_and_types() {
        let base = schema().fingerprint();
        assert_eq!(base, schema().fingerprint());

        let renamed = Schema::new(vec![
            Column::new("Id", ColumnType::Int64),
            Column::new("Title", ColumnType::String),
            Column::new("Price", ColumnType::Decimal),
        ]);
        assert_ne!(base, renamed.fingerprint());

        let retyped = Schema::new(vec![
            Column::new("Id", ColumnType::Int64),
            Column::new("Name", ColumnType::String),
            Column::new("Price", ColumnType::Float64),
        ]);
        assert_ne!(base, retyped.fingerprint());
    }

    #[test]
    fn test_fingerprint_is_not_ambiguous_across_boundaries() {
        // ("ab", "c") must not collide with ("a", "bc").
        let left = Schema::new(vec![Column::new("ab", ColumnType::Other("c".to_string()))]);
        let right = Schema::new(vec![Column::new("a", ColumnType::Other("bc".to_string()))]);
        assert_ne!(left.fingerprint(), right.fingerprint());
    }
}
