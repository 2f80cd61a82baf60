pub mod bootstrap;

mod cursor;
pub use cursor::PgCursor;

use rowset::ColumnType;

/// Map a Postgres type name, as reported by the driver, onto the engine's
/// declared column types. Unmapped names fall through as `Other` and are
/// served by the engine's string fallback.
pub fn column_type_for(pg_type: &str) -> ColumnType {
    match pg_type {
        "BOOL" => ColumnType::Bool,
        // Postgres' 1-byte "char" decodes as i8.
        "CHAR" => ColumnType::Int8,
        "INT2" => ColumnType::Int16,
        "INT4" => ColumnType::Int32,
        "INT8" => ColumnType::Int64,
        "FLOAT4" => ColumnType::Float32,
        "FLOAT8" => ColumnType::Float64,
        "NUMERIC" => ColumnType::Decimal,
        "TIMESTAMP" | "TIMESTAMPTZ" => ColumnType::Timestamp,
        "UUID" => ColumnType::Uuid,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ColumnType::String,
        other => ColumnType::Other(other.to_string()),
    }
}
