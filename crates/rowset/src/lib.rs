// Datum is the tagged union over the primitive value set which flows
// between a row cursor and the projection engine's slot buffer.
mod datum;
pub use datum::Datum;

// An ordinal-checked, in-memory cursor used by tests and development
// tooling.
mod memory;
pub use memory::MemoryCursor;

// Column types, the schema of a cursor, and its fingerprint.
mod schema;
pub use schema::{Column, ColumnType, Schema};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("column ordinal {0} is out of range for the current row")]
    OrdinalOutOfRange(usize),
    #[error("cursor has no current row")]
    NoCurrentRow,
    #[error("column ordinal {ordinal} cannot be read as {requested}")]
    WrongType {
        ordinal: usize,
        requested: &'static str,
    },
    #[error("column ordinal {ordinal} was read after ordinal {last} on a sequential-access cursor")]
    NonSequentialRead { ordinal: usize, last: usize },
    #[error(transparent)]
    Driver(Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// RowCursor is a forward-only, single-pass source of columnar rows.
///
/// The cursor stays positioned at row N until `advance` returns true, at
/// which point every column of row N+1 becomes readable through the typed
/// accessors. Accessors may be called in any ordinal order unless the
/// cursor reports `sequential_access`, in which case reads within one row
/// must use non-decreasing ordinals.
///
/// A cursor owns whatever connection or handle produces its rows; dropping
/// the cursor releases it.
#[async_trait::async_trait]
pub trait RowCursor: Send {
    /// The column names and declared types of this cursor, in ordinal order.
    fn schema(&self) -> &Schema;

    /// Move to the next row. Returns false once the source is exhausted.
    async fn advance(&mut self) -> Result<bool, CursorError>;

    /// Whether reads within a row are restricted to non-decreasing ordinals.
    fn sequential_access(&self) -> bool {
        false
    }

    fn is_null(&self, ordinal: usize) -> Result<bool, CursorError>;

    fn get_bool(&self, ordinal: usize) -> Result<bool, CursorError>;
    fn get_i8(&self, ordinal: usize) -> Result<i8, CursorError>;
    fn get_i16(&self, ordinal: usize) -> Result<i16, CursorError>;
    fn get_i32(&self, ordinal: usize) -> Result<i32, CursorError>;
    fn get_i64(&self, ordinal: usize) -> Result<i64, CursorError>;
    fn get_u8(&self, ordinal: usize) -> Result<u8, CursorError>;
    fn get_f32(&self, ordinal: usize) -> Result<f32, CursorError>;
    fn get_f64(&self, ordinal: usize) -> Result<f64, CursorError>;
    fn get_decimal(&self, ordinal: usize) -> Result<BigDecimal, CursorError>;
    fn get_timestamp(&self, ordinal: usize) -> Result<DateTime<Utc>, CursorError>;
    fn get_uuid(&self, ordinal: usize) -> Result<uuid::Uuid, CursorError>;
    fn get_string(&self, ordinal: usize) -> Result<String, CursorError>;
    fn get_char(&self, ordinal: usize) -> Result<char, CursorError>;

    /// Untyped fallback accessor: the value rendered as a string.
    /// Used for column types outside the primitive set.
    fn get_opaque(&self, ordinal: usize) -> Result<String, CursorError>;
}
