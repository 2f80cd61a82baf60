use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// Datum is one primitive value read from a cursor column, or the null
/// marker. `Opaque` carries the string rendering of a value whose column
/// type falls outside the primitive set.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    F32(f32),
    F64(f64),
    Decimal(BigDecimal),
    Timestamp(DateTime<Utc>),
    Uuid(uuid::Uuid),
    String(String),
    Char(char),
    Opaque(String),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}
