use crate::{CursorError, Datum, RowCursor, Schema};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::cell::Cell;

/// MemoryCursor serves rows from a Vec. It checks ordinal bounds, variant
/// types, and (optionally) the sequential-access contract, so engine tests
/// exercise the same failure surface a real driver would.
pub struct MemoryCursor {
    schema: Schema,
    rows: std::vec::IntoIter<Vec<Datum>>,
    current: Option<Vec<Datum>>,
    sequential: bool,
    last_read: Cell<Option<usize>>,
}

impl MemoryCursor {
    pub fn new(schema: Schema, rows: Vec<Vec<Datum>>) -> Self {
        for (n, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), schema.len(), "row {n} arity mismatch");
        }
        Self {
            schema,
            rows: rows.into_iter(),
            current: None,
            sequential: false,
            last_read: Cell::new(None),
        }
    }

    /// A cursor which additionally enforces non-decreasing ordinal reads
    /// within each row, as sequential-access drivers do.
    pub fn sequential(schema: Schema, rows: Vec<Vec<Datum>>) -> Self {
        Self {
            sequential: true,
            ..Self::new(schema, rows)
        }
    }

    fn fetch(&self, ordinal: usize) -> Result<&Datum, CursorError> {
        let row = self.current.as_ref().ok_or(CursorError::NoCurrentRow)?;
        let datum = row
            .get(ordinal)
            .ok_or(CursorError::OrdinalOutOfRange(ordinal))?;

        if self.sequential {
            if let Some(last) = self.last_read.get() {
                if ordinal < last {
                    return Err(CursorError::NonSequentialRead { ordinal, last });
                }
            }
            self.last_read.set(Some(ordinal));
        }
        Ok(datum)
    }

    fn wrong_type(ordinal: usize, requested: &'static str) -> CursorError {
        CursorError::WrongType { ordinal, requested }
    }
}

macro_rules! typed_getter {
    ($fn:ident, $variant:ident, $ty:ty, $name:literal) => {
        fn $fn(&self, ordinal: usize) -> Result<$ty, CursorError> {
            match self.fetch(ordinal)? {
                Datum::$variant(v) => Ok(v.clone()),
                _ => Err(Self::wrong_type(ordinal, $name)),
            }
        }
    };
}

#[async_trait::async_trait]
impl RowCursor for MemoryCursor {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn advance(&mut self) -> Result<bool, CursorError> {
        self.last_read.set(None);
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn sequential_access(&self) -> bool {
        self.sequential
    }

    fn is_null(&self, ordinal: usize) -> Result<bool, CursorError> {
        Ok(self.fetch(ordinal)?.is_null())
    }

    typed_getter!(get_bool, Bool, bool, "bool");
    typed_getter!(get_i8, I8, i8, "i8");
    typed_getter!(get_i16, I16, i16, "i16");
    typed_getter!(get_i32, I32, i32, "i32");
    typed_getter!(get_i64, I64, i64, "i64");
    typed_getter!(get_u8, U8, u8, "u8");
    typed_getter!(get_f32, F32, f32, "f32");
    typed_getter!(get_f64, F64, f64, "f64");
    typed_getter!(get_decimal, Decimal, BigDecimal, "decimal");
    typed_getter!(get_timestamp, Timestamp, DateTime<Utc>, "timestamp");
    typed_getter!(get_uuid, Uuid, uuid::Uuid, "uuid");
    typed_getter!(get_string, String, String, "string");
    typed_getter!(get_char, Char, char, "char");

    fn get_opaque(&self, ordinal: usize) -> Result<String, CursorError> {
        Ok(match self.fetch(ordinal)? {
            Datum::Null => String::new(),
            Datum::Bool(v) => v.to_string(),
            Datum::I8(v) => v.to_string(),
            Datum::I16(v) => v.to_string(),
            Datum::I32(v) => v.to_string(),
            Datum::I64(v) => v.to_string(),
            Datum::U8(v) => v.to_string(),
            Datum::F32(v) => v.to_string(),
            Datum::F64(v) => v.to_string(),
            Datum::Decimal(v) => v.to_string(),
            Datum::Timestamp(v) => v.to_rfc3339(),
            Datum::Uuid(v) => v.to_string(),
            Datum::String(v) | Datum::Opaque(v) => v.clone(),
            Datum::Char(v) => v.to_string(),
        })
    }
}
