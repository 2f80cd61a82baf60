use crate::json::JsonBuf;
use rowset::{ColumnType, CursorError, Datum, RowCursor};

/// ScalarKind is the enumerated primitive tag of the codec table. Each tag
/// pairs a cursor reader (`read`) with a JSON writer (`write_datum`
/// dispatches on the slot's own tag); dispatch is a bounded match, never a
/// keyed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    F32,
    F64,
    Decimal,
    Timestamp,
    Uuid,
    String,
    Char,
    /// Fallback for column types outside the primitive set: the cursor's
    /// untyped accessor, rendered as a JSON string.
    Opaque,
}

impl ScalarKind {
    /// The codec for a declared column type, or None when only the opaque
    /// fallback can serve it.
    pub fn for_column(ty: &ColumnType) -> Option<ScalarKind> {
        Some(match ty {
            ColumnType::Bool => ScalarKind::Bool,
            ColumnType::Int8 => ScalarKind::I8,
            ColumnType::Int16 => ScalarKind::I16,
            ColumnType::Int32 => ScalarKind::I32,
            ColumnType::Int64 => ScalarKind::I64,
            ColumnType::UInt8 => ScalarKind::U8,
            ColumnType::Float32 => ScalarKind::F32,
            ColumnType::Float64 => ScalarKind::F64,
            ColumnType::Decimal => ScalarKind::Decimal,
            ColumnType::Timestamp => ScalarKind::Timestamp,
            ColumnType::Uuid => ScalarKind::Uuid,
            ColumnType::String => ScalarKind::String,
            ColumnType::Char => ScalarKind::Char,
            ColumnType::Other(_) => return None,
        })
    }

    /// Read one value of this kind from the cursor. A SQL null becomes the
    /// null marker without touching the typed accessor.
    pub fn read<C: RowCursor + ?Sized>(
        &self,
        cursor: &C,
        ordinal: usize,
    ) -> Result<Datum, CursorError> {
        if cursor.is_null(ordinal)? {
            return Ok(Datum::Null);
        }
        Ok(match self {
            ScalarKind::Bool => Datum::Bool(cursor.get_bool(ordinal)?),
            ScalarKind::I8 => Datum::I8(cursor.get_i8(ordinal)?),
            ScalarKind::I16 => Datum::I16(cursor.get_i16(ordinal)?),
            ScalarKind::I32 => Datum::I32(cursor.get_i32(ordinal)?),
            ScalarKind::I64 => Datum::I64(cursor.get_i64(ordinal)?),
            ScalarKind::U8 => Datum::U8(cursor.get_u8(ordinal)?),
            ScalarKind::F32 => Datum::F32(cursor.get_f32(ordinal)?),
            ScalarKind::F64 => Datum::F64(cursor.get_f64(ordinal)?),
            ScalarKind::Decimal => Datum::Decimal(cursor.get_decimal(ordinal)?),
            ScalarKind::Timestamp => Datum::Timestamp(cursor.get_timestamp(ordinal)?),
            ScalarKind::Uuid => Datum::Uuid(cursor.get_uuid(ordinal)?),
            ScalarKind::String => Datum::String(cursor.get_string(ordinal)?),
            ScalarKind::Char => Datum::Char(cursor.get_char(ordinal)?),
            ScalarKind::Opaque => Datum::Opaque(cursor.get_opaque(ordinal)?),
        })
    }
}

/// Write one slot value with its JSON kind: booleans as JSON booleans,
/// numerics (including decimals) as unquoted JSON numbers, characters,
/// UUIDs, timestamps (RFC 3339 UTC), strings, and opaque values as JSON
/// strings, and the null marker as JSON null.
pub(crate) fn write_datum(out: &mut JsonBuf, datum: &Datum) {
    match datum {
        Datum::Null => out.raw(b"null"),
        Datum::Bool(true) => out.raw(b"true"),
        Datum::Bool(false) => out.raw(b"false"),
        Datum::I8(v) => out.scalar(v),
        Datum::I16(v) => out.scalar(v),
        Datum::I32(v) => out.scalar(v),
        Datum::I64(v) => out.scalar(v),
        Datum::U8(v) => out.scalar(v),
        Datum::F32(v) => out.scalar(v),
        Datum::F64(v) => out.scalar(v),
        Datum::Decimal(v) => out.display(v),
        Datum::Timestamp(v) => out.scalar(v),
        Datum::Uuid(v) => out.scalar(v),
        Datum::String(v) => out.scalar(v),
        Datum::Char(v) => out.scalar(v),
        Datum::Opaque(v) => out.scalar(v),
    }
}
