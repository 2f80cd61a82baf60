use bytes::{BufMut, Bytes, BytesMut};

/// JsonBuf accumulates the UTF-8 JSON bytes of complete rows before they
/// are handed to the response writer. Punctuation and property names are
/// pre-encoded into the plan, so the buffer needs no nesting state of its
/// own; scalar rendering is delegated to serde_json.
#[derive(Debug, Default)]
pub struct JsonBuf {
    buf: BytesMut,
}

impl JsonBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Detach everything buffered so far.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Roll back to a previous length, discarding a partially-built row.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub(crate) fn byte(&mut self, b: u8) {
        self.buf.put_u8(b);
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append one scalar as JSON. Escaping and number formatting are
    /// serde_json's; non-finite floats render as null.
    pub(crate) fn scalar<T: serde::Serialize>(&mut self, value: &T) {
        // Unwrap because Write is infallible for BytesMut and scalar
        // serialization has no other failure mode.
        serde_json::to_writer((&mut self.buf).writer(), value).unwrap();
    }

    /// Append a value's Display output verbatim. Used for decimals, whose
    /// plain-decimal rendering is already a valid JSON number.
    pub(crate) fn display<T: std::fmt::Display>(&mut self, value: &T) {
        use std::io::Write;
        write!((&mut self.buf).writer(), "{value}").unwrap();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scalar_escaping() {
        let mut buf = JsonBuf::new();
        buf.scalar(&"quote \" backslash \\ newline \n");
        assert_eq!(
            buf.take().as_ref(),
            br#""quote \" backslash \\ newline \n""#
        );
    }

    #[test]
    fn test_take_resets() {
        let mut buf = JsonBuf::new();
        buf.byte(b'[');
        buf.scalar(&1_i64);
        buf.byte(b']');
        assert_eq!(buf.take().as_ref(), b"[1]");
        assert!(buf.is_empty());

        buf.scalar(&2_i64);
        assert_eq!(buf.take().as_ref(), b"2");
    }

    #[test]
    fn test_truncate_discards_partial_output() {
        let mut buf = JsonBuf::new();
        buf.scalar(&"keep");
        let mark = buf.len();
        buf.raw(b",\"partial");
        buf.truncate(mark);
        assert_eq!(buf.take().as_ref(), br#""keep""#);
    }
}
