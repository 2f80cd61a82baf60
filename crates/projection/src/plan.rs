use crate::ScalarKind;
use bytes::Bytes;
use shape::ShapeId;

/// One cursor read: fetch the column at `ordinal` with the `kind` codec
/// and store it into slot `slot`. A plan's reads are sorted by ascending
/// ordinal so sequential-access cursors are always satisfied.
#[derive(Debug, Clone)]
pub struct ReadOp {
    pub slot: usize,
    pub ordinal: usize,
    pub kind: ScalarKind,
}

/// One JSON-output instruction. `pre` bytes carry everything positional —
/// element separators, escaped property names, and opening brackets — so
/// per-row emission is a memcpy followed by at most one scalar render.
#[derive(Debug, Clone)]
pub enum EmitOp {
    /// Open a nested object: `pre` ends with `{`.
    BeginObject { pre: Bytes },
    EndObject,
    /// Open a pattern array: `pre` ends with `[`.
    BeginArray { pre: Bytes },
    EndArray,
    /// A named property: `pre` is `"name":` with any leading separator.
    Field { pre: Bytes, slot: usize },
    /// An anonymous array element: `pre` is the separator, if any.
    Element { pre: Bytes, slot: usize },
}

/// Plan is the compiled, row-independent form of one shape descriptor
/// against one cursor schema. Plans are immutable and shared.
#[derive(Debug, Clone)]
pub struct Plan {
    pub(crate) shape_id: ShapeId,
    pub(crate) fingerprint: u64,
    pub(crate) reads: Vec<ReadOp>,
    pub(crate) emits: Vec<EmitOp>,
    pub(crate) slot_count: usize,
    pub(crate) depth: usize,
}

impl Plan {
    pub fn shape_id(&self) -> &ShapeId {
        &self.shape_id
    }

    /// Fingerprint of the schema this plan was compiled against.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn reads(&self) -> &[ReadOp] {
        &self.reads
    }

    pub fn emits(&self) -> &[EmitOp] {
        &self.emits
    }

    /// Number of distinct primitive values read per row.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Maximum object/array nesting below the per-row object.
    pub fn depth(&self) -> usize {
        self.depth
    }
}
