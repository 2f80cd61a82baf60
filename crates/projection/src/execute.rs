use crate::{codec, EmitOp, JsonBuf, Plan, SlotBuffer};
use rowset::{CursorError, RowCursor};

/// Execute one compiled plan against the cursor's current row, appending
/// exactly one JSON object to `out`.
///
/// Phase one reads every slot exactly once, in ascending ordinal order.
/// Phase two replays the emit instructions against the populated slots.
/// Neither phase allocates beyond the slot buffer's own values.
pub fn emit_row<C: RowCursor + ?Sized>(
    plan: &Plan,
    cursor: &C,
    out: &mut JsonBuf,
    slots: &mut SlotBuffer,
) -> Result<(), CursorError> {
    debug_assert_eq!(slots.len(), plan.slot_count());

    for read in plan.reads() {
        slots.set(read.slot, read.kind.read(cursor, read.ordinal)?);
    }

    out.byte(b'{');
    for emit in plan.emits() {
        match emit {
            EmitOp::BeginObject { pre } | EmitOp::BeginArray { pre } => out.raw(pre),
            EmitOp::EndObject => out.byte(b'}'),
            EmitOp::EndArray => out.byte(b']'),
            EmitOp::Field { pre, slot } | EmitOp::Element { pre, slot } => {
                out.raw(pre);
                codec::write_datum(out, slots.get(*slot));
            }
        }
    }
    out.byte(b'}');
    Ok(())
}
