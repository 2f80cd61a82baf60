// The projection engine turns a shape descriptor plus a cursor schema into
// a compiled serialization plan, and executes that plan against each cursor
// row to stream one JSON object per row with bounded memory.

// Per-primitive-type readers, and the writer dispatch over slot values.
mod codec;
pub use codec::ScalarKind;

// A reusable, fixed-size buffer of one row's primitive values.
mod slot;
pub use slot::SlotBuffer;

// A minimal streaming JSON byte writer over BytesMut.
mod json;
pub use json::JsonBuf;

// The compiled plan: flat read and emit instruction lists.
mod plan;
pub use plan::{EmitOp, Plan, ReadOp};

// Descriptor + schema -> Plan.
mod compile;
pub use compile::{compile, CompileError, CompileOptions};

// Per-row plan execution.
mod execute;
pub use execute::emit_row;

// The streaming driver: outer array, cancellation, lifecycle events.
mod stream;
pub use stream::{stream, StreamError, StreamOutcome, StreamSettings};

// Compiled plans are cached per (shape, schema fingerprint).
mod cache;
pub use cache::PlanCache;

// Structured events emitted by the compiler, executor, and driver.
mod events;
pub use events::{Event, EventCategory, EventSink, MemorySink, TracingSink};
