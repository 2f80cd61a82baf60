use crate::{EmitOp, Event, EventCategory, EventSink, Plan, ReadOp, ScalarKind};
use bytes::Bytes;
use rowset::{ColumnType, Schema};
use shape::{Node, Shape, ShapeError};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// When true, a referenced column missing from the cursor schema fails
    /// the compilation instead of omitting the field.
    pub strict: bool,
    /// When true, a pattern-matched column with an unsupported type is kept
    /// as a string-rendered array element; when false it is left out of the
    /// array entirely.
    pub array_element_fallback_to_string: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strict: false,
            array_element_fallback_to_string: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("column {column:?} of field {field:?} is not present in the cursor schema")]
    ColumnNotFound { field: String, column: String },
}

/// Compile a shape descriptor against a cursor schema.
///
/// The result is deterministic: the same descriptor and schema always
/// produce a plan with identical instructions. Schema mismatches are
/// resolved here — by omission, coercion, or the opaque fallback, each
/// recorded through the event sink — so execution never consults the
/// descriptor again and emits no schema events of its own.
pub fn compile(
    shape: &Shape,
    schema: &Schema,
    options: &CompileOptions,
    events: &dyn EventSink,
    correlation_id: &str,
) -> Result<Plan, CompileError> {
    // Shapes arriving from configuration bypass the validating constructor.
    shape.validate()?;

    let mut compiler = Compiler {
        schema,
        options,
        events,
        correlation_id,
        reads: Vec::new(),
        emits: Vec::new(),
        next_slot: 0,
        max_depth: 0,
        referenced: vec![0u32; schema.len()],
        pattern_claimed: HashSet::new(),
        unsupported_reported: HashSet::new(),
    };

    // The root is an implicit flatten: the executor itself wraps each row
    // in `{}`, so the walk starts with an open comma scope and no markers.
    let mut first = true;
    compiler.container(&shape.root, 0, &mut first)?;

    let Compiler {
        mut reads,
        emits,
        next_slot,
        max_depth,
        ..
    } = compiler;

    // Sequential-access cursors require non-decreasing ordinal reads.
    // The sort is stable, so slot order is preserved among entries which
    // share an ordinal.
    reads.sort_by_key(|read| read.ordinal);

    Ok(Plan {
        shape_id: shape.id.clone(),
        fingerprint: schema.fingerprint(),
        reads,
        emits,
        slot_count: next_slot,
        depth: max_depth,
    })
}

struct Compiler<'a> {
    schema: &'a Schema,
    options: &'a CompileOptions,
    events: &'a dyn EventSink,
    correlation_id: &'a str,

    reads: Vec<ReadOp>,
    emits: Vec<EmitOp>,
    next_slot: usize,
    max_depth: usize,

    // Reference counts per ordinal, plus the ordinals claimed by array
    // patterns, to surface shared columns.
    referenced: Vec<u32>,
    pattern_claimed: HashSet<usize>,
    unsupported_reported: HashSet<usize>,
}

impl<'a> Compiler<'a> {
    fn container(
        &mut self,
        nodes: &[Node],
        depth: usize,
        first: &mut bool,
    ) -> Result<(), CompileError> {
        for node in nodes {
            match node {
                Node::Field { name, column, ty } => self.field(name, column, ty, first)?,
                Node::Object { name, children } => {
                    self.max_depth = self.max_depth.max(depth + 1);
                    self.emits.push(EmitOp::BeginObject {
                        pre: key_pre(first, name, Some(b'{')),
                    });
                    let mut child_first = true;
                    self.container(children, depth + 1, &mut child_first)?;
                    self.emits.push(EmitOp::EndObject);
                }
                Node::Flatten { children } => {
                    // Children splice into the enclosing scope: no markers,
                    // no additional depth, shared separator state.
                    self.container(children, depth, first)?;
                }
                Node::ArrayPattern { name, prefix } => {
                    self.array_pattern(name, prefix, depth, first)
                }
            }
        }
        Ok(())
    }

    fn field(
        &mut self,
        name: &str,
        column: &str,
        declared: &ColumnType,
        first: &mut bool,
    ) -> Result<(), CompileError> {
        let schema = self.schema;

        let Some(ordinal) = schema.ordinal_of(column) else {
            self.events.record(
                Event::new(EventCategory::ColumnNotFound, self.correlation_id)
                    .detail(format!("column {column:?} referenced by field {name:?}")),
            );
            if self.options.strict {
                return Err(CompileError::ColumnNotFound {
                    field: name.to_string(),
                    column: column.to_string(),
                });
            }
            // Non-strict: the JSON simply omits this field.
            return Ok(());
        };

        if self.pattern_claimed.contains(&ordinal) {
            tracing::warn!(
                column,
                field = name,
                "column is shared between a field and an array pattern"
            );
        }

        // The cursor's reported type wins over the declared one.
        let actual = &schema.columns()[ordinal].ty;
        let kind = match ScalarKind::for_column(actual) {
            Some(kind) => {
                if actual != declared {
                    self.events.record(
                        Event::new(EventCategory::TypeCoerced, self.correlation_id).detail(
                            format!(
                                "field {name:?} declares {declared} but the cursor reports {actual}"
                            ),
                        ),
                    );
                }
                kind
            }
            None => {
                self.report_unsupported(ordinal);
                ScalarKind::Opaque
            }
        };

        self.referenced[ordinal] += 1;
        let slot = self.alloc_slot();
        self.reads.push(ReadOp {
            slot,
            ordinal,
            kind,
        });
        self.emits.push(EmitOp::Field {
            pre: key_pre(first, name, None),
            slot,
        });
        Ok(())
    }

    fn array_pattern(&mut self, name: &str, prefix: &str, depth: usize, first: &mut bool) {
        let schema = self.schema;

        // Expansion happens once, here: matched columns in ascending
        // ordinal order become a bounded list of element instructions.
        let matched: Vec<usize> = (0..schema.len())
            .filter(|&ordinal| schema.columns()[ordinal].name.starts_with(prefix))
            .collect();

        if matched.is_empty() {
            self.events.record(
                Event::new(EventCategory::EmptyArrayPattern, self.correlation_id).detail(
                    format!("array pattern {name:?} with prefix {prefix:?} matched no columns"),
                ),
            );
        }

        self.max_depth = self.max_depth.max(depth + 1);
        self.emits.push(EmitOp::BeginArray {
            pre: key_pre(first, name, Some(b'[')),
        });

        let mut elem_first = true;
        for ordinal in matched {
            if self.referenced[ordinal] > 0 {
                tracing::warn!(
                    column = schema.columns()[ordinal].name.as_str(),
                    pattern = name,
                    "array pattern matches a column already referenced by the shape"
                );
            }

            let kind = match ScalarKind::for_column(&schema.columns()[ordinal].ty) {
                Some(kind) => kind,
                None => {
                    self.report_unsupported(ordinal);
                    if !self.options.array_element_fallback_to_string {
                        continue;
                    }
                    ScalarKind::Opaque
                }
            };

            self.referenced[ordinal] += 1;
            self.pattern_claimed.insert(ordinal);
            let slot = self.alloc_slot();
            self.reads.push(ReadOp {
                slot,
                ordinal,
                kind,
            });

            let pre = if elem_first {
                Bytes::new()
            } else {
                Bytes::from_static(b",")
            };
            elem_first = false;
            self.emits.push(EmitOp::Element { pre, slot });
        }
        self.emits.push(EmitOp::EndArray);
    }

    fn alloc_slot(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn report_unsupported(&mut self, ordinal: usize) {
        // Once per column, at compile time; never per row.
        if !self.unsupported_reported.insert(ordinal) {
            return;
        }
        let column = &self.schema.columns()[ordinal];
        self.events.record(
            Event::new(EventCategory::UnsupportedType, self.correlation_id).detail(format!(
                "column {:?} has unsupported type {:?}; using the string fallback",
                column.name,
                column.ty.as_str()
            )),
        );
    }
}

/// Pre-encode everything positional about one emit instruction: the
/// element separator (when not first in its scope), the escaped property
/// name, and an opening bracket for containers.
fn key_pre(first: &mut bool, name: &str, open: Option<u8>) -> Bytes {
    let mut pre = Vec::with_capacity(name.len() + 5);
    if !*first {
        pre.push(b',');
    }
    *first = false;
    // Unwrap because string-slice serialization cannot fail.
    pre.extend_from_slice(&serde_json::to_vec(name).unwrap());
    pre.push(b':');
    if let Some(b) = open {
        pre.push(b);
    }
    Bytes::from(pre)
}
