use bigdecimal::BigDecimal;
use pretty_assertions::assert_eq;
use projection::{
    compile, emit_row, CompileOptions, EventCategory, JsonBuf, MemorySink, SlotBuffer,
    StreamOutcome, StreamSettings,
};
use rowset::{Column, ColumnType, CursorError, Datum, MemoryCursor, RowCursor, Schema};
use shape::{Node, Shape};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn dec(s: &str) -> Datum {
    Datum::Decimal(BigDecimal::from_str(s).unwrap())
}

fn s(v: &str) -> Datum {
    Datum::String(v.to_string())
}

/// Compile and stream a shape over an in-memory cursor, returning the
/// response body and the recorded events.
async fn run<C: RowCursor>(
    shape: &Shape,
    cursor: C,
    cancel: &CancellationToken,
) -> (String, Result<StreamOutcome, projection::StreamError>, MemorySink) {
    let sink = MemorySink::new();
    let plan = compile(
        shape,
        cursor.schema(),
        &CompileOptions::default(),
        &sink,
        "test",
    )
    .unwrap();

    let mut body = Vec::new();
    let outcome = projection::stream(
        &plan,
        cursor,
        &mut body,
        cancel,
        &sink,
        "test",
        &StreamSettings::default(),
    )
    .await;

    (String::from_utf8(body).unwrap(), outcome, sink)
}

async fn run_complete<C: RowCursor>(shape: &Shape, cursor: C) -> String {
    let cancel = CancellationToken::new();
    let (body, outcome, _) = run(shape, cursor, &cancel).await;
    match outcome.unwrap() {
        StreamOutcome::Complete { .. } => body,
        outcome => panic!("expected completion, got {outcome:?}"),
    }
}

#[tokio::test]
async fn test_scenario_primitives_only() {
    let shape = Shape::new(
        "products",
        vec![
            Node::field("id", "Id", ColumnType::Int64),
            Node::field("name", "Name", ColumnType::String),
            Node::field("price", "Price", ColumnType::Decimal),
        ],
    )
    .unwrap();
    let cursor = MemoryCursor::new(
        Schema::new(vec![
            Column::new("Id", ColumnType::Int64),
            Column::new("Name", ColumnType::String),
            Column::new("Price", ColumnType::Decimal),
        ]),
        vec![
            vec![Datum::I64(7), s("Widget"), dec("19.95")],
            vec![Datum::I64(8), Datum::Null, dec("0")],
        ],
    );

    let body = run_complete(&shape, cursor).await;
    insta::assert_snapshot!(
        body,
        @r#"[{"id":7,"name":"Widget","price":19.95},{"id":8,"name":null,"price":0}]"#
    );
}

#[tokio::test]
async fn test_scenario_nested_object() {
    let shape = Shape::new(
        "orders",
        vec![
            Node::field("id", "Id", ColumnType::Int64),
            Node::object(
                "customer",
                vec![
                    Node::field("name", "CName", ColumnType::String),
                    Node::field("city", "CCity", ColumnType::String),
                ],
            ),
        ],
    )
    .unwrap();
    let cursor = MemoryCursor::new(
        Schema::new(vec![
            Column::new("Id", ColumnType::Int64),
            Column::new("CName", ColumnType::String),
            Column::new("CCity", ColumnType::String),
        ]),
        vec![vec![Datum::I64(1), s("Ada"), s("Paris")]],
    );

    let body = run_complete(&shape, cursor).await;
    assert_eq!(
        body,
        r#"[{"id":1,"customer":{"name":"Ada","city":"Paris"}}]"#
    );
}

#[tokio::test]
async fn test_scenario_flatten_equivalence() {
    let schema = Schema::new(vec![
        Column::new("Id", ColumnType::Int64),
        Column::new("CName", ColumnType::String),
        Column::new("CCity", ColumnType::String),
    ]);
    let row = vec![Datum::I64(1), s("Ada"), s("Paris")];

    let flattened = Shape::new(
        "orders",
        vec![
            Node::field("id", "Id", ColumnType::Int64),
            Node::flatten(vec![
                Node::field("name", "CName", ColumnType::String),
                Node::field("city", "CCity", ColumnType::String),
            ]),
        ],
    )
    .unwrap();
    let inlined = Shape::new(
        "orders",
        vec![
            Node::field("id", "Id", ColumnType::Int64),
            Node::field("name", "CName", ColumnType::String),
            Node::field("city", "CCity", ColumnType::String),
        ],
    )
    .unwrap();

    let body = run_complete(
        &flattened,
        MemoryCursor::new(schema.clone(), vec![row.clone()]),
    )
    .await;
    assert_eq!(body, r#"[{"id":1,"name":"Ada","city":"Paris"}]"#);

    // Flattening a sub-object is byte-identical to inlining its fields.
    let inlined_body = run_complete(&inlined, MemoryCursor::new(schema, vec![row])).await;
    assert_eq!(body, inlined_body);
}

#[tokio::test]
async fn test_scenario_array_pattern() {
    let shape = Shape::new(
        "tagged",
        vec![
            Node::field("id", "Id", ColumnType::Int64),
            Node::array_pattern("tags", "Tag_"),
        ],
    )
    .unwrap();
    let cursor = MemoryCursor::new(
        Schema::new(vec![
            Column::new("Id", ColumnType::Int64),
            Column::new("Tag_01", ColumnType::String),
            Column::new("Tag_02", ColumnType::String),
            Column::new("Tag_03", ColumnType::String),
        ]),
        vec![vec![Datum::I64(42), s("red"), Datum::Null, s("blue")]],
    );

    let body = run_complete(&shape, cursor).await;
    insta::assert_snapshot!(body, @r#"[{"id":42,"tags":["red",null,"blue"]}]"#);
}

#[tokio::test]
async fn test_scenario_column_not_found_is_non_fatal() {
    let shape = Shape::new(
        "partial",
        vec![
            Node::field("id", "Id", ColumnType::Int64),
            Node::field("missing", "Missing", ColumnType::String),
        ],
    )
    .unwrap();
    let cursor = MemoryCursor::new(
        Schema::new(vec![Column::new("Id", ColumnType::Int64)]),
        vec![vec![Datum::I64(1)], vec![Datum::I64(2)]],
    );

    let cancel = CancellationToken::new();
    let (body, outcome, sink) = run(&shape, cursor, &cancel).await;
    assert_eq!(outcome.unwrap(), StreamOutcome::Complete { rows: 2 });

    // The field is omitted from every object; the mismatch was recorded
    // exactly once, at compile time, and never during execution.
    assert_eq!(body, r#"[{"id":1},{"id":2}]"#);
    assert_eq!(sink.count(EventCategory::ColumnNotFound), 1);
    assert_eq!(sink.count(EventCategory::StreamComplete), 1);
}

/// A cursor which cancels the token in place of yielding its fourth row,
/// stalling like a slow source, and records its own release.
struct CancelingCursor {
    inner: MemoryCursor,
    token: CancellationToken,
    yielded: usize,
    cancel_after: usize,
    released: Arc<AtomicBool>,
}

impl Drop for CancelingCursor {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

macro_rules! delegate_getter {
    ($($fn:ident -> $ty:ty),* $(,)?) => {
        $(fn $fn(&self, ordinal: usize) -> Result<$ty, CursorError> {
            self.inner.$fn(ordinal)
        })*
    };
}

#[async_trait::async_trait]
impl RowCursor for CancelingCursor {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    async fn advance(&mut self) -> Result<bool, CursorError> {
        if self.yielded == self.cancel_after {
            self.token.cancel();
            std::future::pending::<()>().await;
        }
        let advanced = self.inner.advance().await?;
        if advanced {
            self.yielded += 1;
        }
        Ok(advanced)
    }

    delegate_getter! {
        is_null -> bool,
        get_bool -> bool,
        get_i8 -> i8,
        get_i16 -> i16,
        get_i32 -> i32,
        get_i64 -> i64,
        get_u8 -> u8,
        get_f32 -> f32,
        get_f64 -> f64,
        get_decimal -> BigDecimal,
        get_timestamp -> chrono::DateTime<chrono::Utc>,
        get_uuid -> uuid::Uuid,
        get_string -> String,
        get_char -> char,
        get_opaque -> String,
    }
}

#[tokio::test]
async fn test_scenario_cancellation_mid_stream() {
    let shape = Shape::new("numbers", vec![Node::field("n", "N", ColumnType::Int64)]).unwrap();
    let schema = Schema::new(vec![Column::new("N", ColumnType::Int64)]);
    let rows: Vec<Vec<Datum>> = (1..=10).map(|n| vec![Datum::I64(n)]).collect();

    let token = CancellationToken::new();
    let released = Arc::new(AtomicBool::new(false));
    let cursor = CancelingCursor {
        inner: MemoryCursor::new(schema, rows),
        token: token.clone(),
        yielded: 0,
        cancel_after: 3,
        released: released.clone(),
    };

    let (body, outcome, sink) = run(&shape, cursor, &token).await;
    assert_eq!(outcome.unwrap(), StreamOutcome::Canceled { rows: 3 });

    // Three complete objects are on the wire, and the body is left without
    // its closing bracket so the truncation is detectable.
    assert_eq!(body, r#"[{"n":1},{"n":2},{"n":3}"#);

    let canceled = sink.of(EventCategory::StreamCanceled);
    assert_eq!(canceled.len(), 1);
    assert_eq!(canceled[0].rows, 3);
    assert!(canceled[0].elapsed.is_some());

    // The cursor (and with it, its connection) was released.
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancellation_before_any_row_completes_the_empty_array() {
    let shape = Shape::new("numbers", vec![Node::field("n", "N", ColumnType::Int64)]).unwrap();
    let schema = Schema::new(vec![Column::new("N", ColumnType::Int64)]);

    let token = CancellationToken::new();
    token.cancel();
    let cursor = MemoryCursor::new(schema, vec![vec![Datum::I64(1)]]);

    let (body, outcome, _) = run(&shape, cursor, &token).await;
    assert_eq!(outcome.unwrap(), StreamOutcome::Canceled { rows: 0 });
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn test_row_to_object_bijection_and_order() {
    let shape = Shape::new("numbers", vec![Node::field("n", "N", ColumnType::Int64)]).unwrap();
    let schema = Schema::new(vec![Column::new("N", ColumnType::Int64)]);
    let rows: Vec<Vec<Datum>> = (0..257).map(|n| vec![Datum::I64(n)]).collect();

    let body = run_complete(&shape, MemoryCursor::new(schema, rows)).await;
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed.len(), 257);
    for (n, object) in parsed.iter().enumerate() {
        assert_eq!(object["n"], n as i64);
    }
}

#[tokio::test]
async fn test_plan_determinism() {
    let shape = Shape::new(
        "mixed",
        vec![
            Node::field("name", "Name", ColumnType::String),
            Node::object(
                "extra",
                vec![Node::field("price", "Price", ColumnType::Decimal)],
            ),
            Node::array_pattern("tags", "Tag_"),
            Node::field("id", "Id", ColumnType::Int64),
        ],
    )
    .unwrap();
    let schema = Schema::new(vec![
        Column::new("Id", ColumnType::Int64),
        Column::new("Name", ColumnType::String),
        Column::new("Price", ColumnType::Decimal),
        Column::new("Tag_01", ColumnType::String),
        Column::new("Tag_02", ColumnType::String),
    ]);
    let rows = || {
        vec![vec![
            Datum::I64(5),
            s("thing"),
            dec("1.50"),
            s("a"),
            Datum::Null,
        ]]
    };

    async fn render(
        plan: &projection::Plan,
        cursor: MemoryCursor,
        sink: &MemorySink,
    ) -> Vec<u8> {
        let mut body = Vec::new();
        projection::stream(
            plan,
            cursor,
            &mut body,
            &CancellationToken::new(),
            sink,
            "x",
            &StreamSettings::default(),
        )
        .await
        .unwrap();
        body
    }

    let sink = MemorySink::new();
    let options = CompileOptions::default();
    let one = compile(&shape, &schema, &options, &sink, "x").unwrap();
    let two = compile(&shape, &schema, &options, &sink, "x").unwrap();

    let first = render(&one, MemoryCursor::new(schema.clone(), rows()), &sink).await;
    let second = render(&two, MemoryCursor::new(schema, rows()), &sink).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_sequential_access_cursors_are_satisfied() {
    // Declaration order reads ordinals 2, 0, 1; the compiled read phase
    // must still proceed in ascending ordinal order.
    let shape = Shape::new(
        "seq",
        vec![
            Node::field("c", "C", ColumnType::String),
            Node::field("a", "A", ColumnType::Int64),
            Node::field("b", "B", ColumnType::Bool),
        ],
    )
    .unwrap();
    let cursor = MemoryCursor::sequential(
        Schema::new(vec![
            Column::new("A", ColumnType::Int64),
            Column::new("B", ColumnType::Bool),
            Column::new("C", ColumnType::String),
        ]),
        vec![vec![Datum::I64(1), Datum::Bool(true), s("last")]],
    );

    let body = run_complete(&shape, cursor).await;
    assert_eq!(body, r#"[{"c":"last","a":1,"b":true}]"#);
}

#[tokio::test]
async fn test_slot_buffer_is_reused_across_rows() {
    let shape = Shape::new(
        "pair",
        vec![
            Node::field("id", "Id", ColumnType::Int64),
            Node::field("name", "Name", ColumnType::String),
        ],
    )
    .unwrap();
    let schema = Schema::new(vec![
        Column::new("Id", ColumnType::Int64),
        Column::new("Name", ColumnType::String),
    ]);
    let sink = MemorySink::new();
    let plan = compile(&shape, &schema, &CompileOptions::default(), &sink, "x").unwrap();

    let mut cursor = MemoryCursor::new(
        schema,
        vec![
            vec![Datum::I64(1), s("one")],
            vec![Datum::I64(2), Datum::Null],
        ],
    );
    let mut out = JsonBuf::new();
    let mut slots = SlotBuffer::for_plan(&plan);
    assert_eq!(slots.len(), 2);

    assert!(cursor.advance().await.unwrap());
    emit_row(&plan, &cursor, &mut out, &mut slots).unwrap();
    assert_eq!(out.take().as_ref(), br#"{"id":1,"name":"one"}"#);

    // The same buffer serves the next row; slots are overwritten in place.
    assert!(cursor.advance().await.unwrap());
    emit_row(&plan, &cursor, &mut out, &mut slots).unwrap();
    assert_eq!(out.take().as_ref(), br#"{"id":2,"name":null}"#);
    assert_eq!(slots.len(), 2);
}

#[tokio::test]
async fn test_full_primitive_set_rendering() {
    let shape = Shape::new(
        "everything",
        vec![
            Node::field("b", "B", ColumnType::Bool),
            Node::field("i8", "I8", ColumnType::Int8),
            Node::field("i16", "I16", ColumnType::Int16),
            Node::field("i32", "I32", ColumnType::Int32),
            Node::field("i64", "I64", ColumnType::Int64),
            Node::field("u8", "U8", ColumnType::UInt8),
            Node::field("f32", "F32", ColumnType::Float32),
            Node::field("f64", "F64", ColumnType::Float64),
            Node::field("dec", "Dec", ColumnType::Decimal),
            Node::field("ts", "Ts", ColumnType::Timestamp),
            Node::field("uuid", "Uu", ColumnType::Uuid),
            Node::field("str", "Str", ColumnType::String),
            Node::field("ch", "Ch", ColumnType::Char),
            Node::field("xml", "Xml", ColumnType::Other("xml".to_string())),
        ],
    )
    .unwrap();

    use chrono::TimeZone;
    let ts = chrono::Utc.with_ymd_and_hms(2023, 6, 28, 20, 29, 46).unwrap();
    let uu = uuid::Uuid::from_str("85bad119-15f2-11ee-8401-43f05f562888").unwrap();

    let cursor = MemoryCursor::new(
        Schema::new(vec![
            Column::new("B", ColumnType::Bool),
            Column::new("I8", ColumnType::Int8),
            Column::new("I16", ColumnType::Int16),
            Column::new("I32", ColumnType::Int32),
            Column::new("I64", ColumnType::Int64),
            Column::new("U8", ColumnType::UInt8),
            Column::new("F32", ColumnType::Float32),
            Column::new("F64", ColumnType::Float64),
            Column::new("Dec", ColumnType::Decimal),
            Column::new("Ts", ColumnType::Timestamp),
            Column::new("Uu", ColumnType::Uuid),
            Column::new("Str", ColumnType::String),
            Column::new("Ch", ColumnType::Char),
            Column::new("Xml", ColumnType::Other("xml".to_string())),
        ]),
        vec![vec![
            Datum::Bool(false),
            Datum::I8(-8),
            Datum::I16(-16),
            Datum::I32(-32),
            Datum::I64(-64),
            Datum::U8(255),
            Datum::F32(0.5),
            Datum::F64(-2.25),
            dec("12.340"),
            Datum::Timestamp(ts),
            Datum::Uuid(uu),
            s("text \"quoted\""),
            Datum::Char('x'),
            Datum::Opaque("<a/>".to_string()),
        ]],
    );

    let body = run_complete(&shape, cursor).await;
    assert_eq!(
        body,
        concat!(
            r#"[{"b":false,"i8":-8,"i16":-16,"i32":-32,"i64":-64,"u8":255,"#,
            r#""f32":0.5,"f64":-2.25,"dec":12.340,"#,
            r#""ts":"2023-06-28T20:29:46Z","#,
            r#""uuid":"85bad119-15f2-11ee-8401-43f05f562888","#,
            r#""str":"text \"quoted\"","ch":"x","xml":"<a/>"}]"#
        )
    );
}

/// A cursor whose advance fails after yielding some rows.
struct FailingCursor {
    inner: MemoryCursor,
    yielded: usize,
    fail_after: usize,
}

#[async_trait::async_trait]
impl RowCursor for FailingCursor {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    async fn advance(&mut self) -> Result<bool, CursorError> {
        if self.yielded == self.fail_after {
            return Err(CursorError::Driver("connection reset".into()));
        }
        let advanced = self.inner.advance().await?;
        if advanced {
            self.yielded += 1;
        }
        Ok(advanced)
    }

    delegate_getter! {
        is_null -> bool,
        get_bool -> bool,
        get_i8 -> i8,
        get_i16 -> i16,
        get_i32 -> i32,
        get_i64 -> i64,
        get_u8 -> u8,
        get_f32 -> f32,
        get_f64 -> f64,
        get_decimal -> BigDecimal,
        get_timestamp -> chrono::DateTime<chrono::Utc>,
        get_uuid -> uuid::Uuid,
        get_string -> String,
        get_char -> char,
        get_opaque -> String,
    }
}

#[tokio::test]
async fn test_cursor_error_mid_stream() {
    let shape = Shape::new("numbers", vec![Node::field("n", "N", ColumnType::Int64)]).unwrap();
    let schema = Schema::new(vec![Column::new("N", ColumnType::Int64)]);
    let rows: Vec<Vec<Datum>> = (1..=10).map(|n| vec![Datum::I64(n)]).collect();

    let cursor = FailingCursor {
        inner: MemoryCursor::new(schema, rows),
        yielded: 0,
        fail_after: 2,
    };

    let cancel = CancellationToken::new();
    let (body, outcome, sink) = run(&shape, cursor, &cancel).await;

    // Complete rows reached the wire; the missing `]` marks truncation.
    assert_eq!(body, r#"[{"n":1},{"n":2}"#);
    assert!(matches!(
        outcome,
        Err(projection::StreamError::Cursor(CursorError::Driver(_)))
    ));

    let errors = sink.of(EventCategory::StreamError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rows, 2);
}

#[tokio::test]
async fn test_large_streams_flush_incrementally() {
    let shape = Shape::new(
        "blobs",
        vec![
            Node::field("id", "Id", ColumnType::Int64),
            Node::field("payload", "Payload", ColumnType::String),
        ],
    )
    .unwrap();
    let schema = Schema::new(vec![
        Column::new("Id", ColumnType::Int64),
        Column::new("Payload", ColumnType::String),
    ]);
    // Roughly 200 KiB of output, crossing the driver's write watermark
    // several times.
    let payload = "x".repeat(1024);
    let rows: Vec<Vec<Datum>> = (0..200)
        .map(|n| vec![Datum::I64(n), s(&payload)])
        .collect();

    let body = run_complete(&shape, MemoryCursor::new(schema, rows)).await;
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed.len(), 200);
    assert_eq!(parsed[199]["id"], 199);
    assert_eq!(parsed[0]["payload"].as_str().unwrap().len(), 1024);
}

#[tokio::test]
async fn test_row_batch_events() {
    let shape = Shape::new("numbers", vec![Node::field("n", "N", ColumnType::Int64)]).unwrap();
    let schema = Schema::new(vec![Column::new("N", ColumnType::Int64)]);
    let rows: Vec<Vec<Datum>> = (0..25).map(|n| vec![Datum::I64(n)]).collect();

    let sink = MemorySink::new();
    let plan = compile(&shape, &schema, &CompileOptions::default(), &sink, "x").unwrap();

    let mut body = Vec::new();
    let settings = StreamSettings {
        row_batch_event_interval: 10,
        ..Default::default()
    };
    let outcome = projection::stream(
        &plan,
        MemoryCursor::new(schema, rows),
        &mut body,
        &CancellationToken::new(),
        &sink,
        "x",
        &settings,
    )
    .await
    .unwrap();

    assert_eq!(outcome, StreamOutcome::Complete { rows: 25 });
    let batches = sink.of(EventCategory::RowBatch);
    assert_eq!(
        batches.iter().map(|e| e.rows).collect::<Vec<_>>(),
        vec![10, 20]
    );
    assert_eq!(sink.count(EventCategory::StreamStart), 1);
    assert_eq!(sink.count(EventCategory::StreamComplete), 1);

    // Every event carries the caller's correlation id.
    let events = sink.take();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.correlation_id == "x"));
}
