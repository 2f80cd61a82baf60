use std::time::Duration;

/// The closed set of event categories the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    StreamStart,
    RowBatch,
    StreamComplete,
    StreamCanceled,
    StreamError,
    UnsupportedType,
    ColumnNotFound,
    TypeCoerced,
    EmptyArrayPattern,
    PlanCacheHit,
    PlanCacheMiss,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::StreamStart => "stream-start",
            EventCategory::RowBatch => "row-batch",
            EventCategory::StreamComplete => "stream-complete",
            EventCategory::StreamCanceled => "stream-canceled",
            EventCategory::StreamError => "stream-error",
            EventCategory::UnsupportedType => "unsupported-type",
            EventCategory::ColumnNotFound => "column-not-found",
            EventCategory::TypeCoerced => "type-coerced",
            EventCategory::EmptyArrayPattern => "empty-array-pattern",
            EventCategory::PlanCacheHit => "plan-cache-hit",
            EventCategory::PlanCacheMiss => "plan-cache-miss",
        }
    }
}

/// One structured event. Every event carries the correlation id supplied by
/// the caller; row count and elapsed time are attached where meaningful.
#[derive(Debug, Clone)]
pub struct Event {
    pub category: EventCategory,
    pub correlation_id: String,
    pub rows: u64,
    pub elapsed: Option<Duration>,
    pub detail: Option<String>,
}

impl Event {
    pub fn new(category: EventCategory, correlation_id: &str) -> Self {
        Self {
            category,
            correlation_id: correlation_id.to_string(),
            rows: 0,
            elapsed: None,
            detail: None,
        }
    }

    pub fn rows(mut self, rows: u64) -> Self {
        self.rows = rows;
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// EventSink records structured events. The engine never interprets the
/// sink's behavior; recording must not fail.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// TracingSink forwards events to the `tracing` subscriber with structured
/// fields, at WARN for schema and stream faults and INFO otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: Event) {
        let Event {
            category,
            correlation_id,
            rows,
            elapsed,
            detail,
        } = event;

        match category {
            EventCategory::StreamError
            | EventCategory::UnsupportedType
            | EventCategory::ColumnNotFound
            | EventCategory::TypeCoerced => tracing::warn!(
                category = category.as_str(),
                correlation_id = correlation_id.as_str(),
                rows,
                ?elapsed,
                detail = detail.as_deref(),
                "projection event",
            ),
            _ => tracing::info!(
                category = category.as_str(),
                correlation_id = correlation_id.as_str(),
                rows,
                ?elapsed,
                detail = detail.as_deref(),
                "projection event",
            ),
        }
    }
}

/// MemorySink retains events for test assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in order.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut self.events.lock().unwrap())
    }

    /// Recorded events of one category, in order.
    pub fn of(&self, category: EventCategory) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    pub fn count(&self, category: EventCategory) -> usize {
        self.of(category).len()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
