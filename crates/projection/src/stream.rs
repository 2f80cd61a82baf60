use crate::{emit_row, Event, EventCategory, EventSink, JsonBuf, Plan, SlotBuffer};
use rowset::{CursorError, RowCursor};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

// Complete rows are pushed to the response writer once this much output
// has accumulated.
const HIGH_WATER: usize = 1 << 16;

/// Engine options recognized by the streaming driver and plan compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StreamSettings {
    /// A `row-batch` event is recorded every this many rows.
    #[serde(default = "default_row_batch_event_interval")]
    pub row_batch_event_interval: u64,
    /// Statement timeout in seconds, applied by the cursor's executor.
    /// The engine treats an expired timeout as any other cursor error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<u64>,
    /// Whether pattern-matched columns of unsupported types are rendered
    /// as string array elements (true) or dropped from the array (false).
    #[serde(default = "default_true")]
    pub array_element_fallback_to_string: bool,
}

fn default_row_batch_event_interval() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            row_batch_event_interval: default_row_batch_event_interval(),
            command_timeout: None,
            array_element_fallback_to_string: default_true(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("cursor read failed")]
    Cursor(#[source] CursorError),
    #[error("response write failed")]
    Writer(#[source] std::io::Error),
}

/// How a stream ended. Cancellation is a clean terminal, not an error:
/// resources are released and the truncated body tells the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Complete { rows: u64 },
    Canceled { rows: u64 },
}

/// Drive one compiled plan over a cursor, writing the outer JSON array to
/// `sink`.
///
/// The driver consumes the cursor, so its connection is released on every
/// exit path — completion, error, and cancellation — after buffered
/// complete rows have been pushed to the writer. Cancellation is observed
/// before each `advance`, and interrupts an in-flight one. Once any row
/// bytes have been emitted, a canceled stream is terminated *without* the
/// closing `]`: a truncated body must never read as a complete result.
pub async fn stream<C, W>(
    plan: &Plan,
    mut cursor: C,
    mut sink: W,
    cancel: &CancellationToken,
    events: &dyn EventSink,
    correlation_id: &str,
    settings: &StreamSettings,
) -> Result<StreamOutcome, StreamError>
where
    C: RowCursor,
    W: AsyncWrite + Unpin,
{
    let started = Instant::now();
    let batch_interval = settings.row_batch_event_interval.max(1);
    events.record(Event::new(EventCategory::StreamStart, correlation_id));

    let mut buf = JsonBuf::with_capacity(2 * HIGH_WATER);
    let mut slots = SlotBuffer::for_plan(plan);
    let mut rows: u64 = 0;

    buf.byte(b'[');

    loop {
        let advanced = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Only a stream with no row bytes may still be completed.
                if rows == 0 {
                    buf.byte(b']');
                }
                // The client is likely gone; a write failure here is moot.
                let _ = flush(&mut sink, &mut buf).await;
                events.record(
                    Event::new(EventCategory::StreamCanceled, correlation_id)
                        .rows(rows)
                        .elapsed(started.elapsed()),
                );
                return Ok(StreamOutcome::Canceled { rows });
            }
            advanced = cursor.advance() => advanced,
        };

        match advanced {
            Ok(true) => {
                let mark = buf.len();
                if rows > 0 {
                    buf.byte(b',');
                }
                if let Err(err) = emit_row(plan, &cursor, &mut buf, &mut slots) {
                    // Drop the partial row so only complete rows reach the
                    // wire, then surface the failure.
                    buf.truncate(mark);
                    let _ = flush(&mut sink, &mut buf).await;
                    events.record(
                        Event::new(EventCategory::StreamError, correlation_id)
                            .rows(rows)
                            .elapsed(started.elapsed())
                            .detail(err.to_string()),
                    );
                    return Err(StreamError::Cursor(err));
                }
                rows += 1;

                if rows % batch_interval == 0 {
                    events.record(
                        Event::new(EventCategory::RowBatch, correlation_id)
                            .rows(rows)
                            .elapsed(started.elapsed()),
                    );
                }
                if buf.len() >= HIGH_WATER {
                    if let Err(err) = write_buf(&mut sink, &mut buf).await {
                        events.record(
                            Event::new(EventCategory::StreamError, correlation_id)
                                .rows(rows)
                                .elapsed(started.elapsed())
                                .detail(err.to_string()),
                        );
                        return Err(StreamError::Writer(err));
                    }
                }
            }
            Ok(false) => {
                buf.byte(b']');
                if let Err(err) = flush(&mut sink, &mut buf).await {
                    events.record(
                        Event::new(EventCategory::StreamError, correlation_id)
                            .rows(rows)
                            .elapsed(started.elapsed())
                            .detail(err.to_string()),
                    );
                    return Err(StreamError::Writer(err));
                }
                events.record(
                    Event::new(EventCategory::StreamComplete, correlation_id)
                        .rows(rows)
                        .elapsed(started.elapsed()),
                );
                return Ok(StreamOutcome::Complete { rows });
            }
            Err(err) => {
                let _ = flush(&mut sink, &mut buf).await;
                events.record(
                    Event::new(EventCategory::StreamError, correlation_id)
                        .rows(rows)
                        .elapsed(started.elapsed())
                        .detail(err.to_string()),
                );
                return Err(StreamError::Cursor(err));
            }
        }
    }
}

async fn write_buf<W: AsyncWrite + Unpin>(
    sink: &mut W,
    buf: &mut JsonBuf,
) -> Result<(), std::io::Error> {
    if !buf.is_empty() {
        sink.write_all(&buf.take()).await?;
    }
    Ok(())
}

async fn flush<W: AsyncWrite + Unpin>(
    sink: &mut W,
    buf: &mut JsonBuf,
) -> Result<(), std::io::Error> {
    write_buf(sink, buf).await?;
    sink.flush().await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings: StreamSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.row_batch_event_interval, 5000);
        assert_eq!(settings.command_timeout, None);
        assert!(settings.array_element_fallback_to_string);

        let settings: StreamSettings =
            serde_json::from_str(r#"{"rowBatchEventInterval": 100, "commandTimeout": 30}"#)
                .unwrap();
        assert_eq!(settings.row_batch_event_interval, 100);
        assert_eq!(settings.command_timeout, Some(30));
    }
}
