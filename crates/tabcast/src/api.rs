use crate::{ApiError, App};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use rowset::RowCursor;
use tabcast_sql::PgCursor;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

const CORRELATION_HEADER: &str = "x-correlation-id";

// Capacity of the pipe between the stream driver and the response body.
// A full pipe suspends the driver, which is how client backpressure
// reaches the database read loop.
const PIPE_CAPACITY: usize = 1 << 16;

pub(crate) async fn healthz() -> &'static str {
    "ok"
}

/// Stream one registered shape as a JSON array of row objects.
///
/// The plan is resolved (or compiled) before the response starts, so
/// compile failures still surface as a 5xx with a JSON body. Once row
/// bytes are flowing, errors terminate the connection instead; a client
/// that received no closing `]` must treat the result as truncated.
#[tracing::instrument(skip_all)]
pub(crate) async fn stream_shape(
    State(app): State<Arc<App>>,
    Path(shape_name): Path<String>,
    headers: HeaderMap,
) -> Response {
    // The caller's correlation id is carried through every event and
    // echoed on the response, errors included.
    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut response = match serve_stream(app, shape_name, &correlation_id).await {
        Ok(response) => response,
        Err(err) => axum::response::IntoResponse::into_response(err),
    };
    if let Ok(value) = correlation_id.parse() {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn serve_stream(
    app: Arc<App>,
    shape_name: String,
    correlation_id: &str,
) -> Result<Response, ApiError> {
    let Some(def) = app.registry.get(&shape_name) else {
        return Err(ApiError::UnknownShape(shape_name));
    };

    let cursor = PgCursor::open(
        &app.pool,
        &def.query,
        app.settings.command_timeout.map(Duration::from_secs),
    )
    .await?;

    let plan = app.cache.get_or_compile(
        &def.shape,
        cursor.schema(),
        &app.compile,
        &app.events,
        correlation_id,
    )?;

    // The driver writes into one end of an in-process pipe; the response
    // body drains the other. Dropping the body (client disconnect) cancels
    // the token, which the driver observes before its next row.
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let cancel = CancellationToken::new();

    {
        let app = app.clone();
        let cancel = cancel.clone();
        let correlation_id = correlation_id.to_string();
        tokio::spawn(async move {
            // Outcomes and errors are recorded through the event sink.
            if let Err(err) = projection::stream(
                &plan,
                cursor,
                writer,
                &cancel,
                &app.events,
                &correlation_id,
                &app.settings,
            )
            .await
            {
                tracing::debug!(
                    correlation_id = correlation_id.as_str(),
                    ?err,
                    "stream terminated early"
                );
            }
        });
    }

    let body = axum::body::Body::from_stream(CancelOnDrop {
        inner: ReaderStream::new(reader),
        cancel,
    });

    // Unwrap because the builder is fed only valid header values.
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(body)
        .unwrap())
}

/// A body stream which trips the request's cancellation token when the
/// client goes away and axum drops the body.
struct CancelOnDrop<S> {
    inner: S,
    cancel: CancellationToken,
}

impl<S: Stream + Unpin> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CancelOnDrop<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
