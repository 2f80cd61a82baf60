use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// ApiError covers everything that can fail before the response stream
/// starts. Failures after the first body bytes cannot change the status;
/// they surface through the event sink and the dropped connection instead.
#[derive(Debug)]
pub enum ApiError {
    UnknownShape(String),
    Compile(projection::CompileError),
    Database(sqlx::Error),
}

impl From<projection::CompileError> for ApiError {
    fn from(err: projection::CompileError) -> Self {
        ApiError::Compile(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::UnknownShape(name) => (
                StatusCode::NOT_FOUND,
                format!("no stream is registered for shape {name:?}"),
            ),
            ApiError::Compile(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("shape failed to compile: {err}"),
            ),
            ApiError::Database(err) => {
                tracing::error!(?err, "responding with database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database error, please retry the request".to_string(),
                )
            }
        };

        (
            status,
            axum::Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}
