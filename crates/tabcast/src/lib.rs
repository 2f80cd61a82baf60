// tabcast streams tabular query results to HTTP clients as JSON, one
// object per row, through the projection engine.

use projection::{CompileOptions, PlanCache, StreamSettings, TracingSink};
use sqlx::postgres::PgPool;
use std::sync::Arc;

mod api;
mod error;
pub use error::ApiError;

pub mod logging;

mod registry;
pub use registry::{ShapeRegistry, StreamDef};

/// Shared per-process state. Everything here is either immutable after
/// startup or internally synchronized; requests share nothing else.
pub struct App {
    pub pool: PgPool,
    pub registry: ShapeRegistry,
    pub cache: PlanCache,
    pub compile: CompileOptions,
    pub settings: StreamSettings,
    pub events: TracingSink,
}

/// Build the service router: one streaming GET endpoint per registered
/// shape, plus a liveness probe.
pub fn build_router(app: Arc<App>) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/v1/streams/:shape", get(api::stream_shape))
        .route("/healthz", get(api::healthz))
        .with_state(app)
}
