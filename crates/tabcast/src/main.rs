use anyhow::Context;
use clap::Parser;
use projection::{CompileOptions, PlanCache, StreamSettings, TracingSink};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tabcast::{logging, App, ShapeRegistry};

/// An HTTP service which streams tabular query results as JSON, one object
/// per row, with bounded memory per request.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Cli {
    /// Postgres connection string of the source database.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    /// The port to listen on for HTTP requests.
    #[arg(long, default_value = "8080", env = "PORT")]
    port: u16,
    /// Maximum source database connections held by the pool.
    #[arg(long, default_value = "16", env = "MAX_DB_CONNECTIONS")]
    max_db_connections: u32,

    /// Rows between row-batch progress events on each stream.
    #[arg(long, default_value = "5000", env = "ROW_BATCH_EVENT_INTERVAL")]
    row_batch_event_interval: u64,
    /// Statement timeout in seconds applied to source queries.
    #[arg(long, env = "COMMAND_TIMEOUT")]
    command_timeout: Option<u64>,
    /// Render pattern-matched columns of unsupported types as strings,
    /// rather than dropping them from the array.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "ARRAY_ELEMENT_FALLBACK_TO_STRING"
    )]
    array_element_fallback_to_string: bool,
    /// Fail a request whose shape references a column the query lacks,
    /// instead of omitting the field.
    #[arg(long, action(clap::ArgAction::SetTrue))]
    strict: bool,

    /// Provision the demo documents table and seed synthetic rows before
    /// serving. Development only.
    #[arg(long, action(clap::ArgAction::SetTrue))]
    bootstrap: bool,
    /// Synthetic rows to seed with --bootstrap.
    #[arg(long, default_value = "500", env = "BOOTSTRAP_ROWS")]
    bootstrap_rows: u32,

    #[command(flatten)]
    log: logging::LogArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log);

    tracing::info!("starting tabcast");

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_db_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to the source database")?;

    if cli.bootstrap {
        tabcast_sql::bootstrap::provision(&pool)
            .await
            .context("failed to provision the demo table")?;
        tabcast_sql::bootstrap::seed(&pool, cli.bootstrap_rows)
            .await
            .context("failed to seed the demo table")?;
    }

    let app = Arc::new(App {
        pool,
        registry: ShapeRegistry::demo(),
        cache: PlanCache::new(),
        compile: CompileOptions {
            strict: cli.strict,
            array_element_fallback_to_string: cli.array_element_fallback_to_string,
        },
        settings: StreamSettings {
            row_batch_event_interval: cli.row_batch_event_interval,
            command_timeout: cli.command_timeout,
            array_element_fallback_to_string: cli.array_element_fallback_to_string,
        },
        events: TracingSink,
    });

    let router = tabcast::build_router(app);
    let addr = format!("[::]:{}", cli.port)
        .parse()
        .context("failed to parse listen address")?;

    tracing::info!(%addr, "listening for streaming requests");
    let server = axum_server::bind(addr).serve(router.into_make_service());

    tokio::select! {
        result = server => result.context("server exited")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
