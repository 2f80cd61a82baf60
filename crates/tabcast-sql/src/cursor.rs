use crate::column_type_for;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::TryStreamExt;
use rowset::{Column, CursorError, RowCursor, Schema};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Acquire, Column as _, Executor, Row, TypeInfo as _, ValueRef};
use std::time::Duration;

// Rows buffered between the reader task and the cursor. A shallow channel
// keeps the database read loop coupled to the response writer's pace.
const CHANNEL_DEPTH: usize = 16;

/// PgCursor adapts one Postgres query to the engine's row-cursor contract.
///
/// The query is described first, so the sample schema is available before
/// any row is fetched; rows are then pumped by a task owning a pooled
/// connection. Dropping the cursor closes the channel, which ends the pump
/// task and returns the connection to its pool.
pub struct PgCursor {
    schema: Schema,
    rows: tokio::sync::mpsc::Receiver<Result<PgRow, sqlx::Error>>,
    current: Option<PgRow>,
}

impl PgCursor {
    pub async fn open(
        pool: &PgPool,
        sql: &str,
        command_timeout: Option<Duration>,
    ) -> Result<Self, sqlx::Error> {
        let describe = pool.describe(sql).await?;
        let columns = describe
            .columns()
            .iter()
            .map(|column| Column::new(column.name(), column_type_for(column.type_info().name())))
            .collect();

        let (tx, rows) = tokio::sync::mpsc::channel(CHANNEL_DEPTH);
        let pool = pool.clone();
        let sql = sql.to_string();

        tokio::spawn(async move {
            if let Err(err) = pump(&pool, &sql, command_timeout, &tx).await {
                tracing::debug!(?err, "row pump ended with error");
                let _ = tx.send(Err(err)).await;
            }
        });

        Ok(Self {
            schema: Schema::new(columns),
            rows,
            current: None,
        })
    }

    fn row(&self) -> Result<&PgRow, CursorError> {
        self.current.as_ref().ok_or(CursorError::NoCurrentRow)
    }
}

async fn pump(
    pool: &PgPool,
    sql: &str,
    command_timeout: Option<Duration>,
    tx: &tokio::sync::mpsc::Sender<Result<PgRow, sqlx::Error>>,
) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    // SET LOCAL scopes the timeout to this transaction, so the connection
    // returns to the pool unchanged.
    let mut txn = conn.begin().await?;
    if let Some(timeout) = command_timeout {
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            timeout.as_millis()
        ))
        .execute(&mut *txn)
        .await?;
    }

    let mut stream = sqlx::query(sql).fetch(&mut *txn);
    while let Some(row) = stream.try_next().await? {
        if tx.send(Ok(row)).await.is_err() {
            // The cursor was dropped; stop fetching.
            break;
        }
    }
    drop(stream);
    txn.commit().await?;
    Ok(())
}

fn decode_error(ordinal: usize, requested: &'static str, err: sqlx::Error) -> CursorError {
    match err {
        sqlx::Error::ColumnIndexOutOfBounds { .. } => CursorError::OrdinalOutOfRange(ordinal),
        sqlx::Error::ColumnDecode { .. } => CursorError::WrongType { ordinal, requested },
        err => CursorError::Driver(Box::new(err)),
    }
}

macro_rules! pg_getter {
    ($($fn:ident -> $ty:ty, $name:literal;)*) => {
        $(fn $fn(&self, ordinal: usize) -> Result<$ty, CursorError> {
            self.row()?
                .try_get::<$ty, _>(ordinal)
                .map_err(|err| decode_error(ordinal, $name, err))
        })*
    };
}

#[async_trait::async_trait]
impl RowCursor for PgCursor {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn advance(&mut self) -> Result<bool, CursorError> {
        self.current = match self.rows.recv().await {
            Some(Ok(row)) => Some(row),
            Some(Err(err)) => return Err(CursorError::Driver(Box::new(err))),
            None => None,
        };
        Ok(self.current.is_some())
    }

    fn is_null(&self, ordinal: usize) -> Result<bool, CursorError> {
        self.row()?
            .try_get_raw(ordinal)
            .map(|value| value.is_null())
            .map_err(|err| decode_error(ordinal, "raw", err))
    }

    pg_getter! {
        get_bool -> bool, "bool";
        get_i8 -> i8, "i8";
        get_i16 -> i16, "i16";
        get_i32 -> i32, "i32";
        get_i64 -> i64, "i64";
        get_f32 -> f32, "f32";
        get_f64 -> f64, "f64";
        get_decimal -> BigDecimal, "decimal";
        get_string -> String, "string";
    }

    fn get_u8(&self, ordinal: usize) -> Result<u8, CursorError> {
        // Postgres has no unsigned byte; the narrowest host is INT2.
        let wide = self
            .row()?
            .try_get::<i16, _>(ordinal)
            .map_err(|err| decode_error(ordinal, "u8", err))?;
        u8::try_from(wide).map_err(|_| CursorError::WrongType {
            ordinal,
            requested: "u8",
        })
    }

    fn get_timestamp(&self, ordinal: usize) -> Result<DateTime<Utc>, CursorError> {
        let row = self.row()?;
        // TIMESTAMPTZ decodes directly; bare TIMESTAMP is taken as UTC.
        match row.try_get::<DateTime<Utc>, _>(ordinal) {
            Ok(ts) => Ok(ts),
            Err(sqlx::Error::ColumnDecode { .. }) => row
                .try_get::<NaiveDateTime, _>(ordinal)
                .map(|naive| naive.and_utc())
                .map_err(|err| decode_error(ordinal, "timestamp", err)),
            Err(err) => Err(decode_error(ordinal, "timestamp", err)),
        }
    }

    fn get_uuid(&self, ordinal: usize) -> Result<uuid::Uuid, CursorError> {
        self.row()?
            .try_get::<uuid::Uuid, _>(ordinal)
            .map_err(|err| decode_error(ordinal, "uuid", err))
    }

    fn get_char(&self, ordinal: usize) -> Result<char, CursorError> {
        let text = self
            .row()?
            .try_get::<String, _>(ordinal)
            .map_err(|err| decode_error(ordinal, "char", err))?;
        text.chars().next().ok_or(CursorError::WrongType {
            ordinal,
            requested: "char",
        })
    }

    fn get_opaque(&self, ordinal: usize) -> Result<String, CursorError> {
        let row = self.row()?;
        match row.try_get::<String, _>(ordinal) {
            Ok(text) => Ok(text),
            // Not textual; JSON-ish types still render faithfully.
            Err(sqlx::Error::ColumnDecode { .. }) => row
                .try_get::<serde_json::Value, _>(ordinal)
                .map(|value| value.to_string())
                .map_err(|err| decode_error(ordinal, "opaque", err)),
            Err(err) => Err(decode_error(ordinal, "opaque", err)),
        }
    }
}
