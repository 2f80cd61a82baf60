//! Development bootstrap: provisions the demo `documents` table and seeds
//! deterministic synthetic rows. Never part of the serving path; the server
//! runs it only behind `--bootstrap`.

use chrono::TimeZone;
use sqlx::postgres::PgPool;

/// Tag and comment column groups of the demo table. The counts are large
/// enough to make the array-pattern expansion meaningful.
pub const TAG_COLUMNS: u32 = 20;
pub const COMMENT_COLUMNS: u32 = 10;

const DOCUMENT_TYPES: &[&str] = &["appraisal", "deed", "income", "insurance", "note"];
const SEED_EPOCH: i64 = 1_700_000_000;

/// The demo table's DDL. Column names are quoted to preserve the source
/// system's casing, which the demo shape references literally.
pub fn documents_ddl() -> String {
    let mut ddl = String::from(
        r#"CREATE TABLE IF NOT EXISTS documents (
    "Id" BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    "LoanNumber" TEXT NOT NULL,
    "BorrowerName" TEXT,
    "DocumentType" TEXT NOT NULL,
    "PageCount" INT NOT NULL,
    "Amount" NUMERIC,
    "IsArchived" BOOLEAN NOT NULL DEFAULT FALSE,
    "ExternalRef" UUID,
    "UploadedAt" TIMESTAMPTZ NOT NULL"#,
    );
    for n in 1..=TAG_COLUMNS {
        ddl.push_str(&format!(",\n    \"Tag_{n:02}\" TEXT"));
    }
    for n in 1..=COMMENT_COLUMNS {
        ddl.push_str(&format!(",\n    \"Comment_{n:02}\" TEXT"));
    }
    ddl.push_str("\n)");
    ddl
}

pub async fn provision(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query(&documents_ddl()).execute(pool).await?;
    tracing::info!("provisioned documents table");
    Ok(())
}

/// Insert `count` synthetic documents, unless the table already has rows.
/// Values are derived from the row number, so repeated bootstraps of a
/// fresh database produce identical data.
pub async fn seed(pool: &PgPool, count: u32) -> sqlx::Result<()> {
    let existing: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM documents"#)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        tracing::info!(existing, "documents table already seeded");
        return Ok(());
    }

    let insert = r#"
        INSERT INTO documents (
            "LoanNumber", "BorrowerName", "DocumentType", "PageCount",
            "Amount", "IsArchived", "ExternalRef", "UploadedAt",
            "Tag_01", "Tag_02", "Tag_03", "Comment_01", "Comment_02"
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    "#;

    for n in 0..count {
        let uploaded = chrono::Utc
            .timestamp_opt(SEED_EPOCH + i64::from(n) * 3600, 0)
            .single()
            .expect("seed timestamps are in range");
        let borrower = if n % 7 == 0 {
            None
        } else {
            Some(format!("Borrower {n:04}"))
        };
        let amount = bigdecimal::BigDecimal::from(100_000 + i64::from(n) * 250)
            / bigdecimal::BigDecimal::from(100);

        sqlx::query(insert)
            .bind(format!("LN-{n:08}"))
            .bind(borrower)
            .bind(DOCUMENT_TYPES[n as usize % DOCUMENT_TYPES.len()])
            .bind(1 + (n as i32 % 40))
            .bind(amount)
            .bind(n % 5 == 0)
            .bind(uuid::Uuid::from_u128(0x7ab3_0000_0000u128 + u128::from(n)))
            .bind(uploaded)
            .bind(format!("tag-{}", n % 3))
            .bind(if n % 2 == 0 {
                Some(format!("tag-{}", n % 11))
            } else {
                None
            })
            .bind(format!("tag-{}", n % 17))
            .bind(format!("synthetic document {n}"))
            .bind(if n % 4 == 0 {
                Some("second review requested".to_string())
            } else {
                None
            })
            .execute(pool)
            .await?;
    }

    tracing::info!(count, "seeded documents table");
    Ok(())
}
