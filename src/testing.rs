use sqlx::PgPool;

use crate::schema::Schema;
use crate::Result;

/// Drop and recreate the warehouse tables. Test harness convenience.
pub async fn reset_schema(pool: &PgPool) -> Result<()> {
    Schema::new(pool.clone()).recreate().await
}

/// Row count of a warehouse table.
pub async fn count_rows(pool: &PgPool, table: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(&format!("select count(*) from {table}"))
        .fetch_one(pool)
        .await?;
    Ok(n)
}
