use sqlx::PgPool;
use std::collections::HashMap;

use crate::Result;

/// Scan a whole table and return natural key -> surrogate key.
///
/// Always sourced from committed rows so the mapping reflects the keys the
/// database actually assigned, never a client-side prediction. Identifier
/// arguments come from crate constants, not user input.
pub async fn natural_key_map(
    pool: &PgPool,
    table: &str,
    id_col: &str,
    key_col: &str,
) -> Result<HashMap<String, i32>> {
    let sql = format!("select {id_col}, {key_col} from {table}");
    let rows: Vec<(String, i32)> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}
