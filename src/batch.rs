//! Shared incremental-commit insert machinery.
//!
//! Every loader funnels its rows through either a [`BatchWriter`] (one
//! transaction per fixed-size chunk, earlier chunks stay committed if a
//! later one fails) or [`insert_all_one_tx`] (the whole table succeeds or
//! rolls back as a unit). Both build multi-row `insert` statements with
//! `QueryBuilder::push_values`, chunked so a statement never exceeds the
//! bind-parameter limit.

use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::atomic::Ordering;

use crate::metrics::metrics;
use crate::{Error, Result};

/// A row that can append itself to a multi-row `insert ... values` list.
pub trait InsertRow {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>);
}

fn insert_prefix<T: InsertRow>() -> String {
    format!("insert into {} ({}) values ", T::TABLE, T::COLUMNS.join(", "))
}

async fn insert_chunk<T: InsertRow>(
    tx: &mut Transaction<'_, Postgres>,
    rows: Vec<T>,
) -> Result<u64> {
    let n = rows.len() as u64;
    if n == 0 {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Postgres>::new(insert_prefix::<T>());
    qb.push_values(rows, |mut b, row| row.bind(&mut b));
    qb.build()
        .execute(&mut **tx)
        .await
        .map_err(Error::from_insert)?;
    Ok(n)
}

#[derive(Default, Debug, Clone, Copy)]
pub struct FlushOutcome {
    pub rows: u64,
    pub batches: u64,
}

/// Buffers rows and commits them in fixed-size chunks, one transaction per
/// chunk. Progress from committed chunks persists even if a later chunk
/// fails.
pub struct BatchWriter<'a, T: InsertRow> {
    pool: &'a PgPool,
    chunk_size: usize,
    buf: Vec<T>,
    outcome: FlushOutcome,
}

impl<'a, T: InsertRow> BatchWriter<'a, T> {
    pub fn new(pool: &'a PgPool, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            pool,
            chunk_size,
            buf: Vec::with_capacity(chunk_size),
            outcome: FlushOutcome::default(),
        }
    }

    /// Buffer one row, committing a full chunk when the buffer fills.
    pub async fn push(&mut self, row: T) -> Result<()> {
        self.buf.push(row);
        if self.buf.len() >= self.chunk_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.buf);
        let mut tx = self.pool.begin().await?;
        let n = insert_chunk(&mut tx, rows).await?;
        tx.commit().await?;
        self.outcome.rows += n;
        self.outcome.batches += 1;
        let m = metrics();
        m.rows_inserted_total.fetch_add(n, Ordering::Relaxed);
        m.batches_committed_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush the remainder and return the totals.
    pub async fn finish(mut self) -> Result<FlushOutcome> {
        self.flush().await?;
        Ok(self.outcome)
    }
}

/// Insert every row inside one transaction, chunking the statements only to
/// stay under the bind-parameter limit. Either all rows land or none do.
pub async fn insert_all_one_tx<T: InsertRow>(
    pool: &PgPool,
    rows: Vec<T>,
    statement_chunk: usize,
) -> Result<u64> {
    assert!(statement_chunk > 0, "statement chunk must be positive");
    if rows.is_empty() {
        return Ok(0);
    }
    let mut tx = pool.begin().await?;
    let mut total = 0u64;
    let mut buf = Vec::with_capacity(statement_chunk.min(rows.len()));
    for row in rows {
        buf.push(row);
        if buf.len() >= statement_chunk {
            total += insert_chunk(&mut tx, std::mem::take(&mut buf)).await?;
        }
    }
    total += insert_chunk(&mut tx, buf).await?;
    tx.commit().await?;
    let m = metrics();
    m.rows_inserted_total.fetch_add(total, Ordering::Relaxed);
    m.batches_committed_total.fetch_add(1, Ordering::Relaxed);
    Ok(total)
}
