//! Payment facts.
//!
//! Source rows are keyed by (order_id, payment_sequential): installment
//! rows sharing a key sum their installments and value into one fact row.
//! Aggregation consumes the whole extract before anything is written,
//! because later rows mutate earlier partial sums. Rows whose order never
//! resolved are dropped. The table commits as a single transaction.

use indexmap::IndexMap;
use sqlx::query_builder::Separated;
use sqlx::Postgres;
use sqlx::PgPool;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::batch::{insert_all_one_tx, InsertRow};
use crate::metrics::metrics;
use crate::pipeline::{FactOutcome, LoadOptions};
use crate::sources::PaymentRecord;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PaymentAccum {
    /// First-seen payment type for the key.
    pub payment_type: String,
    pub installments: i32,
    pub value: f64,
}

pub(crate) fn aggregate(
    rows: impl IntoIterator<Item = PaymentRecord>,
) -> IndexMap<(String, String), PaymentAccum> {
    let mut agg: IndexMap<(String, String), PaymentAccum> = IndexMap::new();
    for r in rows {
        let key = (r.order_id, r.payment_sequential);
        match agg.get_mut(&key) {
            Some(acc) => {
                acc.installments += r.payment_installments;
                acc.value += r.payment_value;
            }
            None => {
                agg.insert(
                    key,
                    PaymentAccum {
                        payment_type: r.payment_type,
                        installments: r.payment_installments,
                        value: r.payment_value,
                    },
                );
            }
        }
    }
    agg
}

struct PaymentRow {
    order_key: i32,
    payment_type: String,
    installments: i32,
    value: f64,
}

impl InsertRow for PaymentRow {
    const TABLE: &'static str = "payments";
    const COLUMNS: &'static [&'static str] = &[
        "order_key",
        "payment_type",
        "payment_installments",
        "payment_value",
    ];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.order_key);
        b.push_bind(self.payment_type);
        b.push_bind(self.installments);
        b.push_bind(self.value);
    }
}

pub async fn load<R: Read>(
    pool: &PgPool,
    rdr: &mut csv::Reader<R>,
    order_keys: &HashMap<String, i32>,
    opts: &LoadOptions,
) -> Result<FactOutcome> {
    let mut read = 0u64;
    let mut rows = Vec::new();
    for rec in rdr.deserialize::<PaymentRecord>() {
        rows.push(rec?);
        read += 1;
    }
    metrics().rows_read_total.fetch_add(read, Ordering::Relaxed);

    let agg = aggregate(rows);

    let mut dropped = 0u64;
    let mut out = Vec::with_capacity(agg.len());
    for ((order_id, _sequential), acc) in agg {
        match order_keys.get(&order_id) {
            Some(order_key) => out.push(PaymentRow {
                order_key: *order_key,
                payment_type: acc.payment_type,
                installments: acc.installments,
                value: acc.value,
            }),
            None => dropped += 1,
        }
    }
    metrics()
        .rows_dropped_total
        .fetch_add(dropped, Ordering::Relaxed);

    let inserted = insert_all_one_tx(pool, out, opts.fact_statement_chunk).await?;
    info!(payments = inserted, dropped, "loaded payment facts");
    Ok(FactOutcome { inserted, dropped })
}
