//! Order-item facts.
//!
//! Source rows are keyed by (order_id, product_id). Duplicates accumulate
//! qty; price and freight are last-write-wins, with
//! `unit_price = price + freight` and `total_price = qty * unit_price`
//! recomputed on every occurrence. That makes unit_price order-sensitive
//! while qty and the final total are not — documented upstream semantics,
//! kept as-is. Rows missing any of the three key resolutions are dropped
//! whole, never partially inserted.

use indexmap::IndexMap;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::batch::{insert_all_one_tx, InsertRow};
use crate::metrics::metrics;
use crate::pipeline::{FactOutcome, LoadOptions};
use crate::sources::OrderItemRecord;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ItemAccum {
    /// Last-seen seller for the key.
    pub seller_id: String,
    pub qty: i32,
    pub unit_price: f64,
    pub total_price: f64,
}

pub(crate) fn aggregate(
    rows: impl IntoIterator<Item = OrderItemRecord>,
) -> IndexMap<(String, String), ItemAccum> {
    let mut agg: IndexMap<(String, String), ItemAccum> = IndexMap::new();
    for r in rows {
        let key = (r.order_id, r.product_id);
        let acc = agg.entry(key).or_insert(ItemAccum {
            seller_id: String::new(),
            qty: 0,
            unit_price: 0.0,
            total_price: 0.0,
        });
        acc.qty += 1;
        acc.unit_price = r.price + r.freight_value;
        acc.total_price = f64::from(acc.qty) * acc.unit_price;
        acc.seller_id = r.seller_id;
    }
    agg
}

struct OrderItemRow {
    order_key: i32,
    product_key: i32,
    seller_key: i32,
    qty: i32,
    unit_price: f64,
    total_price: f64,
}

impl InsertRow for OrderItemRow {
    const TABLE: &'static str = "order_items";
    const COLUMNS: &'static [&'static str] = &[
        "order_key",
        "product_key",
        "seller_key",
        "qty",
        "unit_price",
        "total_price",
    ];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.order_key);
        b.push_bind(self.product_key);
        b.push_bind(self.seller_key);
        b.push_bind(self.qty);
        b.push_bind(self.unit_price);
        b.push_bind(self.total_price);
    }
}

pub async fn load<R: Read>(
    pool: &PgPool,
    rdr: &mut csv::Reader<R>,
    order_keys: &HashMap<String, i32>,
    product_keys: &HashMap<String, i32>,
    seller_keys: &HashMap<String, i32>,
    opts: &LoadOptions,
) -> Result<FactOutcome> {
    let mut read = 0u64;
    let mut rows = Vec::new();
    for rec in rdr.deserialize::<OrderItemRecord>() {
        rows.push(rec?);
        read += 1;
    }
    metrics().rows_read_total.fetch_add(read, Ordering::Relaxed);

    let agg = aggregate(rows);

    let mut dropped = 0u64;
    let mut out = Vec::with_capacity(agg.len());
    for ((order_id, product_id), acc) in agg {
        let resolved = (
            order_keys.get(&order_id),
            product_keys.get(&product_id),
            seller_keys.get(&acc.seller_id),
        );
        match resolved {
            (Some(order_key), Some(product_key), Some(seller_key)) => out.push(OrderItemRow {
                order_key: *order_key,
                product_key: *product_key,
                seller_key: *seller_key,
                qty: acc.qty,
                unit_price: acc.unit_price,
                total_price: acc.total_price,
            }),
            _ => dropped += 1,
        }
    }
    metrics()
        .rows_dropped_total
        .fetch_add(dropped, Ordering::Relaxed);

    let inserted = insert_all_one_tx(pool, out, opts.fact_statement_chunk).await?;
    info!(order_items = inserted, dropped, "loaded order-item facts");
    Ok(FactOutcome { inserted, dropped })
}
