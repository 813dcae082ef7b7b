//! Order facts.
//!
//! Streaming pass-through: lifecycle timestamps parse tolerantly (malformed
//! or blank -> null, never an error), and a row whose `customer_id` is
//! absent from the customer mapping is dropped whole.

use chrono::NaiveDateTime;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::batch::{BatchWriter, InsertRow};
use crate::metrics::metrics;
use crate::pipeline::{FactOutcome, LoadOptions};
use crate::sources::OrderRecord;
use crate::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a lifecycle timestamp; blank or malformed values become None.
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

struct OrderRow {
    order_id: String,
    customer_key: i32,
    order_status: String,
    purchase: Option<NaiveDateTime>,
    approved: Option<NaiveDateTime>,
    delivered_carrier: Option<NaiveDateTime>,
    delivered_customer: Option<NaiveDateTime>,
    estimated_delivery: Option<NaiveDateTime>,
}

impl InsertRow for OrderRow {
    const TABLE: &'static str = "orders";
    const COLUMNS: &'static [&'static str] = &[
        "order_id",
        "customer_key",
        "order_status",
        "order_purchase_date",
        "order_approved_date",
        "order_delivered_carrier_date",
        "order_delivered_customer_date",
        "order_estimated_delivery_date",
    ];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.order_id);
        b.push_bind(self.customer_key);
        b.push_bind(self.order_status);
        b.push_bind(self.purchase);
        b.push_bind(self.approved);
        b.push_bind(self.delivered_carrier);
        b.push_bind(self.delivered_customer);
        b.push_bind(self.estimated_delivery);
    }
}

pub async fn load<R: Read>(
    pool: &PgPool,
    rdr: &mut csv::Reader<R>,
    customer_keys: &HashMap<String, i32>,
    opts: &LoadOptions,
) -> Result<FactOutcome> {
    let mut read = 0u64;
    let mut dropped = 0u64;
    let mut writer = BatchWriter::<OrderRow>::new(pool, opts.order_chunk);

    for rec in rdr.deserialize::<OrderRecord>() {
        let rec = rec?;
        read += 1;
        let Some(customer_key) = customer_keys.get(&rec.customer_id).copied() else {
            dropped += 1;
            continue;
        };
        writer
            .push(OrderRow {
                order_id: rec.order_id,
                customer_key,
                order_status: rec.order_status,
                purchase: parse_timestamp(&rec.order_purchase_timestamp),
                approved: parse_timestamp(&rec.order_approved_at),
                delivered_carrier: parse_timestamp(&rec.order_delivered_carrier_date),
                delivered_customer: parse_timestamp(&rec.order_delivered_customer_date),
                estimated_delivery: parse_timestamp(&rec.order_estimated_delivery_date),
            })
            .await?;
    }

    let m = metrics();
    m.rows_read_total.fetch_add(read, Ordering::Relaxed);
    m.rows_dropped_total.fetch_add(dropped, Ordering::Relaxed);

    let outcome = writer.finish().await?;
    info!(orders = outcome.rows, dropped, "loaded order facts");
    Ok(FactOutcome {
        inserted: outcome.rows,
        dropped,
    })
}
