//! Product dimension.
//!
//! The product file carries no monetary data: `price` and `freight_value`
//! are the sums of every order-item row referencing the product, aggregated
//! in full before the first product row is written. Products absent from
//! the order-items file get zero totals.

use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::batch::{BatchWriter, InsertRow};
use crate::metrics::metrics;
use crate::pipeline::LoadOptions;
use crate::sources::{OrderItemRecord, ProductRecord};
use crate::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct PriceTotals {
    pub price: f64,
    pub freight_value: f64,
}

pub(crate) fn price_totals(
    items: impl IntoIterator<Item = OrderItemRecord>,
) -> HashMap<String, PriceTotals> {
    let mut totals: HashMap<String, PriceTotals> = HashMap::new();
    for item in items {
        let t = totals.entry(item.product_id).or_default();
        t.price += item.price;
        t.freight_value += item.freight_value;
    }
    totals
}

struct ProductRow {
    record: ProductRecord,
    totals: PriceTotals,
}

impl InsertRow for ProductRow {
    const TABLE: &'static str = "products";
    const COLUMNS: &'static [&'static str] = &[
        "product_id",
        "product_category",
        "product_name_length",
        "product_description_length",
        "product_photos_qty",
        "product_weight_g",
        "product_length_cm",
        "product_height_cm",
        "product_width_cm",
        "price",
        "freight_value",
    ];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        let r = self.record;
        b.push_bind(r.product_id);
        b.push_bind(r.product_category);
        b.push_bind(r.product_name_length);
        b.push_bind(r.product_description_length);
        b.push_bind(r.product_photos_qty);
        b.push_bind(r.product_weight_g);
        b.push_bind(r.product_length_cm);
        b.push_bind(r.product_height_cm);
        b.push_bind(r.product_width_cm);
        b.push_bind(self.totals.price);
        b.push_bind(self.totals.freight_value);
    }
}

/// Load products, summing price/freight from the order-items extract first.
pub async fn load<R1: Read, R2: Read>(
    pool: &PgPool,
    products_rdr: &mut csv::Reader<R1>,
    order_items_rdr: &mut csv::Reader<R2>,
    opts: &LoadOptions,
) -> Result<u64> {
    let mut items = Vec::new();
    for rec in order_items_rdr.deserialize::<OrderItemRecord>() {
        items.push(rec?);
    }
    let totals = price_totals(items);

    let mut read = 0u64;
    let mut writer = BatchWriter::<ProductRow>::new(pool, opts.product_chunk);
    for rec in products_rdr.deserialize::<ProductRecord>() {
        let rec = rec?;
        read += 1;
        let t = totals.get(&rec.product_id).copied().unwrap_or_default();
        writer.push(ProductRow { record: rec, totals: t }).await?;
    }
    metrics().rows_read_total.fetch_add(read, Ordering::Relaxed);

    let outcome = writer.finish().await?;
    info!(products = outcome.rows, "loaded product dimension");
    Ok(outcome.rows)
}
