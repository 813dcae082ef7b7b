//! Orchestrates one full snapshot load in the fixed dependency order:
//! locations + geolocations, products (price aggregation over the
//! order-items extract), customers, orders, sellers (possibly extending
//! locations), payments, order items. No step runs out of order; each
//! consumes mappings produced by committed prior steps.

use sqlx::PgPool;
use tracing::info;

use crate::locations::BackfillCity;
use crate::sources::{self, SourceFiles};
use crate::{
    customers, locations, mappings, order_items, orders, payments, products, sellers, Error,
    Result, WithContext,
};

/// Per-table chunk sizes plus the seller back-fill policy. Chunk defaults
/// are tuned per table width and stay under the bind-parameter limit; they
/// carry no semantic weight.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub location_chunk: usize,
    pub geolocation_chunk: usize,
    pub product_chunk: usize,
    pub customer_chunk: usize,
    pub seller_chunk: usize,
    pub order_chunk: usize,
    /// Rows per insert statement inside the single-transaction fact loads.
    pub fact_statement_chunk: usize,
    pub backfill_city: BackfillCity,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            location_chunk: 5_000,
            geolocation_chunk: 10_000,
            product_chunk: 5_000,
            customer_chunk: 25_000,
            seller_chunk: 1_000,
            order_chunk: 5_000,
            fact_statement_chunk: 5_000,
            backfill_city: BackfillCity::default(),
        }
    }
}

/// Inserted vs dropped counts for one fact table. Dropped rows are the ones
/// whose foreign keys never resolved.
#[derive(Clone, Copy, Debug, Default)]
pub struct FactOutcome {
    pub inserted: u64,
    pub dropped: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoadSummary {
    pub locations: u64,
    pub geolocations: u64,
    pub products: u64,
    pub customers: u64,
    pub sellers: u64,
    pub orders: FactOutcome,
    pub payments: FactOutcome,
    pub order_items: FactOutcome,
}

pub struct Pipeline {
    pool: PgPool,
    opts: LoadOptions,
}

impl Pipeline {
    pub fn new(pool: PgPool, opts: LoadOptions) -> Self {
        Self { pool, opts }
    }

    /// Run the whole load. Any step error aborts the run; chunks already
    /// committed by earlier steps persist. An empty prerequisite mapping
    /// aborts the steps that depend on it instead of silently producing
    /// all-dropped fact rows.
    pub async fn run(&self, files: &SourceFiles) -> Result<LoadSummary> {
        let pool = &self.pool;
        let opts = &self.opts;
        let mut summary = LoadSummary::default();

        let loc = locations::load(pool, &mut sources::open(&files.geolocation)?, opts)
            .await
            .context("loading locations")?;
        summary.locations = loc.locations_inserted;
        summary.geolocations = loc.geolocations_inserted;

        summary.products = products::load(
            pool,
            &mut sources::open(&files.products)?,
            &mut sources::open(&files.order_items)?,
            opts,
        )
        .await
        .context("loading products")?;

        let mut zip_to_key = loc.zip_to_key;

        let customer_maps = customers::load(
            pool,
            &mut sources::open(&files.customers)?,
            &zip_to_key,
            opts,
        )
        .await
        .context("loading customers")?;
        summary.customers = customer_maps.inserted;
        if customer_maps.by_customer_id.is_empty() {
            return Err(Error::EmptyMapping { table: "customers" });
        }

        summary.orders = orders::load(
            pool,
            &mut sources::open(&files.orders)?,
            &customer_maps.by_customer_id,
            opts,
        )
        .await
        .context("loading orders")?;

        summary.sellers = sellers::load(
            pool,
            &mut sources::open(&files.sellers)?,
            &mut zip_to_key,
            opts,
        )
        .await
        .context("loading sellers")?;

        let order_keys = mappings::natural_key_map(pool, "orders", "order_id", "order_key").await?;
        if order_keys.is_empty() {
            return Err(Error::EmptyMapping { table: "orders" });
        }

        summary.payments = payments::load(
            pool,
            &mut sources::open(&files.payments)?,
            &order_keys,
            opts,
        )
        .await
        .context("loading payments")?;

        let product_keys =
            mappings::natural_key_map(pool, "products", "product_id", "product_key").await?;
        let seller_keys =
            mappings::natural_key_map(pool, "sellers", "seller_id", "seller_key").await?;
        if product_keys.is_empty() {
            return Err(Error::EmptyMapping { table: "products" });
        }
        if seller_keys.is_empty() {
            return Err(Error::EmptyMapping { table: "sellers" });
        }

        summary.order_items = order_items::load(
            pool,
            &mut sources::open(&files.order_items)?,
            &order_keys,
            &product_keys,
            &seller_keys,
            opts,
        )
        .await
        .context("loading order items")?;

        info!(
            locations = summary.locations,
            geolocations = summary.geolocations,
            products = summary.products,
            customers = summary.customers,
            sellers = summary.sellers,
            orders = summary.orders.inserted,
            payments = summary.payments.inserted,
            order_items = summary.order_items.inserted,
            "snapshot load complete"
        );
        Ok(summary)
    }
}
