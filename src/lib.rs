//! Silo — bulk CSV-to-Postgres loader for e-commerce order snapshots.
//!
//! Takes the seven raw extracts of one immutable snapshot (geolocation,
//! products, customers, orders, sellers, payments, order items) and
//! produces a normalized star-like schema: deduplicated dimensions with
//! surrogate keys, aggregated facts referencing them, chunked transactional
//! writes throughout.

pub mod batch;
pub mod customers;
mod error;
pub mod locations;
pub mod mappings;
pub mod metrics;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod pipeline;
pub mod products;
pub mod reports;
pub mod schema;
pub mod sellers;
pub mod sources;
pub mod store;
pub mod testing;

pub use error::{Error, Result, WithContext};
pub use locations::BackfillCity;
pub use pipeline::{FactOutcome, LoadOptions, LoadSummary, Pipeline};
pub use store::Store;

pub mod prelude {
    pub use crate::{Error, LoadOptions, LoadSummary, Pipeline, Result, Store};
}
