//! Seller dimension.
//!
//! Sellers are not deduplicated: the feed guarantees `seller_id` uniqueness
//! and a violation aborts the offending batch via the unique constraint
//! (caller-must-ensure precondition). A seller whose zip is absent from the
//! location mapping is held back, the missing zips are back-filled into
//! Locations in one batch, and the pending sellers are inserted once their
//! new keys exist. No recursive retry.

use indexmap::IndexMap;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use crate::batch::{BatchWriter, InsertRow};
use crate::locations;
use crate::metrics::metrics;
use crate::pipeline::LoadOptions;
use crate::sources::SellerRecord;
use crate::Result;

struct SellerRow {
    seller_id: String,
    location_key: i32,
}

impl InsertRow for SellerRow {
    const TABLE: &'static str = "sellers";
    const COLUMNS: &'static [&'static str] = &["seller_id", "location_key"];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.seller_id);
        b.push_bind(self.location_key);
    }
}

/// Outcome of resolving one seller row against the location mapping.
pub(crate) enum Resolution {
    Resolved { seller_id: String, location_key: i32 },
    Unresolved { seller_id: String, zip_code: String },
}

pub(crate) struct Partition {
    pub resolved: Vec<(String, i32)>,
    /// (seller_id, zip) awaiting a back-filled location.
    pub pending: Vec<(String, String)>,
    /// zip -> (city, state), first-seen, for the back-fill insert.
    pub missing: IndexMap<String, (String, String)>,
}

pub(crate) fn resolve(rec: &SellerRecord, zip_to_key: &HashMap<String, i32>) -> Resolution {
    match zip_to_key.get(&rec.seller_zip_code_prefix) {
        Some(key) => Resolution::Resolved {
            seller_id: rec.seller_id.clone(),
            location_key: *key,
        },
        None => Resolution::Unresolved {
            seller_id: rec.seller_id.clone(),
            zip_code: rec.seller_zip_code_prefix.clone(),
        },
    }
}

pub(crate) fn partition(
    rows: impl IntoIterator<Item = SellerRecord>,
    zip_to_key: &HashMap<String, i32>,
) -> Partition {
    let mut out = Partition {
        resolved: Vec::new(),
        pending: Vec::new(),
        missing: IndexMap::new(),
    };
    for rec in rows {
        match resolve(&rec, zip_to_key) {
            Resolution::Resolved {
                seller_id,
                location_key,
            } => out.resolved.push((seller_id, location_key)),
            Resolution::Unresolved { seller_id, zip_code } => {
                out.missing
                    .entry(zip_code.clone())
                    .or_insert_with(|| (rec.seller_city.clone(), rec.seller_state.clone()));
                out.pending.push((seller_id, zip_code));
            }
        }
    }
    out
}

/// Load sellers, extending the location mapping in place when zips have to
/// be back-filled.
pub async fn load<R: Read>(
    pool: &PgPool,
    rdr: &mut csv::Reader<R>,
    zip_to_key: &mut HashMap<String, i32>,
    opts: &LoadOptions,
) -> Result<u64> {
    let mut rows = Vec::new();
    for rec in rdr.deserialize::<SellerRecord>() {
        rows.push(rec?);
    }
    metrics()
        .rows_read_total
        .fetch_add(rows.len() as u64, Ordering::Relaxed);

    let part = partition(rows, zip_to_key);

    let mut writer = BatchWriter::<SellerRow>::new(pool, opts.seller_chunk);
    for (seller_id, location_key) in part.resolved {
        writer
            .push(SellerRow {
                seller_id,
                location_key,
            })
            .await?;
    }
    let mut inserted = writer.finish().await?.rows;

    if !part.missing.is_empty() {
        let new_keys = locations::extend(
            pool,
            &part.missing,
            opts.backfill_city,
            opts.location_chunk,
        )
        .await?;
        info!(
            locations = new_keys.len(),
            sellers = part.pending.len(),
            "back-filled locations for seller zips"
        );
        zip_to_key.extend(new_keys);

        let mut writer = BatchWriter::<SellerRow>::new(pool, opts.seller_chunk);
        for (seller_id, zip_code) in part.pending {
            match zip_to_key.get(&zip_code) {
                Some(key) => {
                    writer
                        .push(SellerRow {
                            seller_id,
                            location_key: *key,
                        })
                        .await?;
                }
                // Unreachable after the extension; dropped rather than
                // inserted with a dangling key.
                None => {
                    warn!(%seller_id, %zip_code, "seller zip still unresolved after back-fill");
                    metrics().rows_dropped_total.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        inserted += writer.finish().await?.rows;
    }

    info!(sellers = inserted, "loaded seller dimension");
    Ok(inserted)
}
