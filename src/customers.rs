//! Customer dimension.
//!
//! The feed carries one `customer_id` per order placed, but many of those
//! ids belong to the same person, identified by `customer_unique_id`. One
//! row is written per unique id (first-seen location wins) and the loader
//! hands back both mappings: unique id -> key, and order-scoped id -> key.

use indexmap::IndexMap;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use crate::batch::{BatchWriter, InsertRow};
use crate::metrics::metrics;
use crate::pipeline::LoadOptions;
use crate::sources::CustomerRecord;
use crate::{mappings, Result};

struct CustomerRow {
    customer_unique_id: String,
    location_key: Option<i32>,
}

impl InsertRow for CustomerRow {
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static [&'static str] = &["customer_unique_id", "location_key"];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.customer_unique_id);
        b.push_bind(self.location_key);
    }
}

pub struct CustomerMappings {
    /// customer_unique_id -> customer_key, from committed rows.
    pub by_unique_id: HashMap<String, i32>,
    /// Order-scoped customer_id -> customer_key, composed through the
    /// unique id.
    pub by_customer_id: HashMap<String, i32>,
    pub inserted: u64,
}

pub(crate) struct DedupedCustomers {
    /// unique id -> resolved location key, first-seen order. An unresolved
    /// zip stores None; customers keep the row with a null location.
    pub unique: IndexMap<String, Option<i32>>,
    /// order-scoped id -> unique id, every input row.
    pub id_to_unique: HashMap<String, String>,
}

pub(crate) fn dedup(
    rows: impl IntoIterator<Item = CustomerRecord>,
    zip_to_key: &HashMap<String, i32>,
) -> DedupedCustomers {
    let mut unique = IndexMap::new();
    let mut id_to_unique = HashMap::new();
    for r in rows {
        let location_key = zip_to_key.get(&r.customer_zip_code_prefix).copied();
        id_to_unique.insert(r.customer_id, r.customer_unique_id.clone());
        unique.entry(r.customer_unique_id).or_insert(location_key);
    }
    DedupedCustomers { unique, id_to_unique }
}

pub async fn load<R: Read>(
    pool: &PgPool,
    rdr: &mut csv::Reader<R>,
    zip_to_key: &HashMap<String, i32>,
    opts: &LoadOptions,
) -> Result<CustomerMappings> {
    let mut read = 0u64;
    let mut rows = Vec::new();
    for rec in rdr.deserialize::<CustomerRecord>() {
        rows.push(rec?);
        read += 1;
    }
    metrics().rows_read_total.fetch_add(read, Ordering::Relaxed);

    let deduped = dedup(rows, zip_to_key);

    let mut writer = BatchWriter::<CustomerRow>::new(pool, opts.customer_chunk);
    for (unique_id, location_key) in &deduped.unique {
        writer
            .push(CustomerRow {
                customer_unique_id: unique_id.clone(),
                location_key: *location_key,
            })
            .await?;
    }
    let outcome = writer.finish().await?;

    let by_unique_id =
        mappings::natural_key_map(pool, "customers", "customer_unique_id", "customer_key").await?;

    let mut by_customer_id = HashMap::with_capacity(deduped.id_to_unique.len());
    for (customer_id, unique_id) in deduped.id_to_unique {
        match by_unique_id.get(&unique_id) {
            Some(key) => {
                by_customer_id.insert(customer_id, *key);
            }
            None => warn!(%unique_id, "no committed key for customer_unique_id"),
        }
    }

    info!(customers = outcome.rows, "loaded customer dimension");

    Ok(CustomerMappings {
        by_unique_id,
        by_customer_id,
        inserted: outcome.rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, unique: &str, zip: &str) -> CustomerRecord {
        CustomerRecord {
            customer_id: id.into(),
            customer_unique_id: unique.into(),
            customer_zip_code_prefix: zip.into(),
        }
    }

    #[test]
    fn dedup_keeps_one_row_per_unique_id() {
        let zips = HashMap::from([("10001".to_string(), 7)]);
        let deduped = dedup(
            vec![
                rec("CID1", "CU1", "10001"),
                rec("CID2", "CU1", "99999"),
                rec("CID3", "CU2", "99999"),
            ],
            &zips,
        );
        assert_eq!(deduped.unique.len(), 2);
        // first-seen location wins for CU1
        assert_eq!(deduped.unique["CU1"], Some(7));
        // unresolved zip stays as a null location
        assert_eq!(deduped.unique["CU2"], None);
        assert_eq!(deduped.id_to_unique.len(), 3);
        assert_eq!(deduped.id_to_unique["CID2"], "CU1");
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let deduped = dedup(
            vec![
                rec("a", "CU2", "1"),
                rec("b", "CU1", "1"),
                rec("c", "CU2", "1"),
            ],
            &HashMap::new(),
        );
        let order: Vec<&str> = deduped.unique.keys().map(String::as_str).collect();
        assert_eq!(order, ["CU2", "CU1"]);
    }
}
