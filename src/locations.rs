//! Location dimension: first-seen zip deduplication plus the geolocation
//! samples that reference it.

use indexmap::IndexMap;
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::Ordering;
use tracing::info;

use crate::batch::{BatchWriter, InsertRow};
use crate::metrics::metrics;
use crate::pipeline::LoadOptions;
use crate::sources::GeoRecord;
use crate::{mappings, Result};

/// Which source column becomes the `city` of a Location back-filled from
/// seller data. The upstream feed historically wrote the state text into
/// both columns; [`BackfillCity::StateText`] preserves that behavior and
/// stays the default until the data owner rules on the intended column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackfillCity {
    #[default]
    StateText,
    CityText,
}

pub(crate) struct LocationRow {
    pub zip_code: String,
    pub city: String,
    pub state: String,
}

impl InsertRow for LocationRow {
    const TABLE: &'static str = "locations";
    const COLUMNS: &'static [&'static str] = &["zip_code", "city", "state"];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.zip_code);
        b.push_bind(self.city);
        b.push_bind(self.state);
    }
}

struct GeoLocationRow {
    latitude: f64,
    longitude: f64,
    location_key: Option<i32>,
}

impl InsertRow for GeoLocationRow {
    const TABLE: &'static str = "geolocations";
    const COLUMNS: &'static [&'static str] = &["latitude", "longitude", "location_key"];

    fn bind(self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.latitude);
        b.push_bind(self.longitude);
        b.push_bind(self.location_key);
    }
}

#[derive(Debug)]
pub struct LocationOutcome {
    /// zip code -> location surrogate key, read back from committed rows.
    pub zip_to_key: HashMap<String, i32>,
    pub locations_inserted: u64,
    pub geolocations_inserted: u64,
}

/// First-seen (city, state) per zip, in input order. Later conflicting rows
/// for the same zip are ignored, not merged.
pub(crate) fn dedup_zips(rows: &[GeoRecord]) -> IndexMap<String, (String, String)> {
    let mut unique = IndexMap::new();
    for r in rows {
        unique
            .entry(r.zip_code.clone())
            .or_insert_with(|| (r.city.clone(), r.state.clone()));
    }
    unique
}

/// Load Locations and GeoLocations from the geolocation extract.
///
/// Three passes: dedup zips first-seen, insert one Location per unique zip
/// and re-read the assigned keys, then insert one GeoLocation per input row
/// (no dedup at that level).
pub async fn load<R: Read>(
    pool: &PgPool,
    rdr: &mut csv::Reader<R>,
    opts: &LoadOptions,
) -> Result<LocationOutcome> {
    let mut rows = Vec::new();
    for rec in rdr.deserialize::<GeoRecord>() {
        rows.push(rec?);
    }
    metrics()
        .rows_read_total
        .fetch_add(rows.len() as u64, Ordering::Relaxed);

    let unique = dedup_zips(&rows);

    let mut writer = BatchWriter::<LocationRow>::new(pool, opts.location_chunk);
    for (zip, (city, state)) in &unique {
        writer
            .push(LocationRow {
                zip_code: zip.clone(),
                city: city.clone(),
                state: state.clone(),
            })
            .await?;
    }
    let locations = writer.finish().await?;

    let zip_to_key = mappings::natural_key_map(pool, "locations", "zip_code", "location_key").await?;

    let mut writer = BatchWriter::<GeoLocationRow>::new(pool, opts.geolocation_chunk);
    for r in &rows {
        // Cannot miss by construction: every zip was seen in pass one.
        let location_key = zip_to_key.get(&r.zip_code).copied();
        writer
            .push(GeoLocationRow {
                latitude: r.latitude,
                longitude: r.longitude,
                location_key,
            })
            .await?;
    }
    let geolocations = writer.finish().await?;

    info!(
        locations = locations.rows,
        geolocations = geolocations.rows,
        "loaded location dimension"
    );

    Ok(LocationOutcome {
        zip_to_key,
        locations_inserted: locations.rows,
        geolocations_inserted: geolocations.rows,
    })
}

/// Insert Location rows for zips the geolocation extract never mentioned,
/// then return zip -> key for just the new rows. Used by the seller loader.
pub async fn extend(
    pool: &PgPool,
    missing: &IndexMap<String, (String, String)>,
    policy: BackfillCity,
    chunk: usize,
) -> Result<HashMap<String, i32>> {
    if missing.is_empty() {
        return Ok(HashMap::new());
    }

    let mut writer = BatchWriter::<LocationRow>::new(pool, chunk);
    for (zip, (city, state)) in missing {
        let city_text = match policy {
            BackfillCity::StateText => state.clone(),
            BackfillCity::CityText => city.clone(),
        };
        writer
            .push(LocationRow {
                zip_code: zip.clone(),
                city: city_text,
                state: state.clone(),
            })
            .await?;
    }
    writer.finish().await?;

    let zips: Vec<String> = missing.keys().cloned().collect();
    let rows: Vec<(String, i32)> =
        sqlx::query_as("select zip_code, location_key from locations where zip_code = any($1)")
            .bind(&zips)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}
