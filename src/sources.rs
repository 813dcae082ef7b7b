//! Typed views over the seven raw CSV extracts.
//!
//! Field names are the contract with the upstream feed; column order is
//! irrelevant. Optional numerics arrive as blank strings and deserialize to
//! `None` (or zero where the downstream aggregation sums them), never as
//! errors. Lifecycle timestamps stay raw strings here and are parsed by the
//! order loader, which tolerates malformed values.

use serde::{Deserialize, Deserializer};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::Result;

/// Open a CSV source for streaming deserialization.
pub fn open(path: &Path) -> Result<csv::Reader<File>> {
    Ok(csv::Reader::from_path(path)?)
}

/// The seven conventional file names of one snapshot, resolved in a
/// single directory.
#[derive(Clone, Debug)]
pub struct SourceFiles {
    pub geolocation: PathBuf,
    pub products: PathBuf,
    pub customers: PathBuf,
    pub orders: PathBuf,
    pub sellers: PathBuf,
    pub payments: PathBuf,
    pub order_items: PathBuf,
}

impl SourceFiles {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            geolocation: dir.join("geolocation.csv"),
            products: dir.join("products.csv"),
            customers: dir.join("customers.csv"),
            orders: dir.join("orders.csv"),
            sellers: dir.join("sellers.csv"),
            payments: dir.join("payments.csv"),
            order_items: dir.join("order_items.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoRecord {
    #[serde(rename = "geolocation_zip_code_prefix")]
    pub zip_code: String,
    #[serde(rename = "geolocation_city")]
    pub city: String,
    #[serde(rename = "geolocation_state")]
    pub state: String,
    #[serde(rename = "geolocation_lat", deserialize_with = "f64_or_zero")]
    pub latitude: f64,
    #[serde(rename = "geolocation_lng", deserialize_with = "f64_or_zero")]
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    // Upstream header genuinely contains a space.
    #[serde(rename = "product category", deserialize_with = "blank_to_none")]
    pub product_category: Option<String>,
    #[serde(deserialize_with = "opt_i32")]
    pub product_name_length: Option<i32>,
    #[serde(deserialize_with = "opt_i32")]
    pub product_description_length: Option<i32>,
    #[serde(deserialize_with = "opt_i32")]
    pub product_photos_qty: Option<i32>,
    #[serde(deserialize_with = "opt_f64")]
    pub product_weight_g: Option<f64>,
    #[serde(deserialize_with = "opt_f64")]
    pub product_length_cm: Option<f64>,
    #[serde(deserialize_with = "opt_f64")]
    pub product_height_cm: Option<f64>,
    #[serde(deserialize_with = "opt_f64")]
    pub product_width_cm: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub customer_unique_id: String,
    pub customer_zip_code_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_id: String,
    pub order_status: String,
    pub order_purchase_timestamp: String,
    pub order_approved_at: String,
    pub order_delivered_carrier_date: String,
    pub order_delivered_customer_date: String,
    pub order_estimated_delivery_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SellerRecord {
    pub seller_id: String,
    pub seller_zip_code_prefix: String,
    pub seller_city: String,
    pub seller_state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRecord {
    pub order_id: String,
    pub payment_type: String,
    pub payment_sequential: String,
    #[serde(deserialize_with = "i32_or_zero")]
    pub payment_installments: i32,
    #[serde(deserialize_with = "f64_or_zero")]
    pub payment_value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRecord {
    pub order_id: String,
    pub product_id: String,
    pub seller_id: String,
    #[serde(deserialize_with = "f64_or_zero")]
    pub price: f64,
    #[serde(deserialize_with = "f64_or_zero")]
    pub freight_value: f64,
}

fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    let s = String::deserialize(d)?;
    Ok(s.trim().parse().unwrap_or(0.0))
}

fn i32_or_zero<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i32, D::Error> {
    let s = String::deserialize(d)?;
    Ok(s.trim().parse().unwrap_or(0))
}

fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    let s = String::deserialize(d)?;
    Ok(s.trim().parse().ok())
}

fn opt_i32<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i32>, D::Error> {
    let s = String::deserialize(d)?;
    Ok(s.trim().parse().ok())
}

fn blank_to_none<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let s = String::deserialize(d)?;
    if s.trim().is_empty() { Ok(None) } else { Ok(Some(s)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        csv::Reader::from_reader(data.as_bytes())
    }

    #[test]
    fn blank_numerics_become_none() {
        let data = "\
product_id,product category,product_name_length,product_description_length,product_photos_qty,product_weight_g,product_length_cm,product_height_cm,product_width_cm
P1,,,,,,,,
P2,toys,40,300,2,500,20.5,10,15
";
        let rows: Vec<ProductRecord> = reader(data)
            .deserialize()
            .collect::<csv::Result<_>>()
            .unwrap();
        assert_eq!(rows[0].product_category, None);
        assert_eq!(rows[0].product_name_length, None);
        assert_eq!(rows[0].product_weight_g, None);
        assert_eq!(rows[1].product_category.as_deref(), Some("toys"));
        assert_eq!(rows[1].product_length_cm, Some(20.5));
    }

    #[test]
    fn blank_money_fields_sum_as_zero() {
        let data = "\
order_id,product_id,seller_id,price,freight_value
O1,P1,S1,12.5,
O1,P1,S1,junk,1.5
";
        let rows: Vec<OrderItemRecord> = reader(data)
            .deserialize()
            .collect::<csv::Result<_>>()
            .unwrap();
        assert_eq!(rows[0].price, 12.5);
        assert_eq!(rows[0].freight_value, 0.0);
        assert_eq!(rows[1].price, 0.0);
        assert_eq!(rows[1].freight_value, 1.5);
    }

    #[test]
    fn field_order_is_irrelevant() {
        let data = "\
customer_unique_id,customer_zip_code_prefix,customer_id
CU1,10001,CID1
";
        let rows: Vec<CustomerRecord> = reader(data)
            .deserialize()
            .collect::<csv::Result<_>>()
            .unwrap();
        assert_eq!(rows[0].customer_id, "CID1");
        assert_eq!(rows[0].customer_unique_id, "CU1");
        assert_eq!(rows[0].customer_zip_code_prefix, "10001");
    }
}
