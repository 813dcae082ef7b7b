//! The fixed reporting menu: parameterized read-only analytics over the
//! loaded schema. Pure pass-through — every function runs one query and
//! wraps the rows in the standard response envelope. The HTTP layer that
//! fronts these lives elsewhere.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Instant;

use crate::{Error, Result};

/// `code` 1 = success (possibly no data), 0 = validation or execution
/// error. `result` preserves query row order.
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub code: i32,
    pub msg: String,
    pub req: &'static str,
    pub sqltime: f64,
    pub result: Vec<Value>,
}

fn respond<T: Serialize>(req: &'static str, started: Instant, rows: Result<Vec<T>>) -> ReportResponse {
    let sqltime = started.elapsed().as_secs_f64();
    match rows {
        Ok(rows) => {
            let msg = if rows.is_empty() {
                "No data found"
            } else {
                "Request successful"
            };
            let result = rows
                .iter()
                .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
                .collect();
            ReportResponse {
                code: 1,
                msg: msg.to_string(),
                req,
                sqltime,
                result,
            }
        }
        Err(e) => ReportResponse {
            code: 0,
            msg: format!("Error: {e}"),
            req,
            sqltime,
            result: Vec::new(),
        },
    }
}

fn bad_limit(req: &'static str) -> ReportResponse {
    ReportResponse {
        code: 0,
        msg: "Missing limit".to_string(),
        req,
        sqltime: 0.0,
        result: Vec::new(),
    }
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct CustomerRow {
    customer_unique_id: String,
    zip_code: String,
    city: Option<String>,
    state: Option<String>,
}

pub async fn get_n_customers(pool: &PgPool, limit: i64) -> ReportResponse {
    const REQ: &str = "getNCustomers";
    if limit <= 0 {
        return bad_limit(REQ);
    }
    let started = Instant::now();
    let rows = sqlx::query_as::<_, CustomerRow>(
        "select c.customer_unique_id, l.zip_code, l.city, l.state
         from customers c join locations l on l.location_key = c.location_key
         limit $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct OrderSummaryRow {
    order_id: String,
    customer_unique_id: String,
    order_status: Option<String>,
    order_purchase_date: Option<NaiveDate>,
    order_delivered_customer_date: Option<NaiveDate>,
}

pub async fn get_n_orders(pool: &PgPool, limit: i64) -> ReportResponse {
    const REQ: &str = "getNOrders";
    if limit <= 0 {
        return bad_limit(REQ);
    }
    let started = Instant::now();
    let rows = sqlx::query_as::<_, OrderSummaryRow>(
        "select o.order_id, c.customer_unique_id, o.order_status,
                o.order_purchase_date::date as order_purchase_date,
                o.order_delivered_customer_date::date as order_delivered_customer_date
         from orders o join customers c on o.customer_key = c.customer_key
         limit $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct SellerRow {
    seller_id: String,
    zip_code: String,
    city: Option<String>,
    state: Option<String>,
}

pub async fn get_n_sellers(pool: &PgPool, limit: i64) -> ReportResponse {
    const REQ: &str = "getNSellers";
    if limit <= 0 {
        return bad_limit(REQ);
    }
    let started = Instant::now();
    let rows = sqlx::query_as::<_, SellerRow>(
        "select s.seller_id, l.zip_code, l.city, l.state
         from sellers s join locations l on l.location_key = s.location_key
         limit $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct ProductRow {
    product_id: String,
    product_category: Option<String>,
    product_name_length: Option<i32>,
    product_description_length: Option<i32>,
    product_photos_qty: Option<i32>,
    product_weight_g: Option<f64>,
    product_length_cm: Option<f64>,
    product_height_cm: Option<f64>,
    product_width_cm: Option<f64>,
    price: Option<f64>,
    freight_value: Option<f64>,
}

pub async fn get_n_products(pool: &PgPool, limit: i64) -> ReportResponse {
    const REQ: &str = "getNProducts";
    if limit <= 0 {
        return bad_limit(REQ);
    }
    let started = Instant::now();
    let rows = sqlx::query_as::<_, ProductRow>(
        "select product_id, product_category, product_name_length,
                product_description_length, product_photos_qty,
                product_weight_g, product_length_cm, product_height_cm,
                product_width_cm, price, freight_value
         from products limit $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct OrderDetailRow {
    order_id: String,
    customer_key: i32,
    order_status: Option<String>,
    order_purchase_date: Option<NaiveDateTime>,
    order_approved_date: Option<NaiveDateTime>,
    order_delivered_carrier_date: Option<NaiveDateTime>,
    order_delivered_customer_date: Option<NaiveDateTime>,
    order_estimated_delivery_date: Option<NaiveDateTime>,
}

/// Orders purchased between two dates, ascending, capped at 50 rows.
pub async fn get_orders_between(pool: &PgPool, start: NaiveDate, end: NaiveDate) -> ReportResponse {
    const REQ: &str = "getOrders";
    let started = Instant::now();
    let rows = sqlx::query_as::<_, OrderDetailRow>(
        "select order_id, customer_key, order_status, order_purchase_date,
                order_approved_date, order_delivered_carrier_date,
                order_delivered_customer_date, order_estimated_delivery_date
         from orders
         where order_purchase_date between $1 and $2
         order by order_purchase_date
         limit 50",
    )
    .bind(start.and_hms_opt(0, 0, 0))
    .bind(end.and_hms_opt(0, 0, 0))
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct LocationValueRow {
    city: Option<String>,
    state: Option<String>,
    avg_order_value: Option<f64>,
}

pub async fn highest_avg_order_value_by_location(pool: &PgPool, limit: i64) -> ReportResponse {
    const REQ: &str = "getLocationsWithHighestAvgOrderValue";
    if limit <= 0 {
        return bad_limit(REQ);
    }
    let started = Instant::now();
    let rows = sqlx::query_as::<_, LocationValueRow>(
        "select l.city, l.state, avg(oi.total_price) as avg_order_value
         from locations l
         join customers c on l.location_key = c.location_key
         join orders o on c.customer_key = o.customer_key
         join order_items oi on o.order_key = oi.order_key
         group by l.city, l.state
         order by avg_order_value desc
         limit $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct CategoryRow {
    product_category: Option<String>,
    total_purchases: i64,
}

pub async fn most_frequent_product_categories(pool: &PgPool, limit: i64) -> ReportResponse {
    const REQ: &str = "getMostFrequentProductCategories";
    if limit <= 0 {
        return bad_limit(REQ);
    }
    let started = Instant::now();
    let rows = sqlx::query_as::<_, CategoryRow>(
        "select p.product_category, count(oi.order_item_key) as total_purchases
         from products p
         join order_items oi on p.product_key = oi.product_key
         group by p.product_category
         order by total_purchases desc
         limit $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct PurchaseHourRow {
    purchase_hour: Option<i32>,
    total_orders: i64,
}

pub async fn most_frequent_purchase_hours(pool: &PgPool, limit: i64) -> ReportResponse {
    const REQ: &str = "getMostFrequentPurchaseHours";
    if limit <= 0 {
        return bad_limit(REQ);
    }
    let started = Instant::now();
    let rows = sqlx::query_as::<_, PurchaseHourRow>(
        "select extract(hour from order_purchase_date)::int as purchase_hour,
                count(order_key) as total_orders
         from orders
         group by purchase_hour
         order by total_orders desc
         limit $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct LocationRevenueRow {
    city: Option<String>,
    state: Option<String>,
    total_revenue: Option<f64>,
}

pub async fn most_profitable_locations(pool: &PgPool, limit: i64) -> ReportResponse {
    const REQ: &str = "getMostProfitableLocations";
    if limit <= 0 {
        return bad_limit(REQ);
    }
    let started = Instant::now();
    let rows = sqlx::query_as::<_, LocationRevenueRow>(
        "select l.city, l.state, sum(oi.qty * oi.unit_price) as total_revenue
         from locations l
         join customers c on l.location_key = c.location_key
         join orders o on c.customer_key = o.customer_key
         join order_items oi on o.order_key = oi.order_key
         group by l.city, l.state
         order by total_revenue desc
         limit $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}

#[derive(Debug, sqlx::FromRow, Serialize)]
struct CustomerSpendRow {
    customer_unique_id: String,
    total_spent: Option<f64>,
}

/// Top five customers by spend. The cutoff is fixed upstream.
pub async fn top_customers_by_spending(pool: &PgPool) -> ReportResponse {
    const REQ: &str = "getTop5CustomersOnSpendings";
    let started = Instant::now();
    let rows = sqlx::query_as::<_, CustomerSpendRow>(
        "select c.customer_unique_id, sum(oi.qty * oi.unit_price) as total_spent
         from customers c
         join orders o on c.customer_key = o.customer_key
         join order_items oi on o.order_key = oi.order_key
         group by c.customer_unique_id
         order by total_spent desc
         limit 5",
    )
    .fetch_all(pool)
    .await
    .map_err(Error::from);
    respond(REQ, started, rows)
}
