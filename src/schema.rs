use indoc::indoc;
use sqlx::PgPool;

use crate::Result;

/// Tables in drop order: dependents first so foreign keys never dangle.
const DROP_ORDER: &[&str] = &[
    "order_items",
    "payments",
    "orders",
    "sellers",
    "customers",
    "geolocations",
    "locations",
    "products",
];

/// Create statements in dependency order. Surrogate keys are identity
/// columns assigned by the database; natural keys carry unique constraints
/// so a dirty load surfaces as a constraint violation instead of silent
/// duplication.
const CREATE_TABLES: &[&str] = &[
    indoc! {"
        create table products (
            product_key integer generated always as identity primary key,
            product_id text not null unique,
            product_category text,
            product_name_length integer,
            product_description_length integer,
            product_photos_qty integer,
            product_weight_g double precision,
            product_length_cm double precision,
            product_height_cm double precision,
            product_width_cm double precision,
            price double precision,
            freight_value double precision
        )"},
    indoc! {"
        create table locations (
            location_key integer generated always as identity primary key,
            zip_code text not null unique,
            city text,
            state text
        )"},
    indoc! {"
        create table geolocations (
            geolocation_key integer generated always as identity primary key,
            latitude double precision,
            longitude double precision,
            location_key integer references locations (location_key)
        )"},
    indoc! {"
        create table customers (
            customer_key integer generated always as identity primary key,
            customer_unique_id text not null unique,
            location_key integer references locations (location_key)
        )"},
    indoc! {"
        create table sellers (
            seller_key integer generated always as identity primary key,
            seller_id text not null unique,
            location_key integer references locations (location_key)
        )"},
    indoc! {"
        create table orders (
            order_key integer generated always as identity primary key,
            order_id text not null unique,
            customer_key integer not null references customers (customer_key),
            order_status text,
            order_purchase_date timestamp,
            order_approved_date timestamp,
            order_delivered_carrier_date timestamp,
            order_delivered_customer_date timestamp,
            order_estimated_delivery_date timestamp
        )"},
    indoc! {"
        create table payments (
            payment_key integer generated always as identity primary key,
            order_key integer not null references orders (order_key),
            payment_type text,
            payment_installments integer,
            payment_value double precision
        )"},
    indoc! {"
        create table order_items (
            order_item_key integer generated always as identity primary key,
            order_key integer not null references orders (order_key),
            product_key integer not null references products (product_key),
            seller_key integer not null references sellers (seller_key),
            qty integer not null,
            unit_price double precision,
            total_price double precision
        )"},
];

#[derive(Clone, Debug)]
pub struct Schema {
    pool: PgPool,
}

impl Schema {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop and recreate the full warehouse schema in one transaction.
    /// Every load starts from an empty, freshly created set of tables.
    pub async fn recreate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in DROP_ORDER {
            sqlx::query(&format!("drop table if exists {table}"))
                .execute(&mut *tx)
                .await?;
        }
        for ddl in CREATE_TABLES {
            sqlx::query(ddl).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
