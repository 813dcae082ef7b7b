use anyhow::Result;
use silo::sources::SourceFiles;
use silo::{LoadOptions, Store};
use std::path::Path;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

async fn postgres() -> Result<(ContainerAsync<GenericImage>, String)> {
    let image = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_USER", "postgres")
        .with_env_var("POSTGRES_PASSWORD", "postgres");
    let container = image.start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgres://postgres:postgres@{host}:{port}/postgres?sslmode=disable");
    Ok((container, url))
}

fn write_snapshot(dir: &Path) -> Result<()> {
    std::fs::write(
        dir.join("geolocation.csv"),
        "\
geolocation_zip_code_prefix,geolocation_city,geolocation_state,geolocation_lat,geolocation_lng
10001,A,NY,40.1,-73.9
10001,A,NY,40.2,-73.8
10001,B,NY,40.3,-73.7
20002,C,DC,38.9,-77.0
",
    )?;
    std::fs::write(
        dir.join("products.csv"),
        "\
product_id,product category,product_name_length,product_description_length,product_photos_qty,product_weight_g,product_length_cm,product_height_cm,product_width_cm
P1,toys,40,300,2,500,20,10,15
P2,,,,,,,,
",
    )?;
    std::fs::write(
        dir.join("customers.csv"),
        "\
customer_id,customer_unique_id,customer_zip_code_prefix
CID1,CU1,10001
CID2,CU1,20002
CID3,CU2,99999
",
    )?;
    std::fs::write(
        dir.join("orders.csv"),
        "\
order_id,customer_id,order_status,order_purchase_timestamp,order_approved_at,order_delivered_carrier_date,order_delivered_customer_date,order_estimated_delivery_date
O1,CID1,delivered,2017-10-02 10:56:33,2017-10-02 11:07:15,,not-a-date,2017-10-10 00:00:00
O2,CID2,shipped,2017-11-03 09:00:00,,,,
O3,NOPE,canceled,2017-12-01 00:00:00,,,,
",
    )?;
    std::fs::write(
        dir.join("sellers.csv"),
        "\
seller_id,seller_zip_code_prefix,seller_city,seller_state
S1,10001,a,NY
S2,30003,newtown,TX
",
    )?;
    std::fs::write(
        dir.join("payments.csv"),
        "\
order_id,payment_type,payment_sequential,payment_installments,payment_value
O1,credit_card,1,2,50.00
O1,credit_card,1,1,25.00
O1,voucher,2,1,10.00
O2,boleto,1,1,30.00
OX,credit_card,1,1,99.00
",
    )?;
    std::fs::write(
        dir.join("order_items.csv"),
        "\
order_id,product_id,seller_id,price,freight_value
O1,P1,S1,10,1
O1,P1,S1,10,1
O1,P2,S2,5.5,0.5
O2,P1,S1,7,2
OX,P1,S1,1,1
O1,PX,S1,1,1
",
    )?;
    Ok(())
}

#[tokio::test]
async fn full_snapshot_load_end_to_end() -> Result<()> {
    let (_container, url) = postgres().await?;
    let store = Store::connect(&url).await?;
    store.schema().recreate().await?;

    let dir = tempfile::tempdir()?;
    write_snapshot(dir.path())?;

    // Tiny chunks so every loader commits across several batches.
    let opts = LoadOptions {
        location_chunk: 1,
        geolocation_chunk: 2,
        product_chunk: 1,
        customer_chunk: 1,
        seller_chunk: 1,
        order_chunk: 1,
        fact_statement_chunk: 2,
        ..LoadOptions::default()
    };
    let summary = store
        .pipeline_with(opts)
        .run(&SourceFiles::in_dir(dir.path()))
        .await?;

    // Locations: one row per distinct zip, first-seen city wins; the seller
    // back-fill adds exactly one more.
    assert_eq!(summary.locations, 2);
    assert_eq!(summary.geolocations, 4);
    let city: String = sqlx::query_scalar("select city from locations where zip_code = '10001'")
        .fetch_one(store.pool())
        .await?;
    assert_eq!(city, "A");
    let total_locations = silo::testing::count_rows(store.pool(), "locations").await?;
    assert_eq!(total_locations, 3);
    // Historical back-fill policy writes the state text into both columns.
    let (backfill_city, backfill_state): (Option<String>, Option<String>) =
        sqlx::query_as("select city, state from locations where zip_code = '30003'")
            .fetch_one(store.pool())
            .await?;
    assert_eq!(backfill_city.as_deref(), Some("TX"));
    assert_eq!(backfill_state.as_deref(), Some("TX"));

    // Customers: one row per customer_unique_id; both order-scoped ids of
    // CU1 resolve to the same surrogate key.
    assert_eq!(summary.customers, 2);
    let cu2_location: Option<i32> =
        sqlx::query_scalar("select location_key from customers where customer_unique_id = 'CU2'")
            .fetch_one(store.pool())
            .await?;
    assert_eq!(cu2_location, None);

    // Orders: O3's customer never resolved and is dropped whole; O1's
    // malformed delivery date landed as null.
    assert_eq!(summary.orders.inserted, 2);
    assert_eq!(summary.orders.dropped, 1);
    let delivered: Option<chrono::NaiveDateTime> = sqlx::query_scalar(
        "select order_delivered_customer_date from orders where order_id = 'O1'",
    )
    .fetch_one(store.pool())
    .await?;
    assert_eq!(delivered, None);

    // Products: price/freight summed over every order-item row referencing
    // the product, including rows whose order never resolves.
    let (price, freight): (Option<f64>, Option<f64>) =
        sqlx::query_as("select price, freight_value from products where product_id = 'P1'")
            .fetch_one(store.pool())
            .await?;
    assert_eq!(price, Some(28.0));
    assert_eq!(freight, Some(5.0));

    // Sellers: S2's zip was back-filled; its key must be the new row's key.
    assert_eq!(summary.sellers, 2);
    let (seller_loc, new_loc): (i32, i32) = sqlx::query_as(
        "select s.location_key, l.location_key
         from sellers s, locations l
         where s.seller_id = 'S2' and l.zip_code = '30003'",
    )
    .fetch_one(store.pool())
    .await?;
    assert_eq!(seller_loc, new_loc);

    // Payments: (order_id, sequential) duplicates summed into one row,
    // unresolved order dropped.
    assert_eq!(summary.payments.inserted, 3);
    assert_eq!(summary.payments.dropped, 1);
    let (installments, value): (Option<i32>, Option<f64>) = sqlx::query_as(
        "select p.payment_installments, p.payment_value
         from payments p join orders o on o.order_key = p.order_key
         where o.order_id = 'O1' and p.payment_type = 'credit_card'",
    )
    .fetch_one(store.pool())
    .await?;
    assert_eq!(installments, Some(3));
    assert_eq!(value, Some(75.0));

    // Order items: duplicates aggregate qty and recompute the total; rows
    // with any unresolved key are dropped whole.
    assert_eq!(summary.order_items.inserted, 3);
    assert_eq!(summary.order_items.dropped, 2);
    let (qty, unit, total): (i32, Option<f64>, Option<f64>) = sqlx::query_as(
        "select oi.qty, oi.unit_price, oi.total_price
         from order_items oi
         join orders o on o.order_key = oi.order_key
         join products p on p.product_key = oi.product_key
         where o.order_id = 'O1' and p.product_id = 'P1'",
    )
    .fetch_one(store.pool())
    .await?;
    assert_eq!(qty, 2);
    assert_eq!(unit, Some(11.0));
    assert_eq!(total, Some(22.0));

    Ok(())
}

#[tokio::test]
async fn location_dedup_and_geolocation_counts() -> Result<()> {
    let (_container, url) = postgres().await?;
    let store = Store::connect(&url).await?;
    store.schema().recreate().await?;

    let data = "\
geolocation_zip_code_prefix,geolocation_city,geolocation_state,geolocation_lat,geolocation_lng
10001,A,NY,40.1,-73.9
10001,A,NY,40.2,-73.8
10001,B,NY,40.3,-73.7
20002,C,DC,38.9,-77.0
";
    let mut rdr = csv::Reader::from_reader(data.as_bytes());
    let opts = LoadOptions {
        location_chunk: 1,
        geolocation_chunk: 3,
        ..LoadOptions::default()
    };
    let outcome = silo::locations::load(store.pool(), &mut rdr, &opts).await?;

    assert_eq!(outcome.locations_inserted, 2);
    assert_eq!(outcome.geolocations_inserted, 4);
    assert_eq!(outcome.zip_to_key.len(), 2);

    // Every geolocation row carries the committed key of its zip.
    let key_10001 = outcome.zip_to_key["10001"];
    let n: i64 =
        sqlx::query_scalar("select count(*) from geolocations where location_key = $1")
            .bind(key_10001)
            .fetch_one(store.pool())
            .await?;
    assert_eq!(n, 3);

    Ok(())
}

#[tokio::test]
async fn duplicate_seller_id_surfaces_as_constraint_violation() -> Result<()> {
    let (_container, url) = postgres().await?;
    let store = Store::connect(&url).await?;
    store.schema().recreate().await?;

    let geo = "\
geolocation_zip_code_prefix,geolocation_city,geolocation_state,geolocation_lat,geolocation_lng
10001,A,NY,40.1,-73.9
";
    let mut rdr = csv::Reader::from_reader(geo.as_bytes());
    let opts = LoadOptions::default();
    let outcome = silo::locations::load(store.pool(), &mut rdr, &opts).await?;
    let mut zip_to_key = outcome.zip_to_key;

    // Seller ids are a caller-must-ensure-uniqueness precondition; a dirty
    // feed trips the unique constraint instead of deduplicating.
    let sellers = "\
seller_id,seller_zip_code_prefix,seller_city,seller_state
S1,10001,a,NY
S1,10001,a,NY
";
    let mut rdr = csv::Reader::from_reader(sellers.as_bytes());
    let err = silo::sellers::load(store.pool(), &mut rdr, &mut zip_to_key, &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, silo::Error::ConstraintViolation { .. }));

    Ok(())
}

#[tokio::test]
async fn committed_chunks_survive_a_failing_chunk() -> Result<()> {
    let (_container, url) = postgres().await?;
    let store = Store::connect(&url).await?;
    store.schema().recreate().await?;

    let first = "\
geolocation_zip_code_prefix,geolocation_city,geolocation_state,geolocation_lat,geolocation_lng
10001,A,NY,40.1,-73.9
";
    let opts = LoadOptions {
        location_chunk: 1,
        ..LoadOptions::default()
    };
    let mut rdr = csv::Reader::from_reader(first.as_bytes());
    silo::locations::load(store.pool(), &mut rdr, &opts).await?;

    // Chunk size 1: the new zip commits on its own, then the repeated zip
    // trips the unique constraint in the next chunk.
    let second = "\
geolocation_zip_code_prefix,geolocation_city,geolocation_state,geolocation_lat,geolocation_lng
20002,C,DC,38.9,-77.0
10001,B,NY,40.3,-73.7
";
    let mut rdr = csv::Reader::from_reader(second.as_bytes());
    let err = silo::locations::load(store.pool(), &mut rdr, &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, silo::Error::ConstraintViolation { .. }));

    // The chunk committed before the failure is retained.
    let committed: i64 =
        sqlx::query_scalar("select count(*) from locations where zip_code = '20002'")
            .fetch_one(store.pool())
            .await?;
    assert_eq!(committed, 1);
    assert_eq!(silo::testing::count_rows(store.pool(), "locations").await?, 2);

    Ok(())
}

#[tokio::test]
async fn empty_customer_mapping_aborts_dependent_loads() -> Result<()> {
    let (_container, url) = postgres().await?;
    let store = Store::connect(&url).await?;
    store.schema().recreate().await?;

    let dir = tempfile::tempdir()?;
    write_snapshot(dir.path())?;
    std::fs::write(
        dir.path().join("customers.csv"),
        "customer_id,customer_unique_id,customer_zip_code_prefix\n",
    )?;

    let err = store
        .pipeline()
        .run(&SourceFiles::in_dir(dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        silo::Error::EmptyMapping { table: "customers" }
    ));
    // Nothing past the customer step ran.
    assert_eq!(silo::testing::count_rows(store.pool(), "orders").await?, 0);
    assert_eq!(
        silo::testing::count_rows(store.pool(), "sellers").await?,
        0
    );

    Ok(())
}
