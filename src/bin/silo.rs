use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use silo::sources::SourceFiles;
use silo::{BackfillCity, LoadOptions, LoadSummary, Store};

#[derive(Parser, Debug)]
#[command(name = "silo", version, about = "Silo warehouse loader CLI")]
struct Cli {
    /// Postgres connection string. Falls back to DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Maximum connections in the pool
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drop and recreate the warehouse tables
    SchemaSync,

    /// Recreate the schema and run the full snapshot load
    Load {
        /// Directory holding the seven source CSV files
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Back-fill seller locations with the seller city text instead of
        /// the historical state text
        #[arg(long)]
        backfill_city_text: bool,
    },
}

#[tokio::main]
async fn main() -> silo::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let url = match cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        Some(u) => u,
        None => {
            eprintln!("error: --database-url or env DATABASE_URL is required");
            std::process::exit(2);
        }
    };

    let store = Store::connect_with(&url, cli.max_connections).await?;

    match cli.command {
        Commands::SchemaSync => {
            store.schema().recreate().await?;
            println!("Schema recreated.");
        }
        Commands::Load {
            data_dir,
            backfill_city_text,
        } => {
            store.schema().recreate().await?;
            let mut opts = LoadOptions::default();
            if backfill_city_text {
                opts.backfill_city = BackfillCity::CityText;
            }
            let summary = store
                .pipeline_with(opts)
                .run(&SourceFiles::in_dir(&data_dir))
                .await?;
            print_summary(&summary);
        }
    }

    Ok(())
}

fn print_summary(s: &LoadSummary) {
    println!("Load complete:");
    println!("  locations    {}", s.locations);
    println!("  geolocations {}", s.geolocations);
    println!("  products     {}", s.products);
    println!("  customers    {}", s.customers);
    println!("  sellers      {}", s.sellers);
    println!(
        "  orders       {} ({} dropped)",
        s.orders.inserted, s.orders.dropped
    );
    println!(
        "  payments     {} ({} dropped)",
        s.payments.inserted, s.payments.dropped
    );
    println!(
        "  order_items  {} ({} dropped)",
        s.order_items.inserted, s.order_items.dropped
    );
}
