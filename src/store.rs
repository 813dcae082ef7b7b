use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::pipeline::{LoadOptions, Pipeline};
use crate::schema::Schema;
use crate::Result;

/// Entry point: owns the connection pool, hands out the schema manager and
/// load pipeline.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.pool.clone())
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(LoadOptions::default())
    }

    pub fn pipeline_with(&self, opts: LoadOptions) -> Pipeline {
        Pipeline::new(self.pool.clone(), opts)
    }
}
