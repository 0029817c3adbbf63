//! Postgres connection bootstrap.
//! One pipelined client is opened at startup and shared across the schema
//! reconciler and all HTTP handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_postgres::{Client, Config as PgConfig, NoTls};

#[derive(Clone)]
pub struct SharedDb(pub Arc<Client>);

pub async fn connect(url: &str) -> Result<SharedDb> {
    let cfg: PgConfig = url.parse().context("invalid postgres url")?;
    let (client, conn) = cfg.connect(NoTls).await.context("postgres connect failed")?;
    // drive the connection in background
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::error!("postgres connection error: {}", e);
        }
    });
    Ok(SharedDb(Arc::new(client)))
}
