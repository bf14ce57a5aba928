//! Connection setup.

use tokio_postgres::{Client, NoTls};

use crate::error::Result;

/// Connect to Postgres and drive the connection on a background task.
///
/// The connection task is the only task the pipeline spawns.
pub async fn connect(url: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("postgres connection error: {e}");
        }
    });
    tracing::debug!("connected to postgres");
    Ok(client)
}

/// `CREATE EXTENSION IF NOT EXISTS vector`.
pub async fn ensure_vector_extension(client: &Client) -> Result<()> {
    client
        .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
        .await?;
    Ok(())
}
