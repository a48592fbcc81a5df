use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::Client;

pub type Redis = Client;

pub fn get_redis_client(redis_url: &str) -> Result<Redis> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

pub async fn get_redis_connection(client: &Redis) -> Result<MultiplexedConnection> {
    client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")
}
