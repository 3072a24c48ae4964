//! Redis client wrapper using the fred crate.
//!
//! The operator only ever talks to one node at a time, so connections are
//! centralized (non-clustered) and short-lived: connect, issue a command or
//! two, quit.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use fred::types::cluster::ClusterResetFlag;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors that can occur while talking to a store node.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Timeouts for a single-node session.
#[derive(Clone, Copy, Debug)]
pub struct RedisClientConfig {
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for RedisClientConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// An open session against one store node.
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Raw `CLUSTER NODES` output.
    async fn cluster_nodes_raw(&self) -> Result<String, StoreError>;

    /// `CLUSTER RESET SOFT`.
    async fn cluster_reset(&self) -> Result<(), StoreError>;

    /// `FLUSHALL`.
    async fn flush_all(&self) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

/// Opens sessions to store nodes by host and port.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// Redis client for a single node.
pub struct RedisClient {
    client: Client,
}

impl RedisClient {
    /// Connect to a single node. `host` is a bare IP or hostname, never bracketed.
    #[instrument(skip(config), fields(host = %host, port = %port))]
    pub async fn connect_single(
        host: &str,
        port: u16,
        config: RedisClientConfig,
    ) -> Result<Self, StoreError> {
        if host.is_empty() {
            return Err(StoreError::InvalidConfig("empty host".to_string()));
        }

        let redis_config = Config {
            server: ServerConfig::Centralized {
                server: Server::new(host, port),
            },
            ..Default::default()
        };

        let client = Builder::from_config(redis_config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = config.command_timeout;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = config.connection_timeout;
            })
            .build()?;

        client.init().await?;
        debug!("Connected to redis node");

        Ok(Self { client })
    }
}

#[async_trait]
impl StoreSession for RedisClient {
    #[instrument(skip(self))]
    async fn cluster_nodes_raw(&self) -> Result<String, StoreError> {
        let response: String = self.client.cluster_nodes().await?;
        Ok(response)
    }

    #[instrument(skip(self))]
    async fn cluster_reset(&self) -> Result<(), StoreError> {
        self.client
            .cluster_reset(Some(ClusterResetFlag::Soft))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn flush_all(&self) -> Result<(), StoreError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.client.quit().await?;
        Ok(())
    }
}

/// Connector backed by [`RedisClient`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RedisConnector {
    config: RedisClientConfig,
}

impl RedisConnector {
    pub fn new(config: RedisClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn StoreSession>, StoreError> {
        let client = RedisClient::connect_single(host, port, self.config).await?;
        Ok(Box::new(client))
    }
}
