// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Shared AMQP Connection
//!
//! One [`Connection`] exists per component. It is created first and handed out
//! as an `Arc` to the producer, the consumer and every topology member, which
//! only ever read it.

use crate::{
    channel::LapinClient,
    client::AmqpClient,
    descriptor::{Descriptor, DEFAULT_DSN},
    errors::AmqpError,
};
use serde::Deserialize;
use std::{fmt, sync::Arc};
use tracing::debug;

/// Connection settings decoded from the `connection` descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Broker URI
    #[serde(default = "default_dsn")]
    pub dsn: String,
    /// Name shown for the connection in the broker, the component's service
    /// name is used when absent
    #[serde(default)]
    pub name: Option<String>,
    /// Descriptor keys without a typed counterpart
    #[serde(flatten)]
    pub options: Descriptor,
}

fn default_dsn() -> String {
    DEFAULT_DSN.to_owned()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            dsn: default_dsn(),
            name: None,
            options: Descriptor::new(),
        }
    }
}

impl ConnectionConfig {
    /// Builds the connection settings from the process environment.
    ///
    /// Reads `RABBITMQ_USER`, `RABBITMQ_PASSWORD`, `RABBITMQ_HOST`,
    /// `RABBITMQ_PORT`, `RABBITMQ_VHOST` and `APP_NAME`.
    pub fn from_env() -> ConnectionConfig {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the connection settings from any variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConnectionConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let dsn = format!(
            "amqp://{}:{}@{}:{}/{}",
            var("RABBITMQ_USER", "guest"),
            var("RABBITMQ_PASSWORD", "guest"),
            var("RABBITMQ_HOST", "localhost"),
            var("RABBITMQ_PORT", "5672"),
            var("RABBITMQ_VHOST", ""),
        );

        ConnectionConfig {
            dsn,
            name: lookup("APP_NAME"),
            options: Descriptor::new(),
        }
    }
}

/// The connection shared by every part of a component.
pub struct Connection {
    config: ConnectionConfig,
    client: Arc<dyn AmqpClient>,
}

impl Connection {
    /// Connects to the broker described by `config`.
    ///
    /// # Parameters
    /// * `config` - Connection settings
    /// * `fallback_name` - Connection name used when `config.name` is empty
    pub async fn open(
        config: ConnectionConfig,
        fallback_name: &str,
    ) -> Result<Connection, AmqpError> {
        let name = config.name.clone().unwrap_or_else(|| fallback_name.to_owned());
        debug!(name = name.as_str(), "opening component connection");

        let client = LapinClient::connect(&config.dsn, &name).await?;

        Ok(Connection {
            config,
            client: Arc::new(client),
        })
    }

    /// Wraps an already connected client.
    pub fn with_client(config: ConnectionConfig, client: Arc<dyn AmqpClient>) -> Connection {
        Connection { config, client }
    }

    /// The settings this connection was created from.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The client every broker operation goes through.
    pub fn client(&self) -> &Arc<dyn AmqpClient> {
        &self.client
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), AmqpError> {
        self.client.close().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
