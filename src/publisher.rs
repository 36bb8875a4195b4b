// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Producer
//!
//! The component's single [`Producer`] publishes [`Message`]s to exchanges over
//! the shared connection, propagating the OpenTelemetry context in the message
//! headers.

use crate::{
    component::ComponentId,
    connection::Connection,
    errors::AmqpError,
    logger::{log_options, Logger, LoggerConfig},
    message::Message,
    otel,
};
use opentelemetry::Context;
use serde::Deserialize;
use std::{fmt, sync::Arc};
use tracing::debug;

/// Producer settings decoded from the `producer` descriptor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerConfig {
    /// Wait for broker confirmation of every publish
    #[serde(default)]
    pub confirm: bool,
    /// Ask the broker to return unroutable messages
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub logger: LoggerConfig,
}

/// Publishes messages over the component's connection.
pub struct Producer {
    config: ProducerConfig,
    connection: Arc<Connection>,
    logger: Arc<dyn Logger>,
    owner: ComponentId,
}

impl Producer {
    /// Creates the producer.
    ///
    /// With `confirm` on, the channel is switched to publisher-confirm mode
    /// right away, whether or not the component auto-declares its topology.
    ///
    /// # Parameters
    /// * `config` - Decoded `producer` descriptor
    /// * `connection` - The component's shared connection
    /// * `logger` - Sink for publish activity
    /// * `owner` - Id of the owning component
    ///
    /// # Returns
    /// The producer, or `ConfirmSelectError` when confirm mode is refused
    pub async fn new(
        config: ProducerConfig,
        connection: Arc<Connection>,
        logger: Arc<dyn Logger>,
        owner: ComponentId,
    ) -> Result<Producer, AmqpError> {
        if config.confirm {
            debug!("enabling publisher confirms");
            connection.client().confirm_select().await?;
        }

        Ok(Producer {
            config,
            connection,
            logger,
            owner,
        })
    }

    /// Settings the producer was built from.
    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// The component's shared connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn owner(&self) -> &ComponentId {
        &self.owner
    }

    /// Publishes `message` to `exchange` with `routing_key`.
    ///
    /// The current OpenTelemetry context is added to the message headers.
    ///
    /// # Returns
    /// `PublishingError` when the broker refuses or nacks the message
    pub async fn publish(
        &self,
        message: &Message,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        let options = log_options([("exchange", exchange), ("routing_key", routing_key)]);
        self.logger.info("publishing message", &options);

        let headers = otel::inject_context(&Context::current(), &message.headers());
        let properties = message.properties().clone().with_headers(headers);

        let result = self
            .connection
            .client()
            .basic_publish(
                exchange,
                routing_key,
                self.config.mandatory,
                message.body(),
                properties,
            )
            .await;

        match &result {
            Ok(()) => self.logger.success("message published", &options),
            Err(err) => {
                let mut options = options.clone();
                options.insert("error".to_owned(), err.to_string());
                self.logger.error("message publishing failed", &options);
            }
        }

        result
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("config", &self.config)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::MockAmqpClient, connection::ConnectionConfig, logger::testing::RecordingLogger,
        message::MessageTemplate,
    };

    fn connection(client: MockAmqpClient) -> Arc<Connection> {
        Arc::new(Connection::with_client(ConnectionConfig::default(), Arc::new(client)))
    }

    fn owner() -> ComponentId {
        ComponentId::from("testAmqp")
    }

    async fn producer_with(
        config: ProducerConfig,
        client: MockAmqpClient,
    ) -> Result<Producer, AmqpError> {
        Producer::new(
            config,
            connection(client),
            Arc::new(RecordingLogger::default()),
            owner(),
        )
        .await
    }

    #[tokio::test]
    async fn confirm_mode_is_enabled_when_configured() {
        let mut client = MockAmqpClient::new();
        client.expect_confirm_select().times(1).returning(|| Ok(()));
        client
            .expect_basic_publish()
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        let config = ProducerConfig {
            confirm: true,
            ..ProducerConfig::default()
        };

        let producer = producer_with(config, client).await.unwrap();
        let message = MessageTemplate::default().instantiate(b"payload".to_vec(), owner());

        producer.publish(&message, "srcExchange", "").await.unwrap();
    }

    #[tokio::test]
    async fn no_confirm_mode_by_default() {
        // any confirm_select call would fail the mock
        producer_with(ProducerConfig::default(), MockAmqpClient::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn confirm_select_failure_propagates() {
        let mut client = MockAmqpClient::new();
        client
            .expect_confirm_select()
            .returning(|| Err(AmqpError::ConfirmSelectError));
        let config = ProducerConfig {
            confirm: true,
            ..ProducerConfig::default()
        };

        let result = producer_with(config, client).await;

        assert_eq!(result.err(), Some(AmqpError::ConfirmSelectError));
    }

    #[tokio::test]
    async fn publish_sends_body_and_properties() {
        let mut client = MockAmqpClient::new();
        client
            .expect_basic_publish()
            .withf(|exchange, key, mandatory, payload, props| {
                exchange == "srcExchange"
                    && key == "orders"
                    && !*mandatory
                    && payload == b"payload"
                    && props.content_type().as_ref().map(|v| v.as_str())
                        == Some("application/json")
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        let logger = Arc::new(RecordingLogger::default());

        let producer = Producer::new(
            ProducerConfig::default(),
            connection(client),
            logger.clone(),
            owner(),
        )
        .await
        .unwrap();
        let message = MessageTemplate::default().instantiate(b"payload".to_vec(), owner());

        producer.publish(&message, "srcExchange", "orders").await.unwrap();

        assert_eq!(logger.levels(), vec!["info", "success"]);
    }

    #[tokio::test]
    async fn publish_failure_is_logged_and_returned() {
        let mut client = MockAmqpClient::new();
        client
            .expect_basic_publish()
            .returning(|_, _, _, _, _| Err(AmqpError::PublishingError));
        let logger = Arc::new(RecordingLogger::default());

        let producer = Producer::new(
            ProducerConfig::default(),
            connection(client),
            logger.clone(),
            owner(),
        )
        .await
        .unwrap();
        let message = MessageTemplate::default().instantiate(b"payload".to_vec(), owner());

        let result = producer.publish(&message, "srcExchange", "").await;

        assert_eq!(result, Err(AmqpError::PublishingError));
        assert_eq!(logger.levels(), vec!["info", "error"]);
        let lines = logger.lines.lock().unwrap();
        assert_eq!(lines[1].2["error"], "failure to publish");
    }
}
