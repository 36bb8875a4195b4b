// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Client Boundary
//!
//! Everything the component asks of the broker goes through [`AmqpClient`].
//! The production implementation is [`LapinClient`](crate::channel::LapinClient),
//! which owns one lapin connection and one channel. Topology members, the
//! producer and the consumer only ever see this trait, so the whole
//! registration flow can run against any implementation of it.

use crate::errors::AmqpError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use lapin::{
    options::{ExchangeDeclareOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, ExchangeKind,
};

/// Stream of deliveries from a single queue.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, AmqpError>>;

/// A message received from a queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Queue the message was consumed from
    pub queue: String,
    /// Broker-assigned tag used to ack or nack the message
    pub delivery_tag: u64,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Whether the broker delivered this message before
    pub redelivered: bool,
    /// Message properties, headers included
    pub properties: BasicProperties,
    /// Raw message body
    pub data: Vec<u8>,
}

/// Operations the component needs from an AMQP client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpClient: Send + Sync {
    /// Declares an exchange.
    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), AmqpError>;

    /// Declares a queue.
    async fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange.
    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        no_wait: bool,
        arguments: FieldTable,
    ) -> Result<(), AmqpError>;

    /// Binds the `destination` exchange to the `source` exchange.
    async fn exchange_bind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        no_wait: bool,
        arguments: FieldTable,
    ) -> Result<(), AmqpError>;

    /// Limits the number of unacknowledged deliveries on the channel.
    async fn basic_qos(&self, prefetch_count: u16) -> Result<(), AmqpError>;

    /// Puts the channel in publisher-confirm mode.
    async fn confirm_select(&self) -> Result<(), AmqpError>;

    /// Publishes a message and waits for the broker confirmation, if any.
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError>;

    /// Starts consuming a queue.
    async fn basic_consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, AmqpError>;

    /// Acknowledges a delivery.
    async fn basic_ack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    /// Rejects a delivery.
    async fn basic_nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<(), AmqpError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Arc;

    /// A mock accepting any call, for tests that only care about wiring.
    pub(crate) fn permissive_client() -> MockAmqpClient {
        let mut client = MockAmqpClient::new();
        client.expect_exchange_declare().returning(|_, _, _, _| Ok(()));
        client.expect_queue_declare().returning(|_, _, _| Ok(()));
        client.expect_queue_bind().returning(|_, _, _, _, _| Ok(()));
        client.expect_exchange_bind().returning(|_, _, _, _, _| Ok(()));
        client.expect_basic_qos().returning(|_| Ok(()));
        client.expect_confirm_select().returning(|| Ok(()));
        client.expect_basic_publish().returning(|_, _, _, _, _| Ok(()));
        client.expect_basic_ack().returning(|_| Ok(()));
        client.expect_basic_nack().returning(|_, _| Ok(()));
        client.expect_close().returning(|| Ok(()));
        client
    }

    /// A mock that fails the test on any call.
    pub(crate) fn silent_client() -> Arc<MockAmqpClient> {
        Arc::new(MockAmqpClient::new())
    }

    pub(crate) fn delivery(queue: &str, delivery_tag: u64, data: &[u8]) -> Delivery {
        Delivery {
            queue: queue.to_owned(),
            delivery_tag,
            exchange: "srcExchange".to_owned(),
            routing_key: String::new(),
            redelivered: false,
            properties: BasicProperties::default(),
            data: data.to_vec(),
        }
    }
}
