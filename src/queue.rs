// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management for RabbitMQ
//!
//! This module provides the queue member of the topology. A queue is described
//! by a [`QueueDefinition`], decoded from a `queues` descriptor or assembled
//! with its builder methods, and becomes a [`Queue`] once it is bound to the
//! component's connection. Dead Letter Queues (DLQ) and retry queues are
//! declared alongside the main queue when requested.

use crate::{
    component::ComponentId,
    connection::Connection,
    descriptor::{self, ComponentKind, Descriptor},
    errors::AmqpError,
    fields,
    topology::TopologyMember,
};
use async_trait::async_trait;
use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongInt, LongString, ShortString},
};
use serde::Deserialize;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

/// Constant for the header field used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the header field used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
/// Constant for the header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the header field used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the header field used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// Definition of a RabbitMQ queue with its configuration parameters.
///
/// Decoded from a merged `queues` descriptor; the builder methods produce the
/// same definition in code.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDefinition {
    pub name: String,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub passive: bool,
    #[serde(default)]
    pub no_wait: bool,
    /// Message TTL in milliseconds
    #[serde(default)]
    pub ttl: Option<i32>,
    #[serde(default)]
    pub max_length: Option<i32>,
    #[serde(default)]
    pub max_length_bytes: Option<i32>,
    /// Declare a `<name>-dlq` queue next to this one
    #[serde(default)]
    pub dead_letter: bool,
    /// Declare a `<name>-retry` queue holding rejected messages this many
    /// milliseconds before sending them back
    #[serde(default)]
    pub retry_ttl: Option<i32>,
    /// Extra `x-` arguments passed to the declare as is
    #[serde(default)]
    pub arguments: Descriptor,
    #[serde(default)]
    pub auto_declare: bool,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// Unlike the descriptor defaults, the builder starts from all flags off.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..QueueDefinition::default()
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue, in milliseconds.
    pub fn ttl(mut self, ttl: i32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the maximum number of messages the queue can hold.
    pub fn max_length(mut self, max: i32) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Sets the maximum size in bytes the queue can hold.
    pub fn max_length_bytes(mut self, max_bytes: i32) -> Self {
        self.max_length_bytes = Some(max_bytes);
        self
    }

    /// Adds a Dead Letter Queue (DLQ) to the queue.
    ///
    /// The DLQ name will be the main queue name with "-dlq" suffix.
    pub fn with_dlq(mut self) -> Self {
        self.dead_letter = true;
        self
    }

    /// Adds a retry queue delaying redelivery by `ttl` milliseconds.
    ///
    /// The retry queue name will be the main queue name with "-retry" suffix.
    pub fn with_retry(mut self, ttl: i32) -> Self {
        self.retry_ttl = Some(ttl);
        self
    }

    /// Declares the queue as soon as it is built.
    pub fn auto_declare(mut self, auto_declare: bool) -> Self {
        self.auto_declare = auto_declare;
        self
    }

    /// Name of the dead letter queue, when one is configured.
    pub fn dlq_name(&self) -> Option<String> {
        self.dead_letter.then(|| format!("{}-dlq", self.name))
    }

    /// Name of the retry queue, when one is configured.
    pub fn retry_name(&self) -> Option<String> {
        self.retry_ttl.map(|_| format!("{}-retry", self.name))
    }

    fn options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: self.passive,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
            nowait: self.no_wait,
        }
    }

    /// Arguments of the main queue declare.
    ///
    /// The retry queue takes precedence over the DLQ as dead letter target:
    /// rejected messages go through the retry queue first.
    pub(crate) fn arguments(&self) -> BTreeMap<ShortString, AMQPValue> {
        let mut queue_args = fields::to_btree(&self.arguments);

        let dead_letter_target = self.retry_name().or_else(|| self.dlq_name());
        if let Some(target) = dead_letter_target {
            queue_args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from("")),
            );
            queue_args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
                AMQPValue::LongString(LongString::from(target)),
            );
        }

        if let Some(ttl) = self.ttl {
            queue_args.insert(
                ShortString::from(AMQP_HEADERS_MESSAGE_TTL),
                AMQPValue::LongInt(LongInt::from(ttl)),
            );
        }

        if let Some(max) = self.max_length {
            queue_args.insert(
                ShortString::from(AMQP_HEADERS_MAX_LENGTH),
                AMQPValue::LongInt(LongInt::from(max)),
            );
        }

        if let Some(max_bytes) = self.max_length_bytes {
            queue_args.insert(
                ShortString::from(AMQP_HEADERS_MAX_LENGTH_BYTES),
                AMQPValue::LongInt(LongInt::from(max_bytes)),
            );
        }

        queue_args
    }
}

/// A queue bound to the component's connection.
pub struct Queue {
    definition: QueueDefinition,
    connection: Arc<Connection>,
    owner: ComponentId,
}

impl Queue {
    /// Creates a queue without touching the broker.
    ///
    /// # Parameters
    /// * `definition` - Queue name, flags and arguments
    /// * `connection` - Connection used by [`declare`](TopologyMember::declare)
    /// * `owner` - Id of the component the queue belongs to
    pub fn new(
        definition: QueueDefinition,
        connection: Arc<Connection>,
        owner: ComponentId,
    ) -> Queue {
        Queue {
            definition,
            connection,
            owner,
        }
    }

    pub fn definition(&self) -> &QueueDefinition {
        &self.definition
    }

    /// Connection the queue is declared on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Id of the owning component.
    pub fn owner(&self) -> &ComponentId {
        &self.owner
    }

    /// Declares the retry queue: messages wait `retry_ttl` ms, then are
    /// dead-lettered back to the main queue.
    async fn declare_retry(&self, retry_name: &str, retry_ttl: i32) -> Result<(), AmqpError> {
        let mut args = BTreeMap::new();

        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            AMQPValue::LongString(LongString::from("")),
        );
        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
            AMQPValue::LongString(LongString::from(self.definition.name.clone())),
        );
        args.insert(
            ShortString::from(AMQP_HEADERS_MESSAGE_TTL),
            AMQPValue::LongInt(LongInt::from(retry_ttl)),
        );

        self.connection
            .client()
            .queue_declare(retry_name, self.definition.options(), FieldTable::from(args))
            .await
    }
}

#[async_trait]
impl TopologyMember for Queue {
    const KIND: ComponentKind = ComponentKind::Queues;

    fn from_descriptor(
        descriptor: &Descriptor,
        connection: Arc<Connection>,
        owner: ComponentId,
    ) -> Result<Self, AmqpError> {
        let definition: QueueDefinition = descriptor::decode("queues", descriptor)?;
        if definition.name.is_empty() {
            return Err(AmqpError::invalid_config("queues: name must not be empty"));
        }

        Ok(Queue::new(definition, connection, owner))
    }

    fn name(&self) -> &str {
        &self.definition.name
    }

    fn auto_declare(&self) -> bool {
        self.definition.auto_declare
    }

    /// Declares the queue, its retry queue and its DLQ.
    ///
    /// Auxiliary queues go first so the main queue's dead letter target
    /// exists when the main queue is declared.
    async fn declare(&self) -> Result<(), AmqpError> {
        let def = &self.definition;
        debug!("creating queue: {}", def.name);

        if let (Some(retry_name), Some(retry_ttl)) = (def.retry_name(), def.retry_ttl) {
            self.declare_retry(&retry_name, retry_ttl).await?;
        }

        if let Some(dlq_name) = def.dlq_name() {
            self.connection
                .client()
                .queue_declare(&dlq_name, def.options(), FieldTable::default())
                .await?;
        }

        self.connection
            .client()
            .queue_declare(&def.name, def.options(), FieldTable::from(def.arguments()))
            .await?;

        debug!("queue: {} was created", def.name);
        Ok(())
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("definition", &self.definition)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{client::MockAmqpClient, connection::ConnectionConfig};
    use mockall::Sequence;
    use serde_json::json;

    fn queue(definition: QueueDefinition, client: MockAmqpClient) -> Queue {
        let connection = Connection::with_client(ConnectionConfig::default(), Arc::new(client));
        Queue::new(definition, Arc::new(connection), ComponentId::from("testAmqp"))
    }

    fn as_descriptor(value: serde_json::Value) -> Descriptor {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn decodes_descriptor() {
        let merged = descriptor::merge(
            &ComponentKind::Queues.member_defaults(),
            &as_descriptor(json!({
                "name": "orders",
                "ttl": 60000,
                "maxLength": 100,
                "deadLetter": true,
                "retryTtl": 5000,
                "arguments": { "x-queue-mode": "lazy" },
            })),
        );

        let definition: QueueDefinition = descriptor::decode("queues", &merged).unwrap();

        let mut expected = QueueDefinition::new("orders")
            .durable()
            .ttl(60000)
            .max_length(100)
            .with_dlq()
            .with_retry(5000);
        expected.arguments = as_descriptor(json!({ "x-queue-mode": "lazy" }));

        assert_eq!(definition, expected);
        assert_eq!(definition.dlq_name().as_deref(), Some("orders-dlq"));
        assert_eq!(definition.retry_name().as_deref(), Some("orders-retry"));
    }

    #[test]
    fn missing_name_is_a_config_error() {
        let merged = ComponentKind::Queues.member_defaults();
        let connection = Arc::new(Connection::with_client(
            ConnectionConfig::default(),
            Arc::new(MockAmqpClient::new()),
        ));

        let owner = ComponentId::from("a");
        let err = Queue::from_descriptor(&merged, connection.clone(), owner).unwrap_err();
        assert!(matches!(err, AmqpError::InvalidConfig(reason) if reason.contains("name")));

        let mut empty = merged.clone();
        empty.insert("name".to_owned(), json!(""));
        let err = Queue::from_descriptor(&empty, connection, ComponentId::from("a")).unwrap_err();
        assert_eq!(
            err,
            AmqpError::InvalidConfig("queues: name must not be empty".to_owned())
        );
    }

    #[test]
    fn arguments_point_dead_letters_at_retry_first() {
        let args = QueueDefinition::new("orders").with_dlq().with_retry(1000).arguments();
        assert_eq!(
            args.get(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
            Some(&AMQPValue::LongString(LongString::from("orders-retry")))
        );

        let args = QueueDefinition::new("orders").with_dlq().arguments();
        assert_eq!(
            args.get(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
            Some(&AMQPValue::LongString(LongString::from("orders-dlq")))
        );

        let args = QueueDefinition::new("orders").max_length_bytes(1024).arguments();
        assert!(args.get(AMQP_HEADERS_DEAD_LETTER_EXCHANGE).is_none());
        assert_eq!(
            args.get(AMQP_HEADERS_MAX_LENGTH_BYTES),
            Some(&AMQPValue::LongInt(1024))
        );
    }

    #[tokio::test]
    async fn declare_plain_queue() {
        let mut client = MockAmqpClient::new();
        client
            .expect_queue_declare()
            .withf(|name, options, args| {
                name == "testQueue"
                    && options.durable
                    && !options.exclusive
                    && args.inner().is_empty()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let queue = queue(QueueDefinition::new("testQueue").durable(), client);

        queue.declare().await.unwrap();
    }

    #[tokio::test]
    async fn declare_retry_and_dlq_before_main_queue() {
        let mut seq = Sequence::new();
        let mut client = MockAmqpClient::new();
        client
            .expect_queue_declare()
            .withf(|name, _, args| {
                name == "orders-retry"
                    && args.inner().get(AMQP_HEADERS_MESSAGE_TTL) == Some(&AMQPValue::LongInt(500))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        client
            .expect_queue_declare()
            .withf(|name, _, _| name == "orders-dlq")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        client
            .expect_queue_declare()
            .withf(|name, _, _| name == "orders")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let queue = queue(QueueDefinition::new("orders").with_dlq().with_retry(500), client);

        queue.declare().await.unwrap();
    }

    #[tokio::test]
    async fn declare_failure_propagates() {
        let mut client = MockAmqpClient::new();
        client
            .expect_queue_declare()
            .returning(|name, _, _| Err(AmqpError::DeclareQueueError(name.to_owned())));

        let queue = queue(QueueDefinition::new("testQueue"), client);

        assert_eq!(
            queue.declare().await,
            Err(AmqpError::DeclareQueueError("testQueue".to_owned()))
        );
    }
}
