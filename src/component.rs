// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Component
//!
//! [`AmqpComponent`] is the initialized form of [`AmqpSettings`]: one shared
//! connection, one producer, one consumer, the message template and the three
//! topology collections. Initialization runs in dependency order:
//!
//! 1. the connection is opened
//! 2. the producer and the consumer are built on it
//! 3. queues, exchanges and routing bindings are built on it, each declared
//!    right away when auto-declare applies
//!
//! Every part is reachable through a getter and none can be replaced once the
//! component exists.
//!
//! ```compile_fail
//! # use amqp_component::component::AmqpComponent;
//! fn swap(component: &mut AmqpComponent, other: AmqpComponent) {
//!     component.connection = other.connection;
//! }
//! ```
//!
//! ```compile_fail
//! # use amqp_component::component::AmqpComponent;
//! fn swap(component: &mut AmqpComponent, other: AmqpComponent) {
//!     component.producer = other.producer;
//! }
//! ```
//!
//! ```compile_fail
//! # use amqp_component::component::AmqpComponent;
//! fn swap(component: &mut AmqpComponent, other: AmqpComponent) {
//!     component.consumer = other.consumer;
//! }
//! ```
//!
//! ```compile_fail
//! # use amqp_component::component::AmqpComponent;
//! fn swap(component: &mut AmqpComponent, other: AmqpComponent) {
//!     component.queues = other.queues;
//! }
//! ```
//!
//! ```compile_fail
//! # use amqp_component::component::AmqpComponent;
//! fn swap(component: &mut AmqpComponent, other: AmqpComponent) {
//!     component.exchanges = other.exchanges;
//! }
//! ```
//!
//! ```compile_fail
//! # use amqp_component::component::AmqpComponent;
//! fn swap(component: &mut AmqpComponent, other: AmqpComponent) {
//!     component.routing = other.routing;
//! }
//! ```

use crate::{
    client::AmqpClient,
    connection::{Connection, ConnectionConfig},
    consumer::{Consumer, ConsumerConfig},
    descriptor::{self, ComponentKind, Descriptor},
    errors::AmqpError,
    exchange::Exchange,
    message::{Message, MessageTemplate},
    publisher::{Producer, ProducerConfig},
    queue::Queue,
    routing::Routing,
    settings::{AmqpSettings, SettingsParts, MESSAGE_DEFINITION_KEY},
    topology::{Collection, Topology},
};
use std::{fmt, sync::Arc};
use tracing::debug;
use uuid::Uuid;

/// Identifier of a component, also carried by everything it builds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentId(String);

impl ComponentId {
    /// A fresh 32-character hex id.
    pub fn generate() -> ComponentId {
        ComponentId(Uuid::new_v4().simple().to_string())
    }

    /// The id as configured or generated.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ext.amqp.<id>.<role>`
    pub fn service_name(&self, role: Role) -> String {
        format!("ext.amqp.{}.{}", self.0, role)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        ComponentId(id.to_owned())
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        ComponentId(id)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parts of a component that carry a service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Connection,
    Producer,
    Consumer,
    Message,
}

impl Role {
    /// Role segment used in service names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Connection => "connection",
            Role::Producer => "producer",
            Role::Consumer => "consumer",
            Role::Message => "message",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An initialized AMQP component.
pub struct AmqpComponent {
    id: ComponentId,
    auto_declare: bool,
    connection: Arc<Connection>,
    producer: Arc<Producer>,
    consumer: Arc<Consumer>,
    message: MessageTemplate,
    queues: Collection<Queue>,
    exchanges: Collection<Exchange>,
    routing: Collection<Routing>,
    extra: Descriptor,
}

impl AmqpComponent {
    /// Connects to the broker and builds every part of the component.
    ///
    /// The lapin connection is named after the `connection` descriptor, or
    /// after the connection service name when the descriptor has no name.
    ///
    /// A config set with [`AmqpSettings::with_connection_config`] takes
    /// precedence over the `connection` descriptor.
    pub async fn init(settings: AmqpSettings) -> Result<AmqpComponent, AmqpError> {
        let mut parts = settings.into_parts();
        let id = resolve_id(parts.id.as_deref());
        let config = connection_config(&mut parts)?;

        let connection = Connection::open(config, &id.service_name(Role::Connection)).await?;

        Self::assemble(id, parts, Arc::new(connection)).await
    }

    /// Builds every part of the component on an already connected client.
    pub async fn init_with_client(
        settings: AmqpSettings,
        client: Arc<dyn AmqpClient>,
    ) -> Result<AmqpComponent, AmqpError> {
        let mut parts = settings.into_parts();
        let id = resolve_id(parts.id.as_deref());
        let config = connection_config(&mut parts)?;

        let connection = Connection::with_client(config, client);

        Self::assemble(id, parts, Arc::new(connection)).await
    }

    async fn assemble(
        id: ComponentId,
        parts: SettingsParts,
        connection: Arc<Connection>,
    ) -> Result<AmqpComponent, AmqpError> {
        let auto_declare = parts.auto_declare;
        debug!(id = id.as_str(), auto_declare, "initializing amqp component");

        let producer_config: ProducerConfig =
            descriptor::decode(ComponentKind::Producer.as_str(), &parts.producer)?;
        let producer_logger = parts
            .producer_logger
            .unwrap_or_else(|| producer_config.logger.build());
        let producer = Producer::new(
            producer_config,
            connection.clone(),
            producer_logger,
            id.clone(),
        )
        .await?;

        let consumer_config: ConsumerConfig =
            descriptor::decode(ComponentKind::Consumer.as_str(), &parts.consumer)?;
        let consumer_logger = parts
            .consumer_logger
            .unwrap_or_else(|| consumer_config.logger.build());
        let consumer = Consumer::new(
            consumer_config,
            connection.clone(),
            parts.callbacks,
            consumer_logger,
            id.clone(),
        );

        let message: MessageTemplate = descriptor::decode(MESSAGE_DEFINITION_KEY, &parts.message)?;

        let queues = parts.queues.build(auto_declare, &connection, &id).await?;
        let exchanges = parts.exchanges.build(auto_declare, &connection, &id).await?;
        let routing = parts.routing.build(auto_declare, &connection, &id).await?;

        debug!(
            id = id.as_str(),
            queues = queues.len(),
            exchanges = exchanges.len(),
            routing = routing.len(),
            "amqp component ready"
        );

        Ok(AmqpComponent {
            id,
            auto_declare,
            connection,
            producer: Arc::new(producer),
            consumer: Arc::new(consumer),
            message,
            queues,
            exchanges,
            routing,
            extra: parts.extra,
        })
    }

    /// Component id, configured or generated at init.
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn auto_declare(&self) -> bool {
        self.auto_declare
    }

    /// The connection shared by every part of the component.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The component's producer.
    ///
    /// # Returns
    /// A shared handle, clone it to publish from other tasks
    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    /// The component's consumer, holding the registered callbacks.
    pub fn consumer(&self) -> &Arc<Consumer> {
        &self.consumer
    }

    pub fn message_template(&self) -> &MessageTemplate {
        &self.message
    }

    /// Queues built from the `queues` collection, pre-built ones included.
    pub fn queues(&self) -> &Collection<Queue> {
        &self.queues
    }

    /// Exchanges built from the `exchanges` collection.
    pub fn exchanges(&self) -> &Collection<Exchange> {
        &self.exchanges
    }

    /// Bindings built from the `routing` collection.
    pub fn routing(&self) -> &Collection<Routing> {
        &self.routing
    }

    /// Unrecognised top-level configuration keys.
    pub fn extra(&self) -> &Descriptor {
        &self.extra
    }

    /// Service name of one of the component's parts.
    pub fn service_name(&self, role: Role) -> String {
        self.id.service_name(role)
    }

    /// Creates a message from the component's message template.
    pub fn create_message(&self, body: impl Into<Vec<u8>>) -> Message {
        self.message.instantiate(body.into(), self.id.clone())
    }

    /// The component's exchanges, queues and bindings.
    pub fn topology(&self) -> Topology<'_> {
        Topology::new(&self.exchanges, &self.queues, &self.routing)
    }

    /// Declares the whole topology on the broker.
    pub async fn declare_topology(&self) -> Result<(), AmqpError> {
        self.topology().install().await
    }

    /// Closes the shared connection.
    pub async fn close(&self) -> Result<(), AmqpError> {
        debug!(id = self.id.as_str(), "closing amqp component");
        self.connection.close().await
    }
}

fn connection_config(parts: &mut SettingsParts) -> Result<ConnectionConfig, AmqpError> {
    match parts.connection_config.take() {
        Some(config) => Ok(config),
        None => descriptor::decode(ComponentKind::Connection.as_str(), &parts.connection),
    }
}

fn resolve_id(id: Option<&str>) -> ComponentId {
    id.map(ComponentId::from).unwrap_or_else(ComponentId::generate)
}

impl fmt::Debug for AmqpComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpComponent")
            .field("id", &self.id)
            .field("auto_declare", &self.auto_declare)
            .field("connection", &self.connection)
            .field("producer", &self.producer)
            .field("consumer", &self.consumer)
            .field("queues", &self.queues)
            .field("exchanges", &self.exchanges)
            .field("routing", &self.routing)
            .finish_non_exhaustive()
    }
}
