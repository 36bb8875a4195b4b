// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management for RabbitMQ
//!
//! This module provides the exchange member of the topology. Exchanges are the
//! routing mechanism in RabbitMQ that determine how messages are distributed
//! to queues. The exchange type is a closed set, [`ExchangeKind`], selected by
//! the `type` key of an `exchanges` descriptor.

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
    options::ExchangeDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
};
use serde::Deserialize;
use std::{fmt, sync::Arc};
use tracing::debug;

/// Constant for the header field used to specify the delayed exchange type
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior:
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
/// - XMessageDelayed: Extension for delayed message delivery (plugin required)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
    #[serde(rename = "x-delayed-message")]
    XMessageDelayed,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom("x-delayed-message".to_owned())
            }
        }
    }
}

/// Definition of a RabbitMQ exchange with its configuration parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDefinition {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: ExchangeKind,
    /// Routing behaviour of an `x-delayed-message` exchange
    #[serde(default)]
    pub delayed_type: Option<ExchangeKind>,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default)]
    pub passive: bool,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub no_wait: bool,
    #[serde(default)]
    pub arguments: Descriptor,
    #[serde(default)]
    pub auto_declare: bool,
}

impl ExchangeDefinition {
    /// Creates a new direct exchange definition with the given name.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            ..ExchangeDefinition::default()
        }
    }

    /// Sets the exchange type.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the exchange type to Fanout.
    pub fn fanout(mut self) -> Self {
        self.kind = ExchangeKind::Fanout;
        self
    }

    /// Sets the exchange type to Topic.
    pub fn topic(mut self) -> Self {
        self.kind = ExchangeKind::Topic;
        self
    }

    /// Creates a delayed exchange routing like `delayed_type`.
    ///
    /// This requires the x-delayed-message plugin to be installed on the RabbitMQ server.
    pub fn delayed(mut self, delayed_type: ExchangeKind) -> Self {
        self.kind = ExchangeKind::XMessageDelayed;
        self.delayed_type = Some(delayed_type);
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Makes the exchange internal, preventing direct publishing.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Declares the exchange as soon as it is built.
    pub fn auto_declare(mut self, auto_declare: bool) -> Self {
        self.auto_declare = auto_declare;
        self
    }

    fn options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            passive: self.passive,
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            nowait: self.no_wait,
        }
    }

    /// Arguments of the exchange declare.
    pub(crate) fn arguments(&self) -> FieldTable {
        let mut params = fields::to_btree(&self.arguments);

        if self.kind == ExchangeKind::XMessageDelayed {
            let delayed = match self.delayed_type.unwrap_or_default() {
                ExchangeKind::Fanout => "fanout",
                ExchangeKind::Topic => "topic",
                ExchangeKind::Headers => "headers",
                _ => "direct",
            };
            params.insert(
                ShortString::from(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE),
                AMQPValue::LongString(LongString::from(delayed)),
            );
        }

        FieldTable::from(params)
    }
}

/// An exchange bound to the component's connection.
pub struct Exchange {
    definition: ExchangeDefinition,
    connection: Arc<Connection>,
    owner: ComponentId,
}

impl Exchange {
    /// Creates an exchange without touching the broker.
    pub fn new(
        definition: ExchangeDefinition,
        connection: Arc<Connection>,
        owner: ComponentId,
    ) -> Exchange {
        Exchange {
            definition,
            connection,
            owner,
        }
    }

    /// Name, type and flags of the exchange.
    pub fn definition(&self) -> &ExchangeDefinition {
        &self.definition
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn owner(&self) -> &ComponentId {
        &self.owner
    }
}

#[async_trait]
impl TopologyMember for Exchange {
    const KIND: ComponentKind = ComponentKind::Exchanges;

    fn from_descriptor(
        descriptor: &Descriptor,
        connection: Arc<Connection>,
        owner: ComponentId,
    ) -> Result<Self, AmqpError> {
        let definition: ExchangeDefinition = descriptor::decode("exchanges", descriptor)?;
        if definition.name.is_empty() {
            return Err(AmqpError::invalid_config("exchanges: name must not be empty"));
        }
        if definition.delayed_type == Some(ExchangeKind::XMessageDelayed) {
            return Err(AmqpError::invalid_config(format!(
                "exchanges: `{}` cannot delay through another delayed exchange",
                definition.name
            )));
        }

        Ok(Exchange::new(definition, connection, owner))
    }

    fn name(&self) -> &str {
        &self.definition.name
    }

    fn auto_declare(&self) -> bool {
        self.definition.auto_declare
    }

    async fn declare(&self) -> Result<(), AmqpError> {
        let def = &self.definition;
        debug!("creating exchange: {}", def.name);

        self.connection
            .client()
            .exchange_declare(&def.name, def.kind.into(), def.options(), def.arguments())
            .await?;

        debug!("exchange: {} was created", def.name);
        Ok(())
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("definition", &self.definition)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
