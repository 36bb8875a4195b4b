// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Routing Bindings
//!
//! A routing entry binds a source exchange to either a queue or another
//! exchange. The descriptor names the target with exactly one of
//! `targetQueue` or `targetExchange`; the decoded [`RoutingTarget`] keeps that
//! choice as a closed variant.

use crate::{
    component::ComponentId,
    connection::Connection,
    descriptor::{self, ComponentKind, Descriptor},
    errors::AmqpError,
    fields,
    topology::TopologyMember,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::{fmt, sync::Arc};
use tracing::debug;

/// What a binding delivers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingTarget {
    Queue(String),
    Exchange(String),
}

impl RoutingTarget {
    /// Name of the queue or exchange bound to.
    pub fn name(&self) -> &str {
        match self {
            RoutingTarget::Queue(name) | RoutingTarget::Exchange(name) => name,
        }
    }
}

/// Raw shape of a `routing` descriptor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutingDescriptor {
    source_exchange: String,
    #[serde(default)]
    target_queue: Option<String>,
    #[serde(default)]
    target_exchange: Option<String>,
    #[serde(default)]
    routing_key: String,
    #[serde(default)]
    no_wait: bool,
    #[serde(default)]
    arguments: Descriptor,
    #[serde(default)]
    auto_declare: bool,
}

/// Definition of a binding between a source exchange and its target.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDefinition {
    pub source_exchange: String,
    pub target: RoutingTarget,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: Descriptor,
    pub auto_declare: bool,
}

impl RoutingDefinition {
    /// Binds `queue` to `source_exchange`.
    pub fn to_queue(source_exchange: &str, queue: &str) -> RoutingDefinition {
        Self::with_target(source_exchange, RoutingTarget::Queue(queue.to_owned()))
    }

    /// Binds the `exchange` exchange to `source_exchange`.
    pub fn to_exchange(source_exchange: &str, exchange: &str) -> RoutingDefinition {
        Self::with_target(source_exchange, RoutingTarget::Exchange(exchange.to_owned()))
    }

    fn with_target(source_exchange: &str, target: RoutingTarget) -> RoutingDefinition {
        RoutingDefinition {
            source_exchange: source_exchange.to_owned(),
            target,
            routing_key: String::new(),
            no_wait: false,
            arguments: Descriptor::new(),
            auto_declare: false,
        }
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Declares the binding as soon as it is built.
    pub fn auto_declare(mut self, auto_declare: bool) -> Self {
        self.auto_declare = auto_declare;
        self
    }

    fn from_raw(raw: RoutingDescriptor) -> Result<RoutingDefinition, AmqpError> {
        if raw.source_exchange.is_empty() {
            return Err(AmqpError::invalid_config(
                "routing: sourceExchange must not be empty",
            ));
        }

        let target = match (raw.target_queue, raw.target_exchange) {
            (Some(queue), None) => RoutingTarget::Queue(queue),
            (None, Some(exchange)) => RoutingTarget::Exchange(exchange),
            (Some(_), Some(_)) => {
                return Err(AmqpError::invalid_config(format!(
                    "routing: binding from `{}` sets both targetQueue and targetExchange",
                    raw.source_exchange
                )))
            }
            (None, None) => {
                return Err(AmqpError::invalid_config(format!(
                    "routing: binding from `{}` needs targetQueue or targetExchange",
                    raw.source_exchange
                )))
            }
        };

        Ok(RoutingDefinition {
            source_exchange: raw.source_exchange,
            target,
            routing_key: raw.routing_key,
            no_wait: raw.no_wait,
            arguments: raw.arguments,
            auto_declare: raw.auto_declare,
        })
    }
}

/// A binding bound to the component's connection.
pub struct Routing {
    definition: RoutingDefinition,
    label: String,
    connection: Arc<Connection>,
    owner: ComponentId,
}

impl Routing {
    /// Creates a binding without touching the broker.
    ///
    /// # Parameters
    /// * `definition` - Source exchange, target and routing key
    /// * `connection` - Connection used by [`declare`](TopologyMember::declare)
    /// * `owner` - Id of the component the binding belongs to
    ///
    /// # Returns
    /// A binding named `source->target` within its collection
    pub fn new(
        definition: RoutingDefinition,
        connection: Arc<Connection>,
        owner: ComponentId,
    ) -> Routing {
        let label = format!("{}->{}", definition.source_exchange, definition.target.name());
        Routing {
            definition,
            label,
            connection,
            owner,
        }
    }

    /// Source, target and routing key of the binding.
    pub fn definition(&self) -> &RoutingDefinition {
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
impl TopologyMember for Routing {
    const KIND: ComponentKind = ComponentKind::Routing;

    fn from_descriptor(
        descriptor: &Descriptor,
        connection: Arc<Connection>,
        owner: ComponentId,
    ) -> Result<Self, AmqpError> {
        let raw: RoutingDescriptor = descriptor::decode("routing", descriptor)?;
        let definition = RoutingDefinition::from_raw(raw)?;

        Ok(Routing::new(definition, connection, owner))
    }

    /// `source->target`
    fn name(&self) -> &str {
        &self.label
    }

    fn auto_declare(&self) -> bool {
        self.definition.auto_declare
    }

    async fn declare(&self) -> Result<(), AmqpError> {
        let def = &self.definition;
        let client = self.connection.client();
        let arguments = fields::to_field_table(&def.arguments);

        match &def.target {
            RoutingTarget::Queue(queue) => {
                debug!(
                    "binding queue: {} to the exchange: {} with the key: {}",
                    queue, def.source_exchange, def.routing_key
                );
                client
                    .queue_bind(
                        queue,
                        &def.source_exchange,
                        &def.routing_key,
                        def.no_wait,
                        arguments,
                    )
                    .await
            }
            RoutingTarget::Exchange(exchange) => {
                debug!(
                    "binding exchange: {} to the exchange: {} with the key: {}",
                    exchange, def.source_exchange, def.routing_key
                );
                client
                    .exchange_bind(
                        exchange,
                        &def.source_exchange,
                        &def.routing_key,
                        def.no_wait,
                        arguments,
                    )
                    .await
            }
        }
    }
}

impl fmt::Debug for Routing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routing")
            .field("definition", &self.definition)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
