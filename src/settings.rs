// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Component Settings
//!
//! [`AmqpSettings`] is the configuration tree after construction: every kind
//! merged over its defaults, every collection expanded into options and
//! members. It is pure data; nothing touches the broker until
//! [`AmqpComponent::init`](crate::component::AmqpComponent::init).
//!
//! What cannot be written in a configuration file (consumer callbacks, custom
//! loggers, pre-built topology members) is added with the `with_*` builders.

use crate::{
    connection::ConnectionConfig,
    descriptor::{self, ComponentKind, Descriptor, AUTO_DECLARE_KEY},
    dispatcher::{Callbacks, ConsumerHandler},
    errors::AmqpError,
    exchange::Exchange,
    logger::Logger,
    queue::Queue,
    routing::Routing,
    topology::{CollectionConfig, Member},
};
use serde_json::Value;
use std::{fmt, fs, path::Path, sync::Arc};
use tracing::debug;

/// Key of the component id
pub const ID_KEY: &str = "id";

/// Key of the message template descriptor
pub const MESSAGE_DEFINITION_KEY: &str = "messageDefinition";

/// Consumer key for per-queue callbacks, only accepted through code
const CALLBACKS_KEY: &str = "callbacks";

/// Logger key naming an implementation class, only accepted through code
const LOGGER_CLASS_KEY: &str = "class";

/// Settings of one AMQP component.
pub struct AmqpSettings {
    id: Option<String>,
    auto_declare: bool,
    connection: Descriptor,
    connection_config: Option<ConnectionConfig>,
    producer: Descriptor,
    consumer: Descriptor,
    message: Descriptor,
    queues: CollectionConfig<Queue>,
    exchanges: CollectionConfig<Exchange>,
    routing: CollectionConfig<Routing>,
    extra: Descriptor,
    callbacks: Callbacks,
    producer_logger: Option<Arc<dyn Logger>>,
    consumer_logger: Option<Arc<dyn Logger>>,
}

impl AmqpSettings {
    /// Builds the settings from a configuration tree.
    ///
    /// The tree must be an object. Keys other than `id`, `autoDeclare`,
    /// `messageDefinition` and the six component kinds are kept in
    /// [`extra`](Self::extra).
    pub fn from_value(tree: Value) -> Result<AmqpSettings, AmqpError> {
        let Value::Object(mut root) = tree else {
            return Err(AmqpError::invalid_config("configuration root must be an object"));
        };

        let id = match root.remove(ID_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            Some(other) => {
                return Err(AmqpError::invalid_config(format!(
                    "id: expected a non-empty string, found `{other}`"
                )))
            }
        };

        let auto_declare = match root.remove(AUTO_DECLARE_KEY) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                return Err(AmqpError::invalid_config(format!(
                    "{AUTO_DECLARE_KEY}: expected a boolean, found `{other}`"
                )))
            }
        };

        let mut take = |kind: ComponentKind| root.remove(kind.as_str()).unwrap_or(Value::Null);
        let connection = single(ComponentKind::Connection, take(ComponentKind::Connection))?;
        let producer = single(ComponentKind::Producer, take(ComponentKind::Producer))?;
        let consumer = single(ComponentKind::Consumer, take(ComponentKind::Consumer))?;
        reject_code_only(&producer, &consumer)?;
        let queues = CollectionConfig::from_value(take(ComponentKind::Queues))?;
        let exchanges = CollectionConfig::from_value(take(ComponentKind::Exchanges))?;
        let routing = CollectionConfig::from_value(take(ComponentKind::Routing))?;

        let message = descriptor::merge(
            &descriptor::message_defaults(),
            &descriptor::expect_descriptor(
                MESSAGE_DEFINITION_KEY,
                root.remove(MESSAGE_DEFINITION_KEY).unwrap_or(Value::Null),
            )?,
        );

        debug!(
            queues = queues.members().len(),
            exchanges = exchanges.members().len(),
            routing = routing.members().len(),
            auto_declare,
            "amqp settings loaded"
        );

        Ok(AmqpSettings {
            id,
            auto_declare,
            connection,
            connection_config: None,
            producer,
            consumer,
            message,
            queues,
            exchanges,
            routing,
            extra: root,
            callbacks: Callbacks::new(),
            producer_logger: None,
            consumer_logger: None,
        })
    }

    /// Parses the configuration tree from a JSON document.
    pub fn from_json_str(json: &str) -> Result<AmqpSettings, AmqpError> {
        let tree: Value = serde_json::from_str(json).map_err(AmqpError::invalid_config)?;
        Self::from_value(tree)
    }

    /// Reads the configuration tree from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<AmqpSettings, AmqpError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|err| AmqpError::invalid_config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Connects with `config` instead of the `connection` descriptor.
    ///
    /// # Parameters
    /// * `config` - Typically [`ConnectionConfig::from_env`]
    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = Some(config);
        self
    }

    /// Registers the callback run for every delivery of `queue`.
    pub fn with_callback(mut self, queue: &str, handler: Arc<dyn ConsumerHandler>) -> Self {
        self.callbacks.insert(queue.to_owned(), handler);
        self
    }

    /// Replaces the logger selected by the producer descriptor.
    pub fn with_producer_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.producer_logger = Some(logger);
        self
    }

    /// Replaces the logger selected by the consumer descriptor.
    pub fn with_consumer_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.consumer_logger = Some(logger);
        self
    }

    /// Appends an already built queue to the `queues` collection.
    pub fn with_queue(mut self, queue: Arc<Queue>) -> Self {
        self.queues.push(Member::Prebuilt(queue));
        self
    }

    /// Appends an already built exchange to the `exchanges` collection.
    pub fn with_exchange(mut self, exchange: Arc<Exchange>) -> Self {
        self.exchanges.push(Member::Prebuilt(exchange));
        self
    }

    /// Appends an already built binding to the `routing` collection.
    pub fn with_routing(mut self, routing: Arc<Routing>) -> Self {
        self.routing.push(Member::Prebuilt(routing));
        self
    }

    /// Configured component id, `None` when one is generated at init.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Whether members built from descriptors are declared at init.
    pub fn auto_declare(&self) -> bool {
        self.auto_declare
    }

    /// Merged `connection` descriptor.
    pub fn connection(&self) -> &Descriptor {
        &self.connection
    }

    /// Merged `producer` descriptor.
    pub fn producer(&self) -> &Descriptor {
        &self.producer
    }

    /// Merged `consumer` descriptor.
    pub fn consumer(&self) -> &Descriptor {
        &self.consumer
    }

    /// Merged `messageDefinition` descriptor.
    pub fn message(&self) -> &Descriptor {
        &self.message
    }

    /// Expanded `queues` collection.
    ///
    /// # Returns
    /// Collection options and members, descriptors and pre-built alike
    pub fn queues(&self) -> &CollectionConfig<Queue> {
        &self.queues
    }

    pub fn exchanges(&self) -> &CollectionConfig<Exchange> {
        &self.exchanges
    }

    pub fn routing(&self) -> &CollectionConfig<Routing> {
        &self.routing
    }

    /// Top-level keys the component does not know about.
    pub fn extra(&self) -> &Descriptor {
        &self.extra
    }

    pub(crate) fn into_parts(self) -> SettingsParts {
        SettingsParts {
            id: self.id,
            auto_declare: self.auto_declare,
            connection: self.connection,
            connection_config: self.connection_config,
            producer: self.producer,
            consumer: self.consumer,
            message: self.message,
            queues: self.queues,
            exchanges: self.exchanges,
            routing: self.routing,
            extra: self.extra,
            callbacks: self.callbacks,
            producer_logger: self.producer_logger,
            consumer_logger: self.consumer_logger,
        }
    }
}

/// Owned pieces of [`AmqpSettings`], consumed by the component initialization.
pub(crate) struct SettingsParts {
    pub(crate) id: Option<String>,
    pub(crate) auto_declare: bool,
    pub(crate) connection: Descriptor,
    pub(crate) connection_config: Option<ConnectionConfig>,
    pub(crate) producer: Descriptor,
    pub(crate) consumer: Descriptor,
    pub(crate) message: Descriptor,
    pub(crate) queues: CollectionConfig<Queue>,
    pub(crate) exchanges: CollectionConfig<Exchange>,
    pub(crate) routing: CollectionConfig<Routing>,
    pub(crate) extra: Descriptor,
    pub(crate) callbacks: Callbacks,
    pub(crate) producer_logger: Option<Arc<dyn Logger>>,
    pub(crate) consumer_logger: Option<Arc<dyn Logger>>,
}

fn single(kind: ComponentKind, value: Value) -> Result<Descriptor, AmqpError> {
    let overrides = descriptor::expect_descriptor(kind.as_str(), value)?;
    Ok(descriptor::merge(&kind.defaults(), &overrides))
}

fn reject_code_only(producer: &Descriptor, consumer: &Descriptor) -> Result<(), AmqpError> {
    if consumer.contains_key(CALLBACKS_KEY) {
        return Err(AmqpError::invalid_config(
            "consumer.callbacks: register callbacks with AmqpSettings::with_callback",
        ));
    }

    for (kind, descriptor, builder) in [
        (ComponentKind::Producer, producer, "with_producer_logger"),
        (ComponentKind::Consumer, consumer, "with_consumer_logger"),
    ] {
        let has_class = descriptor
            .get("logger")
            .and_then(Value::as_object)
            .is_some_and(|logger| logger.contains_key(LOGGER_CLASS_KEY));
        if has_class {
            return Err(AmqpError::invalid_config(format!(
                "{kind}.logger.class: set the logger with AmqpSettings::{builder}"
            )));
        }
    }

    Ok(())
}

impl fmt::Debug for AmqpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut callbacks: Vec<&String> = self.callbacks.keys().collect();
        callbacks.sort_unstable();

        f.debug_struct("AmqpSettings")
            .field("id", &self.id)
            .field("auto_declare", &self.auto_declare)
            .field("connection", &self.connection)
            .field("connection_config", &self.connection_config)
            .field("producer", &self.producer)
            .field("consumer", &self.consumer)
            .field("message", &self.message)
            .field("queues", &self.queues)
            .field("exchanges", &self.exchanges)
            .field("routing", &self.routing)
            .field("extra", &self.extra)
            .field("callbacks", &callbacks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::SilentLogger;
    use serde_json::json;

    #[test]
    fn empty_tree_yields_defaults() {
        let settings = AmqpSettings::from_value(json!({})).unwrap();

        assert_eq!(settings.id(), None);
        assert!(!settings.auto_declare());
        assert_eq!(settings.connection(), &ComponentKind::Connection.defaults());
        assert_eq!(settings.producer(), &ComponentKind::Producer.defaults());
        assert_eq!(settings.consumer(), &ComponentKind::Consumer.defaults());
        assert_eq!(settings.message(), &descriptor::message_defaults());
        assert!(settings.queues().members().is_empty());
        assert!(settings.exchanges().members().is_empty());
        assert!(settings.routing().members().is_empty());
        assert!(settings.extra().is_empty());
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let settings = AmqpSettings::from_value(json!({
            "connection": { "dsn": "amqp://broker:5672/app" },
            "producer": { "confirm": true },
            "consumer": { "prefetchCount": 20 },
        }))
        .unwrap();

        assert_eq!(settings.connection()["dsn"], json!("amqp://broker:5672/app"));
        assert_eq!(settings.connection()["name"], Value::Null);
        assert_eq!(settings.producer()["confirm"], json!(true));
        assert_eq!(settings.producer()["mandatory"], json!(false));
        assert_eq!(settings.consumer()["prefetchCount"], json!(20));
        assert_eq!(settings.consumer()["logger"], json!({ "type": "tracing" }));
    }

    #[test]
    fn collections_split_members_from_options() {
        let settings = AmqpSettings::from_value(json!({
            "queues": [{ "name": "testQueue" }],
            "exchanges": {
                "0": { "name": "srcExchange" },
                "1": { "name": "tgtExchange" },
                "prefix": "app.",
            },
        }))
        .unwrap();

        assert_eq!(settings.queues().members().len(), 1);
        assert_eq!(settings.exchanges().members().len(), 2);
        assert_eq!(settings.exchanges().options().len(), 1);
    }

    #[test]
    fn unknown_keys_are_kept_aside() {
        let settings = AmqpSettings::from_value(json!({
            "id": "testAmqp",
            "autoDeclare": true,
            "region": "eu-west",
        }))
        .unwrap();

        assert_eq!(settings.id(), Some("testAmqp"));
        assert!(settings.auto_declare());
        assert_eq!(settings.extra().len(), 1);
        assert_eq!(settings.extra()["region"], json!("eu-west"));
    }

    #[test]
    fn rejects_malformed_trees() {
        let cases = [
            json!([]),
            json!({ "id": 42 }),
            json!({ "id": "" }),
            json!({ "autoDeclare": "yes" }),
            json!({ "connection": "amqp://localhost" }),
            json!({ "messageDefinition": [1, 2] }),
            json!({ "queues": "testQueue" }),
            json!({ "routing": [42] }),
        ];

        for tree in cases {
            let result = AmqpSettings::from_value(tree.clone());
            assert!(
                matches!(result, Err(AmqpError::InvalidConfig(_))),
                "accepted {tree}"
            );
        }
    }

    #[test]
    fn code_only_keys_point_to_builders() {
        let callbacks = AmqpSettings::from_value(json!({
            "consumer": { "callbacks": { "testQueue": "app\\Handler" } },
        }))
        .unwrap_err();
        let logger = AmqpSettings::from_value(json!({
            "producer": { "logger": { "class": "app\\Logger" } },
        }))
        .unwrap_err();

        assert_eq!(
            callbacks,
            AmqpError::InvalidConfig(
                "consumer.callbacks: register callbacks with AmqpSettings::with_callback"
                    .to_owned()
            )
        );
        assert_eq!(
            logger,
            AmqpError::InvalidConfig(
                "producer.logger.class: set the logger with AmqpSettings::with_producer_logger"
                    .to_owned()
            )
        );
    }

    #[test]
    fn parses_json_documents() {
        let json = r#"{ "id": "fromJson", "queues": [{ "name": "q" }] }"#;

        let settings = AmqpSettings::from_json_str(json).unwrap();
        assert_eq!(settings.id(), Some("fromJson"));
        assert_eq!(settings.queues().members().len(), 1);

        let err = AmqpSettings::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, AmqpError::InvalidConfig(_)));
    }

    #[test]
    fn reads_json_files() {
        let name = format!("amqp-settings-{}.json", uuid::Uuid::new_v4());
        let path = std::env::temp_dir().join(name);
        let json = r#"{ "exchanges": [{ "name": "srcExchange", "type": "topic" }] }"#;
        fs::write(&path, json).unwrap();

        let settings = AmqpSettings::from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(settings.exchanges().members().len(), 1);
        assert!(AmqpSettings::from_file(&path).is_err());
    }

    #[test]
    fn builders_record_programmatic_parts() {
        let settings = AmqpSettings::from_value(json!({}))
            .unwrap()
            .with_producer_logger(Arc::new(SilentLogger))
            .with_consumer_logger(Arc::new(SilentLogger));

        let parts = settings.into_parts();

        assert!(parts.connection_config.is_none());
        assert!(parts.producer_logger.is_some());
        assert!(parts.consumer_logger.is_some());
        assert!(parts.callbacks.is_empty());
    }
}
