// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! The component's single [`Consumer`] starts one delivery stream per queue
//! that has a callback, each on its own tokio task, and hands every delivery
//! to the [`Dispatcher`].

use crate::{
    component::{ComponentId, Role},
    connection::Connection,
    dispatcher::{Callbacks, Dispatcher},
    errors::AmqpError,
    logger::{Logger, LoggerConfig},
};
use futures_util::{future::join_all, StreamExt};
use serde::Deserialize;
use std::{fmt, sync::Arc};
use tracing::{debug, error};

/// Consumer settings decoded from the `consumer` descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerConfig {
    /// Unacknowledged deliveries allowed on the channel
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    /// Consumer tag prefix, the component's consumer service name when absent
    #[serde(default)]
    pub tag: Option<String>,
    /// Put messages whose callback failed back on the queue
    #[serde(default)]
    pub requeue_on_error: bool,
    #[serde(default)]
    pub logger: LoggerConfig,
}

fn default_prefetch_count() -> u16 {
    1
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            prefetch_count: default_prefetch_count(),
            tag: None,
            requeue_on_error: false,
            logger: LoggerConfig::default(),
        }
    }
}

/// Consumes the queues that have a callback.
pub struct Consumer {
    config: ConsumerConfig,
    connection: Arc<Connection>,
    dispatcher: Dispatcher,
    callbacks: Arc<Callbacks>,
    owner: ComponentId,
}

impl Consumer {
    /// Creates the consumer.
    ///
    /// # Parameters
    /// * `config` - Decoded `consumer` descriptor
    /// * `connection` - The component's shared connection
    /// * `callbacks` - Handler per queue name
    /// * `logger` - Sink for delivery activity
    /// * `owner` - Id of the owning component
    pub fn new(
        config: ConsumerConfig,
        connection: Arc<Connection>,
        callbacks: Callbacks,
        logger: Arc<dyn Logger>,
        owner: ComponentId,
    ) -> Consumer {
        let callbacks = Arc::new(callbacks);
        let dispatcher = Dispatcher::new(
            connection.client().clone(),
            callbacks.clone(),
            logger,
            config.requeue_on_error,
        );

        Consumer {
            config,
            connection,
            dispatcher,
            callbacks,
            owner,
        }
    }

    /// Settings the consumer was built from.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// The component's shared connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn owner(&self) -> &ComponentId {
        &self.owner
    }

    /// Queues with a registered callback, sorted by name.
    pub fn queues(&self) -> Vec<&str> {
        let mut queues: Vec<&str> = self.callbacks.keys().map(String::as_str).collect();
        queues.sort_unstable();
        queues
    }

    /// Consumer tag used for `queue`.
    ///
    /// The configured `tag`, or the consumer service name, suffixed with the
    /// queue name.
    pub fn tag_for(&self, queue: &str) -> String {
        let prefix = self
            .config
            .tag
            .clone()
            .unwrap_or_else(|| self.owner.service_name(Role::Consumer));
        format!("{prefix}.{queue}")
    }

    /// Consumes every queue with a callback until all streams end.
    ///
    /// The channel QoS is set first, then every stream is opened. Tasks are
    /// only spawned once all streams are open, so a failing queue leaves
    /// nothing running behind the returned error.
    ///
    /// # Returns
    /// `QoSDeclarationError` or `ConsumerError` when the consumption could not start
    pub async fn consume(&self) -> Result<(), AmqpError> {
        self.apply_qos().await?;

        let mut streams = vec![];
        for queue in self.queues() {
            let stream = self
                .connection
                .client()
                .basic_consume(queue, &self.tag_for(queue))
                .await?;
            streams.push(stream);
        }

        let mut spawns = vec![];
        for mut stream in streams {
            let dispatcher = self.dispatcher.clone();

            spawns.push(tokio::spawn(async move {
                while let Some(result) = stream.next().await {
                    match result {
                        Ok(delivery) => {
                            if let Err(err) = dispatcher.dispatch(&delivery).await {
                                error!(error = err.to_string(), "error consume msg");
                            }
                        }
                        Err(err) => error!(error = err.to_string(), "errors consume msg"),
                    }
                }
            }));
        }

        for res in join_all(spawns).await {
            if let Err(err) = res {
                error!(error = err.to_string(), "tokio process error");
                return Err(AmqpError::ConsumerError(err.to_string()));
            }
        }

        Ok(())
    }

    /// Consumes a single queue on the current task until its stream ends.
    pub async fn consume_queue(&self, queue: &str) -> Result<(), AmqpError> {
        if !self.callbacks.contains_key(queue) {
            return Err(AmqpError::ConsumerError(format!("no callback for queue `{queue}`")));
        }

        self.apply_qos().await?;

        let mut stream = self
            .connection
            .client()
            .basic_consume(queue, &self.tag_for(queue))
            .await?;
        while let Some(result) = stream.next().await {
            match result {
                Ok(delivery) => {
                    if let Err(err) = self.dispatcher.dispatch(&delivery).await {
                        error!(error = err.to_string(), "error consume msg");
                    }
                }
                Err(err) => error!(error = err.to_string(), "errors consume msg"),
            }
        }

        Ok(())
    }

    async fn apply_qos(&self) -> Result<(), AmqpError> {
        debug!(prefetch_count = self.config.prefetch_count, "configuring qos");
        self.connection
            .client()
            .basic_qos(self.config.prefetch_count)
            .await
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("config", &self.config)
            .field("queues", &self.queues())
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
