// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Dispatcher
//!
//! Routes each delivery to the callback registered for its queue and settles
//! it with the broker: ack on success, nack on failure. Deliveries from a
//! queue without a callback are acked and dropped.

use crate::{
    client::{AmqpClient, Delivery},
    errors::AmqpError,
    logger::{log_options, Logger},
    otel,
};
use async_trait::async_trait;
use opentelemetry::{
    global,
    trace::{Span, Status},
    Context,
};
use std::{borrow::Cow, collections::HashMap, sync::Arc};
use tracing::debug;

/// Callback invoked for every delivery of the queue it is registered for.
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, ctx: &Context, delivery: &Delivery) -> Result<(), AmqpError>;
}

/// Callbacks keyed by queue name.
pub type Callbacks = HashMap<String, Arc<dyn ConsumerHandler>>;

/// Settles deliveries through the registered callbacks.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn AmqpClient>,
    callbacks: Arc<Callbacks>,
    logger: Arc<dyn Logger>,
    requeue_on_error: bool,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn AmqpClient>,
        callbacks: Arc<Callbacks>,
        logger: Arc<dyn Logger>,
        requeue_on_error: bool,
    ) -> Dispatcher {
        Dispatcher {
            client,
            callbacks,
            logger,
            requeue_on_error,
        }
    }

    /// Runs the callback of the delivery's queue and settles the delivery.
    ///
    /// A callback failure is not an error of the dispatch itself: the delivery
    /// is nacked and the failure logged. Errors returned here come from
    /// acking or nacking.
    pub async fn dispatch(&self, delivery: &Delivery) -> Result<(), AmqpError> {
        let (ctx, mut span) = otel::new_span(
            &delivery.properties,
            &global::tracer("amqp consumer"),
            &delivery.queue,
        );
        let tag = delivery.delivery_tag.to_string();
        let options = log_options([
            ("queue", delivery.queue.as_str()),
            ("exchange", delivery.exchange.as_str()),
            ("delivery_tag", tag.as_str()),
        ]);

        let Some(handler) = self.callbacks.get(&delivery.queue) else {
            let msg = "removing message from queue - reason: no callback for queue";
            debug!(queue = delivery.queue.as_str(), "{}", msg);
            self.logger.info(msg, &options);
            span.set_status(Status::Error {
                description: Cow::from(msg),
            });

            return self.client.basic_ack(delivery.delivery_tag).await;
        };

        self.logger.info("message received", &options);

        match handler.exec(&ctx, delivery).await {
            Ok(()) => {
                self.client.basic_ack(delivery.delivery_tag).await?;
                span.set_status(Status::Ok);
                self.logger.success("message processed", &options);
                Ok(())
            }
            Err(err) => {
                span.record_error(&err);
                span.set_status(Status::Error {
                    description: Cow::from(err.to_string()),
                });
                let mut options = options.clone();
                options.insert("error".to_owned(), err.to_string());
                self.logger.error("message processing failed", &options);

                self.client
                    .basic_nack(delivery.delivery_tag, self.requeue_on_error)
                    .await
            }
        }
    }
}
