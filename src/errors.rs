// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Component
//!
//! This module provides the error type shared by every part of the component.
//! `InvalidConfig` covers everything that goes wrong while the configuration
//! tree is merged, expanded and decoded; the remaining variants mirror the
//! failures reported by the AMQP client while the topology is declared and
//! while messages flow.

use thiserror::Error;

/// Represents errors that can occur while building or running the AMQP component.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// The configuration tree or one of its descriptors is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error binding an exchange to another exchange
    #[error("failure to binding exchange `{0}` to exchange `{1}`")]
    BindingExchangeToExchangeError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error enabling publisher confirms on the channel
    #[error("failure to enable publisher confirms")]
    ConfirmSelectError,

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error consuming a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),
}

impl AmqpError {
    /// Builds an [`AmqpError::InvalidConfig`] from anything printable.
    pub(crate) fn invalid_config(reason: impl std::fmt::Display) -> Self {
        AmqpError::InvalidConfig(reason.to_string())
    }
}
