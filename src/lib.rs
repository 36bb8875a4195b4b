// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod fields;
mod otel;

pub mod channel;
pub mod client;
pub mod component;
pub mod connection;
pub mod consumer;
pub mod descriptor;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod logger;
pub mod message;
pub mod publisher;
pub mod queue;
pub mod routing;
pub mod settings;
pub mod topology;

pub use component::{AmqpComponent, ComponentId, Role};
pub use errors::AmqpError;
pub use settings::AmqpSettings;
