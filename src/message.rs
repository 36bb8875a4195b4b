// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Outgoing Messages
//!
//! Messages are created by
//! [`AmqpComponent::create_message`](crate::component::AmqpComponent::create_message)
//! from the `messageDefinition` template: the template supplies the AMQP
//! properties, the caller supplies the body.

use crate::{component::ComponentId, descriptor::Descriptor, errors::AmqpError, fields};
use lapin::{
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Message template decoded from the `messageDefinition` descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub content_encoding: Option<String>,
    /// 1 for transient, 2 for persistent
    #[serde(default = "default_delivery_mode")]
    pub delivery_mode: u8,
    #[serde(default)]
    pub priority: Option<u8>,
    /// Per-message TTL in milliseconds, as the broker expects it: a string
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default, rename = "type")]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub headers: Descriptor,
}

fn default_content_type() -> String {
    JSON_CONTENT_TYPE.to_owned()
}

fn default_delivery_mode() -> u8 {
    2
}

impl Default for MessageTemplate {
    fn default() -> Self {
        MessageTemplate {
            content_type: default_content_type(),
            content_encoding: None,
            delivery_mode: default_delivery_mode(),
            priority: None,
            expiration: None,
            msg_type: None,
            app_id: None,
            headers: Descriptor::new(),
        }
    }
}

impl MessageTemplate {
    /// Builds a message owned by `owner`.
    pub fn instantiate(&self, body: Vec<u8>, owner: ComponentId) -> Message {
        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(self.content_type.clone()))
            .with_delivery_mode(self.delivery_mode)
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()));

        if let Some(encoding) = &self.content_encoding {
            properties = properties.with_content_encoding(ShortString::from(encoding.clone()));
        }
        if let Some(priority) = self.priority {
            properties = properties.with_priority(priority);
        }
        if let Some(expiration) = &self.expiration {
            properties = properties.with_expiration(ShortString::from(expiration.clone()));
        }
        if let Some(msg_type) = &self.msg_type {
            properties = properties.with_type(ShortString::from(msg_type.clone()));
        }
        if let Some(app_id) = &self.app_id {
            properties = properties.with_app_id(ShortString::from(app_id.clone()));
        }
        if !self.headers.is_empty() {
            properties = properties.with_headers(fields::to_field_table(&self.headers));
        }

        Message {
            body,
            properties,
            owner,
        }
    }
}

/// A message ready to be published.
#[derive(Debug, Clone)]
pub struct Message {
    body: Vec<u8>,
    properties: BasicProperties,
    owner: ComponentId,
}

impl Message {
    /// Raw message body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// AMQP properties the message is published with.
    pub fn properties(&self) -> &BasicProperties {
        &self.properties
    }

    /// Id of the component that created the message.
    pub fn owner(&self) -> &ComponentId {
        &self.owner
    }

    /// Adds or replaces a header.
    pub fn with_header(mut self, key: &str, value: AMQPValue) -> Self {
        let mut headers = self.properties.headers().clone().unwrap_or_default();
        headers.insert(ShortString::from(key), value);
        self.properties = self.properties.with_headers(headers);
        self
    }

    /// Replaces the body with the JSON encoding of `value`.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, AmqpError> {
        self.body = serde_json::to_vec(value)
            .map_err(|err| AmqpError::invalid_config(format!("message body: {err}")))?;
        Ok(self)
    }

    /// Headers currently set on the message.
    pub fn headers(&self) -> FieldTable {
        self.properties.headers().clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;
    use serde_json::json;

    fn owner() -> ComponentId {
        ComponentId::from("testAmqp")
    }

    #[test]
    fn default_template_sets_json_persistent() {
        let message = MessageTemplate::default().instantiate(b"payload".to_vec(), owner());
        let props = message.properties();

        assert_eq!(message.body(), b"payload");
        assert_eq!(message.owner(), &owner());
        assert_eq!(props.content_type().as_ref().map(|v| v.as_str()), Some(JSON_CONTENT_TYPE));
        assert_eq!(*props.delivery_mode(), Some(2));
        assert!(props.message_id().is_some());
        assert!(props.headers().is_none());
    }

    #[test]
    fn template_fields_reach_properties() {
        let template: MessageTemplate = serde_json::from_value(json!({
            "contentType": "text/plain",
            "deliveryMode": 1,
            "priority": 5,
            "expiration": "60000",
            "type": "order.created",
            "appId": "billing",
            "headers": { "tenant": "acme" },
        }))
        .unwrap();

        let message = template.instantiate(b"hello".to_vec(), owner());
        let props = message.properties();

        assert_eq!(props.content_type().as_ref().map(|v| v.as_str()), Some("text/plain"));
        assert_eq!(*props.delivery_mode(), Some(1));
        assert_eq!(*props.priority(), Some(5));
        assert_eq!(props.expiration().as_ref().map(|v| v.as_str()), Some("60000"));
        assert_eq!(props.kind().as_ref().map(|v| v.as_str()), Some("order.created"));
        assert_eq!(props.app_id().as_ref().map(|v| v.as_str()), Some("billing"));
        assert_eq!(
            message.headers().inner().get("tenant"),
            Some(&AMQPValue::LongString(LongString::from("acme")))
        );
    }

    #[test]
    fn every_message_gets_its_own_id() {
        let template = MessageTemplate::default();
        let first = template.instantiate(vec![], owner());
        let second = template.instantiate(vec![], owner());

        assert_ne!(first.properties().message_id(), second.properties().message_id());
    }

    #[test]
    fn headers_and_json_body() {
        let message = MessageTemplate::default()
            .instantiate(vec![], owner())
            .with_header("x-attempt", AMQPValue::LongLongInt(1))
            .with_json(&json!({ "id": 7 }))
            .unwrap();

        assert_eq!(message.body(), br#"{"id":7}"#);
        assert_eq!(
            message.headers().inner().get("x-attempt"),
            Some(&AMQPValue::LongLongInt(1))
        );
    }
}
