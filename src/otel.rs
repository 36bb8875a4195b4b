// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ
//!
//! Trace context travels in the AMQP headers: the producer injects the current
//! context before publishing, the consumer extracts it and opens a consumer
//! span around the callback.

use lapin::{
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties,
};
use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};
use tracing::error;

/// AMQP headers seen as an OpenTelemetry text-map carrier.
///
/// Keys are written lowercase; only long-string headers are readable.
pub(crate) struct HeaderCarrier<'h> {
    headers: &'h mut BTreeMap<ShortString, AMQPValue>,
}

impl<'h> HeaderCarrier<'h> {
    pub(crate) fn new(headers: &'h mut BTreeMap<ShortString, AMQPValue>) -> Self {
        HeaderCarrier { headers }
    }
}

impl Injector for HeaderCarrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        let key = ShortString::from(key.to_lowercase());
        self.headers.insert(key, AMQPValue::LongString(LongString::from(value)));
    }
}

impl Extractor for HeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        let Some(AMQPValue::LongString(value)) = self.headers.get(key) else {
            return None;
        };

        match std::str::from_utf8(value.as_bytes()) {
            Ok(value) => Some(value),
            Err(err) => {
                error!(error = err.to_string(), key, "trace header is not utf-8");
                None
            }
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(ShortString::as_str).collect()
    }
}

/// Returns `headers` with the trace context of `ctx` added.
pub(crate) fn inject_context(ctx: &Context, headers: &FieldTable) -> FieldTable {
    let mut btree = headers.inner().clone();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut HeaderCarrier::new(&mut btree))
    });

    FieldTable::from(btree)
}

/// Creates a consumer span for a delivery, parented on the context found in
/// its headers.
pub(crate) fn new_span(
    props: &BasicProperties,
    tracer: &BoxedTracer,
    name: &str,
) -> (Context, BoxedSpan) {
    let mut headers = props.headers().clone().unwrap_or_default().inner().clone();
    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderCarrier::new(&mut headers))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injector_lowercases_keys() {
        let mut headers = BTreeMap::new();
        HeaderCarrier::new(&mut headers).set("TraceParent", "00-abc-01".to_owned());

        assert_eq!(
            headers.get("traceparent"),
            Some(&AMQPValue::LongString(LongString::from("00-abc-01")))
        );
    }

    #[test]
    fn extractor_reads_string_headers_only() {
        let mut headers = BTreeMap::new();
        headers.insert(
            ShortString::from("traceparent"),
            AMQPValue::LongString(LongString::from("00-abc-01")),
        );
        headers.insert(ShortString::from("attempt"), AMQPValue::LongLongInt(2));

        let propagator = HeaderCarrier::new(&mut headers);

        assert_eq!(propagator.get("traceparent"), Some("00-abc-01"));
        assert_eq!(propagator.get("attempt"), None);
        assert_eq!(propagator.keys().len(), 2);
    }

    #[test]
    fn inject_keeps_existing_headers() {
        let mut table = FieldTable::default();
        table.insert(ShortString::from("tenant"), AMQPValue::LongString(LongString::from("acme")));

        let injected = inject_context(&Context::current(), &table);

        assert!(injected.inner().contains_key("tenant"));
    }
}
