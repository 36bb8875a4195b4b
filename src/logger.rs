// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Producer and Consumer Logging
//!
//! The producer and the consumer report what they do through a [`Logger`].
//! By default that is [`TracingLogger`], which turns every call into a
//! `tracing` event; [`SilentLogger`] drops everything. Any other sink can be
//! plugged in through the component settings.

use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{error, info};

/// Structured context attached to a log line.
pub type LogOptions = BTreeMap<String, String>;

/// Builds [`LogOptions`] from key/value pairs.
pub fn log_options<const N: usize>(pairs: [(&str, &str); N]) -> LogOptions {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

/// Sink for producer and consumer activity.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str, options: &LogOptions);

    fn error(&self, message: &str, options: &LogOptions);

    fn success(&self, message: &str, options: &LogOptions);
}

/// Logger emitting `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str, options: &LogOptions) {
        info!(options = ?options, "{}", message);
    }

    fn error(&self, message: &str, options: &LogOptions) {
        error!(options = ?options, "{}", message);
    }

    fn success(&self, message: &str, options: &LogOptions) {
        info!(outcome = "success", options = ?options, "{}", message);
    }
}

/// Logger discarding everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentLogger;

impl Logger for SilentLogger {
    fn info(&self, _message: &str, _options: &LogOptions) {}

    fn error(&self, _message: &str, _options: &LogOptions) {}

    fn success(&self, _message: &str, _options: &LogOptions) {}
}

/// Logger selection in a producer or consumer descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LoggerConfig {
    #[default]
    Tracing,
    Silent,
}

impl LoggerConfig {
    /// Builds the selected logger.
    pub fn build(&self) -> Arc<dyn Logger> {
        match self {
            LoggerConfig::Tracing => Arc::new(TracingLogger),
            LoggerConfig::Silent => Arc::new(SilentLogger),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Logger keeping every call for later assertions.
    #[derive(Default)]
    pub(crate) struct RecordingLogger {
        pub(crate) lines: Mutex<Vec<(&'static str, String, LogOptions)>>,
    }

    impl RecordingLogger {
        pub(crate) fn levels(&self) -> Vec<&'static str> {
            self.lines.lock().unwrap().iter().map(|(level, _, _)| *level).collect()
        }

        fn push(&self, level: &'static str, message: &str, options: &LogOptions) {
            self.lines
                .lock()
                .unwrap()
                .push((level, message.to_owned(), options.clone()));
        }
    }

    impl Logger for RecordingLogger {
        fn info(&self, message: &str, options: &LogOptions) {
            self.push("info", message, options);
        }

        fn error(&self, message: &str, options: &LogOptions) {
            self.push("error", message, options);
        }

        fn success(&self, message: &str, options: &LogOptions) {
            self.push("success", message, options);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn logger_config_from_descriptor() {
        let silent: LoggerConfig = serde_json::from_value(json!({ "type": "silent" })).unwrap();
        let tracing: LoggerConfig = serde_json::from_value(json!({ "type": "tracing" })).unwrap();

        assert_eq!(silent, LoggerConfig::Silent);
        assert_eq!(tracing, LoggerConfig::Tracing);
        assert!(serde_json::from_value::<LoggerConfig>(json!({ "type": "syslog" })).is_err());
    }

    #[test]
    fn options_from_pairs() {
        let options = log_options([("queue", "testQueue"), ("exchange", "srcExchange")]);

        assert_eq!(options.len(), 2);
        assert_eq!(options["queue"], "testQueue");
    }

    #[test]
    fn built_loggers_accept_calls() {
        let options = log_options([("queue", "testQueue")]);
        for config in [LoggerConfig::Tracing, LoggerConfig::Silent] {
            let logger = config.build();
            logger.info("received", &options);
            logger.success("processed", &options);
            logger.error("failed", &options);
        }
    }
}
