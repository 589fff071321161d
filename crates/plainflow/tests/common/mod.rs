//! Shared harness for facade tests.

#![allow(dead_code)]

use delivery_client::mock::{MockTransport, RecordedRequest};
use plainflow::{KeyValueStorage, Plainflow, PlainflowConfig, RuntimeEnvironment};
use plainflow_storage::CookieStorage;
use std::sync::Arc;
use std::time::Duration;

pub const API_KEY: &str = "p1ai2f10w";

pub struct Harness {
    pub storage: Arc<dyn KeyValueStorage>,
    pub transport: Arc<MockTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(CookieStorage::new()),
            transport: Arc::new(MockTransport::new()),
        }
    }

    pub fn build(&self, config: PlainflowConfig, environment: RuntimeEnvironment) -> Plainflow {
        Plainflow::new(
            config,
            self.storage.clone(),
            self.transport.clone(),
            environment,
        )
        .expect("valid test config")
    }

    pub fn posts(&self) -> Vec<RecordedRequest> {
        self.transport
            .requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .collect()
    }

    pub fn gets(&self) -> Vec<RecordedRequest> {
        self.transport
            .requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .collect()
    }
}

/// Immediate-send configuration.
pub fn direct_config() -> PlainflowConfig {
    PlainflowConfig {
        retry_queue: false,
        ..PlainflowConfig::with_api_key(API_KEY)
    }
}

/// Queued configuration with millisecond backoff.
pub fn queued_config() -> PlainflowConfig {
    let mut config = PlainflowConfig::with_api_key(API_KEY);
    config.retry_queue = true;
    config.retry.min_retry_delay_ms = 10;
    config.retry.max_retry_delay_ms = 40;
    config
}

pub fn localhost() -> RuntimeEnvironment {
    RuntimeEnvironment::parse("http://localhost/").expect("valid url")
}

pub fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
