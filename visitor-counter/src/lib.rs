pub use crate::{
    config::{Config, ErrorPolicy},
    service::{CounterService, COUNTER_RECORD_ID, COUNTER_ATTRIBUTE, coerce_count, invoke_once},
    storage::{CounterStore, BoxedCounterStore, AttributeValue},
};

pub mod config;
pub mod error;
pub mod http;
pub mod service;
pub mod storage;
