#![allow(dead_code)]

use async_trait::async_trait;
use chain_dispatch_connector::{
    callback::{callback, Callback},
    config::ConnectorConfig,
    dispatcher::CapabilityDispatcher,
    error::{DispatchError, TransportError},
    operation::OperationTable,
    transport::{InterfaceId, MethodCall, Registry, SendEvent, SendOptions, Target},
};
use futures::{stream::BoxStream, StreamExt};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio::sync::oneshot;

/// An in-memory target with scripted answers that records what it was asked.
pub struct MockTarget {
    address: String,
    supports: Result<bool, TransportError>,
    call_result: Result<Value, TransportError>,
    send_events: Vec<SendEvent>,
    introspections: AtomicUsize,
    calls: Mutex<Vec<MethodCall>>,
    sends: Mutex<Vec<(MethodCall, SendOptions)>>,
}

impl MockTarget {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            supports: Ok(true),
            call_result: Ok(Value::Null),
            send_events: Vec::new(),
            introspections: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
        }
    }

    pub fn supporting(mut self, supports: Result<bool, TransportError>) -> Self {
        self.supports = supports;
        self
    }

    pub fn returning(mut self, result: Result<Value, TransportError>) -> Self {
        self.call_result = result;
        self
    }

    pub fn emitting(mut self, events: Vec<SendEvent>) -> Self {
        self.send_events = events;
        self
    }

    pub fn introspections(&self) -> usize {
        self.introspections.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<MethodCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<(MethodCall, SendOptions)> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl Target for MockTarget {
    fn address(&self) -> &str {
        &self.address
    }

    async fn supports_interface(&self, _interface_id: InterfaceId) -> Result<bool, TransportError> {
        self.introspections.fetch_add(1, Ordering::SeqCst);
        self.supports.clone()
    }

    async fn call(&self, request: MethodCall) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(request);
        self.call_result.clone()
    }

    fn send(&self, request: MethodCall, options: SendOptions) -> BoxStream<'static, SendEvent> {
        self.sends.lock().unwrap().push((request, options));
        futures::stream::iter(self.send_events.clone()).boxed()
    }
}

/// A registry backed by a fixed map of names to targets.
#[derive(Default)]
pub struct MockRegistry {
    targets: HashMap<String, Arc<MockTarget>>,
    resolutions: AtomicUsize,
}

impl MockRegistry {
    pub fn with(mut self, name: &str, target: Arc<MockTarget>) -> Self {
        self.targets.insert(name.to_string(), target);
        self
    }

    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn resolver(&self, name: &str) -> Result<Arc<dyn Target>, TransportError> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        match self.targets.get(name) {
            Some(target) => Ok(target.clone() as Arc<dyn Target>),
            None => Err(TransportError::Rpc {
                code: -32000,
                message: format!("no resolver for {name}"),
            }),
        }
    }
}

pub fn dispatcher_for(registry: Arc<MockRegistry>) -> CapabilityDispatcher {
    dispatcher_with_config(registry, ConnectorConfig::default())
}

pub fn dispatcher_with_config(
    registry: Arc<MockRegistry>,
    config: ConnectorConfig,
) -> CapabilityDispatcher {
    chain_dispatch_logger::try_init_for_tests();
    CapabilityDispatcher::new(
        Arc::new(config),
        registry,
        Arc::new(OperationTable::ens_resolver()),
    )
}

pub type CallbackArgs = (Result<Value, DispatchError>, Option<Value>);

/// A callback that forwards its two arguments to the returned receiver.
pub fn capture() -> (oneshot::Receiver<CallbackArgs>, Callback<Value>) {
    let (tx, rx) = oneshot::channel();
    let cb = callback(move |first, second| {
        let _ = tx.send((first, second));
    });
    (rx, cb)
}
