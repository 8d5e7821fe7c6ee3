//! # Sync Status Monitor
//!
//! Turns the node's raw `syncing` notifications into a stable boolean signal.
//!
//! A node close to the chain tip reports sync progress that flips back and
//! forth by a few blocks. The monitor reports `Changed(true)` as soon as the
//! first snapshot arrives, but only reports `Changed(false)` once snapshots
//! have stopped for a debounce window and the last one was within the
//! catch-up threshold of the highest block. A `NotSyncing` notification counts
//! as a caught-up reading and is debounced the same way. Every snapshot is also
//! passed through as `Data`.
//!
//! When the source ends, a pending transition is still evaluated once its
//! window has passed, after which the monitor closes its event channel.

use crate::{config::SyncMonitorConfig, error::TransportError};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, Instant},
};
use tokio_stream::wrappers::ReceiverStream;

/// A single progress report from the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub starting_block: Option<u64>,
    pub current_block: u64,
    pub highest_block: u64,
    pub known_states: Option<u64>,
    pub pulled_states: Option<u64>,
}

impl SyncSnapshot {
    pub fn new(current_block: u64, highest_block: u64) -> Self {
        Self {
            starting_block: None,
            current_block,
            highest_block,
            known_states: None,
            pulled_states: None,
        }
    }

    /// `current_block > highest_block - threshold`, without underflow.
    pub fn is_caught_up(&self, threshold: u64) -> bool {
        u128::from(self.current_block) + u128::from(threshold) > u128::from(self.highest_block)
    }
}

/// A raw notification from the subscription source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncNotification {
    Snapshot(SyncSnapshot),
    /// The node reports it is not syncing.
    NotSyncing,
}

impl SyncNotification {
    /// Parses an `eth_syncing` result or a `syncing` subscription payload.
    ///
    /// Accepts `false`, a status object with hex-quantity or numeric fields,
    /// or the `{ "syncing": bool, "status": {...} }` envelope.
    pub fn from_rpc(value: &Value) -> Result<Self, TransportError> {
        match value {
            Value::Bool(false) => Ok(Self::NotSyncing),
            Value::Object(map) if map.contains_key("syncing") => {
                match (map.get("syncing"), map.get("status")) {
                    (Some(Value::Bool(false)), _) => Ok(Self::NotSyncing),
                    (Some(Value::Bool(true)), Some(status)) => Self::from_rpc(status),
                    _ => Err(TransportError::InvalidResponse(format!(
                        "malformed syncing envelope: {value}"
                    ))),
                }
            }
            Value::Object(_) => Ok(Self::Snapshot(SyncSnapshot {
                starting_block: optional_quantity(value, "startingBlock")?,
                current_block: required_quantity(value, "currentBlock")?,
                highest_block: required_quantity(value, "highestBlock")?,
                known_states: optional_quantity(value, "knownStates")?,
                pulled_states: optional_quantity(value, "pulledStates")?,
            })),
            other => Err(TransportError::InvalidResponse(format!(
                "unexpected syncing result: {other}"
            ))),
        }
    }
}

fn required_quantity(value: &Value, field: &str) -> Result<u64, TransportError> {
    optional_quantity(value, field)?
        .ok_or_else(|| TransportError::InvalidResponse(format!("missing '{field}'")))
}

fn optional_quantity(value: &Value, field: &str) -> Result<Option<u64>, TransportError> {
    let invalid = || TransportError::InvalidResponse(format!("invalid quantity in '{field}'"));
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map(Some).map_err(|_| invalid())
        }
        Some(_) => Err(invalid()),
    }
}

/// Events emitted by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Raw passthrough of every snapshot.
    Data(SyncSnapshot),
    /// A confirmed transition of the syncing flag.
    Changed(bool),
}

impl SyncEvent {
    pub fn kind(&self) -> SyncEventKind {
        match self {
            SyncEvent::Data(_) => SyncEventKind::Data,
            SyncEvent::Changed(_) => SyncEventKind::Changed,
        }
    }
}

/// Selects which events a handler registered with [`SyncStatusMonitor::on`] receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEventKind {
    Data,
    Changed,
}

type Handler = Box<dyn FnMut(&SyncEvent) + Send>;

/// Where events go while the monitor is subscribed. Taken (set to `None`) on
/// unsubscribe, after which nothing can be emitted.
struct Outlet {
    tx: mpsc::UnboundedSender<SyncEvent>,
    handlers: Vec<(SyncEventKind, Handler)>,
}

type SharedOutlet = Arc<Mutex<Option<Outlet>>>;

fn lock(outlet: &SharedOutlet) -> MutexGuard<'_, Option<Outlet>> {
    outlet.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Delivers `event` to the handlers and the channel. Returns `false` once the
/// monitor has been unsubscribed.
fn emit(outlet: &SharedOutlet, event: SyncEvent) -> bool {
    let mut guard = lock(outlet);
    let Some(outlet) = guard.as_mut() else {
        return false;
    };

    for (kind, handler) in outlet.handlers.iter_mut() {
        if *kind == event.kind() {
            handler(&event);
        }
    }
    if outlet.tx.send(event).is_err() {
        tracing::trace!("Sync event dropped: receiver closed");
    }
    true
}

/// Watches a stream of sync notifications and emits debounced change events.
///
/// Dropping the monitor unsubscribes it.
pub struct SyncStatusMonitor {
    outlet: SharedOutlet,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    task: JoinHandle<()>,
}

impl fmt::Debug for SyncStatusMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStatusMonitor")
            .field("active", &self.is_active())
            .finish()
    }
}

impl SyncStatusMonitor {
    /// Starts monitoring `source`. Must be called from within a tokio runtime.
    pub fn spawn<S>(source: S, config: &SyncMonitorConfig) -> Self
    where
        S: Stream<Item = SyncNotification> + Send + 'static,
    {
        let (tx, events_rx) = mpsc::unbounded_channel();
        let outlet: SharedOutlet = Arc::new(Mutex::new(Some(Outlet {
            tx,
            handlers: Vec::new(),
        })));

        let signal = SyncSignal::new(
            Duration::from_millis(config.debounce_ms),
            config.catch_up_threshold,
        );
        let task = tokio::spawn(signal.run(source, outlet.clone()));

        Self {
            outlet,
            events_rx,
            task,
        }
    }

    /// Starts monitoring notifications arriving on an `mpsc` channel.
    pub fn from_receiver(
        rx: mpsc::Receiver<SyncNotification>,
        config: &SyncMonitorConfig,
    ) -> Self {
        Self::spawn(ReceiverStream::new(rx), config)
    }

    /// Registers `handler` for every future event of the given kind.
    ///
    /// Handlers run on the monitor's task while it holds an internal lock, so
    /// they must not call back into the monitor.
    pub fn on<F>(&self, kind: SyncEventKind, handler: F)
    where
        F: FnMut(&SyncEvent) + Send + 'static,
    {
        if let Some(outlet) = lock(&self.outlet).as_mut() {
            outlet.handlers.push((kind, Box::new(handler)));
        }
    }

    /// Receives the next event. Returns `None` once unsubscribed and drained.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events_rx.recv().await
    }

    pub fn is_active(&self) -> bool {
        lock(&self.outlet).is_some()
    }

    /// Stops the monitor. No event is emitted after this returns, including a
    /// pending `Changed(false)`. Calling it again has no effect.
    pub fn unsubscribe(&self) {
        if lock(&self.outlet).take().is_some() {
            tracing::debug!("Sync status monitor unsubscribed");
        }
        self.task.abort();
    }
}

impl Drop for SyncStatusMonitor {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// The most recent reading seen while syncing.
#[derive(Debug, Clone, Copy)]
enum Reading {
    Snapshot(SyncSnapshot),
    NotSyncing,
}

/// The monitor's private state machine.
struct SyncSignal {
    is_syncing: Option<bool>,
    latest: Option<Reading>,
    debounce: Duration,
    threshold: u64,
}

impl SyncSignal {
    fn new(debounce: Duration, threshold: u64) -> Self {
        Self {
            is_syncing: None,
            latest: None,
            debounce,
            threshold,
        }
    }

    async fn run<S>(mut self, source: S, outlet: SharedOutlet)
    where
        S: Stream<Item = SyncNotification> + Send + 'static,
    {
        let mut source = Box::pin(source);
        let drain_timer = sleep(self.debounce);
        tokio::pin!(drain_timer);
        let mut drain_pending = false;
        let mut source_closed = false;

        loop {
            tokio::select! {
                notification = source.next() => {
                    let Some(notification) = notification else {
                        tracing::debug!("Sync notification source closed");
                        source_closed = true;
                        break;
                    };
                    let keep_going = match notification {
                        SyncNotification::Snapshot(snapshot) => {
                            if self.is_syncing == Some(true) {
                                self.latest = Some(Reading::Snapshot(snapshot));
                                drain_timer.as_mut().reset(Instant::now() + self.debounce);
                                drain_pending = true;
                                emit(&outlet, SyncEvent::Data(snapshot))
                            } else {
                                self.start_episode(snapshot, &outlet).await
                            }
                        }
                        // Counts as a caught-up reading; a later far-behind
                        // snapshot inside the window still cancels it.
                        SyncNotification::NotSyncing => {
                            if self.is_syncing == Some(true) {
                                self.latest = Some(Reading::NotSyncing);
                                drain_timer.as_mut().reset(Instant::now() + self.debounce);
                                drain_pending = true;
                            }
                            true
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }
                () = &mut drain_timer, if drain_pending => {
                    drain_pending = false;
                    if !self.on_quiet(&outlet) {
                        break;
                    }
                }
            }
        }

        if source_closed {
            if drain_pending {
                drain_timer.as_mut().await;
                self.on_quiet(&outlet);
            }
            // Dropping the sender lets `next_event` return `None`.
            lock(&outlet).take();
        }
    }

    /// Evaluates the latest reading once the debounce window has passed.
    fn on_quiet(&mut self, outlet: &SharedOutlet) -> bool {
        let caught_up = match self.latest {
            Some(Reading::Snapshot(snapshot)) => snapshot.is_caught_up(self.threshold),
            Some(Reading::NotSyncing) => true,
            None => false,
        };
        if caught_up {
            self.finish_episode(outlet)
        } else {
            true
        }
    }

    /// Flags syncing and reports it before the snapshot that triggered it.
    async fn start_episode(&mut self, snapshot: SyncSnapshot, outlet: &SharedOutlet) -> bool {
        self.is_syncing = Some(true);
        self.latest = None;
        tracing::info!(
            "Node is syncing: block {} of {}",
            snapshot.current_block,
            snapshot.highest_block
        );
        if !emit(outlet, SyncEvent::Changed(true)) {
            return false;
        }
        tokio::task::yield_now().await;
        emit(outlet, SyncEvent::Data(snapshot))
    }

    fn finish_episode(&mut self, outlet: &SharedOutlet) -> bool {
        if self.is_syncing != Some(true) {
            return true;
        }
        self.is_syncing = Some(false);
        tracing::info!("Node caught up with the chain");
        emit(outlet, SyncEvent::Changed(false))
    }
}
