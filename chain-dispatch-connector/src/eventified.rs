//! # Eventified Results
//!
//! A dispatched operation reports back on two independent channels:
//!
//! - a [`Completion`], a future that settles exactly once with the final
//!   `Result`, and
//! - an [`EventStream`], which carries zero or more [`LifecycleEvent`]s
//!   (transaction submitted, hash known, confirmations, ...) before the
//!   operation ends.
//!
//! [`EventifiedResult`] bundles both so callers can either simply `.await` it
//! or watch the lifecycle as well. The producing side holds a [`Settle`]
//! handle, consumed when it settles, and an [`Emitter`].

use crate::{error::DispatchError, transport::Receipt};
use futures::{FutureExt, Stream};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::{mpsc, oneshot};

/// A notification emitted while an operation is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Sending,
    Sent,
    TransactionHash(String),
    Confirmation { number: u64, receipt: Receipt },
    Receipt(Receipt),
    Error(DispatchError),
}

/// Creates the producer handles and the caller-facing result for one operation.
pub fn eventified<T>() -> (Emitter, Settle<T>, EventifiedResult<T>) {
    // Unbounded: a caller that only awaits the completion never drains events.
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();

    (
        Emitter { tx: event_tx },
        Settle { tx: outcome_tx },
        EventifiedResult {
            completion: Completion { rx: outcome_rx },
            events: EventStream { rx: event_rx },
        },
    )
}

/// Producer side of the event channel.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl Emitter {
    /// Emits an event. Events nobody listens for are dropped.
    pub fn emit(&self, event: LifecycleEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Lifecycle event dropped: no listener attached");
        }
    }
}

/// Producer side of the completion. Settling consumes the handle, so an
/// operation cannot settle twice.
#[derive(Debug)]
pub struct Settle<T> {
    tx: oneshot::Sender<Result<T, DispatchError>>,
}

impl<T> Settle<T> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, error: DispatchError) {
        self.settle(Err(error));
    }

    pub fn settle(self, outcome: Result<T, DispatchError>) {
        if self.tx.send(outcome).is_err() {
            tracing::trace!("Completion dropped before the operation settled");
        }
    }
}

/// A future resolving once with the operation's outcome.
///
/// If the producer goes away without settling (because the outcome went to a
/// callback instead) this resolves to [`DispatchError::Detached`].
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, DispatchError>>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx
            .poll_unpin(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::Detached)))
    }
}

/// The ordered stream of lifecycle events for one operation.
///
/// Ends once the operation has finished and its producer is gone.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl EventStream {
    /// Receives the next event. Returns `None` once the stream is closed.
    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }

    /// Drains whatever is left, waiting for the producer to finish.
    pub async fn collect_remaining(mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = LifecycleEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// The value returned to callers of the dispatcher: awaitable and observable.
#[derive(Debug)]
pub struct EventifiedResult<T> {
    completion: Completion<T>,
    events: EventStream,
}

impl<T> EventifiedResult<T> {
    /// Receives the next lifecycle event.
    pub async fn next_event(&mut self) -> Option<LifecycleEvent> {
        self.events.next_event().await
    }

    pub fn events(&mut self) -> &mut EventStream {
        &mut self.events
    }

    /// Splits the result into its two halves so they can be driven separately.
    pub fn into_parts(self) -> (Completion<T>, EventStream) {
        (self.completion, self.events)
    }
}

impl<T> Future for EventifiedResult<T> {
    type Output = Result<T, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.completion).poll(cx)
    }
}
