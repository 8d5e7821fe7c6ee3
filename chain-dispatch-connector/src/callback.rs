//! Adapter between the dispatcher's tagged outcomes and legacy
//! error-first completion callbacks.
//!
//! Legacy callers receive two arguments: the outcome in the first slot and,
//! on success, the same value again in the second. Failures leave the second
//! slot empty.

use crate::{error::DispatchError, eventified::Settle};

/// A completion callback in the legacy two-slot shape.
pub type Callback<T> = Box<dyn FnOnce(Result<T, DispatchError>, Option<T>) + Send + 'static>;

/// Wraps a closure as a [`Callback`].
pub fn callback<T, F>(f: F) -> Callback<T>
where
    F: FnOnce(Result<T, DispatchError>, Option<T>) + Send + 'static,
{
    Box::new(f)
}

/// Invokes `callback` for `outcome` using the two-slot convention.
pub fn invoke<T: Clone>(callback: Callback<T>, outcome: Result<T, DispatchError>) {
    match outcome {
        Ok(value) => {
            let second = value.clone();
            callback(Ok(value), Some(second));
        }
        Err(error) => callback(Err(error), None),
    }
}

/// Routes an outcome to exactly one channel: the callback when there is one,
/// the completion otherwise.
///
/// When the callback wins, `settle` is dropped and the awaitable side reports
/// [`DispatchError::Detached`].
pub fn deliver<T: Clone>(
    callback: Option<Callback<T>>,
    settle: Settle<T>,
    outcome: Result<T, DispatchError>,
) {
    match callback {
        Some(callback) => {
            drop(settle);
            invoke(callback, outcome);
        }
        None => settle.settle(outcome),
    }
}
