//! # Capability-Checked Dispatcher
//!
//! The `CapabilityDispatcher` routes a named operation to whatever target the
//! registry currently maps a name to.
//!
//! ## Flow
//! Every invocation runs as its own background task, strictly in order:
//!
//! 1. **Resolve** the target for the name. Targets are never cached; the
//!    registry mapping may change between calls.
//! 2. **Verify** that the target implements the operation's interface, if the
//!    operation has one. The check is repeated on every dispatch.
//! 3. **Dispatch** either as a read-only `call` or as a state-changing `send`
//!    whose transaction lifecycle is relayed as events.
//!
//! The outcome reaches the caller through the returned [`EventifiedResult`],
//! or through the legacy completion callback when one is supplied.
use crate::{
    callback::{self, Callback},
    config::{ConnectorConfig, TransactionDefaults},
    error::{DispatchError, TransportError},
    eventified::{eventified, Emitter, EventifiedResult, LifecycleEvent, Settle},
    namehash::namehash,
    operation::{Operation, OperationTable, ResultFormatter},
    transport::{MethodCall, Receipt, Registry, SendEvent, SendOptions, Target},
};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// How a dispatched operation is executed.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchMode {
    /// A read-only call resolving with the (formatted) return value.
    Call,
    /// A transaction resolving with its receipt.
    Send(SendOptions),
}

/// Everything one invocation needs once its target is known.
///
/// Built once per invocation and moved into exactly one of the call or send
/// handlers.
pub struct DispatchContext {
    target_name: String,
    operation: Operation,
    args: Vec<Value>,
    result_formatter: Option<ResultFormatter>,
    callback: Option<Callback<Value>>,
}

impl DispatchContext {
    /// Builds the context, prefixing the arguments with the name's node.
    ///
    /// Operations that take no explicit arguments still receive the node.
    pub fn new(
        target_name: &str,
        operation: Operation,
        args: Vec<Value>,
        result_formatter: Option<ResultFormatter>,
        callback: Option<Callback<Value>>,
    ) -> Self {
        let mut prepared = Vec::with_capacity(args.len() + 1);
        prepared.push(Value::String(namehash(target_name).to_hex()));
        prepared.extend(operation.build_arguments(args));

        let result_formatter =
            result_formatter.or_else(|| operation.result_formatter().cloned());

        Self {
            target_name: target_name.to_string(),
            operation,
            args: prepared,
            result_formatter,
            callback,
        }
    }

    pub fn operation_name(&self) -> &str {
        self.operation.name()
    }

    /// The arguments as they will be sent, node first.
    pub fn arguments(&self) -> &[Value] {
        &self.args
    }

    fn into_request(
        self,
        defaults: &TransactionDefaults,
    ) -> (MethodCall, Option<ResultFormatter>, Option<Callback<Value>>) {
        let request = MethodCall {
            method: self.operation.name().to_string(),
            args: self.args,
            block: defaults.default_block.clone(),
        };
        (request, self.result_formatter, self.callback)
    }
}

/// Routes named operations to registry-resolved targets.
///
/// Cheap to clone; clones share the registry, the operation table and the
/// configuration, none of which are mutated by dispatching.
#[derive(Clone)]
pub struct CapabilityDispatcher {
    config: Arc<ConnectorConfig>,
    registry: Arc<dyn Registry>,
    operations: Arc<OperationTable>,
}

impl CapabilityDispatcher {
    /// Creates a new `CapabilityDispatcher`.
    ///
    /// # Arguments
    ///
    /// * `config` - The shared connector configuration.
    /// * `registry` - Resolves names to targets.
    /// * `operations` - The operations known to this dispatcher. Names not in
    ///   the table are dispatched unchecked and unformatted.
    pub fn new(
        config: Arc<ConnectorConfig>,
        registry: Arc<dyn Registry>,
        operations: Arc<OperationTable>,
    ) -> Self {
        Self {
            config,
            registry,
            operations,
        }
    }

    /// Dispatches `operation_name` against the target of `target_name`.
    ///
    /// Must be called from within a tokio runtime. The work runs in a spawned
    /// task and continues even if the returned result is dropped.
    ///
    /// When `callback` is given it receives the outcome instead of the
    /// completion, except for a successful send, which settles both.
    pub fn invoke(
        &self,
        target_name: &str,
        operation_name: &str,
        args: Vec<Value>,
        mode: DispatchMode,
        callback: Option<Callback<Value>>,
    ) -> EventifiedResult<Value> {
        self.spawn(target_name, operation_name, args, None, mode, callback)
    }

    /// Dispatches a read-only call.
    pub fn call(
        &self,
        target_name: &str,
        operation_name: &str,
        args: Vec<Value>,
    ) -> EventifiedResult<Value> {
        self.invoke(target_name, operation_name, args, DispatchMode::Call, None)
    }

    /// Dispatches a transaction.
    pub fn send(
        &self,
        target_name: &str,
        operation_name: &str,
        args: Vec<Value>,
        options: SendOptions,
    ) -> EventifiedResult<Receipt> {
        self.invoke(target_name, operation_name, args, DispatchMode::Send(options), None)
    }

    /// Prepares an operation without dispatching it, so the caller can choose
    /// between [`ResolverMethod::call`] and [`ResolverMethod::send`].
    pub fn method(
        &self,
        target_name: &str,
        operation_name: &str,
        args: Vec<Value>,
    ) -> ResolverMethod {
        ResolverMethod {
            dispatcher: self.clone(),
            target_name: target_name.to_string(),
            operation_name: operation_name.to_string(),
            args,
            result_formatter: None,
        }
    }

    fn spawn(
        &self,
        target_name: &str,
        operation_name: &str,
        args: Vec<Value>,
        result_formatter: Option<ResultFormatter>,
        mode: DispatchMode,
        callback: Option<Callback<Value>>,
    ) -> EventifiedResult<Value> {
        let (emitter, settle, result) = eventified();
        let operation = self.operations.lookup(operation_name);
        let ctx = DispatchContext::new(target_name, operation, args, result_formatter, callback);

        let registry = self.registry.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            run(registry, config, ctx, mode, emitter, settle).await;
        });

        result
    }
}

/// A prepared operation awaiting its dispatch mode.
pub struct ResolverMethod {
    dispatcher: CapabilityDispatcher,
    target_name: String,
    operation_name: String,
    args: Vec<Value>,
    result_formatter: Option<ResultFormatter>,
}

impl ResolverMethod {
    /// Overrides the operation's registered result formatter for this call.
    pub fn with_result_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.result_formatter = Some(Arc::new(formatter));
        self
    }

    pub fn call(self, callback: Option<Callback<Value>>) -> EventifiedResult<Value> {
        self.dispatcher.spawn(
            &self.target_name,
            &self.operation_name,
            self.args,
            self.result_formatter,
            DispatchMode::Call,
            callback,
        )
    }

    pub fn send(
        self,
        options: SendOptions,
        callback: Option<Callback<Receipt>>,
    ) -> EventifiedResult<Receipt> {
        self.dispatcher.spawn(
            &self.target_name,
            &self.operation_name,
            self.args,
            self.result_formatter,
            DispatchMode::Send(options),
            callback,
        )
    }
}

async fn run(
    registry: Arc<dyn Registry>,
    config: Arc<ConnectorConfig>,
    ctx: DispatchContext,
    mode: DispatchMode,
    emitter: Emitter,
    settle: Settle<Value>,
) {
    tracing::debug!(
        "Dispatching '{}' for '{}'",
        ctx.operation_name(),
        ctx.target_name
    );

    let resolved =
        resolve_and_verify(registry.as_ref(), &ctx.target_name, &ctx.operation).await;
    let target = match resolved {
        Ok(target) => target,
        Err(e) => {
            tracing::debug!("Dispatch of '{}' aborted: {}", ctx.operation_name(), e);
            callback::deliver(ctx.callback, settle, Err(e));
            return;
        }
    };

    match mode {
        DispatchMode::Call => {
            handle_call(target.as_ref(), ctx, &config.transaction, settle).await
        }
        DispatchMode::Send(options) => {
            let options = options.with_defaults(&config.transaction);
            handle_send(target.as_ref(), ctx, &config.transaction, options, emitter, settle).await
        }
    }
}

/// Only the name and the operation are borrowed here: the context also owns the
/// callback, which is `Send` but not `Sync`.
async fn resolve_and_verify(
    registry: &dyn Registry,
    target_name: &str,
    operation: &Operation,
) -> Result<Arc<dyn Target>, DispatchError> {
    let target = registry
        .resolver(target_name)
        .await
        .map_err(|source| DispatchError::Resolution {
            name: target_name.to_string(),
            source,
        })?;

    tracing::debug!("Resolved '{}' to {}", target_name, target.address());

    check_interface_support(target.as_ref(), operation).await?;
    Ok(target)
}

/// Verifies that `target` implements the interface behind `operation`.
///
/// Operations without an interface id pass unchecked. A failed introspection
/// call counts as "unsupported".
pub async fn check_interface_support(
    target: &dyn Target,
    operation: &Operation,
) -> Result<(), DispatchError> {
    let Some(interface_id) = operation.capability_id() else {
        return Ok(());
    };

    let supported = match target.supports_interface(interface_id).await {
        Ok(supported) => supported,
        Err(e) => {
            tracing::warn!(
                "Could not verify interface {} of target at '{}': {}",
                interface_id,
                target.address(),
                e
            );
            false
        }
    };

    if !supported {
        return Err(DispatchError::CapabilityNotSupported {
            address: target.address().to_string(),
            operation: operation.name().to_string(),
        });
    }
    Ok(())
}

async fn handle_call(
    target: &dyn Target,
    ctx: DispatchContext,
    defaults: &TransactionDefaults,
    settle: Settle<Value>,
) {
    let (request, formatter, callback) = ctx.into_request(defaults);

    let outcome = target
        .call(request)
        .await
        .map(|raw| match &formatter {
            Some(format) => format(raw),
            None => raw,
        })
        .map_err(DispatchError::from);

    callback::deliver(callback, settle, outcome);
}

async fn handle_send(
    target: &dyn Target,
    ctx: DispatchContext,
    defaults: &TransactionDefaults,
    options: SendOptions,
    emitter: Emitter,
    settle: Settle<Receipt>,
) {
    let (request, _, callback) = ctx.into_request(defaults);
    let mut lifecycle = target.send(request, options);

    while let Some(event) = lifecycle.next().await {
        match event {
            SendEvent::Sending => emitter.emit(LifecycleEvent::Sending),
            SendEvent::Sent => emitter.emit(LifecycleEvent::Sent),
            SendEvent::TransactionHash(hash) => {
                emitter.emit(LifecycleEvent::TransactionHash(hash))
            }
            SendEvent::Confirmation { number, receipt } => {
                emitter.emit(LifecycleEvent::Confirmation { number, receipt })
            }
            SendEvent::Receipt(receipt) => {
                emitter.emit(LifecycleEvent::Receipt(receipt.clone()));
                settle.resolve(receipt.clone());
                if let Some(callback) = callback {
                    callback::invoke(callback, Ok(receipt));
                }
                return;
            }
            SendEvent::Error(e) => {
                fail_send(&emitter, callback, settle, e);
                return;
            }
        }
    }

    fail_send(&emitter, callback, settle, TransportError::StreamClosed);
}

fn fail_send(
    emitter: &Emitter,
    callback: Option<Callback<Receipt>>,
    settle: Settle<Receipt>,
    error: TransportError,
) {
    let error = DispatchError::Transport(error);
    emitter.emit(LifecycleEvent::Error(error.clone()));
    callback::deliver(callback, settle, Err(error));
}
