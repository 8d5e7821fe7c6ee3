//! Registered operations and the table the dispatcher looks them up in.

use crate::transport::InterfaceId;
use serde_json::{json, Value};
use std::{collections::HashMap, fmt, sync::Arc};

/// Transforms the caller's arguments into the order the remote method expects.
pub type ArgumentBuilder = Arc<dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync>;

/// Transforms a raw call result before it reaches the caller.
pub type ResultFormatter = Arc<dyn Fn(Value) -> Value + Send + Sync>;

pub const ADDR_INTERFACE: InterfaceId = InterfaceId::new([0x3b, 0x3b, 0x57, 0xde]);
pub const PUBKEY_INTERFACE: InterfaceId = InterfaceId::new([0xc8, 0x69, 0x02, 0x33]);
pub const CONTENTHASH_INTERFACE: InterfaceId = InterfaceId::new([0xbc, 0x1c, 0x58, 0xd1]);
pub const TEXT_INTERFACE: InterfaceId = InterfaceId::new([0x59, 0xd1, 0xd4, 0x3c]);

/// A logical operation that can be dispatched against a resolved target.
#[derive(Clone)]
pub struct Operation {
    name: String,
    argument_builder: Option<ArgumentBuilder>,
    result_formatter: Option<ResultFormatter>,
    capability_id: Option<InterfaceId>,
}

impl Operation {
    /// An operation with no interface check and no formatting.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument_builder: None,
            result_formatter: None,
            capability_id: None,
        }
    }

    pub fn with_capability(mut self, id: InterfaceId) -> Self {
        self.capability_id = Some(id);
        self
    }

    pub fn with_argument_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    {
        self.argument_builder = Some(Arc::new(builder));
        self
    }

    pub fn with_result_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.result_formatter = Some(Arc::new(formatter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capability_id(&self) -> Option<InterfaceId> {
        self.capability_id
    }

    pub fn result_formatter(&self) -> Option<&ResultFormatter> {
        self.result_formatter.as_ref()
    }

    /// Applies the argument builder, if any.
    pub fn build_arguments(&self, args: Vec<Value>) -> Vec<Value> {
        match &self.argument_builder {
            Some(builder) => builder(args),
            None => args,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("capability_id", &self.capability_id)
            .field("argument_builder", &self.argument_builder.is_some())
            .field("result_formatter", &self.result_formatter.is_some())
            .finish()
    }
}

/// An immutable-after-setup map from operation names to [`Operation`]s.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    operations: HashMap<String, Operation>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard resolver operation set.
    ///
    /// Record getters and setters share the interface of their record type.
    /// `name`, `ABI` and the multihash pair have no documented interface id
    /// and are dispatched without a check.
    pub fn ens_resolver() -> Self {
        let mut table = Self::new();
        table
            .register(Operation::new("addr").with_capability(ADDR_INTERFACE))
            .register(Operation::new("setAddr").with_capability(ADDR_INTERFACE))
            .register(
                Operation::new("pubkey")
                    .with_capability(PUBKEY_INTERFACE)
                    .with_result_formatter(format_pubkey),
            )
            .register(Operation::new("setPubkey").with_capability(PUBKEY_INTERFACE))
            .register(Operation::new("contenthash").with_capability(CONTENTHASH_INTERFACE))
            .register(Operation::new("setContenthash").with_capability(CONTENTHASH_INTERFACE))
            .register(Operation::new("text").with_capability(TEXT_INTERFACE))
            .register(Operation::new("setText").with_capability(TEXT_INTERFACE))
            .register(Operation::new("name"))
            .register(Operation::new("ABI"))
            .register(Operation::new("multihash"))
            .register(Operation::new("setMultihash"));
        table
    }

    /// Adds or replaces an operation.
    pub fn register(&mut self, operation: Operation) -> &mut Self {
        self.operations
            .insert(operation.name().to_string(), operation);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Returns the registered operation, or a bare one for unknown names.
    pub fn lookup(&self, name: &str) -> Operation {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| Operation::new(name))
    }
}

/// Maps the resolver's `(x, y)` tuple to a named object.
fn format_pubkey(raw: Value) -> Value {
    match raw {
        Value::Array(mut parts) if parts.len() == 2 => {
            let y = parts.pop().unwrap_or(Value::Null);
            let x = parts.pop().unwrap_or(Value::Null);
            json!({ "x": x, "y": y })
        }
        other => other,
    }
}
