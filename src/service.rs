//! The operator-name registry mapping short names to operations.

use std::collections::HashMap;

use crate::operation::{Operation, OperationEntry};

/// A process-wide, read-only-at-dispatch registry of operations keyed by
/// their short type name. Built once during server construction.
#[derive(Debug, Default)]
pub struct Service {
    operations: HashMap<&'static str, OperationEntry>,
}

impl Service {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operation under the last path component of its qualified
    /// type name. Idempotent: the first registration for a name wins.
    pub fn operator<T: Operation + 'static>(mut self) -> Self {
        let entry = OperationEntry::of::<T>();
        self.operations.entry(entry.name()).or_insert(entry);
        self
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&OperationEntry> {
        self.operations.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RpcError;
    use crate::operand::{OperandKind, OperandSpec};
    use crate::operation::{Arguments, OperandValues};
    use crate::server::CallContext;
    use serde_json::{json, Value};

    struct Echo {
        text: String,
    }

    impl Operation for Echo {
        fn operands() -> Vec<OperandSpec> {
            vec![OperandSpec::new("text", OperandKind::String)]
        }

        fn from_values(values: OperandValues, _ctx: CallContext) -> Result<Self, RpcError> {
            Ok(Self {
                text: values.require_str("text")?.to_string(),
            })
        }

        fn execute(&self) -> Result<Value, RpcError> {
            Ok(json!(self.text))
        }
    }

    struct Noop;

    impl Operation for Noop {
        fn operands() -> Vec<OperandSpec> {
            Vec::new()
        }

        fn from_values(_values: OperandValues, _ctx: CallContext) -> Result<Self, RpcError> {
            Ok(Self)
        }

        fn execute(&self) -> Result<Value, RpcError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn registers_under_the_short_type_name() {
        let service = Service::new().operator::<Echo>();
        assert!(service.get("Echo").is_some());
        assert!(service.get("echo").is_none());
        assert!(service.get("Unknown").is_none());
    }

    #[test]
    fn first_registration_wins() {
        let service = Service::new().operator::<Echo>().operator::<Echo>();
        let entry = service.get("Echo").expect("registered");
        let result = entry
            .invoke(
                Arguments::Positional(vec![json!("ok")]),
                &CallContext::default(),
            )
            .expect("echo succeeds");
        assert_eq!(result, json!("ok"));
    }

    #[test]
    fn holds_multiple_operators() {
        let service = Service::new().operator::<Echo>().operator::<Noop>();
        assert!(service.get("Echo").is_some());
        assert!(service.get("Noop").is_some());
    }
}
