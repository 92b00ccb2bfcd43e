//! Self-validating RPC operations.
//!
//! An operation declares an ordered operand list, is constructed from either
//! positional or named arguments, and executes to produce a domain value.
//! Construction validates arity and operand types before any execution.

use std::fmt;

use serde_json::{Map, Value};

use crate::errors::RpcError;
use crate::operand::{validate, OperandSpec};
use crate::server::CallContext;

/// Inclusive argument-count bounds for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArityRange {
    pub min: usize,
    pub max: usize,
}

impl ArityRange {
    pub fn contains(&self, count: usize) -> bool {
        count >= self.min && count <= self.max
    }

    /// Derived bounds: max is the operand count, min the non-optional count.
    pub fn derived(operands: &[OperandSpec]) -> Self {
        Self {
            min: operands.iter().filter(|spec| !spec.optional).count(),
            max: operands.len(),
        }
    }
}

impl fmt::Display for ArityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}..{}", self.min, self.max)
        }
    }
}

/// Request arguments in either wire shape.
#[derive(Debug, Clone)]
pub enum Arguments {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Arguments {
    /// Builds arguments from a JSON-RPC `params` member. Absent params are an
    /// empty positional list.
    pub fn from_params(params: Option<Value>) -> Result<Self, RpcError> {
        match params {
            None | Some(Value::Null) => Ok(Self::Positional(Vec::new())),
            Some(Value::Array(values)) => Ok(Self::Positional(values)),
            Some(Value::Object(map)) => Ok(Self::Named(map)),
            Some(other) => Err(RpcError::invalid_params(format!(
                "params must be an array or object, got {other}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The validated operand values of one operation instance, in declaration
/// order. Only supplied operands are recorded; converting back to a named map
/// and re-binding yields an equivalent set.
#[derive(Debug, Clone, PartialEq)]
pub struct OperandValues {
    entries: Vec<(&'static str, Value)>,
}

impl OperandValues {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry_name, _)| *entry_name == name)
            .map(|(_, value)| value)
    }

    pub fn require_f64(&self, name: &str) -> Result<f64, RpcError> {
        self.get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| RpcError::internal(format!("operand `{name}' missing after binding")))
    }

    pub fn require_i64(&self, name: &str) -> Result<i64, RpcError> {
        self.get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| RpcError::internal(format!("operand `{name}' missing after binding")))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, RpcError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::internal(format!("operand `{name}' missing after binding")))
    }

    pub fn to_named(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Binds arguments to an operand list: arity first, unknown names next, then
/// per-operand validation. Fails before any operation code runs.
pub fn bind(
    operands: &[OperandSpec],
    arity: ArityRange,
    args: Arguments,
) -> Result<OperandValues, RpcError> {
    if !arity.contains(args.len()) {
        return Err(RpcError::invalid_params(format!(
            "wrong number of arguments (given {}, expected {})",
            args.len(),
            arity
        )));
    }

    let mut entries = Vec::with_capacity(operands.len());
    match args {
        Arguments::Positional(values) => {
            for (index, spec) in operands.iter().enumerate() {
                let value = values.get(index);
                validate(spec, value)?;
                if let Some(value) = value {
                    entries.push((spec.name, value.clone()));
                }
            }
        }
        Arguments::Named(map) => {
            let unknown: Vec<&str> = map
                .keys()
                .filter(|key| !operands.iter().any(|spec| spec.name == key.as_str()))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(RpcError::invalid_params(format!(
                    "unknown parameters: {}",
                    unknown.join(", ")
                )));
            }
            for spec in operands {
                let value = map.get(spec.name);
                validate(spec, value)?;
                if let Some(value) = value {
                    entries.push((spec.name, value.clone()));
                }
            }
        }
    }

    Ok(OperandValues { entries })
}

/// A single-purpose, self-validating RPC command.
pub trait Operation: Send + Sync {
    /// Ordered operand declarations; order defines the positional mapping.
    fn operands() -> Vec<OperandSpec>
    where
        Self: Sized;

    /// Explicit arity bounds, overriding the derived range.
    fn arity_override() -> Option<ArityRange>
    where
        Self: Sized,
    {
        None
    }

    /// Builds the operation from validated operand values and the per-call
    /// context of the originating request.
    fn from_values(values: OperandValues, ctx: CallContext) -> Result<Self, RpcError>
    where
        Self: Sized;

    fn execute(&self) -> Result<Value, RpcError> {
        Err(RpcError::internal("operation does not implement execute"))
    }
}

type OperationFactory =
    Box<dyn Fn(OperandValues, CallContext) -> Result<Box<dyn Operation>, RpcError> + Send + Sync>;

/// A type-erased operation registration. The short name, operand list, and
/// arity are computed once here, at registration time.
pub struct OperationEntry {
    name: &'static str,
    operands: Vec<OperandSpec>,
    arity: ArityRange,
    factory: OperationFactory,
}

impl OperationEntry {
    pub fn of<T: Operation + 'static>() -> Self {
        let operands = T::operands();
        debug_assert!(
            operands
                .iter()
                .enumerate()
                .all(|(i, a)| operands[..i].iter().all(|b| a.name != b.name)),
            "operand names must be unique"
        );
        let arity = T::arity_override().unwrap_or_else(|| ArityRange::derived(&operands));
        Self {
            name: short_type_name::<T>(),
            operands,
            arity,
            factory: Box::new(|values, ctx| {
                T::from_values(values, ctx).map(|op| Box::new(op) as Box<dyn Operation>)
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn operands(&self) -> &[OperandSpec] {
        &self.operands
    }

    pub fn arity(&self) -> ArityRange {
        self.arity
    }

    /// Binds arguments, constructs the operation, and executes it. The
    /// instance lives for exactly this call.
    pub fn invoke(&self, args: Arguments, ctx: &CallContext) -> Result<Value, RpcError> {
        let values = bind(&self.operands, self.arity, args)?;
        let operation = (self.factory)(values, ctx.clone())?;
        operation.execute()
    }
}

impl fmt::Debug for OperationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationEntry")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Last path component of a qualified type name.
fn short_type_name<T>() -> &'static str {
    let qualified = std::any::type_name::<T>();
    qualified.rsplit("::").next().unwrap_or(qualified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::OperandKind;
    use serde_json::json;

    struct Multiply {
        x: f64,
        y: f64,
    }

    impl Operation for Multiply {
        fn operands() -> Vec<OperandSpec> {
            vec![
                OperandSpec::new("x", OperandKind::Float),
                OperandSpec::new("y", OperandKind::Float),
            ]
        }

        fn from_values(values: OperandValues, _ctx: CallContext) -> Result<Self, RpcError> {
            Ok(Self {
                x: values.require_f64("x")?,
                y: values.require_f64("y")?,
            })
        }

        fn execute(&self) -> Result<Value, RpcError> {
            Ok(json!(self.x * self.y))
        }
    }

    struct Greet {
        name: String,
        greeting: Option<String>,
    }

    impl Operation for Greet {
        fn operands() -> Vec<OperandSpec> {
            vec![
                OperandSpec::new("name", OperandKind::String),
                OperandSpec::new("greeting", OperandKind::String).optional(),
            ]
        }

        fn from_values(values: OperandValues, _ctx: CallContext) -> Result<Self, RpcError> {
            Ok(Self {
                name: values.require_str("name")?.to_string(),
                greeting: values.get("greeting").and_then(Value::as_str).map(String::from),
            })
        }

        fn execute(&self) -> Result<Value, RpcError> {
            let greeting = self.greeting.as_deref().unwrap_or("hello");
            Ok(json!(format!("{greeting}, {}", self.name)))
        }
    }

    struct Unfinished;

    impl Operation for Unfinished {
        fn operands() -> Vec<OperandSpec> {
            Vec::new()
        }

        fn from_values(_values: OperandValues, _ctx: CallContext) -> Result<Self, RpcError> {
            Ok(Self)
        }
    }

    #[test]
    fn derived_arity_counts_required_operands() {
        let entry = OperationEntry::of::<Greet>();
        assert_eq!(entry.arity(), ArityRange { min: 1, max: 2 });
    }

    #[test]
    fn entry_name_is_the_short_type_name() {
        assert_eq!(OperationEntry::of::<Multiply>().name(), "Multiply");
    }

    #[test]
    fn positional_invocation_executes() {
        let entry = OperationEntry::of::<Multiply>();
        let result = entry
            .invoke(
                Arguments::Positional(vec![json!(6), json!(7.0)]),
                &CallContext::default(),
            )
            .expect("multiply succeeds");
        assert_eq!(result, json!(42.0));
    }

    #[test]
    fn named_invocation_executes() {
        let entry = OperationEntry::of::<Greet>();
        let args = Arguments::from_params(Some(json!({"name": "world"}))).expect("object params");
        let result = entry
            .invoke(args, &CallContext::default())
            .expect("greet succeeds");
        assert_eq!(result, json!("hello, world"));
    }

    #[test]
    fn arity_violation_fails_before_execute() {
        let entry = OperationEntry::of::<Multiply>();
        let err = entry
            .invoke(Arguments::Positional(vec![json!(1)]), &CallContext::default())
            .expect_err("too few arguments");
        assert_eq!(err.code(), -32602);
        assert!(err.to_string().contains("given 1, expected 2"));

        let err = entry
            .invoke(
                Arguments::Positional(vec![json!(1), json!(2), json!(3)]),
                &CallContext::default(),
            )
            .expect_err("too many arguments");
        assert!(err.to_string().contains("given 3, expected 2"));
    }

    #[test]
    fn unknown_named_parameter_fails() {
        let entry = OperationEntry::of::<Multiply>();
        let args = Arguments::from_params(Some(json!({"x": 1, "y": 2, "z": 3})))
            .expect("object params");
        let err = entry
            .invoke(args, &CallContext::default())
            .expect_err("unknown key");
        assert!(err.to_string().contains("unknown parameters: z"));
    }

    #[test]
    fn type_mismatch_fails_construction() {
        let entry = OperationEntry::of::<Multiply>();
        let err = entry
            .invoke(
                Arguments::Positional(vec![json!("a"), json!(2)]),
                &CallContext::default(),
            )
            .expect_err("string is not a number");
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn missing_execute_override_is_an_internal_error() {
        let entry = OperationEntry::of::<Unfinished>();
        let err = entry
            .invoke(Arguments::Positional(Vec::new()), &CallContext::default())
            .expect_err("no execute body");
        assert_eq!(err.code(), -32603);
        assert!(err.to_string().contains("does not implement execute"));
    }

    #[test]
    fn bound_values_round_trip_through_a_named_map() {
        let operands = Greet::operands();
        let arity = ArityRange::derived(&operands);
        let first = bind(
            &operands,
            arity,
            Arguments::Positional(vec![json!("world"), json!("hi")]),
        )
        .expect("bind positional");

        let named = Arguments::Named(first.to_named());
        let second = bind(&operands, arity, named).expect("bind named");
        assert_eq!(first, second);
    }

    #[test]
    fn scalar_params_are_rejected() {
        let err = Arguments::from_params(Some(json!(42))).expect_err("scalar params");
        assert_eq!(err.code(), -32602);
    }
}
