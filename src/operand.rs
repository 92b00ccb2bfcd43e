//! Single-argument validation against a declared operand contract.

use std::fmt;
use std::ops::RangeInclusive;

use regex::Regex;
use serde_json::Value;

use crate::errors::RpcError;

/// The closed set of operand type declarations. Values are checked through
/// these tags only; there are no open-ended runtime type objects.
#[derive(Debug, Clone)]
pub enum OperandKind {
    Bool,
    /// A JSON number representable as i64.
    Integer,
    /// Any JSON number.
    Float,
    /// An i64 within the given bounds.
    IntegerRange(RangeInclusive<i64>),
    String,
    /// A string matching the given pattern.
    Pattern(Regex),
    Array,
    Object,
    Any,
}

impl OperandKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::IntegerRange(range) => value.as_i64().is_some_and(|n| range.contains(&n)),
            Self::String => value.is_string(),
            Self::Pattern(pattern) => value.as_str().is_some_and(|s| pattern.is_match(s)),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "boolean"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "number"),
            Self::IntegerRange(range) => {
                write!(f, "integer in {}..={}", range.start(), range.end())
            }
            Self::String => write!(f, "string"),
            Self::Pattern(pattern) => write!(f, "string matching /{}/", pattern.as_str()),
            Self::Array => write!(f, "array"),
            Self::Object => write!(f, "object"),
            Self::Any => write!(f, "any"),
        }
    }
}

/// One named, typed argument slot on an operation. Declaration order defines
/// the positional mapping; names must be unique within an operation.
#[derive(Debug, Clone)]
pub struct OperandSpec {
    pub name: &'static str,
    pub kind: OperandKind,
    pub optional: bool,
    pub nullable: bool,
}

impl OperandSpec {
    pub fn new(name: &'static str, kind: OperandKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            nullable: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Validates one value against its declaration. Absence and null pass only
/// for optional or nullable operands; any present non-null value must satisfy
/// the declared kind.
pub fn validate(spec: &OperandSpec, value: Option<&Value>) -> Result<(), RpcError> {
    match value {
        None | Some(Value::Null) => {
            if spec.optional || spec.nullable {
                Ok(())
            } else {
                Err(RpcError::invalid_params(format!(
                    "operand `{}' expected {}, got null",
                    spec.name, spec.kind
                )))
            }
        }
        Some(value) => {
            if spec.kind.matches(value) {
                Ok(())
            } else {
                Err(RpcError::invalid_params(format!(
                    "operand `{}' expected {}, got {}",
                    spec.name, spec.kind, value
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(kind: OperandKind) -> OperandSpec {
        OperandSpec::new("x", kind)
    }

    #[test]
    fn primitive_kinds_accept_matching_values() {
        assert!(validate(&spec(OperandKind::Bool), Some(&json!(true))).is_ok());
        assert!(validate(&spec(OperandKind::Integer), Some(&json!(42))).is_ok());
        assert!(validate(&spec(OperandKind::Float), Some(&json!(1.5))).is_ok());
        assert!(validate(&spec(OperandKind::Float), Some(&json!(3))).is_ok());
        assert!(validate(&spec(OperandKind::String), Some(&json!("ok"))).is_ok());
        assert!(validate(&spec(OperandKind::Array), Some(&json!([1]))).is_ok());
        assert!(validate(&spec(OperandKind::Object), Some(&json!({"a": 1}))).is_ok());
        assert!(validate(&spec(OperandKind::Any), Some(&json!([1, "mixed"]))).is_ok());
    }

    #[test]
    fn primitive_kinds_reject_mismatched_values() {
        assert!(validate(&spec(OperandKind::Bool), Some(&json!(1))).is_err());
        assert!(validate(&spec(OperandKind::Integer), Some(&json!(1.5))).is_err());
        assert!(validate(&spec(OperandKind::Integer), Some(&json!("1"))).is_err());
        assert!(validate(&spec(OperandKind::String), Some(&json!(7))).is_err());
    }

    #[test]
    fn integer_range_checks_bounds() {
        let kind = OperandKind::IntegerRange(1..=100);
        assert!(validate(&spec(kind.clone()), Some(&json!(100))).is_ok());
        assert!(validate(&spec(kind), Some(&json!(101))).is_err());
    }

    #[test]
    fn pattern_kind_matches_strings() {
        let kind = OperandKind::Pattern(Regex::new(r"^[a-z]+\.[a-z]+$").expect("valid pattern"));
        assert!(validate(&spec(kind.clone()), Some(&json!("svc.test"))).is_ok());
        assert!(validate(&spec(kind), Some(&json!("SVC"))).is_err());
    }

    #[test]
    fn null_passes_only_when_optional_or_nullable() {
        let required = spec(OperandKind::String);
        assert!(validate(&required, Some(&json!(null))).is_err());
        assert!(validate(&required, None).is_err());
        assert!(validate(&spec(OperandKind::Any), Some(&json!(null))).is_err());

        let optional = spec(OperandKind::String).optional();
        assert!(validate(&optional, Some(&json!(null))).is_ok());
        assert!(validate(&optional, None).is_ok());

        let nullable = spec(OperandKind::String).nullable();
        assert!(validate(&nullable, Some(&json!(null))).is_ok());
        assert!(validate(&nullable, None).is_ok());
    }

    #[test]
    fn failures_name_the_expected_kind_and_value() {
        let err = validate(&spec(OperandKind::Integer), Some(&json!("abc")))
            .expect_err("type mismatch must fail");
        assert_eq!(err.code(), -32602);
        assert!(err.to_string().contains("expected integer"));
        assert!(err.to_string().contains("\"abc\""));
    }
}
