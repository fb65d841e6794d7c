//! Helper functions to create ConditionExpression instances
//!
//! Filters and search express their predicates as runtara-dsl condition trees;
//! every data source adapter knows how to apply one.

use runtara_dsl::{
    ConditionArgument, ConditionExpression, ConditionOperation, ConditionOperator, ImmediateValue,
    MappingValue, ReferenceValue,
};

fn field(name: impl Into<String>) -> ConditionArgument {
    ConditionArgument::Value(MappingValue::Reference(ReferenceValue {
        value: name.into(),
        type_hint: None,
        default: None,
    }))
}

fn immediate(value: serde_json::Value) -> ConditionArgument {
    ConditionArgument::Value(MappingValue::Immediate(ImmediateValue { value }))
}

fn binary(
    op: ConditionOperator,
    name: impl Into<String>,
    value: serde_json::Value,
) -> ConditionExpression {
    ConditionExpression::Operation(ConditionOperation {
        op,
        arguments: vec![field(name), immediate(value)],
    })
}

fn unary(op: ConditionOperator, name: impl Into<String>) -> ConditionExpression {
    ConditionExpression::Operation(ConditionOperation {
        op,
        arguments: vec![field(name)],
    })
}

fn logical(op: ConditionOperator, conditions: Vec<ConditionExpression>) -> ConditionExpression {
    ConditionExpression::Operation(ConditionOperation {
        op,
        arguments: conditions
            .into_iter()
            .map(|c| ConditionArgument::Expression(Box::new(c)))
            .collect(),
    })
}

/// field == value
pub fn eq(name: impl Into<String>, value: serde_json::Value) -> ConditionExpression {
    binary(ConditionOperator::Eq, name, value)
}

/// field != value
pub fn ne(name: impl Into<String>, value: serde_json::Value) -> ConditionExpression {
    binary(ConditionOperator::Ne, name, value)
}

/// field > value
pub fn gt(name: impl Into<String>, value: serde_json::Value) -> ConditionExpression {
    binary(ConditionOperator::Gt, name, value)
}

/// field >= value
pub fn gte(name: impl Into<String>, value: serde_json::Value) -> ConditionExpression {
    binary(ConditionOperator::Gte, name, value)
}

/// field < value
pub fn lt(name: impl Into<String>, value: serde_json::Value) -> ConditionExpression {
    binary(ConditionOperator::Lt, name, value)
}

/// field <= value
pub fn lte(name: impl Into<String>, value: serde_json::Value) -> ConditionExpression {
    binary(ConditionOperator::Lte, name, value)
}

/// Case-sensitive substring match
pub fn contains(name: impl Into<String>, value: impl Into<String>) -> ConditionExpression {
    binary(
        ConditionOperator::Contains,
        name,
        serde_json::Value::String(value.into()),
    )
}

/// Prefix match on the text form of the field
pub fn starts_with(name: impl Into<String>, value: impl Into<String>) -> ConditionExpression {
    binary(
        ConditionOperator::StartsWith,
        name,
        serde_json::Value::String(value.into()),
    )
}

/// field IN (values)
pub fn in_list(name: impl Into<String>, values: Vec<serde_json::Value>) -> ConditionExpression {
    binary(ConditionOperator::In, name, serde_json::Value::Array(values))
}

/// field IS NOT NULL
pub fn is_defined(name: impl Into<String>) -> ConditionExpression {
    unary(ConditionOperator::IsDefined, name)
}

/// All conditions hold
pub fn and(conditions: Vec<ConditionExpression>) -> ConditionExpression {
    logical(ConditionOperator::And, conditions)
}

/// Any condition holds
pub fn or(conditions: Vec<ConditionExpression>) -> ConditionExpression {
    logical(ConditionOperator::Or, conditions)
}

/// Negation
pub fn not(condition: ConditionExpression) -> ConditionExpression {
    logical(ConditionOperator::Not, vec![condition])
}
