//! Condition building for SQL WHERE clauses
//!
//! Converts ConditionExpression (from runtara-dsl) to SQL WHERE clauses over
//! the columns of an aliased table.

use runtara_dsl::{
    ConditionArgument, ConditionExpression, ConditionOperation, ConditionOperator, MappingValue,
};

use crate::record::value_to_text;
use crate::sql::sanitize::{escape_like, quote_identifier, validate_column_name};

/// Build SQL WHERE clause from ConditionExpression (runtara-dsl)
///
/// Returns (clause, params) tuple where:
/// - `clause` is the SQL WHERE condition string with parameter placeholders ($1, $2, etc.)
/// - `params` is a vector of parameter values to bind as text
///
/// # Arguments
/// * `condition` - The ConditionExpression to convert
/// * `alias` - Alias of the table the fields belong to
/// * `param_offset` - Starting parameter number (mutated to track next available)
///
/// # Supported Operations
/// - Logical: And, Or, Not
/// - Comparison: Eq, Ne, Gt, Lt, Gte, Lte (numeric when the value is a JSON number)
/// - String: StartsWith, EndsWith, Contains
/// - Array: In, NotIn
/// - Nullability: IsEmpty, IsNotEmpty, IsDefined
pub fn build_condition_clause(
    condition: &ConditionExpression,
    alias: &str,
    param_offset: &mut i32,
) -> Result<(String, Vec<serde_json::Value>), String> {
    match condition {
        ConditionExpression::Operation(op) => build_operation_clause(op, alias, param_offset),
        ConditionExpression::Value(mapping_value) => {
            // Bare field reference reads as truthy
            let column = column_sql(alias, &extract_field_from_mapping(mapping_value)?)?;
            Ok((
                format!(
                    "({col} IS NOT NULL AND {col}::text != 'false' AND {col}::text != '')",
                    col = column
                ),
                Vec::new(),
            ))
        }
    }
}

fn build_operation_clause(
    op: &ConditionOperation,
    alias: &str,
    param_offset: &mut i32,
) -> Result<(String, Vec<serde_json::Value>), String> {
    let mut params = Vec::new();

    match op.op {
        ConditionOperator::And | ConditionOperator::Or => {
            let mut clauses = Vec::new();
            for arg in &op.arguments {
                if let ConditionArgument::Expression(sub_expr) = arg {
                    let (clause, mut sub_params) =
                        build_condition_clause(sub_expr, alias, param_offset)?;
                    clauses.push(format!("({})", clause));
                    params.append(&mut sub_params);
                }
            }
            let joiner = if op.op == ConditionOperator::And {
                " AND "
            } else {
                " OR "
            };
            if clauses.is_empty() {
                return Err(format!(
                    "{} operation requires at least one condition",
                    joiner.trim()
                ));
            }
            Ok((clauses.join(joiner), params))
        }
        ConditionOperator::Not => {
            if op.arguments.len() != 1 {
                return Err("NOT operation requires exactly one argument".to_string());
            }
            if let ConditionArgument::Expression(sub_expr) = &op.arguments[0] {
                let (clause, sub_params) = build_condition_clause(sub_expr, alias, param_offset)?;
                params.extend(sub_params);
                Ok((format!("NOT ({})", clause), params))
            } else {
                Err("NOT operation requires an expression argument".to_string())
            }
        }
        ConditionOperator::Eq
        | ConditionOperator::Ne
        | ConditionOperator::Gt
        | ConditionOperator::Lt
        | ConditionOperator::Gte
        | ConditionOperator::Lte => {
            let (column, value) = binary_operands(op, alias)?;

            let operator = match op.op {
                ConditionOperator::Eq => "=",
                ConditionOperator::Ne => "!=",
                ConditionOperator::Gt => ">",
                ConditionOperator::Lt => "<",
                ConditionOperator::Gte => ">=",
                _ => "<=",
            };

            if value.is_null() {
                let null_operator = match op.op {
                    ConditionOperator::Eq => "IS NULL",
                    ConditionOperator::Ne => "IS NOT NULL",
                    _ => {
                        return Err(format!(
                            "{:?} operation with NULL value is not supported",
                            op.op
                        ));
                    }
                };
                return Ok((format!("{} {}", column, null_operator), params));
            }

            let ordering = !matches!(op.op, ConditionOperator::Eq | ConditionOperator::Ne);
            let cast = if ordering && value.is_number() {
                "numeric"
            } else {
                "text"
            };

            params.push(serde_json::Value::String(value_to_text(&value)));
            let clause = format!(
                "{}::{} {} ${}::{}",
                column, cast, operator, param_offset, cast
            );
            *param_offset += 1;

            Ok((clause, params))
        }
        ConditionOperator::Contains | ConditionOperator::StartsWith | ConditionOperator::EndsWith => {
            let (column, value) = binary_operands(op, alias)?;
            let value_str = value
                .as_str()
                .ok_or_else(|| format!("{:?} value must be a string", op.op))?;

            let escaped = escape_like(value_str);
            let pattern = match op.op {
                ConditionOperator::Contains => format!("%{}%", escaped),
                ConditionOperator::StartsWith => format!("{}%", escaped),
                _ => format!("%{}", escaped),
            };
            params.push(serde_json::Value::String(pattern));

            let clause = format!("{}::text LIKE ${}::text", column, param_offset);
            *param_offset += 1;

            Ok((clause, params))
        }
        ConditionOperator::In | ConditionOperator::NotIn => {
            let (column, value) = binary_operands(op, alias)?;
            let values = value
                .as_array()
                .ok_or_else(|| format!("{:?} operation requires an array value", op.op))?;

            params.push(serde_json::Value::String(
                serde_json::Value::Array(values.clone()).to_string(),
            ));

            let membership = format!(
                "{}::text = ANY(SELECT jsonb_array_elements_text(${}::jsonb))",
                column, param_offset
            );
            *param_offset += 1;

            let clause = if op.op == ConditionOperator::In {
                membership
            } else {
                format!("NOT ({})", membership)
            };
            Ok((clause, params))
        }
        ConditionOperator::IsEmpty => {
            let column = unary_operand(op, alias)?;
            Ok((format!("({col} IS NULL OR {col}::text = '')", col = column), params))
        }
        ConditionOperator::IsNotEmpty => {
            let column = unary_operand(op, alias)?;
            Ok((
                format!("({col} IS NOT NULL AND {col}::text != '')", col = column),
                params,
            ))
        }
        ConditionOperator::IsDefined => {
            let column = unary_operand(op, alias)?;
            Ok((format!("{} IS NOT NULL", column), params))
        }
        ConditionOperator::Length => {
            Err("LENGTH operator must be used within a comparison".to_string())
        }
    }
}

/// `t."name"` for a validated, undotted field
pub fn column_sql(alias: &str, field: &str) -> Result<String, String> {
    if field.contains('.') {
        return Err(format!(
            "Field '{}' reaches into a relation; only search and sort can traverse relations",
            field
        ));
    }
    validate_column_name(field)?;
    Ok(format!("{}.{}", alias, quote_identifier(field)))
}

fn binary_operands(
    op: &ConditionOperation,
    alias: &str,
) -> Result<(String, serde_json::Value), String> {
    if op.arguments.len() != 2 {
        return Err(format!("{:?} operation requires exactly 2 arguments", op.op));
    }
    let field = extract_field_from_argument(&op.arguments[0])?;
    let value = extract_value_from_argument(&op.arguments[1])?;
    Ok((column_sql(alias, &field)?, value))
}

fn unary_operand(op: &ConditionOperation, alias: &str) -> Result<String, String> {
    if op.arguments.len() != 1 {
        return Err(format!("{:?} operation requires exactly 1 argument", op.op));
    }
    let field = extract_field_from_argument(&op.arguments[0])?;
    column_sql(alias, &field)
}

fn extract_field_from_argument(arg: &ConditionArgument) -> Result<String, String> {
    match arg {
        ConditionArgument::Value(mapping_value) => extract_field_from_mapping(mapping_value),
        ConditionArgument::Expression(_) => {
            Err("Expected a field reference, got an expression".to_string())
        }
    }
}

fn extract_value_from_argument(arg: &ConditionArgument) -> Result<serde_json::Value, String> {
    match arg {
        ConditionArgument::Value(MappingValue::Immediate(imm)) => Ok(imm.value.clone()),
        ConditionArgument::Value(MappingValue::Reference(_)) => {
            Err("Comparing two fields is not supported".to_string())
        }
        ConditionArgument::Value(MappingValue::Composite(_)) => {
            Err("Composite values are not supported in filter conditions".to_string())
        }
        ConditionArgument::Expression(_) => Err("Expected a value, got an expression".to_string()),
    }
}

fn extract_field_from_mapping(mapping_value: &MappingValue) -> Result<String, String> {
    match mapping_value {
        MappingValue::Reference(ref_val) => Ok(ref_val.value.clone()),
        MappingValue::Immediate(imm) => imm
            .value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "Expected a field name string".to_string()),
        MappingValue::Composite(_) => {
            Err("Composite values are not supported as field references".to_string())
        }
    }
}
