use std::borrow::Cow;

use serde_json::Value;

use crate::ast::{CompareOp, Expr, Literal};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::EvalError;
use crate::parser::parse_condition;
use crate::state::State;

/// A value produced while evaluating a condition. `Undefined` is kept apart
/// from `null` because the two compare differently.
#[derive(Debug, Clone, PartialEq)]
enum Operand<'v> {
    Undefined,
    Value(Cow<'v, Value>),
}

impl Operand<'_> {
    fn truthy(&self) -> bool {
        match self {
            Self::Undefined => false,
            Self::Value(value) => match value.as_ref() {
                Value::Null => false,
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
                Value::String(s) => !s.is_empty(),
                Value::Array(_) | Value::Object(_) => true,
            },
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Value(value) => match value.as_ref() {
                Value::Null => 0.0,
                Value::Bool(b) => f64::from(u8::from(*b)),
                Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
                Value::String(s) => {
                    let s = s.trim();
                    if s.is_empty() {
                        0.0
                    } else {
                        s.parse().unwrap_or(f64::NAN)
                    }
                }
                Value::Array(_) | Value::Object(_) => f64::NAN,
            },
        }
    }

    fn is_nullish(&self) -> bool {
        match self {
            Self::Undefined => true,
            Self::Value(value) => value.is_null(),
        }
    }

    fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Value(a), Self::Value(b)) => match (a.as_ref(), b.as_ref()) {
                (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
                (a, b) => a == b,
            },
            (Self::Undefined, Self::Value(_)) | (Self::Value(_), Self::Undefined) => false,
        }
    }

    fn loose_eq(&self, other: &Self) -> bool {
        if self.is_nullish() || other.is_nullish() {
            return self.is_nullish() && other.is_nullish();
        }
        let (Self::Value(a), Self::Value(b)) = (self, other) else {
            return false;
        };
        match (a.as_ref(), b.as_ref()) {
            (Value::String(x), Value::String(y)) => x == y,
            (
                Value::Number(_) | Value::String(_) | Value::Bool(_),
                Value::Number(_) | Value::String(_) | Value::Bool(_),
            ) => self.to_number() == other.to_number(),
            (a, b) => a == b,
        }
    }

    fn ordering(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if let (Self::Value(a), Self::Value(b)) = (self, other) {
            if let (Value::String(x), Value::String(y)) = (a.as_ref(), b.as_ref()) {
                return Some(x.cmp(y));
            }
        }
        self.to_number().partial_cmp(&other.to_number())
    }
}

fn eval_expr<'v>(expr: &Expr<'_>, state: &'v State) -> Result<Operand<'v>, EvalError> {
    Ok(match expr {
        Expr::Literal(literal) => match literal {
            Literal::Number(n) => Operand::Value(Cow::Owned(Value::from(*n))),
            Literal::String(s) => Operand::Value(Cow::Owned(Value::String(s.to_string()))),
            Literal::Boolean(b) => Operand::Value(Cow::Owned(Value::Bool(*b))),
            Literal::Null => Operand::Value(Cow::Owned(Value::Null)),
            Literal::Undefined => Operand::Undefined,
        },
        Expr::Identifier { name } => match state.get(*name) {
            Some(value) => Operand::Value(Cow::Borrowed(value)),
            None => {
                return Err(EvalError::UndefinedIdentifier {
                    name: name.to_string(),
                });
            }
        },
        Expr::Not { operand } => {
            let truthy = eval_expr(operand, state)?.truthy();
            Operand::Value(Cow::Owned(Value::Bool(!truthy)))
        }
        // Short circuit, returning the deciding operand like the host language does.
        Expr::And { left, right } => {
            let left = eval_expr(left, state)?;
            if !left.truthy() {
                return Ok(left);
            }
            eval_expr(right, state)?
        }
        Expr::Or { left, right } => {
            let left = eval_expr(left, state)?;
            if left.truthy() {
                return Ok(left);
            }
            eval_expr(right, state)?
        }
        Expr::Compare { op, left, right } => {
            let left = eval_expr(left, state)?;
            let right = eval_expr(right, state)?;
            let result = match op {
                CompareOp::LooseEq => left.loose_eq(&right),
                CompareOp::LooseNe => !left.loose_eq(&right),
                CompareOp::StrictEq => left.strict_eq(&right),
                CompareOp::StrictNe => !left.strict_eq(&right),
                CompareOp::Lt => left.ordering(&right).is_some_and(|o| o.is_lt()),
                CompareOp::Le => left.ordering(&right).is_some_and(|o| o.is_le()),
                CompareOp::Gt => left.ordering(&right).is_some_and(|o| o.is_gt()),
                CompareOp::Ge => left.ordering(&right).is_some_and(|o| o.is_ge()),
            };
            Operand::Value(Cow::Owned(Value::Bool(result)))
        }
    })
}

/// Parses and evaluates `expression` against `state`, returning the
/// truthiness of the result.
///
/// # Errors
/// - If the expression does not parse.
/// - If it names an identifier that is not a key of `state`.
pub fn try_evaluate(expression: &str, state: &State) -> Result<bool, EvalError> {
    let expr = parse_condition(expression)?;
    Ok(eval_expr(&expr, state)?.truthy())
}

/// Evaluates a condition, reporting failures to `sink` and treating them as
/// `false`.
///
/// ```
/// use reweave::{evaluate, NullSink};
/// use serde_json::json;
///
/// let state = json!({ "score": 80 });
/// let state = state.as_object().unwrap();
/// assert!(evaluate("score > 75 && score <= 90", state, &NullSink));
/// assert!(!evaluate("score >", state, &NullSink));
/// ```
pub fn evaluate(expression: &str, state: &State, sink: &dyn DiagnosticSink) -> bool {
    match try_evaluate(expression, state) {
        Ok(result) => result,
        Err(error) => {
            sink.emit(&Diagnostic::ConditionFailed {
                expression: expression.trim().to_string(),
                message: error.to_string(),
            });
            false
        }
    }
}
