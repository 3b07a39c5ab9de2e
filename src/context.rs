use crate::error::EvalError;
use serde_json::{Map, Value};

/// Named-value environment that template expressions are evaluated against.
///
/// Wraps the caller's JSON value. The renderer never mutates it; loop scopes
/// are created with [`Context::child`], which shallow-copies the top level so
/// a loop binding is visible only inside that iteration's body.
#[derive(Debug, Clone)]
pub struct Context {
    values: Value,
}

impl Context {
    pub fn new(values: Value) -> Self {
        Context { values }
    }

    /// Looks up a top-level identifier.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns a new scope with `name` additionally bound to `value`.
    ///
    /// A non-object context (the caller passed e.g. a bare array) turns into
    /// an object holding only the new binding.
    pub fn child(&self, name: &str, value: Value) -> Context {
        let mut values = match &self.values {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        values.insert(name.to_string(), value);
        Context {
            values: Value::Object(values),
        }
    }
}

/// Truthiness of a value, following the source dialect: `null`, `false`,
/// `0`, `""` and empty arrays are falsy; objects are always truthy.
pub fn value_to_boolean(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => {
            if n.is_i64() {
                n.as_i64().unwrap() != 0
            } else if n.is_u64() {
                n.as_u64().unwrap() != 0
            } else {
                n.as_f64().unwrap() != 0.
            }
        }
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(_) => true,
        Value::Null => false,
    }
}

/// Output form of a value. Strings are used verbatim, arrays concatenate
/// their elements (null elements become empty, as in a JS `join`), anything
/// else falls back to its JSON text.
pub fn value_to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(arr) => arr
            .iter()
            .map(|elem| match elem {
                Value::Null => String::new(),
                elem => value_to_display(elem),
            })
            .collect(),
        v => v.to_string(),
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOp {
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Negate,
}

pub fn compute_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Equal => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Less => compute_compare(left, right, |o| o == std::cmp::Ordering::Less),
        BinaryOp::LessEq => compute_compare(left, right, |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Greater => compute_compare(left, right, |o| o == std::cmp::Ordering::Greater),
        BinaryOp::GreaterEq => compute_compare(left, right, |o| o != std::cmp::Ordering::Less),
        BinaryOp::Add => compute_add(left, right),
        BinaryOp::Subtract => compute_arithmetic(left, right, "-", |a, b| a - b, |a, b| a - b),
        BinaryOp::Multiply => compute_arithmetic(left, right, "*", |a, b| a * b, |a, b| a * b),
        BinaryOp::Divide => compute_divide(left, right),
        BinaryOp::Modulo => compute_arithmetic(left, right, "%", |a, b| a % b, |a, b| a % b),
        // And/Or are short-circuited by the evaluator before reaching here.
        BinaryOp::And | BinaryOp::Or => unreachable!("logical ops are short-circuited"),
    }
}

pub fn compute_unary(op: UnaryOp, value: &Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value_to_boolean(value))),
        UnaryOp::Negate => match value {
            Value::Number(n) => {
                if n.is_i64() {
                    Ok(Value::from(-n.as_i64().unwrap()))
                } else {
                    Ok(Value::from(-n.as_f64().unwrap()))
                }
            }
            v => Err(EvalError::type_mismatch(format!(
                "cannot negate {}",
                type_name(v)
            ))),
        },
    }
}

// Numbers compare numerically so 1 and 1.0 are equal; everything else uses
// structural equality.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            l.as_f64().unwrap_or(f64::NAN) == r.as_f64().unwrap_or(f64::NAN)
        }
        (l, r) => l == r,
    }
}

fn compute_compare<Check>(left: &Value, right: &Value, check: Check) -> Result<Value, EvalError>
where
    Check: Fn(std::cmp::Ordering) -> bool,
{
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(Value::Bool(check(l.cmp(r)))),
        (Value::Number(l), Value::Number(r)) => {
            let l = l.as_f64().unwrap_or(f64::NAN);
            let r = r.as_f64().unwrap_or(f64::NAN);
            match l.partial_cmp(&r) {
                Some(ordering) => Ok(Value::Bool(check(ordering))),
                None => Ok(Value::Bool(false)),
            }
        }
        (l, r) => Err(EvalError::type_mismatch(format!(
            "cannot compare {} with {}",
            type_name(l),
            type_name(r)
        ))),
    }
}

// A string on either side makes + a concatenation, matching the template
// dialect's JS heritage. Two numbers add numerically.
fn compute_add(left: &Value, right: &Value) -> Result<Value, EvalError> {
    if left.is_string() || right.is_string() {
        return Ok(Value::from(format!(
            "{}{}",
            value_to_display(left),
            value_to_display(right)
        )));
    }

    compute_arithmetic(left, right, "+", |a, b| a + b, |a, b| a + b)
}

// Division always goes through f64, so 3 / 2 is 1.5 rather than 1.
fn compute_divide(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            let divisor = r.as_f64().unwrap_or(f64::NAN);
            if divisor == 0. {
                return Err(EvalError::type_mismatch("division by zero"));
            }
            Ok(Value::from(l.as_f64().unwrap_or(f64::NAN) / divisor))
        }
        (l, r) => Err(EvalError::type_mismatch(format!(
            "cannot apply / to {} and {}",
            type_name(l),
            type_name(r)
        ))),
    }
}

fn compute_arithmetic<IntOp, FloatOp>(
    left: &Value,
    right: &Value,
    symbol: &str,
    int_op: IntOp,
    float_op: FloatOp,
) -> Result<Value, EvalError>
where
    IntOp: Fn(i64, i64) -> i64,
    FloatOp: Fn(f64, f64) -> f64,
{
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            if l.is_i64() && r.is_i64() {
                Ok(Value::from(int_op(l.as_i64().unwrap(), r.as_i64().unwrap())))
            } else {
                Ok(Value::from(float_op(
                    l.as_f64().unwrap_or(f64::NAN),
                    r.as_f64().unwrap_or(f64::NAN),
                )))
            }
        }
        (l, r) => Err(EvalError::type_mismatch(format!(
            "cannot apply {} to {} and {}",
            symbol,
            type_name(l),
            type_name(r)
        ))),
    }
}

pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[test]
fn child_scope_does_not_leak() {
    let context = Context::new(serde_json::json!({ "a": 1 }));
    let scoped = context.child("item", Value::from("x"));

    assert_eq!(scoped.get("item"), Some(&Value::from("x")));
    assert_eq!(scoped.get("a"), Some(&Value::from(1)));
    assert_eq!(context.get("item"), None);
}

#[test]
fn child_scope_shadows_outer_binding() {
    let context = Context::new(serde_json::json!({ "item": "outer" }));
    let scoped = context.child("item", Value::from("inner"));

    assert_eq!(scoped.get("item"), Some(&Value::from("inner")));
    assert_eq!(context.get("item"), Some(&Value::from("outer")));
}

#[test]
fn truthiness_follows_source_dialect() {
    assert!(!value_to_boolean(&Value::Null));
    assert!(!value_to_boolean(&Value::from(0)));
    assert!(!value_to_boolean(&Value::from("")));
    assert!(!value_to_boolean(&Value::from(false)));
    assert!(!value_to_boolean(&serde_json::json!([])));
    assert!(value_to_boolean(&Value::from(0.5)));
    assert!(value_to_boolean(&serde_json::json!({})));
    assert!(value_to_boolean(&serde_json::json!(["a"])));
}

#[test]
fn display_concatenates_arrays() {
    let v = serde_json::json!(["a", 1, null, "b"]);
    assert_eq!(value_to_display(&v), "a1b");
}

#[test]
fn add_concatenates_when_either_side_is_string() {
    assert_eq!(
        compute_binary(BinaryOp::Add, &Value::from("$"), &Value::from(12)).unwrap(),
        Value::from("$12")
    );
    assert_eq!(
        compute_binary(BinaryOp::Add, &Value::from(1), &Value::from(2)).unwrap(),
        Value::from(3)
    );
}

#[test]
fn divide_is_floating_point() {
    assert_eq!(
        compute_binary(BinaryOp::Divide, &Value::from(3), &Value::from(2)).unwrap(),
        Value::from(1.5)
    );
    assert!(compute_binary(BinaryOp::Divide, &Value::from(3), &Value::from(0)).is_err());
}

#[test]
fn comparing_mixed_types_is_an_error() {
    assert!(compute_binary(BinaryOp::Less, &Value::from("a"), &Value::from(1)).is_err());
}
