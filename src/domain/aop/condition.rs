//! Decision-rule condition language
//!
//! Conditions are small boolean expressions evaluated against [`WorkflowData`] only:
//!
//! ```text
//! or_expr    := and_expr (("or" | "||") and_expr)*
//! and_expr   := not_expr (("and" | "&&") not_expr)*
//! not_expr   := ("not" | "!")* comparison
//! comparison := operand (("==" | "!=" | "<" | "<=" | ">" | ">=") operand)*
//! operand    := number | string | true | false | null | path | "(" or_expr ")"
//! path       := ident ("." ident)*
//! ```
//!
//! The grammar lives in `condition.pest`; parenthesised nesting is capped at
//! [`MAX_NESTING`] levels. `True`/`False`/`None` are accepted as aliases. Chained
//! comparisons (`0 < x <= 5`) hold when every adjacent pair holds. A bare operand is
//! tested for truthiness. When a number meets a string that parses as a number, both
//! sides compare numerically.

use std::cmp::Ordering;
use std::fmt;

use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::WorkflowData;

/// Errors raised while parsing or evaluating a condition
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

impl ConditionError {
    fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Variable(Vec<String>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
}

/// A parsed, sandboxed decision condition
///
/// Serializes back to the source text it was parsed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a condition from its source text
    pub fn parse(source: impl Into<String>) -> Result<Self, ConditionError> {
        let source = source.into();
        check_nesting(&source)?;

        let mut pairs = ConditionGrammar::parse(Rule::condition, &source).map_err(pest_error)?;
        let or_expr = pairs
            .next()
            .and_then(|condition| condition.into_inner().next())
            .ok_or_else(|| ConditionError::parse(0, "empty condition"))?;
        let expr = build_or(or_expr)?;

        Ok(Self { source, expr })
    }

    /// Condition text as written in the catalog
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate the condition against workflow data
    pub fn evaluate(&self, data: &WorkflowData) -> Result<bool, ConditionError> {
        eval(&self.expr, data).map(|v| truthy(&v))
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TryFrom<String> for Condition {
    type Error = ConditionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.source
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

// Parsing

/// Deepest parenthesised nesting accepted in a condition
pub const MAX_NESTING: usize = 64;

#[derive(Parser)]
#[grammar = "domain/aop/condition.pest"]
struct ConditionGrammar;

/// Reject sources whose parentheses nest deeper than [`MAX_NESTING`] before parsing
fn check_nesting(source: &str) -> Result<(), ConditionError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (position, c) in source.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(ConditionError::parse(position, "expression nested too deeply"));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Ok(())
}

fn pest_error(err: pest::error::Error<Rule>) -> ConditionError {
    let position = match err.location {
        InputLocation::Pos(position) => position,
        InputLocation::Span((start, _)) => start,
    };

    ConditionError::parse(position, err.variant.message())
}

/// Single operands stay as they are; longer chains become one n-ary node
fn join(mut operands: Vec<Expr>, node: fn(Vec<Expr>) -> Expr) -> Expr {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        node(operands)
    }
}

fn build_or(pair: Pair<'_, Rule>) -> Result<Expr, ConditionError> {
    let operands = pair
        .into_inner()
        .filter(|inner| inner.as_rule() == Rule::and_expr)
        .map(build_and)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(join(operands, Expr::Or))
}

fn build_and(pair: Pair<'_, Rule>) -> Result<Expr, ConditionError> {
    let operands = pair
        .into_inner()
        .filter(|inner| inner.as_rule() == Rule::not_expr)
        .map(build_not)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(join(operands, Expr::And))
}

fn build_not(pair: Pair<'_, Rule>) -> Result<Expr, ConditionError> {
    let position = pair.as_span().start();
    let mut negations = 0usize;
    let mut operand = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::not_op => negations += 1,
            _ => operand = Some(build_comparison(inner)?),
        }
    }

    let expr = operand.ok_or_else(|| ConditionError::parse(position, "expected a value"))?;

    // Only the parity of a `not` chain matters; `not not x` is the truthiness of x
    Ok(match negations {
        0 => expr,
        n if n % 2 == 1 => Expr::Not(Box::new(expr)),
        _ => Expr::Not(Box::new(Expr::Not(Box::new(expr)))),
    })
}

fn build_comparison(pair: Pair<'_, Rule>) -> Result<Expr, ConditionError> {
    let position = pair.as_span().start();
    let mut inner = pair.into_inner();

    let first = inner
        .next()
        .ok_or_else(|| ConditionError::parse(position, "expected a value"))?;
    let first = build_operand(first)?;
    let mut rest = Vec::new();

    while let Some(op) = inner.next() {
        let op_position = op.as_span().start();
        let op = CompareOp::from_symbol(op.as_str()).ok_or_else(|| {
            ConditionError::parse(op_position, format!("unknown operator '{}'", op.as_str()))
        })?;
        let operand = inner
            .next()
            .ok_or_else(|| ConditionError::parse(op_position, "expected a value"))?;

        rest.push((op, build_operand(operand)?));
    }

    if rest.is_empty() {
        Ok(first)
    } else {
        Ok(Expr::Compare {
            first: Box::new(first),
            rest,
        })
    }
}

fn build_operand(pair: Pair<'_, Rule>) -> Result<Expr, ConditionError> {
    let position = pair.as_span().start();

    match pair.as_rule() {
        Rule::number => parse_number(pair.as_str(), position).map(|n| Expr::Literal(Value::Number(n))),
        Rule::string => {
            let raw = pair.into_inner().next().map(|text| text.as_str()).unwrap_or_default();
            Ok(Expr::Literal(Value::String(unescape(raw))))
        }
        Rule::true_lit => Ok(Expr::Literal(Value::Bool(true))),
        Rule::false_lit => Ok(Expr::Literal(Value::Bool(false))),
        Rule::null_lit => Ok(Expr::Literal(Value::Null)),
        Rule::path => Ok(Expr::Variable(
            pair.as_str().split('.').map(str::to_string).collect(),
        )),
        Rule::or_expr => build_or(pair),
        other => Err(ConditionError::parse(
            position,
            format!("unexpected {:?}", other),
        )),
    }
}

fn parse_number(text: &str, position: usize) -> Result<serde_json::Number, ConditionError> {
    if !text.contains('.') {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(n.into());
        }
    }

    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .ok_or_else(|| ConditionError::parse(position, format!("invalid number '{}'", text)))
}

fn unescape(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some(other) => text.push(other),
            None => {}
        }
    }

    text
}

// Evaluation

fn eval(expr: &Expr, data: &WorkflowData) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(path) => lookup(path, data),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, data)?))),
        Expr::And(operands) => {
            for operand in operands {
                if !truthy(&eval(operand, data)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Expr::Or(operands) => {
            for operand in operands {
                if truthy(&eval(operand, data)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Expr::Compare { first, rest } => {
            let mut left = eval(first, data)?;

            for (op, operand) in rest {
                let right = eval(operand, data)?;

                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }

            Ok(Value::Bool(true))
        }
    }
}

fn lookup(path: &[String], data: &WorkflowData) -> Result<Value, ConditionError> {
    let unknown = || ConditionError::UnknownVariable(path.join("."));

    let (head, tail) = path.split_first().ok_or_else(unknown)?;
    let mut current = data.get(head).ok_or_else(unknown)?;

    for segment in tail {
        current = current.get(segment.as_str()).ok_or_else(unknown)?;
    }

    Ok(current.clone())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Numeric view of a pair: numbers as-is, numeric strings coerced when paired with a number
fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    fn as_number(value: &Value, other_is_number: bool) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if other_is_number => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    let left_num = left.is_number();
    let right_num = right.is_number();

    if !left_num && !right_num {
        return None;
    }

    Some((as_number(left, right_num)?, as_number(right, left_num)?))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    let ordering = if let Some((l, r)) = numeric_pair(left, right) {
        l.partial_cmp(&r)
    } else {
        match (left, right) {
            (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
            (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
            _ => None,
        }
    };

    let ordered = || {
        ordering.ok_or(ConditionError::TypeMismatch {
            op: op.symbol(),
            left: type_name(left),
            right: type_name(right),
        })
    };

    match op {
        CompareOp::Eq => Ok(ordering.map_or(left == right, |o| o == Ordering::Equal)),
        CompareOp::Ne => Ok(ordering.map_or(left != right, |o| o != Ordering::Equal)),
        CompareOp::Lt => Ok(ordered()? == Ordering::Less),
        CompareOp::Le => Ok(ordered()? != Ordering::Greater),
        CompareOp::Gt => Ok(ordered()? == Ordering::Greater),
        CompareOp::Ge => Ok(ordered()? != Ordering::Less),
    }
}
