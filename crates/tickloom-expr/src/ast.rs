//! The whitelisted AST and the value model.
//!
//! The node set below is the entire language. There is no dynamic name
//! binding, no loops, no user functions, no attribute lookup on opaque
//! objects — an expression that parses is an expression the evaluator
//! can run inside its budget with no way to touch the outside world.
//! Removing capabilities here is what removes the need for any sandbox
//! at evaluation time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A runtime value.
///
/// `Record` exists for fixed-shape data samples ("mem.used"); records
/// nest, but their shape comes from the producer, not the expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// The type-appropriate zero used for render-path degradation.
    pub fn zero_like(&self) -> Value {
        match self {
            Value::Number(_) => Value::Number(0.0),
            Value::Bool(_) => Value::Bool(false),
            Value::Text(_) => Value::Text(String::new()),
            Value::Record(_) => Value::Record(BTreeMap::new()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Record(_) => "record",
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// An expression node. The compiled AST is immutable.
///
/// Variables are resolved to indices at compile time ([`Expr::Var`]
/// holds an index into the declared-variable table), so evaluation
/// never does a name lookup.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Bool(bool),
    Text(String),
    /// Index into the compiled expression's variable table.
    Var(usize),
    /// Field access on a record value.
    Field(Box<Expr>, String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `cond ? then : else`
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Call of a whitelisted function.
    Call(Func, Vec<Expr>),
}

impl Expr {
    /// Number of nodes in this subtree, used for the memory budget.
    pub(crate) fn node_count(&self) -> usize {
        1 + match self {
            Expr::Number(_) | Expr::Bool(_) | Expr::Text(_) | Expr::Var(_) => 0,
            Expr::Field(inner, _) => inner.node_count(),
            Expr::Unary(_, inner) => inner.node_count(),
            Expr::Binary(_, a, b) => a.node_count() + b.node_count(),
            Expr::Ternary(c, a, b) => {
                c.node_count() + a.node_count() + b.node_count()
            }
            Expr::Call(_, args) => args.iter().map(Expr::node_count).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// The closed function library. Anything else fails at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func {
    Min,
    Max,
    Abs,
    Round,
    Floor,
    Ceil,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Log,
    Exp,
    Pow,
}

impl Func {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "min" => Self::Min,
            "max" => Self::Max,
            "abs" => Self::Abs,
            "round" => Self::Round,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "sqrt" => Self::Sqrt,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "log" => Self::Log,
            "exp" => Self::Exp,
            "pow" => Self::Pow,
            _ => return None,
        })
    }

    /// `(min_args, max_args)` — `min`/`max` fold over two or more.
    pub(crate) fn arity(&self) -> (usize, usize) {
        match self {
            Self::Min | Self::Max => (2, usize::MAX),
            Self::Pow => (2, 2),
            _ => (1, 1),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Sqrt => "sqrt",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Log => "log",
            Self::Exp => "exp",
            Self::Pow => "pow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_zero_like_matches_type() {
        assert_eq!(Value::Number(5.0).zero_like(), Value::Number(0.0));
        assert_eq!(Value::Bool(true).zero_like(), Value::Bool(false));
        assert_eq!(Value::Text("x".into()).zero_like(), Value::Text("".into()));
    }

    #[test]
    fn test_func_lookup_covers_whitelist_only() {
        assert!(Func::from_name("sqrt").is_some());
        assert!(Func::from_name("eval").is_none());
        assert!(Func::from_name("open").is_none());
        assert!(Func::from_name("getattr").is_none());
    }

    #[test]
    fn test_node_count() {
        // 1 + 2 * 3 → Binary(Add, 1, Binary(Mul, 2, 3)) = 5 nodes
        let ast = Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Number(1.0)),
            Box::new(Expr::Binary(
                BinOp::Mul,
                Box::new(Expr::Number(2.0)),
                Box::new(Expr::Number(3.0)),
            )),
        );
        assert_eq!(ast.node_count(), 5);
    }
}
