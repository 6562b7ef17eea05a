//! Tree-walking evaluator with a deterministic step budget.
//!
//! The budget is counted in evaluation steps, not wall time: a step
//! counter is deterministic across machines and runs, while a wall
//! clock would make the same expression pass on a fast core and fail on
//! a slow one — which would leak timing into trigger decisions. The
//! configured nanosecond budget is converted to steps once, up front.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::ast::{BinOp, Expr, Func, UnaryOp, Value};
use crate::parser::CompiledExpr;
use crate::ExprError;

/// Rough cost model: one evaluation step ≈ 10 ns of work.
const NANOS_PER_STEP: u64 = 10;

/// Floor so tiny budgets still evaluate trivial expressions.
const MIN_STEPS: u64 = 1024;

/// Evaluates compiled expressions against per-call bindings.
///
/// The evaluator is stateless apart from a degradation counter, so one
/// instance can serve every call site. Bindings are a slice aligned
/// with the expression's declared-variable table.
#[derive(Debug)]
pub struct Evaluator {
    step_budget: u64,
    /// Render-path evaluations that degraded to a typed zero.
    degraded: AtomicU64,
}

impl Evaluator {
    /// Creates an evaluator whose per-call step budget approximates the
    /// given wall budget in nanoseconds.
    pub fn new(time_budget_ns: u64) -> Self {
        Self {
            step_budget: (time_budget_ns / NANOS_PER_STEP).max(MIN_STEPS),
            degraded: AtomicU64::new(0),
        }
    }

    /// Evaluates to any [`Value`].
    ///
    /// # Errors
    /// [`ExprError::Eval`] on type or domain problems,
    /// [`ExprError::BudgetExhausted`] if the step budget runs out,
    /// [`ExprError::MissingBinding`] if `bindings` is shorter than the
    /// expression's variable table.
    pub fn eval(
        &self,
        expr: &CompiledExpr,
        bindings: &[Value],
    ) -> Result<Value, ExprError> {
        if bindings.len() < expr.vars.len() {
            let missing = &expr.vars[bindings.len()];
            return Err(ExprError::MissingBinding(missing.clone()));
        }
        let mut steps = self.step_budget;
        eval_node(&expr.ast, bindings, &mut steps)
    }

    /// Evaluates expecting a number.
    pub fn eval_number(
        &self,
        expr: &CompiledExpr,
        bindings: &[Value],
    ) -> Result<f64, ExprError> {
        match self.eval(expr, bindings)? {
            Value::Number(n) => Ok(n),
            other => Err(ExprError::Eval(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }

    /// Evaluates expecting a bool.
    pub fn eval_bool(
        &self,
        expr: &CompiledExpr,
        bindings: &[Value],
    ) -> Result<bool, ExprError> {
        match self.eval(expr, bindings)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::Eval(format!(
                "expected bool, got {}",
                other.type_name()
            ))),
        }
    }

    /// Render-path evaluation: any failure degrades to `0.0` and bumps
    /// the degradation counter instead of propagating.
    pub fn eval_number_or_zero(
        &self,
        expr: &CompiledExpr,
        bindings: &[Value],
    ) -> f64 {
        match self.eval_number(expr, bindings) {
            Ok(n) if n.is_finite() => n,
            Ok(_) => {
                self.note_degraded("non-finite result");
                0.0
            }
            Err(err) => {
                self.note_degraded(&err.to_string());
                0.0
            }
        }
    }

    /// Render-path evaluation: any failure degrades to `false`.
    pub fn eval_bool_or_false(
        &self,
        expr: &CompiledExpr,
        bindings: &[Value],
    ) -> bool {
        match self.eval_bool(expr, bindings) {
            Ok(b) => b,
            Err(err) => {
                self.note_degraded(&err.to_string());
                false
            }
        }
    }

    /// How many render-path evaluations degraded to a typed zero.
    pub fn degraded_count(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    fn note_degraded(&self, reason: &str) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(reason, "expression degraded to typed zero");
    }
}

impl Default for Evaluator {
    /// 10 ms budget, the documented per-evaluation cap.
    fn default() -> Self {
        Self::new(10_000_000)
    }
}

fn charge(steps: &mut u64) -> Result<(), ExprError> {
    if *steps == 0 {
        return Err(ExprError::BudgetExhausted);
    }
    *steps -= 1;
    Ok(())
}

fn eval_node(
    node: &Expr,
    bindings: &[Value],
    steps: &mut u64,
) -> Result<Value, ExprError> {
    charge(steps)?;
    match node {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Var(index) => Ok(bindings[*index].clone()),
        Expr::Field(inner, name) => {
            let value = eval_node(inner, bindings, steps)?;
            match value {
                Value::Record(fields) => {
                    fields.get(name).cloned().ok_or_else(|| {
                        ExprError::Eval(format!("record has no field `{name}`"))
                    })
                }
                other => Err(ExprError::Eval(format!(
                    "cannot access field `{name}` on {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Unary(op, inner) => {
            let value = eval_node(inner, bindings, steps)?;
            match (op, value) {
                (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (op, value) => Err(ExprError::Eval(format!(
                    "{op:?} is not defined on {}",
                    value.type_name()
                ))),
            }
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, bindings, steps),
        Expr::Ternary(cond, then, otherwise) => {
            match eval_node(cond, bindings, steps)? {
                Value::Bool(true) => eval_node(then, bindings, steps),
                Value::Bool(false) => eval_node(otherwise, bindings, steps),
                other => Err(ExprError::Eval(format!(
                    "conditional needs a bool, got {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Call(func, args) => eval_call(*func, args, bindings, steps),
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    bindings: &[Value],
    steps: &mut u64,
) -> Result<Value, ExprError> {
    // Short-circuit logic first: the right side may never run.
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = match eval_node(lhs, bindings, steps)? {
            Value::Bool(b) => b,
            other => {
                return Err(ExprError::Eval(format!(
                    "logic needs bools, got {}",
                    other.type_name()
                )));
            }
        };
        if (op == BinOp::And && !l) || (op == BinOp::Or && l) {
            return Ok(Value::Bool(l));
        }
        return match eval_node(rhs, bindings, steps)? {
            Value::Bool(r) => Ok(Value::Bool(r)),
            other => Err(ExprError::Eval(format!(
                "logic needs bools, got {}",
                other.type_name()
            ))),
        };
    }

    let l = eval_node(lhs, bindings, steps)?;
    let r = eval_node(rhs, bindings, steps)?;

    // Equality works across any matching value types.
    match op {
        BinOp::Eq => return Ok(Value::Bool(l == r)),
        BinOp::Ne => return Ok(Value::Bool(l != r)),
        _ => {}
    }

    let (a, b) = match (l, r) {
        (Value::Number(a), Value::Number(b)) => (a, b),
        (l, r) => {
            return Err(ExprError::Eval(format!(
                "{op:?} needs numbers, got {} and {}",
                l.type_name(),
                r.type_name()
            )));
        }
    };

    Ok(match op {
        BinOp::Add => Value::Number(a + b),
        BinOp::Sub => Value::Number(a - b),
        BinOp::Mul => Value::Number(a * b),
        BinOp::Div => Value::Number(a / b),
        BinOp::Mod => Value::Number(a % b),
        BinOp::Lt => Value::Bool(a < b),
        BinOp::Le => Value::Bool(a <= b),
        BinOp::Gt => Value::Bool(a > b),
        BinOp::Ge => Value::Bool(a >= b),
        BinOp::Eq | BinOp::Ne | BinOp::And | BinOp::Or => unreachable!(),
    })
}

fn eval_call(
    func: Func,
    args: &[Expr],
    bindings: &[Value],
    steps: &mut u64,
) -> Result<Value, ExprError> {
    let mut numbers = Vec::with_capacity(args.len());
    for arg in args {
        match eval_node(arg, bindings, steps)? {
            Value::Number(n) => numbers.push(n),
            other => {
                return Err(ExprError::Eval(format!(
                    "`{}` needs numbers, got {}",
                    func.name(),
                    other.type_name()
                )));
            }
        }
    }

    let result = match func {
        // Fold in argument order — a fixed reduction order keeps the
        // result identical everywhere.
        Func::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        Func::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Func::Abs => numbers[0].abs(),
        Func::Round => numbers[0].round(),
        Func::Floor => numbers[0].floor(),
        Func::Ceil => numbers[0].ceil(),
        Func::Sqrt => numbers[0].sqrt(),
        Func::Sin => numbers[0].sin(),
        Func::Cos => numbers[0].cos(),
        Func::Tan => numbers[0].tan(),
        Func::Log => numbers[0].ln(),
        Func::Exp => numbers[0].exp(),
        Func::Pow => numbers[0].powf(numbers[1]),
    };
    Ok(Value::Number(result))
}

// =========================================================================
// Tests
// =========================================================================
