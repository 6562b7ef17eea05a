//! Reactive bindings: data samples and expressions driving animation
//! parameters.
//!
//! A binding connects one side of the data world to one animated
//! parameter:
//!
//! - **Data binding** — `source sample → mapping_expr → parameter`.
//!   The sample's value is bound to the variable `value` inside the
//!   mapping expression.
//! - **Expression binding** — `named variables → expr → parameter`,
//!   re-evaluated whenever one of its variables changes.
//!
//! Both run on the render path, so evaluation failures degrade to zero
//! through the evaluator's render-path helpers; a binding can slew a
//! gauge to zero, never stall a frame.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tickloom_anim::AnimId;
use tickloom_expr::{
    CompiledExpr, Evaluator, ExprCompiler, ExprLimits, Value,
};

use crate::ring::Sample;
use crate::DataError;

/// How a binding's value reaches the parameter.
///
/// `Direct` bypasses the evaluator entirely — the identity route for
/// hot paths like progress widgets fed straight from a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingRoute {
    /// Run the mapping expression.
    #[default]
    Evaluated,
    /// Use the sample value as-is (numbers only; anything else is 0).
    Direct,
}

/// A parameter value produced by a binding this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterUpdate {
    pub animation_id: AnimId,
    pub parameter: String,
    pub value: f64,
}

#[derive(Debug, Clone)]
struct DataBinding {
    source: String,
    animation_id: AnimId,
    parameter: String,
    route: BindingRoute,
    /// Compiled mapping; absent for `Direct` bindings.
    mapping: Option<Arc<CompiledExpr>>,
}

#[derive(Debug, Clone)]
struct ExpressionBinding {
    animation_id: AnimId,
    parameter: String,
    expr: Arc<CompiledExpr>,
}

/// Holds all bindings plus the latest value of every named variable.
///
/// Evaluation order is registration order, which is part of the
/// determinism contract — two bindings writing the same parameter
/// resolve last-writer-wins, identically on every run.
#[derive(Debug)]
pub struct BindingSet {
    compiler: ExprCompiler,
    evaluator: Evaluator,
    data_bindings: Vec<DataBinding>,
    expr_bindings: Vec<ExpressionBinding>,
    /// Latest observed value per variable name.
    vars: BTreeMap<String, Value>,
}

impl BindingSet {
    pub fn new(limits: ExprLimits, time_budget_ns: u64) -> Self {
        Self {
            compiler: ExprCompiler::new(limits),
            evaluator: Evaluator::new(time_budget_ns),
            data_bindings: Vec::new(),
            expr_bindings: Vec::new(),
            vars: BTreeMap::new(),
        }
    }

    /// Binds a data source to an animation parameter through a mapping
    /// expression. The sample value is available as `value`.
    ///
    /// # Errors
    /// [`DataError::BadMapping`] if the mapping fails to compile.
    pub fn bind_data(
        &mut self,
        source: impl Into<String>,
        animation_id: AnimId,
        parameter: impl Into<String>,
        mapping_expr: &str,
    ) -> Result<(), DataError> {
        let parameter = parameter.into();
        let mapping = self
            .compiler
            .compile(mapping_expr, &["value"])
            .map_err(|source_err| DataError::BadMapping {
                animation: animation_id.to_string(),
                parameter: parameter.clone(),
                source: source_err,
            })?;
        self.data_bindings.push(DataBinding {
            source: source.into(),
            animation_id,
            parameter,
            route: BindingRoute::Evaluated,
            mapping: Some(mapping),
        });
        Ok(())
    }

    /// Binds a data source directly (no evaluator on the hot path).
    pub fn bind_data_direct(
        &mut self,
        source: impl Into<String>,
        animation_id: AnimId,
        parameter: impl Into<String>,
    ) {
        self.data_bindings.push(DataBinding {
            source: source.into(),
            animation_id,
            parameter: parameter.into(),
            route: BindingRoute::Direct,
            mapping: None,
        });
    }

    /// Binds an expression over named variables to a parameter.
    ///
    /// # Errors
    /// [`DataError::BadMapping`] if the expression fails to compile
    /// against the declared variables.
    pub fn bind_expression(
        &mut self,
        animation_id: AnimId,
        parameter: impl Into<String>,
        expr: &str,
        variables: &[&str],
    ) -> Result<(), DataError> {
        let parameter = parameter.into();
        let compiled = self
            .compiler
            .compile(expr, variables)
            .map_err(|source_err| DataError::BadMapping {
                animation: animation_id.to_string(),
                parameter: parameter.clone(),
                source: source_err,
            })?;
        self.expr_bindings.push(ExpressionBinding {
            animation_id,
            parameter,
            expr: compiled,
        });
        Ok(())
    }

    /// Latest value of a variable, if any sample has arrived for it.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// All current variable values, keyed by name.
    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.vars
    }

    /// Absorbs drained samples and produces the tick's parameter
    /// updates: data bindings for sources that changed, then expression
    /// bindings whose variables changed.
    ///
    /// Returns the updates plus the set of changed variable names (the
    /// dependency manager wants the latter).
    pub fn apply_samples(
        &mut self,
        samples: &[Sample],
    ) -> (Vec<ParameterUpdate>, BTreeSet<String>) {
        let mut changed = BTreeSet::new();
        for sample in samples {
            self.vars
                .insert(sample.name.clone(), sample.value.to_expr_value());
            changed.insert(sample.name.clone());
        }
        if changed.is_empty() {
            return (Vec::new(), changed);
        }

        let mut updates = Vec::new();

        for binding in &self.data_bindings {
            if !changed.contains(&binding.source) {
                continue;
            }
            let Some(value) = self.vars.get(&binding.source) else {
                continue;
            };
            let number = match binding.route {
                BindingRoute::Direct => value.as_number().unwrap_or(0.0),
                BindingRoute::Evaluated => {
                    let mapping = binding
                        .mapping
                        .as_ref()
                        .expect("evaluated bindings always carry a mapping");
                    self.evaluator
                        .eval_number_or_zero(mapping, &[value.clone()])
                }
            };
            updates.push(ParameterUpdate {
                animation_id: binding.animation_id.clone(),
                parameter: binding.parameter.clone(),
                value: number,
            });
        }

        for binding in &self.expr_bindings {
            if !binding
                .expr
                .variables()
                .iter()
                .any(|v| changed.contains(v))
            {
                continue;
            }
            let bindings: Vec<Value> = binding
                .expr
                .variables()
                .iter()
                .map(|name| {
                    self.vars.get(name).cloned().unwrap_or(Value::Number(0.0))
                })
                .collect();
            let number =
                self.evaluator.eval_number_or_zero(&binding.expr, &bindings);
            updates.push(ParameterUpdate {
                animation_id: binding.animation_id.clone(),
                parameter: binding.parameter.clone(),
                value: number,
            });
        }

        (updates, changed)
    }

    /// Evaluates a trigger condition against the current variables.
    /// Render-path semantics: failures are `false`.
    pub fn eval_condition(&self, expr: &CompiledExpr) -> bool {
        let bindings: Vec<Value> = expr
            .variables()
            .iter()
            .map(|name| self.vars.get(name).cloned().unwrap_or(Value::Number(0.0)))
            .collect();
        self.evaluator.eval_bool_or_false(expr, &bindings)
    }

    /// Compiles a condition through the shared cache.
    ///
    /// # Errors
    /// Propagates the compile error untouched — condition registration
    /// is not on the render path.
    pub fn compile_condition(
        &mut self,
        expr: &str,
        variables: &[&str],
    ) -> Result<Arc<CompiledExpr>, tickloom_expr::ExprError> {
        self.compiler.compile(expr, variables)
    }

    /// Render-path degradations observed so far.
    pub fn degraded_count(&self) -> u64 {
        self.evaluator.degraded_count()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::SampleValue;

    fn set() -> BindingSet {
        BindingSet::new(ExprLimits::default(), 10_000_000)
    }

    fn sample(name: &str, v: f64, tick: u64) -> Sample {
        Sample::new(name, SampleValue::Number(v), tick).unwrap()
    }

    #[test]
    fn test_data_binding_maps_sample_to_parameter() {
        let mut bindings = set();
        bindings
            .bind_data("cpu", AnimId::new("gauge"), "progress", "value / 100")
            .unwrap();

        let (updates, changed) =
            bindings.apply_samples(&[sample("cpu", 42.0, 1)]);
        assert_eq!(changed.len(), 1);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].animation_id, AnimId::new("gauge"));
        assert_eq!(updates[0].parameter, "progress");
        assert_eq!(updates[0].value, 0.42);
    }

    #[test]
    fn test_direct_route_bypasses_evaluator() {
        let mut bindings = set();
        bindings.bind_data_direct("pct", AnimId::new("bar"), "progress");
        let (updates, _) = bindings.apply_samples(&[sample("pct", 0.7, 1)]);
        assert_eq!(updates[0].value, 0.7);
        assert_eq!(bindings.degraded_count(), 0);
    }

    #[test]
    fn test_unrelated_samples_produce_no_updates() {
        let mut bindings = set();
        bindings
            .bind_data("cpu", AnimId::new("gauge"), "progress", "value")
            .unwrap();
        let (updates, _) = bindings.apply_samples(&[sample("mem", 1.0, 1)]);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_expression_binding_combines_variables() {
        let mut bindings = set();
        bindings
            .bind_expression(
                AnimId::new("combined"),
                "progress",
                "(cpu + mem) / 200",
                &["cpu", "mem"],
            )
            .unwrap();

        bindings.apply_samples(&[sample("cpu", 50.0, 1)]);
        let (updates, _) = bindings.apply_samples(&[sample("mem", 150.0, 2)]);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].value, 1.0);
    }

    #[test]
    fn test_bad_mapping_is_rejected_at_bind_time() {
        let mut bindings = set();
        let err = bindings
            .bind_data("cpu", AnimId::new("g"), "p", "value +")
            .unwrap_err();
        assert!(matches!(err, DataError::BadMapping { .. }));
    }

    #[test]
    fn test_type_mismatch_degrades_to_zero() {
        let mut bindings = set();
        bindings
            .bind_data("label", AnimId::new("g"), "p", "value * 2")
            .unwrap();
        let text =
            Sample::new("label", SampleValue::Text("hot".into()), 1).unwrap();
        let (updates, _) = bindings.apply_samples(&[text]);
        assert_eq!(updates[0].value, 0.0);
        assert_eq!(bindings.degraded_count(), 1);
    }

    #[test]
    fn test_eval_condition_against_current_vars() {
        let mut bindings = set();
        let cond = bindings.compile_condition("cpu > 80", &["cpu"]).unwrap();
        bindings.apply_samples(&[sample("cpu", 75.0, 1)]);
        assert!(!bindings.eval_condition(&cond));
        bindings.apply_samples(&[sample("cpu", 85.0, 2)]);
        assert!(bindings.eval_condition(&cond));
    }

    #[test]
    fn test_condition_with_missing_variable_is_false() {
        let mut bindings = set();
        let cond = bindings.compile_condition("cpu > 80", &["cpu"]).unwrap();
        // cpu never sampled → binds to 0.0 → false, not an error.
        assert!(!bindings.eval_condition(&cond));
    }
}
