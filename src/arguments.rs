//! 把调用实参绑定到 mixin 形参上。
//!
//! 实参在调用方作用域中求值一次后交给这里；参数作用域直接挂在定义所在作用域之下，
//! 默认值只能看到定义处的变量和排在前面的形参，看不到调用方的变量。

use crate::ast::{MixinDefinition, MixinParam};
use crate::error::{LessResult, MixinProblem};
use crate::expression::ExpressionEvaluator;
use crate::scope::{ScopeArena, ScopeId};
use crate::value::Value;
use std::cmp::Ordering;
use tracing::trace;

/// 已求值的调用实参。
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedArgument {
    pub name: Option<String>,
    pub value: Value,
}

impl EvaluatedArgument {
    pub fn positional(value: Value) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    /// 绑定成功，返回新建的参数作用域。
    Bound(ScopeId),
    /// 模式参数与实参不相等，候选静默落选。
    PatternMismatch,
    Rejected(MixinProblem),
}

pub fn bind_arguments(
    scopes: &mut ScopeArena,
    definition: &MixinDefinition,
    definition_scope: ScopeId,
    call_name: &str,
    args: &[EvaluatedArgument],
) -> LessResult<BindOutcome> {
    let mut slots: Vec<Option<Value>> = vec![None; definition.params.len()];

    for arg in args {
        let Some(name) = &arg.name else {
            continue;
        };
        let index = definition.params.iter().position(
            |param| matches!(param, MixinParam::Variable { name: param_name, .. } if param_name == name),
        );
        let Some(index) = index else {
            return Ok(BindOutcome::Rejected(MixinProblem::UnknownNamedArgument {
                call: call_name.to_string(),
                name: name.clone(),
            }));
        };
        if slots[index].is_some() {
            return Ok(BindOutcome::Rejected(arity_mismatch(definition, call_name, args.len())));
        }
        slots[index] = Some(arg.value.clone());
    }

    let mut positional = args
        .iter()
        .filter(|arg| arg.name.is_none())
        .map(|arg| arg.value.clone());
    let mut rest = Vec::new();
    for (index, param) in definition.params.iter().enumerate() {
        match param {
            MixinParam::Variable { .. } | MixinParam::Pattern(_) => {
                if slots[index].is_none() {
                    slots[index] = positional.next();
                }
            }
            MixinParam::Rest { .. } => rest.extend(positional.by_ref()),
        }
    }
    if positional.next().is_some() {
        return Ok(BindOutcome::Rejected(arity_mismatch(definition, call_name, args.len())));
    }

    for (param, slot) in definition.params.iter().zip(&slots) {
        match (param, slot) {
            (MixinParam::Pattern(pattern), Some(value)) => {
                let expected =
                    ExpressionEvaluator::new(scopes, definition_scope).evaluate(pattern)?;
                if expected.compare(value) != Some(Ordering::Equal) {
                    trace!(mixin = %definition.name, pattern = %expected, actual = %value, "pattern mismatch");
                    return Ok(BindOutcome::PatternMismatch);
                }
            }
            (MixinParam::Pattern(_), None)
            | (MixinParam::Variable { default: None, .. }, None) => {
                return Ok(BindOutcome::Rejected(arity_mismatch(definition, call_name, args.len())));
            }
            _ => {}
        }
    }

    let args_scope = scopes.create_child(definition_scope);
    let mut all_values = Vec::with_capacity(definition.params.len() + rest.len());
    for (param, slot) in definition.params.iter().zip(slots) {
        match param {
            MixinParam::Variable { name, default } => {
                let value = match (slot, default) {
                    (Some(value), _) => value,
                    (None, Some(default)) => {
                        ExpressionEvaluator::new(scopes, args_scope).evaluate(default)?
                    }
                    (None, None) => continue,
                };
                scopes.define_variable(args_scope, name.as_str(), value.clone());
                all_values.push(value);
            }
            MixinParam::Pattern(_) => all_values.extend(slot),
            MixinParam::Rest { name } => {
                if let Some(name) = name {
                    scopes.define_variable(args_scope, name.as_str(), Value::space_list(rest.clone()));
                }
                all_values.extend(rest.iter().cloned());
            }
        }
    }
    scopes.define_variable(args_scope, "arguments", Value::space_list(all_values));
    Ok(BindOutcome::Bound(args_scope))
}

/// 实参过多时报告形参个数，否则报告必填参数个数。
pub(crate) fn arity_mismatch(
    definition: &MixinDefinition,
    call_name: &str,
    actual: usize,
) -> MixinProblem {
    let expected = if actual > definition.positional_count() {
        definition.positional_count()
    } else {
        definition.required_count()
    };
    MixinProblem::ArgumentArityMismatch {
        call: call_name.to_string(),
        expected,
        actual,
    }
}
