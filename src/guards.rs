//! mixin 守卫求值。
//!
//! `default()` 不在单个候选内直接给出布尔值：整组守卫分别在 `default()` 为假、为真
//! 两种假设下各求值一次，两次结果组合成 [`GuardVerdict`]，最终取舍交给候选筛选阶段。

use crate::ast::{Comparison, Condition};
use crate::error::LessResult;
use crate::expression::ExpressionEvaluator;
use crate::scope::{ScopeArena, ScopeId};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Use,
    DoNotUse,
    /// 只有没有其他候选匹配时才使用。
    UseAsDefault,
    /// 只有存在其他匹配的候选时才使用，对应 `not (default())`。
    UseUnlessDefault,
}

impl GuardVerdict {
    /// 由 `default()` 取假、取真两轮的求值结果构造。
    pub fn from_outcomes(when_not_default: bool, when_default: bool) -> Self {
        match (when_not_default, when_default) {
            (true, true) => GuardVerdict::Use,
            (false, true) => GuardVerdict::UseAsDefault,
            (true, false) => GuardVerdict::UseUnlessDefault,
            (false, false) => GuardVerdict::DoNotUse,
        }
    }

    pub fn outcomes(self) -> (bool, bool) {
        match self {
            GuardVerdict::Use => (true, true),
            GuardVerdict::UseAsDefault => (false, true),
            GuardVerdict::UseUnlessDefault => (true, false),
            GuardVerdict::DoNotUse => (false, false),
        }
    }

    pub fn and(self, other: GuardVerdict) -> GuardVerdict {
        let (left_plain, left_default) = self.outcomes();
        let (right_plain, right_default) = other.outcomes();
        GuardVerdict::from_outcomes(left_plain && right_plain, left_default && right_default)
    }
}

/// 守卫求值器，只读访问作用域。
pub struct GuardsValidator<'a> {
    scopes: &'a ScopeArena,
}

impl<'a> GuardsValidator<'a> {
    pub fn new(scopes: &'a ScopeArena) -> Self {
        Self { scopes }
    }

    /// 对命名空间守卫与 mixin 自身守卫做与运算，每个守卫在各自的作用域中求值。
    pub fn evaluate_guards(&self, guards: &[(&Condition, ScopeId)]) -> LessResult<GuardVerdict> {
        let mut verdict = GuardVerdict::Use;
        for (condition, scope) in guards {
            verdict = verdict.and(self.evaluate_guard(condition, *scope)?);
            if verdict == GuardVerdict::DoNotUse {
                break;
            }
        }
        Ok(verdict)
    }

    pub fn evaluate_guard(&self, condition: &Condition, scope: ScopeId) -> LessResult<GuardVerdict> {
        let plain = ExpressionEvaluator::new(self.scopes, scope).with_default(false);
        let when_not_default = evaluate_condition(&plain, condition)?;
        let assumed = ExpressionEvaluator::new(self.scopes, scope).with_default(true);
        let when_default = evaluate_condition(&assumed, condition)?;
        Ok(GuardVerdict::from_outcomes(when_not_default, when_default))
    }

    /// 规则集上的 CSS 守卫没有候选竞争，只有 `Use` 才输出。
    pub fn allows_ruleset(&self, condition: &Condition, scope: ScopeId) -> LessResult<bool> {
        Ok(self.evaluate_guard(condition, scope)? == GuardVerdict::Use)
    }
}

/// 短路求值的布尔条件。
pub fn evaluate_condition(
    evaluator: &ExpressionEvaluator<'_>,
    condition: &Condition,
) -> LessResult<bool> {
    match condition {
        Condition::Truthy(expression) => Ok(evaluator.evaluate(expression)?.is_true()),
        Condition::Compare { op, lhs, rhs } => {
            let lhs = evaluator.evaluate(lhs)?;
            let rhs = evaluator.evaluate(rhs)?;
            let ordering = lhs.compare(&rhs);
            Ok(match op {
                Comparison::Equal => ordering == Some(Ordering::Equal),
                Comparison::Greater => ordering == Some(Ordering::Greater),
                Comparison::Less => ordering == Some(Ordering::Less),
                Comparison::GreaterOrEqual => {
                    matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
                }
                Comparison::LessOrEqual => {
                    matches!(ordering, Some(Ordering::Less | Ordering::Equal))
                }
            })
        }
        Condition::Not(inner) => Ok(!evaluate_condition(evaluator, inner)?),
        Condition::And(left, right) => {
            Ok(evaluate_condition(evaluator, left)? && evaluate_condition(evaluator, right)?)
        }
        Condition::Or(left, right) => {
            Ok(evaluate_condition(evaluator, left)? || evaluate_condition(evaluator, right)?)
        }
    }
}
