use crate::ast::{Expression, Operator};
use crate::error::{LessError, LessResult};
use crate::scope::{ScopeArena, ScopeId};
use crate::value::{DetachedRuleset, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::rc::Rc;

static INTERPOLATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@\{([\w-]+)\}").expect("插值正则编译失败"));

/// 在给定作用域中对表达式求值，只读访问作用域。
pub struct ExpressionEvaluator<'a> {
    scopes: &'a ScopeArena,
    scope: ScopeId,
    default_value: Option<bool>,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(scopes: &'a ScopeArena, scope: ScopeId) -> Self {
        Self {
            scopes,
            scope,
            default_value: None,
        }
    }

    /// 守卫求值时为 `default()` 指定本轮取值。
    pub fn with_default(mut self, value: bool) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn evaluate(&self, expression: &Expression) -> LessResult<Value> {
        match expression {
            Expression::Number { value, unit } => Ok(Value::number(*value, unit.clone())),
            Expression::Keyword(text) => Ok(Value::Keyword(text.clone())),
            Expression::Quoted {
                text,
                quote,
                escaped,
            } => {
                let text = self.interpolate(text)?;
                if *escaped {
                    Ok(Value::keyword(text))
                } else {
                    Ok(Value::Quoted {
                        text,
                        quote: *quote,
                    })
                }
            }
            Expression::Variable(name) => self.lookup(name),
            Expression::Negate(inner) => negate(self.evaluate(inner)?),
            Expression::Operation { op, lhs, rhs } => {
                apply_operator(self.evaluate(lhs)?, *op, self.evaluate(rhs)?)
            }
            Expression::List { separator, items } => {
                let items = items
                    .iter()
                    .map(|item| self.evaluate(item))
                    .collect::<LessResult<Vec<_>>>()?;
                Ok(Value::List {
                    separator: *separator,
                    items,
                })
            }
            Expression::Function { name, args } => {
                if name == "default" && args.is_empty() {
                    return self
                        .default_value
                        .map(Value::boolean)
                        .ok_or_else(|| LessError::eval("default() 只能在 mixin 守卫中使用"));
                }
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<LessResult<Vec<_>>>()?;
                Ok(Value::Function {
                    name: name.clone(),
                    args,
                })
            }
            Expression::DetachedRuleset(body) => Ok(Value::Ruleset(DetachedRuleset {
                body: Rc::clone(body),
                scope: self.scope,
            })),
        }
    }

    pub fn lookup(&self, name: &str) -> LessResult<Value> {
        self.scopes
            .lookup_variable(self.scope, name)
            .cloned()
            .ok_or_else(|| LessError::eval(format!("未定义的变量 @{name}")))
    }

    /// 替换文本中的 `@{name}`，字符串变量取其内容。
    pub fn interpolate(&self, text: &str) -> LessResult<String> {
        if !text.contains("@{") {
            return Ok(text.to_string());
        }
        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for caps in INTERPOLATION_RE.captures_iter(text) {
            let (Some(matched), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            output.push_str(&text[last..matched.start()]);
            match self.lookup(name.as_str())? {
                Value::Quoted { text, .. } => output.push_str(&text),
                other => output.push_str(&other.to_string()),
            }
            last = matched.end();
        }
        output.push_str(&text[last..]);
        Ok(output)
    }
}

fn negate(value: Value) -> LessResult<Value> {
    match value {
        Value::Number(mut quantity) => {
            quantity.value = -quantity.value;
            Ok(Value::Number(quantity))
        }
        Value::Keyword(text) => Ok(Value::Keyword(format!("-{text}"))),
        other => Err(LessError::eval(format!("无法对 {other} 取负"))),
    }
}

fn apply_operator(lhs: Value, op: Operator, rhs: Value) -> LessResult<Value> {
    let (Value::Number(left), Value::Number(right)) = (&lhs, &rhs) else {
        return Err(LessError::eval(format!(
            "无法对非数值进行运算: {lhs} {op} {rhs}"
        )));
    };
    // 单位取左侧，左侧无单位时沿用右侧
    let unit = if left.unit.is_empty() {
        right.unit.clone()
    } else {
        left.unit.clone()
    };
    let value = match op {
        Operator::Add => left.value + right.value,
        Operator::Subtract => left.value - right.value,
        Operator::Multiply => left.value * right.value,
        Operator::Divide => {
            if right.value.abs() < f64::EPSILON {
                return Err(LessError::eval("除法分母不能为 0"));
            }
            left.value / right.value
        }
    };
    Ok(Value::number(value, unit))
}
