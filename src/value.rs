use crate::ast::{RuleBody, Separator};
use crate::scope::ScopeId;
use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::rc::Rc;

/// 求值后的表达式结果。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Quantity),
    Keyword(String),
    Quoted { text: String, quote: char },
    List {
        separator: Separator,
        items: Vec<Value>,
    },
    /// 未实现的函数原样透传，例如 `rgba(0, 0, 0, 0.2)`。
    Function { name: String, args: Vec<Value> },
    Ruleset(DetachedRuleset),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

/// 分离规则集：规则体加上定义它时的作用域。
#[derive(Debug, Clone)]
pub struct DetachedRuleset {
    pub body: Rc<Vec<RuleBody>>,
    pub scope: ScopeId,
}

impl PartialEq for DetachedRuleset {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.body, &other.body) && self.scope == other.scope
    }
}

impl Value {
    pub fn number(value: f64, unit: impl Into<String>) -> Self {
        Value::Number(Quantity {
            value,
            unit: unit.into(),
        })
    }

    pub fn keyword(text: impl Into<String>) -> Self {
        Value::Keyword(text.into())
    }

    pub fn boolean(value: bool) -> Self {
        Value::Keyword(if value { "true" } else { "false" }.to_string())
    }

    pub fn space_list(items: Vec<Value>) -> Self {
        Value::List {
            separator: Separator::Space,
            items,
        }
    }

    /// 守卫中只有关键字 `true` 被视为真。
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Keyword(text) if text == "true")
    }

    pub fn as_ruleset(&self) -> Option<&DetachedRuleset> {
        match self {
            Value::Ruleset(ruleset) => Some(ruleset),
            _ => None,
        }
    }

    /// 用于比较的文本：字符串去掉引号。
    fn comparable_text(&self) -> String {
        match self {
            Value::Quoted { text, .. } => text.clone(),
            other => other.to_string(),
        }
    }

    /// 数值按值比较（单位一致或一方无单位），其余类型只判断相等。
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if let (Value::Number(lhs), Value::Number(rhs)) = (self, other) {
            if lhs.unit == rhs.unit || lhs.unit.is_empty() || rhs.unit.is_empty() {
                return lhs.value.partial_cmp(&rhs.value);
            }
            return None;
        }
        if matches!(self, Value::Ruleset(_)) || matches!(other, Value::Ruleset(_)) {
            return if self == other {
                Some(Ordering::Equal)
            } else {
                None
            };
        }
        if self.comparable_text() == other.comparable_text() {
            Some(Ordering::Equal)
        } else {
            None
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(quantity) => f.write_str(&format_quantity(quantity)),
            Value::Keyword(text) => f.write_str(text),
            Value::Quoted { text, quote } => write!(f, "{quote}{text}{quote}"),
            Value::List { separator, items } => {
                let glue = match separator {
                    Separator::Space => " ",
                    Separator::Comma => ", ",
                    Separator::Slash => "/",
                };
                let parts = items.iter().map(ToString::to_string).collect::<Vec<_>>();
                f.write_str(&parts.join(glue))
            }
            Value::Function { name, args } => {
                let parts = args.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "{name}({})", parts.join(", "))
            }
            Value::Ruleset(_) => f.write_str("[detached ruleset]"),
        }
    }
}

pub(crate) fn format_quantity(quantity: &Quantity) -> String {
    let mut value = quantity.value;
    if value.abs() < 1e-9 {
        value = 0.0;
    }
    let mut formatted = format!("{value:.4}");
    while formatted.contains('.') && formatted.ends_with('0') {
        formatted.pop();
    }
    if formatted.ends_with('.') {
        formatted.pop();
    }
    if formatted == "-0" {
        formatted = "0".to_string();
    }
    if quantity.unit.is_empty() {
        formatted
    } else {
        format!("{formatted}{}", quantity.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_without_trailing_zeros() {
        assert_eq!(Value::number(9.0, "px").to_string(), "9px");
        assert_eq!(Value::number(0.75, "").to_string(), "0.75");
        assert_eq!(Value::number(-0.0000001, "em").to_string(), "0em");
    }

    #[test]
    fn unitless_numbers_compare_with_any_unit() {
        let ten_px = Value::number(10.0, "px");
        assert_eq!(ten_px.compare(&Value::number(2.0, "")), Some(Ordering::Greater));
        assert_eq!(ten_px.compare(&Value::number(10.0, "em")), None);
    }

    #[test]
    fn quoted_and_keyword_compare_by_text() {
        let quoted = Value::Quoted {
            text: "dark".into(),
            quote: '"',
        };
        assert_eq!(quoted.compare(&Value::keyword("dark")), Some(Ordering::Equal));
        assert_eq!(quoted.compare(&Value::keyword("light")), None);
    }

    #[test]
    fn lists_and_functions_render_like_css() {
        let shadow = Value::space_list(vec![
            Value::number(0.0, ""),
            Value::number(4.0, "px"),
            Value::Function {
                name: "rgba".into(),
                args: vec![
                    Value::number(0.0, ""),
                    Value::number(0.0, ""),
                    Value::number(0.0, ""),
                    Value::number(0.2, ""),
                ],
            },
        ]);
        assert_eq!(shadow.to_string(), "0 4px rgba(0, 0, 0, 0.2)");
    }
}
