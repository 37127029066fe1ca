use std::fmt::{self, Display};
use std::rc::Rc;

/// 表示一份完整的 LESS 样式表。
#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    pub imports: Vec<ImportStatement>,
    pub body: Vec<RuleBody>,
}

impl Stylesheet {
    pub fn new(imports: Vec<ImportStatement>, body: Vec<RuleBody>) -> Self {
        Self { imports, body }
    }
}

/// `@import` 只做原样透传，不加载文件。
#[derive(Debug, Clone, PartialEq)]
pub struct ImportStatement {
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub selectors: Vec<Selector>,
    /// CSS 守卫：`.a when (@mode = dark) { ... }`
    pub guard: Option<Condition>,
    pub body: Vec<RuleBody>,
}

impl RuleSet {
    /// 单一的 `.name` / `#name` 选择器可以被当作无参 mixin 或命名空间调用。
    pub fn mixin_name(&self) -> Option<&str> {
        match self.selectors.as_slice() {
            [selector] if is_simple_mixin_name(&selector.value) => Some(selector.value.as_str()),
            _ => None,
        }
    }
}

fn is_simple_mixin_name(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some('.') | Some('#'))
        && !value[1..].is_empty()
        && chars.all(|ch| ch.is_alphanumeric() || ch == '-' || ch == '_')
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtRule {
    pub name: String,
    pub params: String,
    pub body: Vec<RuleBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleBody {
    Declaration(Declaration),
    NestedRule(RuleSet),
    AtRule(AtRule),
    DetachedCall(DetachedCall),
    Variable(VariableDeclaration),
    MixinDefinition(Rc<MixinDefinition>),
    MixinCall(MixinCall),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub value: String,
}

impl Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// 附着在节点上的块注释，`leading` 位于节点之前，`trailing` 位于同一行之后。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comments {
    pub leading: Vec<String>,
    pub trailing: Vec<String>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.leading.is_empty() && self.trailing.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub value: Expression,
    pub important: bool,
    pub comments: Comments,
}

/// 未求值的表达式树。
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number { value: f64, unit: String },
    Keyword(String),
    Quoted {
        text: String,
        quote: char,
        escaped: bool,
    },
    Variable(String),
    Negate(Box<Expression>),
    Operation {
        op: Operator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    List {
        separator: Separator,
        items: Vec<Expression>,
    },
    Function {
        name: String,
        args: Vec<Expression>,
    },
    DetachedRuleset(Rc<Vec<RuleBody>>),
}

impl Expression {
    pub fn number(value: f64, unit: impl Into<String>) -> Self {
        Expression::Number {
            value,
            unit: unit.into(),
        }
    }

    pub fn keyword(text: impl Into<String>) -> Self {
        Expression::Keyword(text.into())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Space,
    Comma,
    Slash,
}

/// 守卫条件树。
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Truthy(Expression),
    Compare {
        op: Comparison,
        lhs: Expression,
        rhs: Expression,
    },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

/// mixin 定义：解析后即不可变，所有调用共享同一份 `Rc`。
#[derive(Debug, Clone, PartialEq)]
pub struct MixinDefinition {
    pub name: String,
    pub params: Vec<MixinParam>,
    pub guard: Option<Condition>,
    pub body: Vec<RuleBody>,
}

impl MixinDefinition {
    /// 由普通规则集生成的无参定义。
    pub fn from_ruleset(name: &str, rule: &RuleSet) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            guard: rule.guard.clone(),
            body: rule.body.clone(),
        }
    }

    pub fn has_rest(&self) -> bool {
        self.params
            .iter()
            .any(|param| matches!(param, MixinParam::Rest { .. }))
    }

    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|param| param.is_required()).count()
    }

    /// 不含剩余参数的参数个数。
    pub fn positional_count(&self) -> usize {
        self.params
            .iter()
            .filter(|param| !matches!(param, MixinParam::Rest { .. }))
            .count()
    }

    /// 按调用实参个数做的粗筛，具名实参等细节由参数绑定阶段校验。
    pub fn accepts_arity(&self, arity: usize) -> bool {
        arity >= self.required_count() && (self.has_rest() || arity <= self.positional_count())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MixinParam {
    Variable {
        name: String,
        default: Option<Expression>,
    },
    /// `@rest...` 或匿名的 `...`
    Rest { name: Option<String> },
    /// 按值匹配的模式参数，例如 `.m(dark; @color)` 中的 `dark`。
    Pattern(Expression),
}

impl MixinParam {
    pub fn is_required(&self) -> bool {
        match self {
            MixinParam::Variable { default, .. } => default.is_none(),
            MixinParam::Rest { .. } => false,
            MixinParam::Pattern(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixinCall {
    /// 命名空间路径，例如 `#ns > .m()` 对应 `["#ns", ".m"]`。
    pub path: Vec<String>,
    pub args: Vec<MixinArgument>,
    pub important: bool,
    pub comments: Comments,
}

impl MixinCall {
    pub fn display_name(&self) -> String {
        self.path.join(" > ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixinArgument {
    pub name: Option<String>,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetachedCall {
    pub name: String,
    pub comments: Comments,
}
