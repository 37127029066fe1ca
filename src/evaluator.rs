use crate::ast::{AtRule, Comments, Declaration, MixinDefinition, RuleBody, RuleSet, Stylesheet};
use crate::diagnostics::Diagnostics;
use crate::error::{LessError, LessResult};
use crate::expression::ExpressionEvaluator;
use crate::guards::GuardsValidator;
use crate::scope::{MixinEntry, ScopeArena, ScopeId};
use crate::value::Value;
use crate::CompileOptions;
use once_cell::sync::Lazy;
use regex::Regex;
use std::rc::Rc;

/// 经过语义求值后的规则信息。
#[derive(Debug, Clone)]
pub struct EvaluatedStylesheet {
    pub imports: Vec<String>,
    pub nodes: Vec<EvaluatedNode>,
}

#[derive(Debug, Clone)]
pub enum EvaluatedNode {
    Rule(EvaluatedRule),
    AtRule(EvaluatedAtRule),
}

#[derive(Debug, Clone)]
pub struct EvaluatedRule {
    pub selectors: Vec<String>,
    pub declarations: Vec<EvaluatedDeclaration>,
    pub comments: Comments,
}

#[derive(Debug, Clone)]
pub struct EvaluatedAtRule {
    pub name: String,
    pub params: String,
    pub declarations: Vec<EvaluatedDeclaration>,
    pub children: Vec<EvaluatedNode>,
    pub comments: Comments,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedDeclaration {
    pub name: String,
    pub value: String,
    pub important: bool,
    pub comments: Comments,
}

/// 展开 mixin 之后、扁平化选择器之前的节点树。选择器仍是相对父规则的写法。
#[derive(Debug, Clone, PartialEq)]
pub enum CssNode {
    Declaration(EvaluatedDeclaration),
    Rule(CssRule),
    AtRule(CssAtRule),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CssRule {
    pub selectors: Vec<String>,
    pub children: Vec<CssNode>,
    pub comments: Comments,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CssAtRule {
    pub name: String,
    pub params: String,
    pub children: Vec<CssNode>,
    pub comments: Comments,
}

impl CssNode {
    pub fn comments_mut(&mut self) -> &mut Comments {
        match self {
            CssNode::Declaration(decl) => &mut decl.comments,
            CssNode::Rule(rule) => &mut rule.comments,
            CssNode::AtRule(at_rule) => &mut at_rule.comments,
        }
    }
}

static AT_RULE_VARIABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@\{?([\w-]+)\}?").expect("at-rule 变量正则编译失败"));

/// 负责维护作用域、展开 mixin 与分离规则集并输出扁平化 CSS 规则。
pub struct Evaluator {
    pub(crate) scopes: ScopeArena,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) max_recursion_depth: usize,
    pub(crate) depth: usize,
}

impl Evaluator {
    pub fn new(options: &CompileOptions) -> Self {
        Self {
            scopes: ScopeArena::new(),
            diagnostics: Diagnostics::new(),
            max_recursion_depth: options.max_recursion_depth,
            depth: 0,
        }
    }

    pub fn evaluate(&mut self, stylesheet: Stylesheet) -> LessResult<EvaluatedStylesheet> {
        let root = self.scopes.root();
        let resolved = self.resolve_body(&stylesheet.body, root)?;
        let mut nodes = Vec::new();
        for node in resolved {
            match node {
                CssNode::Declaration(decl) => {
                    return Err(LessError::eval(format!(
                        "顶层声明 {} 无法附加到任何选择器",
                        decl.name
                    )));
                }
                CssNode::Rule(rule) => flatten_rule(rule, &[], &mut nodes),
                CssNode::AtRule(at_rule) => {
                    nodes.push(EvaluatedNode::AtRule(flatten_at_rule(at_rule, &[])));
                }
            }
        }
        let imports = stylesheet
            .imports
            .into_iter()
            .map(|import| import.raw)
            .collect();
        Ok(EvaluatedStylesheet { imports, nodes })
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// 在给定作用域中展开一段规则体。mixin 定义先整体登记，其余语句按顺序求值。
    pub(crate) fn resolve_body(
        &mut self,
        body: &[RuleBody],
        scope: ScopeId,
    ) -> LessResult<Vec<CssNode>> {
        self.hoist_mixins(body, scope);
        let mut nodes = Vec::new();
        for item in body {
            match item {
                RuleBody::Variable(var) => {
                    let value = ExpressionEvaluator::new(&self.scopes, scope).evaluate(&var.value)?;
                    self.scopes.define_variable(scope, var.name.as_str(), value);
                }
                RuleBody::Declaration(decl) => {
                    let evaluated = self.eval_declaration(decl, scope)?;
                    nodes.push(CssNode::Declaration(evaluated));
                }
                RuleBody::NestedRule(rule) => {
                    if let Some(node) = self.resolve_ruleset(rule, scope)? {
                        nodes.push(node);
                    }
                }
                RuleBody::AtRule(at_rule) => {
                    nodes.push(self.resolve_at_rule(at_rule, scope)?);
                }
                RuleBody::MixinDefinition(_) => {}
                RuleBody::MixinCall(call) => {
                    nodes.extend(self.resolve_mixin_call(call, scope)?);
                }
                RuleBody::DetachedCall(call) => {
                    nodes.extend(self.resolve_detached_call(call, scope)?);
                }
            }
        }
        Ok(nodes)
    }

    /// 登记规则体中的 mixin；只有单一类名或 id 选择器的规则集同时作为无参 mixin 登记。
    pub(crate) fn hoist_mixins(&mut self, body: &[RuleBody], scope: ScopeId) {
        for item in body {
            let definition = match item {
                RuleBody::MixinDefinition(definition) => Rc::clone(definition),
                RuleBody::NestedRule(rule) => match rule.mixin_name() {
                    Some(name) => Rc::new(MixinDefinition::from_ruleset(name, rule)),
                    None => continue,
                },
                _ => continue,
            };
            self.scopes.define_mixin(scope, MixinEntry { definition, scope });
        }
    }

    fn resolve_ruleset(&mut self, rule: &RuleSet, scope: ScopeId) -> LessResult<Option<CssNode>> {
        if let Some(guard) = &rule.guard {
            if !GuardsValidator::new(&self.scopes).allows_ruleset(guard, scope)? {
                return Ok(None);
            }
        }
        let selectors = {
            let evaluator = ExpressionEvaluator::new(&self.scopes, scope);
            rule.selectors
                .iter()
                .map(|selector| evaluator.interpolate(&selector.value))
                .collect::<LessResult<Vec<_>>>()?
        };
        let child = self.scopes.create_child(scope);
        let children = self.resolve_body(&rule.body, child)?;
        Ok(Some(CssNode::Rule(CssRule {
            selectors,
            children,
            comments: Comments::default(),
        })))
    }

    fn resolve_at_rule(&mut self, at_rule: &AtRule, scope: ScopeId) -> LessResult<CssNode> {
        let params = self.substitute_params(&at_rule.params, scope);
        let child = self.scopes.create_child(scope);
        let children = self.resolve_body(&at_rule.body, child)?;
        Ok(CssNode::AtRule(CssAtRule {
            name: at_rule.name.clone(),
            params,
            children,
            comments: Comments::default(),
        }))
    }

    /// `@media (min-width: @bp)` 这类参数中的变量按当前作用域替换，未定义的保持原样。
    fn substitute_params(&self, params: &str, scope: ScopeId) -> String {
        if !params.contains('@') {
            return params.to_string();
        }
        let mut output = String::with_capacity(params.len());
        let mut last = 0;
        for caps in AT_RULE_VARIABLE_RE.captures_iter(params) {
            let (Some(matched), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Some(value) = self.scopes.lookup_variable(scope, name.as_str()) else {
                continue;
            };
            output.push_str(&params[last..matched.start()]);
            match value {
                Value::Quoted { text, .. } => output.push_str(text),
                other => output.push_str(&other.to_string()),
            }
            last = matched.end();
        }
        output.push_str(&params[last..]);
        output
    }

    fn eval_declaration(
        &self,
        decl: &Declaration,
        scope: ScopeId,
    ) -> LessResult<EvaluatedDeclaration> {
        let evaluator = ExpressionEvaluator::new(&self.scopes, scope);
        let name = evaluator.interpolate(&decl.name)?.trim().to_string();
        let value = evaluator.evaluate(&decl.value)?;
        if matches!(value, Value::Ruleset(_)) {
            return Err(LessError::eval(format!(
                "分离规则集不能作为属性 {name} 的值"
            )));
        }
        Ok(EvaluatedDeclaration {
            name,
            value: value.to_string(),
            important: decl.important,
            comments: decl.comments.clone(),
        })
    }
}

/// 合并父子选择器，支持 `&` 占位符。
fn combine_selectors(parents: &[String], current: &[String]) -> Vec<String> {
    if parents.is_empty() {
        return current.to_vec();
    }

    let mut result = Vec::new();
    for parent in parents {
        for child in current {
            let selector = if child.contains('&') {
                child.replace('&', parent).trim().to_string()
            } else {
                format!("{} {}", parent.trim(), child.trim())
            };
            result.push(selector);
        }
    }
    result
}

fn flatten_rule(rule: CssRule, parents: &[String], output: &mut Vec<EvaluatedNode>) {
    let selectors = combine_selectors(parents, &rule.selectors);
    let mut declarations = Vec::new();
    let mut pending_nodes = Vec::new();

    for child in rule.children {
        match child {
            CssNode::Declaration(decl) => declarations.push(decl),
            CssNode::Rule(nested) => flatten_rule(nested, &selectors, &mut pending_nodes),
            CssNode::AtRule(at_rule) => {
                pending_nodes.push(EvaluatedNode::AtRule(flatten_at_rule(at_rule, &selectors)));
            }
        }
    }

    if !declarations.is_empty() {
        output.push(EvaluatedNode::Rule(EvaluatedRule {
            selectors,
            declarations,
            comments: rule.comments,
        }));
    }
    output.extend(pending_nodes);
}

/// 嵌套在规则中的 at-rule 会把声明包回外层选择器。
fn flatten_at_rule(at_rule: CssAtRule, selectors: &[String]) -> EvaluatedAtRule {
    let mut own_declarations = Vec::new();
    let mut scoped_declarations = Vec::new();
    let mut children = Vec::new();

    for child in at_rule.children {
        match child {
            CssNode::Declaration(decl) => {
                if selectors.is_empty() {
                    own_declarations.push(decl);
                } else {
                    scoped_declarations.push(decl);
                }
            }
            CssNode::Rule(nested) => flatten_rule(nested, selectors, &mut children),
            CssNode::AtRule(inner) => {
                children.push(EvaluatedNode::AtRule(flatten_at_rule(inner, selectors)));
            }
        }
    }

    let mut scoped_nodes = Vec::new();
    if !scoped_declarations.is_empty() {
        scoped_nodes.push(EvaluatedNode::Rule(EvaluatedRule {
            selectors: selectors.to_vec(),
            declarations: scoped_declarations,
            comments: Comments::default(),
        }));
    }
    scoped_nodes.extend(children);

    EvaluatedAtRule {
        name: at_rule.name,
        params: at_rule.params,
        declarations: own_declarations,
        children: scoped_nodes,
        comments: at_rule.comments,
    }
}
