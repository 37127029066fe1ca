//! mixin 与分离规则集调用的展开。
//!
//! 每个候选都在局部快照内完成参数绑定与守卫求值，落选即整体回滚；选中的候选逐个编译，
//! 导出的变量与 mixin 先暂存到调用方的占位区，全部编译完成后一次性提交。
//! 可复用的定义本身永远只读。

use crate::arguments::{arity_mismatch, bind_arguments, BindOutcome, EvaluatedArgument};
use crate::ast::{Comments, DetachedCall, MixinCall, RuleBody};
use crate::candidates::choose_mixins_to_use;
use crate::error::{LessError, LessResult, MixinProblem};
use crate::evaluator::{CssNode, Evaluator};
use crate::expression::ExpressionEvaluator;
use crate::guards::{GuardVerdict, GuardsValidator};
use crate::scope::{FoundMixin, ScopeId, SnapshotKind};
use crate::value::{DetachedRuleset, Value};
use tracing::{debug, trace};

/// 调用完成后哪些条目可以进入调用方作用域。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImportMode {
    VariablesAndMixins,
    MixinsOnly,
}

/// 一次规则体编译的结果：替换调用点的节点与导出作用域。
#[derive(Debug)]
pub(crate) struct BodyCompilation {
    pub nodes: Vec<CssNode>,
    pub exports: ScopeId,
}

impl Evaluator {
    pub(crate) fn resolve_mixin_call(
        &mut self,
        call: &MixinCall,
        caller: ScopeId,
    ) -> LessResult<Vec<CssNode>> {
        let call_name = call.display_name();
        let args = self.evaluate_arguments(call, caller)?;
        let candidates = self.find_mixins(caller, &call.path, Some(args.len()))?;
        if candidates.is_empty() {
            let problem = match self.find_mixins(caller, &call.path, None)?.first() {
                Some(found) => arity_mismatch(&found.entry.definition, &call_name, args.len()),
                None => MixinProblem::NoMatchingDefinition {
                    call: call_name,
                    arguments: args.len(),
                },
            };
            self.diagnostics.report(problem);
            return Ok(Vec::new());
        }

        let total = candidates.len();
        let mut problems = Vec::new();
        let mut trials = Vec::with_capacity(total);
        for candidate in candidates {
            let snapshot = self.scopes.snapshot(caller, SnapshotKind::Local);
            match self.try_candidate(&candidate, &call_name, &args, caller, &mut problems)? {
                Some((verdict, working)) => trials.push((verdict, (candidate, working))),
                None => self.scopes.restore(snapshot),
            }
        }
        self.diagnostics.report_once_per_call(problems);

        let selected = choose_mixins_to_use(trials);
        debug!(
            call = %call_name,
            candidates = total,
            selected = selected.len(),
            "resolve mixin call"
        );

        let mut nodes = Vec::new();
        let mut exports = Vec::with_capacity(selected.len());
        for (candidate, working) in selected {
            let definition = candidate.entry.definition;
            let compiled = self.compile_body(
                &definition.name,
                &definition.body,
                working,
                candidate.entry.scope,
                caller,
                ImportMode::VariablesAndMixins,
            )?;
            nodes.extend(compiled.nodes);
            exports.push(compiled.exports);
        }
        self.commit_exports(caller, &exports);

        if call.important {
            apply_importance(&mut nodes);
        }
        shift_comments(&mut nodes, &call.comments);
        Ok(nodes)
    }

    /// 单个候选的试探：绑定参数、求值守卫。返回 `None` 表示落选，调用方负责回滚。
    fn try_candidate(
        &mut self,
        candidate: &FoundMixin,
        call_name: &str,
        args: &[EvaluatedArgument],
        caller: ScopeId,
        problems: &mut Vec<MixinProblem>,
    ) -> LessResult<Option<(GuardVerdict, ScopeId)>> {
        let definition = &candidate.entry.definition;
        let args_scope = match bind_arguments(
            &mut self.scopes,
            definition,
            candidate.entry.scope,
            call_name,
            args,
        )? {
            BindOutcome::Bound(scope) => scope,
            BindOutcome::PatternMismatch => return Ok(None),
            BindOutcome::Rejected(problem) => {
                problems.push(problem);
                return Ok(None);
            }
        };
        let working = self.scopes.join(caller, args_scope);

        let mut guards: Vec<_> = candidate
            .path_guards
            .iter()
            .map(|(condition, scope)| (condition, *scope))
            .collect();
        if let Some(own) = &definition.guard {
            guards.push((own, working));
        }
        let verdict = match GuardsValidator::new(&self.scopes).evaluate_guards(&guards) {
            Ok(verdict) => verdict,
            Err(err) => {
                problems.push(MixinProblem::GuardEvaluationError {
                    mixin: definition.name.clone(),
                    reason: err.to_string(),
                });
                GuardVerdict::DoNotUse
            }
        };
        trace!(mixin = %definition.name, ?verdict, "candidate verdict");

        if verdict == GuardVerdict::DoNotUse {
            return Ok(None);
        }
        Ok(Some((verdict, working)))
    }

    pub(crate) fn resolve_detached_call(
        &mut self,
        call: &DetachedCall,
        caller: ScopeId,
    ) -> LessResult<Vec<CssNode>> {
        let value = ExpressionEvaluator::new(&self.scopes, caller).lookup(&call.name)?;
        let Some(ruleset) = value.as_ruleset().cloned() else {
            return Err(LessError::eval(format!(
                "变量 @{} 不是可调用的分离规则集",
                call.name
            )));
        };
        debug!(ruleset = %call.name, "resolve detached ruleset call");
        let working = self.scopes.join(caller, ruleset.scope);
        let compiled = self.compile_body(
            &format!("@{}", call.name),
            &ruleset.body,
            working,
            ruleset.scope,
            caller,
            ImportMode::MixinsOnly,
        )?;
        self.commit_exports(caller, &[compiled.exports]);

        let mut nodes = compiled.nodes;
        shift_comments(&mut nodes, &call.comments);
        Ok(nodes)
    }

    /// 编译一段可复用的规则体。定义所在作用域在编译前后保持一致。
    pub(crate) fn compile_body(
        &mut self,
        name: &str,
        body: &[RuleBody],
        working: ScopeId,
        definition_scope: ScopeId,
        caller: ScopeId,
        mode: ImportMode,
    ) -> LessResult<BodyCompilation> {
        if self.depth >= self.max_recursion_depth {
            return Err(LessError::RecursionTooDeep {
                mixin: name.to_string(),
                limit: self.max_recursion_depth,
            });
        }
        self.depth += 1;
        let snapshot = self
            .scopes
            .snapshot(definition_scope, SnapshotKind::OriginalPreserving);
        let body_scope = self.scopes.create_child(working);
        let resolved = self.resolve_body(body, body_scope);
        self.scopes.restore(snapshot);
        self.depth -= 1;

        let nodes = resolved?;
        let exports = self.collect_exports(body_scope, caller, mode);
        Ok(BodyCompilation { nodes, exports })
    }

    /// 规则体自身定义的条目构成导出作用域。变量同名时取最后一次赋值。
    fn collect_exports(&mut self, body_scope: ScopeId, caller: ScopeId, mode: ImportMode) -> ScopeId {
        let exports = self.scopes.create_detached();
        if mode == ImportMode::VariablesAndMixins {
            for (name, value) in self.scopes.local_variables(body_scope) {
                let value = match value {
                    Value::Ruleset(ruleset) => {
                        let scope = self.scopes.join(caller, ruleset.scope);
                        Value::Ruleset(DetachedRuleset {
                            body: ruleset.body,
                            scope,
                        })
                    }
                    other => other,
                };
                self.scopes.define_variable(exports, name, value);
            }
        }
        for entry in self.scopes.local_mixins(body_scope) {
            self.scopes.define_mixin(exports, entry);
        }
        exports
    }

    fn commit_exports(&mut self, caller: ScopeId, exports: &[ScopeId]) {
        self.scopes.open_placeholder(caller);
        for scope in exports {
            self.scopes.add_to_placeholder(caller, *scope);
        }
        self.scopes.close_placeholder(caller);
        trace!(exports = exports.len(), "commit mixin exports");
    }

    fn evaluate_arguments(
        &self,
        call: &MixinCall,
        caller: ScopeId,
    ) -> LessResult<Vec<EvaluatedArgument>> {
        let evaluator = ExpressionEvaluator::new(&self.scopes, caller);
        call.args
            .iter()
            .map(|arg| -> LessResult<EvaluatedArgument> {
                let value = evaluator.evaluate(&arg.value)?;
                Ok(match &arg.name {
                    Some(name) => EvaluatedArgument::named(name.as_str(), value),
                    None => EvaluatedArgument::positional(value),
                })
            })
            .collect()
    }

    /// 按名字路径查找候选。多段路径逐层进入命名空间，命名空间的守卫随候选一起返回。
    pub(crate) fn find_mixins(
        &mut self,
        caller: ScopeId,
        path: &[String],
        arity: Option<usize>,
    ) -> LessResult<Vec<FoundMixin>> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(Vec::new());
        };
        if rest.is_empty() {
            return Ok(self.scopes.lookup_mixins(caller, first, arity));
        }
        let namespaces = self.scopes.lookup_mixins(caller, first, Some(0));
        self.descend(caller, namespaces, rest, arity)
    }

    fn descend(
        &mut self,
        caller: ScopeId,
        namespaces: Vec<FoundMixin>,
        path: &[String],
        arity: Option<usize>,
    ) -> LessResult<Vec<FoundMixin>> {
        let Some((next, rest)) = path.split_first() else {
            return Ok(namespaces);
        };
        let mut found = Vec::new();
        for namespace in namespaces {
            let namespace_scope = self.open_namespace(&namespace)?;
            let guard_scope = self.scopes.join(caller, namespace_scope);
            let mut path_guards = namespace.path_guards.clone();
            if let Some(guard) = &namespace.entry.definition.guard {
                path_guards.push((guard.clone(), guard_scope));
            }
            let lookup_arity = if rest.is_empty() { arity } else { Some(0) };
            let inner = self
                .scopes
                .local_mixins_named(namespace_scope, next, lookup_arity)
                .into_iter()
                .map(|mut mixin| {
                    let mut guards = path_guards.clone();
                    guards.append(&mut mixin.path_guards);
                    mixin.path_guards = guards;
                    mixin
                })
                .collect();
            found.extend(self.descend(caller, inner, rest, arity)?);
        }
        Ok(found)
    }

    /// 命名空间作用域：登记其中的 mixin 并求值其顶层变量，不输出任何节点。
    fn open_namespace(&mut self, namespace: &FoundMixin) -> LessResult<ScopeId> {
        let definition = &namespace.entry.definition;
        let scope = self.scopes.create_child(namespace.entry.scope);
        self.hoist_mixins(&definition.body, scope);
        for item in &definition.body {
            if let RuleBody::Variable(var) = item {
                let value = ExpressionEvaluator::new(&self.scopes, scope).evaluate(&var.value)?;
                self.scopes.define_variable(scope, var.name.as_str(), value);
            }
        }
        Ok(scope)
    }
}

/// 为所有声明打上 `!important`，包括嵌套规则与 at-rule 内部。
fn apply_importance(nodes: &mut [CssNode]) {
    for node in nodes {
        match node {
            CssNode::Declaration(decl) => decl.important = true,
            CssNode::Rule(rule) => apply_importance(&mut rule.children),
            CssNode::AtRule(at_rule) => apply_importance(&mut at_rule.children),
        }
    }
}

/// 调用点前的注释移到第一个替换节点，行尾注释移到最后一个。
fn shift_comments(nodes: &mut [CssNode], comments: &Comments) {
    if comments.is_empty() {
        return;
    }
    if let Some(first) = nodes.first_mut() {
        let target = first.comments_mut();
        let mut leading = comments.leading.clone();
        leading.append(&mut target.leading);
        target.leading = leading;
    }
    if let Some(last) = nodes.last_mut() {
        last.comments_mut()
            .trailing
            .extend(comments.trailing.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LessParser;
    use crate::CompileOptions;

    fn evaluator_with_limit(limit: usize) -> Evaluator {
        Evaluator::new(&CompileOptions {
            max_recursion_depth: limit,
            ..CompileOptions::default()
        })
    }

    fn declarations(nodes: &[CssNode]) -> Vec<String> {
        let mut output = Vec::new();
        for node in nodes {
            match node {
                CssNode::Declaration(decl) => {
                    let mut text = format!("{}: {}", decl.name, decl.value);
                    if decl.important {
                        text.push_str(" !important");
                    }
                    output.push(text);
                }
                CssNode::Rule(rule) => output.extend(declarations(&rule.children)),
                CssNode::AtRule(at_rule) => output.extend(declarations(&at_rule.children)),
            }
        }
        output
    }

    fn resolve(evaluator: &mut Evaluator, src: &str) -> LessResult<Vec<CssNode>> {
        let stylesheet = LessParser::new().parse(src)?;
        let root = evaluator.scopes.root();
        evaluator.resolve_body(&stylesheet.body, root)
    }

    #[test]
    fn definition_scope_is_untouched_by_calls() {
        let mut evaluator = evaluator_with_limit(16);
        let src = r"@base: 2px;
.m(@x) { @y: @x; width: @y; }
.a { .m(1px); }
.b { .m(1px); }";
        let nodes = resolve(&mut evaluator, src).unwrap();
        let root = evaluator.scopes.root();
        let variables = evaluator.scopes.local_variables(root);
        assert_eq!(variables.len(), 1);
        assert_eq!(variables.get("base"), Some(&Value::number(2.0, "px")));
        assert!(evaluator.scopes.lookup_variable(root, "y").is_none());

        let CssNode::Rule(a) = &nodes[0] else {
            panic!("expected rule");
        };
        let CssNode::Rule(b) = &nodes[1] else {
            panic!("expected rule");
        };
        assert_eq!(a.children, b.children);
    }

    #[test]
    fn recursive_mixin_unrolls_until_guard_fails() {
        let mut evaluator = evaluator_with_limit(16);
        let src = r".loop(@i) when (@i > 0) { .loop(@i - 1); w: @i; }
.x { .loop(3); }";
        let nodes = resolve(&mut evaluator, src).unwrap();
        assert_eq!(declarations(&nodes), vec!["w: 1", "w: 2", "w: 3"]);
        assert!(evaluator.diagnostics.is_empty());
        assert_eq!(evaluator.depth, 0);
    }

    #[test]
    fn unbounded_recursion_hits_the_ceiling() {
        let mut evaluator = evaluator_with_limit(8);
        let src = ".forever() { .forever(); }\n.x { .forever(); }";
        let err = resolve(&mut evaluator, src).unwrap_err();
        assert!(matches!(
            err,
            LessError::RecursionTooDeep { limit: 8, ref mixin } if mixin == ".forever"
        ));
    }

    #[test]
    fn important_marks_nested_declarations_once() {
        let mut evaluator = evaluator_with_limit(16);
        let src = r".m() { color: red !important; .inner { margin: 0; } }
.x { .m() !important; }";
        let nodes = resolve(&mut evaluator, src).unwrap();
        assert_eq!(
            declarations(&nodes),
            vec!["color: red !important", "margin: 0 !important"]
        );
    }

    #[test]
    fn call_comments_move_to_replacement_nodes() {
        let mut evaluator = evaluator_with_limit(16);
        let src = r".m() { a: 1; b: 2; }
.x {
  /* before */
  .m(); /* after */
}";
        let nodes = resolve(&mut evaluator, src).unwrap();
        let CssNode::Rule(rule) = &nodes[0] else {
            panic!("expected rule");
        };
        let CssNode::Declaration(first) = &rule.children[0] else {
            panic!("expected declaration");
        };
        let CssNode::Declaration(last) = &rule.children[1] else {
            panic!("expected declaration");
        };
        assert_eq!(first.comments.leading, vec!["/* before */".to_string()]);
        assert_eq!(last.comments.trailing, vec!["/* after */".to_string()]);
    }

    #[test]
    fn rejected_candidates_leave_no_scopes_behind() {
        let mut evaluator = evaluator_with_limit(16);
        let src = ".m(@x) when (@x > 10) { w: @x; }\n.x { .m(1); }";
        resolve(&mut evaluator, src).unwrap();
        let with_call = evaluator.scopes.node_count();

        let mut baseline = evaluator_with_limit(16);
        resolve(&mut baseline, ".m(@x) when (@x > 10) { w: @x; }\n.x { }").unwrap();
        assert_eq!(with_call, baseline.scopes.node_count());
    }

    #[test]
    fn missing_definition_is_a_diagnostic() {
        let mut evaluator = evaluator_with_limit(16);
        let nodes = resolve(&mut evaluator, ".x { .nope(1); color: red; }").unwrap();
        assert_eq!(declarations(&nodes), vec!["color: red"]);
        assert_eq!(
            evaluator.diagnostics.items()[0].problem,
            MixinProblem::NoMatchingDefinition {
                call: ".nope".into(),
                arguments: 1,
            }
        );
    }
}
