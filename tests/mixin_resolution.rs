use less_resolver::{
    compile, compile_with_diagnostics, CompileOptions, LessError, MixinProblem,
};
use pretty_assertions::assert_eq;

fn minified(src: &str) -> String {
    compile(
        src,
        CompileOptions {
            minify: true,
            ..CompileOptions::default()
        },
    )
    .unwrap()
}

fn problems(src: &str) -> Vec<MixinProblem> {
    compile_with_diagnostics(src, CompileOptions::default())
        .unwrap()
        .diagnostics
        .into_iter()
        .map(|diagnostic| diagnostic.problem)
        .collect()
}

#[test]
fn regular_match_wins_over_default() {
    let src = r".m(@x) when (@x > 0) { a: pos; }
.m(@x) when (default()) { a: fallback; }
.p { .m(1); }
.q { .m(-1); }";
    assert_eq!(minified(src), ".p{a:pos}.q{a:fallback}");
}

#[test]
fn several_defaults_are_all_used() {
    let src = r".m() when (default()) { a: 1; }
.m() when (default()) { b: 2; }
.x { .m(); }";
    assert_eq!(minified(src), ".x{a:1;b:2}");
}

#[test]
fn guard_on_defaulted_parameter() {
    let src = r".m(@x: 1) when (@x > 0) { width: @x; }
.a { .m(); }
.b { .m(-1); }";
    let output = compile_with_diagnostics(
        src,
        CompileOptions {
            minify: true,
            ..CompileOptions::default()
        },
    )
    .unwrap();
    assert_eq!(output.css, ".a{width:1}");
    assert!(output.diagnostics.is_empty());
}

#[test]
fn negated_default_joins_a_regular_match_only() {
    let src = r".m(@a) when (@a > 0) { a: pos; }
.m(@a) when not (default()) { b: extra; }
.m(@a) when (default()) { c: fallback; }
.x { .m(1); }
.y { .m(-1); }";
    assert_eq!(minified(src), ".x{a:pos;b:extra}.y{c:fallback}");
}

#[test]
fn failing_guard_is_a_diagnostic_not_an_abort() {
    let options = || CompileOptions {
        minify: true,
        ..CompileOptions::default()
    };

    let src = ".m() when (@nope > 0) { a: 1; }\n.x { .m(); b: 2; }";
    let output = compile_with_diagnostics(src, options()).unwrap();
    assert_eq!(output.css, ".x{b:2}");
    assert_eq!(output.diagnostics.len(), 1);
    assert!(matches!(
        &output.diagnostics[0].problem,
        MixinProblem::GuardEvaluationError { mixin, reason }
            if mixin == ".m" && reason.contains("@nope")
    ));

    let with_default = ".m() when (@nope > 0) { a: 1; }
.m() when (default()) { a: d; }
.x { .m(); b: 2; }";
    let output = compile_with_diagnostics(with_default, options()).unwrap();
    assert_eq!(output.css, ".x{a:d;b:2}");
    assert_eq!(output.diagnostics.len(), 1);
}

#[test]
fn guards_combine_with_and_or() {
    let src = r".m(@a) when (@a > 1) and (@a < 5), (@a = 10) { ok: @a; }
.x { .m(3); }
.y { .m(10); }
.z { .m(7); }";
    assert_eq!(minified(src), ".x{ok:3}.y{ok:10}");
}

#[test]
fn recursion_unrolls_in_order() {
    let src = r".loop(@i) when (@i > 0) {
  .loop(@i - 1);
  w: @i;
}
.g { .loop(3); }";
    assert_eq!(minified(src), ".g{w:1;w:2;w:3}");
}

#[test]
fn unbounded_recursion_is_fatal() {
    let src = ".f() { .f(); }\n.x { .f(); }";
    let err = compile(
        src,
        CompileOptions {
            max_recursion_depth: 16,
            ..CompileOptions::default()
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        LessError::RecursionTooDeep { ref mixin, limit: 16 } if mixin == ".f"
    ));
}

#[test]
fn exported_variables_keep_the_last_assignment() {
    let src = r".m() { @a: 1; @a: 2; }
.other() { @b: 3; c: 4; }
.x { .m(); .other(); .other(); width: @a; }";
    assert_eq!(minified(src), ".x{c:4;c:4;width:2}");
}

#[test]
fn exports_are_invisible_before_the_call() {
    let src = r".m() { @a: 1; }
.x { width: @a; .m(); }";
    let err = compile(src, CompileOptions::default()).unwrap_err();
    assert!(matches!(err, LessError::EvalError(_)));
}

#[test]
fn caller_variables_win_over_imports() {
    let src = r".m() { @v: inner; }
.x { @v: outer; .m(); c: @v; }";
    assert_eq!(minified(src), ".x{c:outer}");
}

#[test]
fn defaults_do_not_see_caller_variables() {
    let src = r"@size: 1px;
.m(@w: @size) { width: @w; }
.x { @size: 99px; .m(); }";
    assert_eq!(minified(src), ".x{width:1px}");
}

#[test]
fn important_is_applied_once() {
    let src = r".m() { color: red !important; margin: 0; }
.x { .m() !important; }";
    assert_eq!(minified(src), ".x{color:red!important;margin:0!important}");
}

#[test]
fn pattern_parameters_select_candidates() {
    let src = r".m(dark; @c) { color: @c; }
.m(light; @c) { background: @c; }
.x { .m(dark; red); }";
    assert_eq!(minified(src), ".x{color:red}");
}

#[test]
fn arguments_variable_holds_all_values() {
    let src = r".b(@x; @y) { box-shadow: @arguments; }
.x { .b(1px; 2px); }";
    assert_eq!(minified(src), ".x{box-shadow:1px 2px}");
}

#[test]
fn namespaced_calls_respect_namespace_guards() {
    let src = r"@on: false;
#ns { .m() { c: ns; } }
#off when (@on = true) { .m() { c: off; } }
.x { #ns > .m(); }
.y { #off > .m(); }";
    let output = compile_with_diagnostics(
        src,
        CompileOptions {
            minify: true,
            ..CompileOptions::default()
        },
    )
    .unwrap();
    assert_eq!(output.css, ".x{c:ns}");
    assert!(output.diagnostics.is_empty());
}

#[test]
fn plain_rulesets_are_callable() {
    let src = ".base { color: red; }\n.x { .base; }";
    assert_eq!(minified(src), ".base{color:red}.x{color:red}");
}

#[test]
fn detached_rulesets_see_caller_scope() {
    let src = r"@dr: { c: @v; };
.x { @v: 1; @dr(); }";
    assert_eq!(minified(src), ".x{c:1}");
}

#[test]
fn detached_ruleset_returned_from_mixin() {
    let src = r".m() {
  @r: { c: @inner; };
  @inner: 5;
}
.x { .m(); @r(); }";
    assert_eq!(minified(src), ".x{c:5}");
}

#[test]
fn detached_ruleset_as_argument() {
    let src = r".wrap(@body) { .inner { @body(); } }
.x { .wrap({ color: red; }); }";
    assert_eq!(minified(src), ".x .inner{color:red}");
}

#[test]
fn calling_a_plain_variable_is_an_error() {
    let src = "@v: 1px;\n.x { @v(); }";
    let err = compile(src, CompileOptions::default()).unwrap_err();
    assert!(matches!(err, LessError::EvalError(_)));
}

#[test]
fn problems_are_reported_without_stopping() {
    let src = r".m(@a) { w: @a; }
.x {
  .m(@b: 1);
  .m(1; 2);
  .nothing();
  color: red;
}";
    assert_eq!(
        problems(src),
        vec![
            MixinProblem::UnknownNamedArgument {
                call: ".m".into(),
                name: "b".into(),
            },
            MixinProblem::ArgumentArityMismatch {
                call: ".m".into(),
                expected: 1,
                actual: 2,
            },
            MixinProblem::NoMatchingDefinition {
                call: ".nothing".into(),
                arguments: 0,
            },
        ]
    );
}

#[test]
fn call_comments_survive_in_pretty_output() {
    let src = r".m() { color: red; }
.x {
  /* before */
  .m(); /* after */
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert_eq!(css, ".x {\n  /* before */\n  color: red; /* after */\n}");
}

#[test]
fn repeated_calls_are_independent() {
    let src = r".m(@a) { w: @a; }
.x { .m(1); .m(2); }";
    let first = minified(src);
    assert_eq!(first, ".x{w:1;w:2}");
    assert_eq!(minified(src), first);
}
