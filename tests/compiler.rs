use less_resolver::{compile, CompileOptions};
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

#[test]
fn variable_and_nesting() {
    let src = r"@spacing: 8px;
.container {
  padding: @spacing;
  .title {
    margin-bottom: @spacing;
  }
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert_eq!(
        css,
        ".container {\n  padding: 8px;\n}\n\n.container .title {\n  margin-bottom: 8px;\n}"
    );
}

#[test]
fn minify_output() {
    let src = r".demo {
  color: #333;
  font-weight: bold;
}";
    assert_eq!(minified(src), ".demo{color:#333;font-weight:bold}");
}

#[test]
fn mixin_with_nested_rules() {
    let src = r".rounded(@radius) {
  border-radius: @radius;
  &:hover {
    border-radius: (@radius * 2);
  }
}

.badge {
  .rounded(4px);
  background: #1f5a95;
}";
    assert_eq!(
        minified(src),
        ".badge{border-radius:4px;background:#1f5a95}.badge:hover{border-radius:8px}"
    );
}

#[test]
fn mixin_default_and_override() {
    let src = r".shadow(@x: 0, @y: 2px, @blur: 4px) {
  box-shadow: @x @y @blur rgba(0, 0, 0, 0.4);
}

.dialog {
  .shadow();
}

.dialog-elevated {
  .shadow(0, 8px, 16px);
}";
    let css = minified(src);
    assert!(css.contains(".dialog{box-shadow:0 2px 4px rgba(0, 0, 0, 0.4)}"));
    assert!(css.contains(".dialog-elevated{box-shadow:0 8px 16px rgba(0, 0, 0, 0.4)}"));
}

#[test]
fn arithmetic_multiple_segments_minified() {
    let src = r"@base: 5px;
.layout {
  padding: (@base * 2) (@base * 4) (@base / 5);
}";
    assert_eq!(minified(src), ".layout{padding:10px 20px 1px}");
}

#[test]
fn import_statement_passthrough() {
    let src = r#"@import (css) "https://cdn.example.com/reset.css";
body {
  color: #333;
}"#;
    let css = minified(src);
    assert!(css.starts_with(r#"@import (css) "https://cdn.example.com/reset.css";"#));
    assert!(css.contains("body{color:#333}"));
}

#[test]
fn nested_media_queries() {
    let src = r".panel {
  color: #333;
  @media (min-width: 800px) {
    color: #000;
    .panel__title {
      font-size: 20px;
    }
  }
}

@media (max-width: 600px) {
  .panel {
    width: 100%;
  }
}";
    let css = compile(src, CompileOptions::default()).unwrap();
    assert!(css.contains(".panel {\n  color: #333;"));
    assert!(css.contains("@media (min-width: 800px)"));
    assert!(css.contains(".panel .panel__title"));
    assert!(css.contains("@media (max-width: 600px)"));
    assert!(css.contains(".panel {\n    width: 100%;"));
}

#[test]
fn font_face_and_keyframes_blocks() {
    let src = r"@font-face {
  font-family: 'Open Sans';
  src: url('/fonts/open-sans.woff2') format('woff2');
}

@keyframes fade-in {
  from {
    opacity: 0;
  }
  to {
    opacity: 1;
  }
}";
    let css = minified(src);
    assert!(css.contains(
        "@font-face{font-family:'Open Sans';src:url('/fonts/open-sans.woff2') format('woff2')}"
    ));
    assert!(css.contains("@keyframes fade-in{from{opacity:0}to{opacity:1}}"));
}

#[test]
fn fixtures_compile() {
    let guards = minified(include_str!("../fixtures/guards.less"));
    assert!(guards.contains(".page{color:white;background:black;width:24px}"));
    assert!(guards.contains(".sidebar{color:gray;width:4px}"));
    assert!(guards.contains(".grid .col-1{width:10%}"));
    assert!(guards.contains(".alert{border:1px solid white}"));

    let namespaces = minified(include_str!("../fixtures/namespaces.less"));
    assert!(namespaces.contains(".panel{gap:12px;margin:0;padding:0;color:tomato;border:1px solid #ddd}"));
    assert!(namespaces.contains("@media (min-width: 768px){.panel{padding:16px}}"));
    assert!(namespaces.contains(".holder{line-height:12px;width:12px}"));

    let mixins = minified(include_str!("../fixtures/mixins.less"));
    assert!(mixins.contains(".card{padding:8px;margin:0 auto;border-radius:4px}"));
    assert!(mixins.contains(".card:hover{box-shadow:0 4px 4px rgba(0, 0, 0, 0.2)}"));
    assert!(mixins.contains(".card .title{border-radius:2px;font:14px/1.4 sans-serif}"));
    assert!(mixins.contains("box-shadow:0 2px 4px rgba(0, 0, 0, 0.2)!important"));
}
