//! less_resolver 库入口，负责 LESS mixin 与分离规则集的解析展开，并输出 CSS。
//! 内部分为三个阶段：解析（Parser）→ 语义求值（Evaluator，包含 mixin 匹配与作用域管理）→ CSS 序列化（Serializer）。

mod arguments;
mod ast;
mod candidates;
mod diagnostics;
mod error;
mod evaluator;
mod expression;
mod guards;
mod mixins;
mod parser;
mod scope;
mod serializer;
mod value;

pub use crate::diagnostics::Diagnostic;
pub use crate::error::{LessError, LessResult, MixinProblem};
use evaluator::Evaluator;
use parser::LessParser;
use serializer::Serializer;
use tracing::debug;

/// mixin 嵌套展开的默认上限。
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 256;

/// LESS 编译配置。
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// 是否输出压缩后的 CSS。
    pub minify: bool,
    /// mixin 与分离规则集嵌套展开的最大层数，超出即报错终止。
    pub max_recursion_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            minify: false,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

/// 编译结果：CSS 文本与 mixin 解析过程中收集到的非致命诊断。
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub css: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// 编译 LESS 源码为 CSS 文本，诊断信息只写入日志。
///
/// # 参数
/// * `source` - 待编译的 LESS 字符串
/// * `options` - 编译配置
pub fn compile(source: &str, options: CompileOptions) -> LessResult<String> {
    compile_with_diagnostics(source, options).map(|output| output.css)
}

/// 编译 LESS 源码，同时返回诊断列表。
pub fn compile_with_diagnostics(source: &str, options: CompileOptions) -> LessResult<CompileOutput> {
    let parser = LessParser::new();
    let ast = parser.parse(source)?;

    let mut evaluator = Evaluator::new(&options);
    let stylesheet = evaluator.evaluate(ast)?;
    let diagnostics = evaluator.into_diagnostics().into_vec();
    debug!(
        rules = stylesheet.nodes.len(),
        diagnostics = diagnostics.len(),
        "compiled stylesheet"
    );

    let serializer = Serializer::new(options.minify);
    Ok(CompileOutput {
        css: serializer.to_css(&stylesheet),
        diagnostics,
    })
}

#[cfg(feature = "node")]
use napi::{Error, Result};
#[cfg(feature = "node")]
use napi_derive::napi;

/// Node.js 侧的编译选项对象。
#[cfg(feature = "node")]
#[napi(object)]
pub struct JsCompileOptions {
    /// 是否压缩输出 CSS。
    pub minify: Option<bool>,
    /// mixin 展开的最大嵌套层数。
    pub max_recursion_depth: Option<u32>,
}

/// Node.js 侧的编译结果。
#[cfg(feature = "node")]
#[napi(object)]
pub struct JsCompileOutput {
    pub css: String,
    /// 诊断信息的可读文本。
    pub warnings: Vec<String>,
}

/// 暴露给 Node.js 的编译函数。
#[cfg(feature = "node")]
#[napi]
pub fn compile_less(source: String, options: Option<JsCompileOptions>) -> Result<JsCompileOutput> {
    let opt = options.unwrap_or(JsCompileOptions {
        minify: None,
        max_recursion_depth: None,
    });
    let compile_options = CompileOptions {
        minify: opt.minify.unwrap_or(false),
        max_recursion_depth: opt
            .max_recursion_depth
            .map_or(DEFAULT_MAX_RECURSION_DEPTH, |depth| depth as usize),
    };
    let output = compile_with_diagnostics(&source, compile_options)
        .map_err(|err| Error::from_reason(err.to_string()))?;
    Ok(JsCompileOutput {
        css: output.css,
        warnings: output
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .collect(),
    })
}
