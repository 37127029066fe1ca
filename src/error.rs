use thiserror::Error;

/// 编译过程中统一的错误类型，出现即终止整份文档的编译。
#[derive(Debug, Error)]
pub enum LessError {
    #[error("解析失败: {message} (位置 {position})")]
    ParseError { message: String, position: usize },
    #[error("语义求值失败: {0}")]
    EvalError(String),
    #[error("mixin {mixin} 递归过深: 超过上限 {limit} 层")]
    RecursionTooDeep { mixin: String, limit: usize },
}

pub type LessResult<T> = Result<T, LessError>;

impl LessError {
    pub fn parse<S: Into<String>>(message: S, position: usize) -> Self {
        LessError::ParseError {
            message: message.into(),
            position,
        }
    }

    pub fn eval<S: Into<String>>(message: S) -> Self {
        LessError::EvalError(message.into())
    }
}

/// mixin 解析中的非致命问题，记录到诊断列表后继续编译。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixinProblem {
    #[error("未找到匹配的 mixin 定义 {call} (实参 {arguments} 个)")]
    NoMatchingDefinition { call: String, arguments: usize },
    #[error("mixin {call} 参数个数不匹配: 期望 {expected} 个，实际 {actual} 个")]
    ArgumentArityMismatch {
        call: String,
        expected: usize,
        actual: usize,
    },
    #[error("mixin {call} 没有名为 @{name} 的参数")]
    UnknownNamedArgument { call: String, name: String },
    #[error("mixin {mixin} 的守卫求值失败: {reason}")]
    GuardEvaluationError { mixin: String, reason: String },
}
