use crate::error::MixinProblem;
use std::fmt::{self, Display};
use tracing::warn;

/// 一条编译诊断。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub problem: MixinProblem,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.problem)
    }
}

/// 诊断收集器，尽可能在一次编译中报告所有问题。
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, problem: MixinProblem) {
        warn!(%problem, "mixin diagnostic");
        self.items.push(Diagnostic { problem });
    }

    /// 同一次调用内重复的问题只报告一次。
    pub fn report_once_per_call(&mut self, problems: Vec<MixinProblem>) {
        let mut seen: Vec<MixinProblem> = Vec::with_capacity(problems.len());
        for problem in problems {
            if !seen.contains(&problem) {
                seen.push(problem.clone());
                self.report(problem);
            }
        }
    }

    #[cfg(test)]
    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_within_one_call_are_collapsed() {
        let mut diagnostics = Diagnostics::new();
        let problem = MixinProblem::UnknownNamedArgument {
            call: ".m".into(),
            name: "size".into(),
        };
        diagnostics.report_once_per_call(vec![problem.clone(), problem.clone()]);
        assert_eq!(diagnostics.items().len(), 1);

        diagnostics.report_once_per_call(vec![problem]);
        assert_eq!(diagnostics.items().len(), 2);
    }
}
