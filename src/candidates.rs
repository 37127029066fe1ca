use crate::guards::GuardVerdict;

/// 按守卫结论筛选最终要展开的候选，保持定义顺序。
///
/// 存在 `Use` 时取全部 `Use` 与 `UseUnlessDefault`；否则取 `UseAsDefault`。
/// 多个 `UseAsDefault` 同时生效时全部展开，不视为歧义。
pub fn choose_mixins_to_use<T>(candidates: Vec<(GuardVerdict, T)>) -> Vec<T> {
    let has_match = candidates
        .iter()
        .any(|(verdict, _)| *verdict == GuardVerdict::Use);
    candidates
        .into_iter()
        .filter_map(|(verdict, candidate)| {
            let keep = match verdict {
                GuardVerdict::Use => true,
                GuardVerdict::UseUnlessDefault => has_match,
                GuardVerdict::UseAsDefault => !has_match,
                GuardVerdict::DoNotUse => false,
            };
            keep.then_some(candidate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use GuardVerdict::*;

    #[test]
    fn regular_match_beats_default() {
        let chosen = choose_mixins_to_use(vec![(UseAsDefault, "fallback"), (Use, "positive")]);
        assert_eq!(chosen, vec!["positive"]);
    }

    #[test]
    fn defaults_are_used_together_in_definition_order() {
        let chosen = choose_mixins_to_use(vec![
            (UseAsDefault, "first"),
            (DoNotUse, "rejected"),
            (UseAsDefault, "second"),
        ]);
        assert_eq!(chosen, vec!["first", "second"]);
    }

    #[test]
    fn negated_default_needs_another_match() {
        let alone = choose_mixins_to_use(vec![(UseUnlessDefault, "not-default")]);
        assert!(alone.is_empty());

        let together = choose_mixins_to_use(vec![
            (UseUnlessDefault, "not-default"),
            (UseAsDefault, "default"),
            (Use, "plain"),
        ]);
        assert_eq!(together, vec!["not-default", "plain"]);
    }

    #[test]
    fn nothing_selected_is_not_an_error() {
        let chosen: Vec<&str> = choose_mixins_to_use(vec![(DoNotUse, "a"), (DoNotUse, "b")]);
        assert!(chosen.is_empty());
    }
}
