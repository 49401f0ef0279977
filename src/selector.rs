//! Rule-based action selection.

use crate::config::{ActionDefinition, RuleSet};

/// First enabled definition, in table order, whose include patterns hit
/// `text` and whose exclude patterns do not.
pub fn select_action<'a>(text: &str, rules: &'a RuleSet) -> Option<&'a ActionDefinition> {
    rules
        .definitions()
        .iter()
        .filter(|def| def.enabled)
        .find(|def| def.matches(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rules::repost;

    fn def(key: &str, enabled: bool, include: &[&str], exclude: &[&str]) -> ActionDefinition {
        let mut d = repost();
        d.key = key.into();
        d.enabled = enabled;
        d.include = include.iter().map(|s| s.to_string()).collect();
        d.exclude = exclude.iter().map(|s| s.to_string()).collect();
        d
    }

    #[test]
    fn repost_selected() {
        let rules = RuleSet::default();
        let hit = select_action("please リポスト this", &rules).unwrap();
        assert_eq!(hit.key, "REPOST");
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let rules = RuleSet::default();
        assert!(select_action("引用して紹介", &rules).is_none());
        assert!(select_action("引用リポストお願いします", &rules).is_none());
    }

    #[test]
    fn no_match_returns_none() {
        let rules = RuleSet::default();
        assert!(select_action("", &rules).is_none());
        assert!(select_action("hello world", &rules).is_none());
    }

    #[test]
    fn first_enabled_in_table_order_wins() {
        let rules = RuleSet::new(vec![
            def("A", false, &["x"], &[]),
            def("B", true, &["x"], &[]),
            def("C", true, &["x"], &[]),
        ]);
        assert_eq!(select_action("xyz", &rules).unwrap().key, "B");
    }

    #[test]
    fn excluded_entry_falls_through_to_next() {
        let rules = RuleSet::new(vec![
            def("A", true, &["x"], &["y"]),
            def("B", true, &["x"], &[]),
        ]);
        assert_eq!(select_action("x y", &rules).unwrap().key, "B");
        assert_eq!(select_action("x", &rules).unwrap().key, "A");
    }

    #[test]
    fn any_include_pattern_suffices() {
        let rules = RuleSet::new(vec![def("A", true, &["foo", "bar"], &[])]);
        assert!(select_action("only bar here", &rules).is_some());
    }

    #[test]
    fn exclusion_holds_for_every_definition() {
        let rules = RuleSet::new(vec![
            def("A", true, &["a"], &["!a"]),
            def("B", true, &["b"], &["!b"]),
        ]);
        for text in ["a !a", "b !b", "x a !a b !b"] {
            let hit = select_action(text, &rules);
            if let Some(d) = hit {
                assert!(!d.exclude.iter().any(|p| text.contains(p.as_str())));
            }
        }
        assert!(select_action("a !a b !b", &rules).is_none());
    }
}
