//! The per-webhook filter DSL.
//!
//! A filter set is a list of rules over dotted paths into the request
//! payload, combined with `all` or `any` semantics. An empty rule list
//! matches everything.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How rules combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every rule must match.
    #[default]
    All,
    /// At least one rule must match.
    Any,
}

/// Comparison operator of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Value at the path equals the expected value.
    Eq,
    /// Value at the path differs from the expected value.
    Ne,
    /// String contains a substring, or array contains the expected value.
    Contains,
    /// A value exists at the path.
    Exists,
    /// Numeric greater-than.
    Gt,
    /// Numeric less-than.
    Lt,
}

/// One filter rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Rule id, recorded on matching events.
    pub id: String,
    /// Dotted path into the payload.
    pub path: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Expected value; unused for `Exists`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A webhook's filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    /// Combination semantics.
    #[serde(default)]
    pub mode: MatchMode,
    /// The rules. Empty matches everything.
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

/// Result of evaluating a filter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMatch {
    /// Whether the set as a whole matched.
    pub matched: bool,
    /// Ids of the individual rules that matched.
    pub matched_rules: Vec<String>,
}

impl FilterSet {
    /// Evaluate against a payload.
    #[must_use]
    pub fn evaluate(&self, payload: &Value) -> FilterMatch {
        if self.rules.is_empty() {
            return FilterMatch {
                matched: true,
                matched_rules: Vec::new(),
            };
        }

        let matched_rules: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(payload))
            .map(|rule| rule.id.clone())
            .collect();
        let matched = match self.mode {
            MatchMode::All => matched_rules.len() == self.rules.len(),
            MatchMode::Any => !matched_rules.is_empty(),
        };
        FilterMatch {
            matched,
            matched_rules,
        }
    }
}

impl FilterRule {
    fn matches(&self, payload: &Value) -> bool {
        let found = lookup_path(payload, &self.path);
        match self.op {
            FilterOp::Exists => found.is_some(),
            FilterOp::Eq => found.as_ref() == self.value.as_ref(),
            FilterOp::Ne => found.is_some() && found.as_ref() != self.value.as_ref(),
            FilterOp::Contains => match (&found, &self.value) {
                (Some(Value::String(s)), Some(Value::String(needle))) => s.contains(needle),
                (Some(Value::Array(items)), Some(expected)) => items.contains(expected),
                _ => false,
            },
            FilterOp::Gt => compare(&found, &self.value).is_some_and(|o| o.is_gt()),
            FilterOp::Lt => compare(&found, &self.value).is_some_and(|o| o.is_lt()),
        }
    }
}

fn compare(found: &Option<Value>, expected: &Option<Value>) -> Option<std::cmp::Ordering> {
    let a = found.as_ref()?.as_f64()?;
    let b = expected.as_ref()?.as_f64()?;
    a.partial_cmp(&b)
}

fn lookup_path(value: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rule(id: &str, path: &str, op: FilterOp, value: Option<Value>) -> FilterRule {
        FilterRule {
            id: id.to_owned(),
            path: path.to_owned(),
            op,
            value,
        }
    }

    #[test]
    fn empty_set_matches_everything() {
        let m = FilterSet::default().evaluate(&json!({"anything": true}));
        assert!(m.matched);
        assert!(m.matched_rules.is_empty());
    }

    #[test]
    fn all_mode_requires_every_rule() {
        let set = FilterSet {
            mode: MatchMode::All,
            rules: vec![
                rule("r1", "event", FilterOp::Eq, Some(json!("push"))),
                rule("r2", "repo.private", FilterOp::Eq, Some(json!(false))),
            ],
        };
        let hit = set.evaluate(&json!({"event": "push", "repo": {"private": false}}));
        assert!(hit.matched);
        assert_eq!(hit.matched_rules, vec!["r1", "r2"]);

        let miss = set.evaluate(&json!({"event": "push", "repo": {"private": true}}));
        assert!(!miss.matched);
        assert_eq!(miss.matched_rules, vec!["r1"]);
    }

    #[test]
    fn any_mode_needs_one_rule() {
        let set = FilterSet {
            mode: MatchMode::Any,
            rules: vec![
                rule("r1", "kind", FilterOp::Eq, Some(json!("a"))),
                rule("r2", "kind", FilterOp::Eq, Some(json!("b"))),
            ],
        };
        assert!(set.evaluate(&json!({"kind": "b"})).matched);
        assert!(!set.evaluate(&json!({"kind": "c"})).matched);
    }

    #[test]
    fn operators_cover_the_dsl() {
        let payload = json!({"n": 5, "tags": ["alpha", "beta"], "msg": "deploy failed"});
        let cases = [
            (rule("gt", "n", FilterOp::Gt, Some(json!(3))), true),
            (rule("lt", "n", FilterOp::Lt, Some(json!(3))), false),
            (rule("ex", "tags", FilterOp::Exists, None), true),
            (rule("ex2", "missing", FilterOp::Exists, None), false),
            (
                rule("c1", "tags", FilterOp::Contains, Some(json!("alpha"))),
                true,
            ),
            (
                rule("c2", "msg", FilterOp::Contains, Some(json!("failed"))),
                true,
            ),
            (rule("ne", "n", FilterOp::Ne, Some(json!(4))), true),
        ];
        for (r, expected) in cases {
            let set = FilterSet {
                mode: MatchMode::All,
                rules: vec![r.clone()],
            };
            assert_eq!(set.evaluate(&payload).matched, expected, "rule {}", r.id);
        }
    }

    #[test]
    fn ne_on_a_missing_path_does_not_match() {
        let set = FilterSet {
            mode: MatchMode::All,
            rules: vec![rule("r", "missing", FilterOp::Ne, Some(json!(1)))],
        };
        assert!(!set.evaluate(&json!({})).matched);
    }
}
