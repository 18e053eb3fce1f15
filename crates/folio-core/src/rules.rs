//! Boolean rule language used by `conditions` on actions.
//!
//! A rule tree is pure: evaluating it never mutates the context, so the same
//! tree can be checked against every volume (the driver does exactly that during
//! pre-flight and again right before each action runs).

use crate::error::FolioError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix marking a condition value as a reference to another context field.
pub const CONTEXT_REF_PREFIX: &str = "ctx:";

// ---------------------------------------------------------------------------
// RuleValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<RuleValue>),
}

impl RuleValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            RuleValue::Int(i) => Some(*i as f64),
            RuleValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn loose_eq(&self, other: &RuleValue) -> bool {
        match (self, other) {
            (RuleValue::List(a), RuleValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    fn loose_cmp(&self, other: &RuleValue) -> Option<Ordering> {
        match (self, other) {
            (RuleValue::Str(a), RuleValue::Str(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    /// `None` when membership is undefined for this pairing.
    fn contains(&self, needle: &RuleValue) -> Option<bool> {
        match (self, needle) {
            (RuleValue::List(items), _) => Some(items.iter().any(|i| i.loose_eq(needle))),
            (RuleValue::Str(hay), RuleValue::Str(n)) => Some(hay.contains(n.as_str())),
            _ => None,
        }
    }
}

impl From<bool> for RuleValue {
    fn from(v: bool) -> Self {
        RuleValue::Bool(v)
    }
}

impl From<i64> for RuleValue {
    fn from(v: i64) -> Self {
        RuleValue::Int(v)
    }
}

impl From<u32> for RuleValue {
    fn from(v: u32) -> Self {
        RuleValue::Int(i64::from(v))
    }
}

impl From<f64> for RuleValue {
    fn from(v: f64) -> Self {
        RuleValue::Float(v)
    }
}

impl From<&str> for RuleValue {
    fn from(v: &str) -> Self {
        RuleValue::Str(v.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(v: String) -> Self {
        RuleValue::Str(v)
    }
}

impl<T: Into<RuleValue>> From<Vec<T>> for RuleValue {
    fn from(v: Vec<T>) -> Self {
        RuleValue::List(v.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::In => "in",
            Operator::NotIn => "not in",
        }
    }

    fn apply(self, lhs: &RuleValue, rhs: &RuleValue) -> bool {
        match self {
            Operator::Eq => lhs.loose_eq(rhs),
            Operator::Ne => !lhs.loose_eq(rhs),
            Operator::Gt => lhs.loose_cmp(rhs) == Some(Ordering::Greater),
            Operator::Lt => lhs.loose_cmp(rhs) == Some(Ordering::Less),
            Operator::Ge => matches!(
                lhs.loose_cmp(rhs),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Le => matches!(lhs.loose_cmp(rhs), Some(Ordering::Less | Ordering::Equal)),
            Operator::In => rhs.contains(lhs).unwrap_or(false),
            Operator::NotIn => rhs.contains(lhs).map(|found| !found).unwrap_or(false),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operator {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "==" | "is" => Ok(Operator::Eq),
            "!=" | "not is" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Ge),
            "<=" => Ok(Operator::Le),
            "in" => Ok(Operator::In),
            "not in" => Ok(Operator::NotIn),
            _ => Err(FolioError::UnsupportedOperator(s.to_string())),
        }
    }
}

impl TryFrom<String> for Operator {
    type Error = FolioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Operand
// ---------------------------------------------------------------------------

/// Right-hand side of a condition: either a literal or `ctx:<field>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RuleValue", into = "RuleValue")]
pub enum Operand {
    Literal(RuleValue),
    Reference(String),
}

impl From<RuleValue> for Operand {
    fn from(value: RuleValue) -> Self {
        match value {
            RuleValue::Str(s) if s.starts_with(CONTEXT_REF_PREFIX) => {
                Operand::Reference(s[CONTEXT_REF_PREFIX.len()..].to_string())
            }
            other => Operand::Literal(other),
        }
    }
}

impl From<Operand> for RuleValue {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Literal(v) => v,
            Operand::Reference(name) => RuleValue::Str(format!("{CONTEXT_REF_PREFIX}{name}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Anything a rule can read fields from.
pub trait Lookup {
    fn lookup(&self, field: &str) -> Option<RuleValue>;
}

impl Lookup for BTreeMap<String, RuleValue> {
    fn lookup(&self, field: &str) -> Option<RuleValue> {
        self.get(field).cloned()
    }
}

// ---------------------------------------------------------------------------
// RuleExpr
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RuleExpr {
    Condition {
        field: String,
        operator: Operator,
        value: Operand,
    },
    And {
        rules: Vec<RuleExpr>,
    },
    Or {
        rules: Vec<RuleExpr>,
    },
    Not {
        rule: Box<RuleExpr>,
    },
}

impl RuleExpr {
    pub fn condition(field: impl Into<String>, operator: Operator, value: impl Into<RuleValue>) -> Self {
        RuleExpr::Condition {
            field: field.into(),
            operator,
            value: Operand::from(value.into()),
        }
    }

    pub fn and(rules: Vec<RuleExpr>) -> Self {
        RuleExpr::And { rules }
    }

    pub fn or(rules: Vec<RuleExpr>) -> Self {
        RuleExpr::Or { rules }
    }

    pub fn negate(rule: RuleExpr) -> Self {
        RuleExpr::Not {
            rule: Box::new(rule),
        }
    }

    pub fn evaluate<C: Lookup + ?Sized>(&self, ctx: &C) -> bool {
        match self {
            RuleExpr::Condition {
                field,
                operator,
                value,
            } => {
                let lhs = match ctx.lookup(field) {
                    Some(RuleValue::Null) | None => return false,
                    Some(v) => v,
                };
                let rhs = match value {
                    Operand::Literal(v) => v.clone(),
                    Operand::Reference(name) => ctx.lookup(name).unwrap_or(RuleValue::Null),
                };
                operator.apply(&lhs, &rhs)
            }
            // Children are all evaluated on purpose: no short-circuit.
            RuleExpr::And { rules } => rules
                .iter()
                .map(|r| r.evaluate(ctx))
                .fold(true, |acc, hit| acc & hit),
            RuleExpr::Or { rules } => rules
                .iter()
                .map(|r| r.evaluate(ctx))
                .fold(false, |acc, hit| acc | hit),
            RuleExpr::Not { rule } => !rule.evaluate(ctx),
        }
    }

    /// Structural problems that serde cannot express, as `(path, message)`.
    pub fn problems(&self, path: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.collect_problems(path, &mut out);
        out
    }

    fn collect_problems(&self, path: &str, out: &mut Vec<(String, String)>) {
        match self {
            RuleExpr::Condition { field, .. } => {
                if field.trim().is_empty() {
                    out.push((format!("{path}.field"), "field must not be empty".to_string()));
                }
            }
            RuleExpr::And { rules } | RuleExpr::Or { rules } => {
                if rules.is_empty() {
                    out.push((
                        format!("{path}.rules"),
                        "requires at least one sub-rule".to_string(),
                    ));
                }
                for (i, r) in rules.iter().enumerate() {
                    r.collect_problems(&format!("{path}.rules[{i}]"), out);
                }
            }
            RuleExpr::Not { rule } => rule.collect_problems(&format!("{path}.rule"), out),
        }
    }
}

impl fmt::Display for RuleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleExpr::Condition {
                field,
                operator,
                value,
            } => match value {
                Operand::Literal(v) => write!(f, "{field} {operator} {v:?}"),
                Operand::Reference(r) => write!(f, "{field} {operator} ctx:{r}"),
            },
            RuleExpr::And { rules } | RuleExpr::Or { rules } => {
                let joiner = if matches!(self, RuleExpr::And { .. }) {
                    " AND "
                } else {
                    " OR "
                };
                let parts: Vec<String> = rules.iter().map(|r| r.to_string()).collect();
                write!(f, "({})", parts.join(joiner))
            }
            RuleExpr::Not { rule } => write!(f, "NOT({rule})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, RuleValue)]) -> BTreeMap<String, RuleValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn always(value: bool) -> RuleExpr {
        RuleExpr::condition("flag", Operator::Eq, value)
    }

    #[test]
    fn greater_than_matches_and_missing_field_fails_closed() {
        let rule = RuleExpr::condition("x", ">".parse().unwrap(), 5i64);
        assert!(rule.evaluate(&ctx(&[("x", 10i64.into())])));
        assert!(!rule.evaluate(&ctx(&[])));
    }

    #[test]
    fn null_field_counts_as_missing() {
        let rule = RuleExpr::condition("q", Operator::Ne, "HQ");
        assert!(!rule.evaluate(&ctx(&[("q", RuleValue::Null)])));
    }

    #[test]
    fn and_or_not_follow_boolean_algebra() {
        let c = ctx(&[("flag", true.into())]);
        assert!(!RuleExpr::and(vec![always(true), always(false)]).evaluate(&c));
        assert!(RuleExpr::or(vec![always(false), always(true)]).evaluate(&c));
        for rule in [always(true), always(false), RuleExpr::condition("nope", Operator::Eq, 1i64)] {
            assert_eq!(RuleExpr::negate(rule.clone()).evaluate(&c), !rule.evaluate(&c));
        }
    }

    #[test]
    fn context_reference_resolved_before_compare() {
        let rule = RuleExpr::condition("volume", Operator::Ge, "ctx:threshold");
        assert!(rule.evaluate(&ctx(&[("volume", 3i64.into()), ("threshold", 2.5.into())])));
        assert!(!rule.evaluate(&ctx(&[("volume", 3i64.into())])));
    }

    #[test]
    fn membership_on_lists_and_strings() {
        let c = ctx(&[("pub_type", "digital".into()), ("colors", vec![0i64, 3].into())]);
        assert!(RuleExpr::condition("pub_type", Operator::In, vec!["digital", "web"]).evaluate(&c));
        assert!(RuleExpr::condition("pub_type", Operator::In, "digital-raw").evaluate(&c));
        assert!(RuleExpr::condition("pub_type", Operator::NotIn, vec!["scan"]).evaluate(&c));
        // number `in` number is undefined, so both forms fail closed
        assert!(!RuleExpr::condition("pub_type", Operator::NotIn, 4i64).evaluate(&c));
    }

    #[test]
    fn int_and_float_compare_equal() {
        let c = ctx(&[("volume", 2i64.into())]);
        assert!(RuleExpr::condition("volume", Operator::Eq, 2.0).evaluate(&c));
        assert!(!RuleExpr::condition("volume", Operator::Gt, "1").evaluate(&c));
    }

    #[test]
    fn unknown_operator_rejected_at_parse_time() {
        let yaml = "op: condition\nfield: x\noperator: '=~'\nvalue: 1\n";
        let err = serde_yaml::from_str::<RuleExpr>(yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported operator"));
    }

    #[test]
    fn operators_are_case_insensitive() {
        assert_eq!("NOT IN".parse::<Operator>().unwrap(), Operator::NotIn);
        assert_eq!("Is".parse::<Operator>().unwrap(), Operator::Eq);
    }

    #[test]
    fn nested_tree_from_yaml() {
        let yaml = r#"
op: and
rules:
  - op: condition
    field: volume
    operator: ">="
    value: 2
  - op: not
    rule:
      op: condition
      field: oneshot
      operator: is
      value: true
"#;
        let rule: RuleExpr = serde_yaml::from_str(yaml).unwrap();
        let c = ctx(&[("volume", 3i64.into()), ("oneshot", false.into())]);
        assert!(rule.evaluate(&c));
        assert!(!rule.evaluate(&ctx(&[("volume", 3i64.into()), ("oneshot", true.into())])));
    }

    #[test]
    fn reference_survives_serialization() {
        let rule = RuleExpr::condition("a", Operator::Eq, "ctx:b");
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"ctx:b\""));
        let back: RuleExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn empty_and_is_a_problem() {
        let rule = RuleExpr::negate(RuleExpr::and(vec![]));
        let problems = rule.problems("actions[0].conditions");
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, "actions[0].conditions.rule.rules");
    }
}
