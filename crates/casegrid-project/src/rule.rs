//! Requirement and restriction rules, and the constraint predicate over cases.
//!
//! Both predicates are pure and safe to evaluate on partial cases: an
//! unassigned variable never matches an expected choice, so a rule only
//! becomes enforceable once every variable it mentions is assigned. That is
//! what lets the generator prune candidates at each stage instead of only at
//! the end.

use serde::{Deserialize, Serialize};

use casegrid_types::{Case, Mapping};

use crate::manifest::Project;

/// Conditional rule: when every `if` pair matches, every `then` pair must
/// match too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(rename = "if")]
    pub if_: Mapping,
    pub then: Mapping,
}

impl Requirement {
    /// Returns `false` only when every `if` pair matches the case and at
    /// least one `then` pair does not.
    pub fn allows(&self, case: &Case) -> bool {
        for (name, choice) in &self.if_ {
            if !case.choice_is(name, choice) {
                return true;
            }
        }
        for (name, choice) in &self.then {
            if !case.choice_is(name, choice) {
                return false;
            }
        }
        true
    }
}

/// Absolute rule: forbids the exact (possibly partial) combination it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Restriction(pub Mapping);

impl Restriction {
    /// Returns `false` only when every pair matches the case.
    pub fn allows(&self, case: &Case) -> bool {
        for (name, choice) in &self.0 {
            if !case.choice_is(name, choice) {
                return true;
            }
        }
        false
    }
}

impl Project {
    /// `true` iff the case violates no requirement and no restriction.
    /// Pure conjunction; rule evaluation order does not affect the result.
    pub fn allows(&self, case: &Case) -> bool {
        for rule in self.requirements.values() {
            if !rule.allows(case) {
                return false;
            }
        }
        for rule in self.restrictions.values() {
            if !rule.allows(case) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> Mapping {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn requirement(if_: &[(&str, &str)], then: &[(&str, &str)]) -> Requirement {
        Requirement {
            if_: mapping(if_),
            then: mapping(then),
        }
    }

    // --- Requirement semantics ---

    #[test]
    fn requirement_rejects_matching_if_with_failing_then() {
        let rule = requirement(&[("A", "x")], &[("B", "y")]);
        let case = Case::new().with("A", "x").with("B", "z");
        assert!(!rule.allows(&case));
    }

    #[test]
    fn requirement_accepts_when_if_does_not_match() {
        let rule = requirement(&[("A", "x")], &[("B", "y")]);
        let case = Case::new().with("A", "w").with("B", "z");
        assert!(rule.allows(&case));
    }

    #[test]
    fn requirement_accepts_when_then_matches() {
        let rule = requirement(&[("A", "x")], &[("B", "y")]);
        let case = Case::new().with("A", "x").with("B", "y");
        assert!(rule.allows(&case));
    }

    #[test]
    fn requirement_is_safe_on_partial_cases() {
        let rule = requirement(&[("A", "x")], &[("B", "y")]);

        // A unassigned: the antecedent cannot match, so the rule allows.
        assert!(rule.allows(&Case::new().with("B", "z")));

        // A assigned and matching, B unassigned: an unassigned B cannot
        // satisfy the consequent, so the rule already disallows here. The
        // generator never extends such a branch.
        assert!(!rule.allows(&Case::new().with("A", "x")));
    }

    #[test]
    fn requirement_with_multiple_if_pairs_needs_all_to_match() {
        let rule = requirement(&[("A", "x"), ("B", "y")], &[("C", "z")]);
        let partial_match = Case::new().with("A", "x").with("B", "other").with("C", "w");
        assert!(rule.allows(&partial_match));

        let full_match = Case::new().with("A", "x").with("B", "y").with("C", "w");
        assert!(!rule.allows(&full_match));
    }

    // --- Restriction semantics ---

    #[test]
    fn restriction_rejects_exact_combination() {
        let rule = Restriction(mapping(&[("A", "x"), ("B", "y")]));
        let case = Case::new().with("A", "x").with("B", "y").with("C", "anything");
        assert!(!rule.allows(&case));
    }

    #[test]
    fn restriction_accepts_when_any_pair_differs() {
        let rule = Restriction(mapping(&[("A", "x"), ("B", "y")]));
        let case = Case::new().with("A", "x").with("B", "z");
        assert!(rule.allows(&case));
    }

    #[test]
    fn restriction_is_safe_on_partial_cases() {
        let rule = Restriction(mapping(&[("A", "x"), ("B", "y")]));
        assert!(rule.allows(&Case::new().with("A", "x")));
        assert!(rule.allows(&Case::new()));
    }

    // --- Project conjunction ---

    #[test]
    fn project_allows_conjuncts_all_rules() {
        let source = r#"
apiVersion: casegrid.dev/v1alpha1
kind: Project
parts: {p: {}}
variables:
  size:
    small: [p]
    large: [p]
  env:
    dev: [p]
    prod: [p]
requirements:
  prod-needs-large:
    if: {env: prod}
    then: {size: large}
restrictions:
  no-large-dev:
    size: large
    env: dev
"#;
        let project = Project::from_yaml(source).unwrap();

        let ok = Case::new().with("size", "small").with("env", "dev");
        assert!(project.allows(&ok));

        let violates_requirement = Case::new().with("size", "small").with("env", "prod");
        assert!(!project.allows(&violates_requirement));

        let violates_restriction = Case::new().with("size", "large").with("env", "dev");
        assert!(!project.allows(&violates_restriction));

        let ok_both = Case::new().with("size", "large").with("env", "prod");
        assert!(project.allows(&ok_both));
    }
}
