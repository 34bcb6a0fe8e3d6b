//! Project validation: check rules and diagnostics.
//!
//! Every structural problem that would otherwise surface mid-run is caught
//! here, before any case is generated. Call [`validate`] for advisory
//! diagnostics or [`validate_or_raise`] to fail on the first `Error`-severity
//! issue.

use casegrid_types::{CasegridError, Result};

use crate::manifest::{Project, API_VERSION, PROJECT_KIND};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

// ---------------------------------------------------------------------------
// CheckRule trait
// ---------------------------------------------------------------------------

pub trait CheckRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, project: &Project) -> Vec<Diagnostic>;
}

fn error(rule: &dyn CheckRule, message: String, fix: Option<String>) -> Diagnostic {
    Diagnostic {
        rule: rule.name().into(),
        severity: Severity::Error,
        message,
        fix,
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct ApiVersionRule;
impl CheckRule for ApiVersionRule {
    fn name(&self) -> &str {
        "api_version"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        if project.api_version != API_VERSION {
            out.push(error(
                self,
                format!("Unknown apiVersion '{}'", project.api_version),
                Some(format!("Set apiVersion to '{}'", API_VERSION)),
            ));
        }
        if project.kind != PROJECT_KIND {
            out.push(error(
                self,
                format!("Unknown kind '{}'", project.kind),
                Some(format!("Set kind to '{}'", PROJECT_KIND)),
            ));
        }
        out
    }
}

struct PartsPresentRule;
impl CheckRule for PartsPresentRule {
    fn name(&self) -> &str {
        "parts_present"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        if project.parts.is_empty() && project.parts_dirs.is_empty() {
            vec![error(
                self,
                "No parts or parts directories specified".into(),
                Some("Add at least one entry under 'parts' or 'partsDirs'".into()),
            )]
        } else {
            vec![]
        }
    }
}

struct VariablesRule;
impl CheckRule for VariablesRule {
    fn name(&self) -> &str {
        "variables"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        if project.variables.is_empty() {
            return vec![error(self, "No variables specified".into(), None)];
        }
        project
            .variables
            .iter()
            .filter(|(_, choices)| choices.is_empty())
            .map(|(name, _)| error(self, format!("Variable '{}' has no choices", name), None))
            .collect()
    }
}

/// Empty identifiers would defeat the partial-case safety of rule evaluation
/// (an unassigned variable must never compare equal to a declared choice), so
/// they are rejected outright.
struct EmptyNamesRule;
impl CheckRule for EmptyNamesRule {
    fn name(&self) -> &str {
        "empty_names"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (name, choices) in &project.variables {
            if name.is_empty() {
                out.push(error(self, "Variable with empty name".into(), None));
            }
            for (choice, parts) in choices {
                if choice.is_empty() {
                    out.push(error(
                        self,
                        format!("Variable '{}' has a choice with an empty name", name),
                        None,
                    ));
                }
                if parts.iter().any(String::is_empty) {
                    out.push(error(
                        self,
                        format!(
                            "Variable '{}', choice '{}' references a part with an empty name",
                            name, choice
                        ),
                        None,
                    ));
                }
            }
        }
        if project.parts.keys().any(String::is_empty) {
            out.push(error(self, "Part with empty name".into(), None));
        }
        out
    }
}

struct RequirementShapeRule;
impl CheckRule for RequirementShapeRule {
    fn name(&self) -> &str {
        "requirement_shape"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (name, rule) in &project.requirements {
            if rule.if_.is_empty() {
                out.push(error(
                    self,
                    format!("Requirement '{}' has an empty 'if', it would match all cases", name),
                    None,
                ));
            }
            if rule.then.is_empty() {
                out.push(error(
                    self,
                    format!(
                        "Requirement '{}' has an empty 'then', it would never discard any case",
                        name
                    ),
                    None,
                ));
            }
        }
        out
    }
}

struct RestrictionShapeRule;
impl CheckRule for RestrictionShapeRule {
    fn name(&self) -> &str {
        "restriction_shape"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        project
            .restrictions
            .iter()
            .filter(|(_, rule)| rule.0.is_empty())
            .map(|(name, _)| {
                error(
                    self,
                    format!("Restriction '{}' is empty, it would discard all cases", name),
                    None,
                )
            })
            .collect()
    }
}

struct RuleReferencesRule;
impl RuleReferencesRule {
    fn check_mapping(
        &self,
        project: &Project,
        rule_name: &str,
        clause: &str,
        mapping: &casegrid_types::Mapping,
        out: &mut Vec<Diagnostic>,
    ) {
        for (variable, choice) in mapping {
            match project.variables.get(variable) {
                None => out.push(error(
                    self,
                    format!(
                        "Rule '{}' {} refers to undefined variable '{}'",
                        rule_name, clause, variable
                    ),
                    None,
                )),
                Some(choices) if !choices.contains_key(choice) => out.push(error(
                    self,
                    format!(
                        "Rule '{}' {} refers to non-existent choice '{}' of variable '{}'",
                        rule_name, clause, choice, variable
                    ),
                    None,
                )),
                Some(_) => {}
            }
        }
    }
}
impl CheckRule for RuleReferencesRule {
    fn name(&self) -> &str {
        "rule_references"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (name, rule) in &project.requirements {
            self.check_mapping(project, name, "if", &rule.if_, &mut out);
            self.check_mapping(project, name, "then", &rule.then, &mut out);
        }
        for (name, rule) in &project.restrictions {
            self.check_mapping(project, name, "mapping", &rule.0, &mut out);
        }
        out
    }
}

/// Parts referenced by choices must exist. With parts directories in play the
/// full set is only known at resolution time, so this rule stays quiet then
/// and resolution reports anything still unresolved.
struct PartReferencesRule;
impl CheckRule for PartReferencesRule {
    fn name(&self) -> &str {
        "part_references"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        if !project.parts_dirs.is_empty() {
            return vec![];
        }
        let mut out = Vec::new();
        for (variable, choices) in &project.variables {
            for (choice, parts) in choices {
                for part in parts {
                    if !project.parts.contains_key(part) {
                        out.push(error(
                            self,
                            format!(
                                "Variable '{}', choice '{}' refers to unknown part '{}'",
                                variable, choice, part
                            ),
                            None,
                        ));
                    }
                }
            }
        }
        out
    }
}

struct VariableOrderRule;
impl CheckRule for VariableOrderRule {
    fn name(&self) -> &str {
        "variable_order"
    }
    fn apply(&self, project: &Project) -> Vec<Diagnostic> {
        if project.variable_order.is_empty() {
            return vec![];
        }
        let mut out = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for name in &project.variable_order {
            if !project.variables.contains_key(name) {
                out.push(error(
                    self,
                    format!("variableOrder mentions undefined variable '{}'", name),
                    None,
                ));
            }
            if !seen.insert(name) {
                out.push(error(
                    self,
                    format!("variableOrder mentions variable '{}' more than once", name),
                    None,
                ));
            }
        }
        let missing: Vec<&str> = project
            .variables
            .keys()
            .filter(|name| !seen.contains(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            out.push(error(
                self,
                format!("variableOrder is missing variables: {}", missing.join(", ")),
                Some("List every declared variable exactly once".into()),
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

fn default_rules() -> Vec<Box<dyn CheckRule>> {
    vec![
        Box::new(ApiVersionRule),
        Box::new(PartsPresentRule),
        Box::new(VariablesRule),
        Box::new(EmptyNamesRule),
        Box::new(RequirementShapeRule),
        Box::new(RestrictionShapeRule),
        Box::new(RuleReferencesRule),
        Box::new(PartReferencesRule),
        Box::new(VariableOrderRule),
    ]
}

/// Run every check rule and collect diagnostics.
pub fn validate(project: &Project) -> Vec<Diagnostic> {
    default_rules()
        .iter()
        .flat_map(|rule| rule.apply(project))
        .collect()
}

/// Fail on the first `Error`-severity diagnostic.
pub fn validate_or_raise(project: &Project) -> Result<()> {
    for diag in validate(project) {
        if diag.severity == Severity::Error {
            return Err(CasegridError::ProjectInvalid(format!(
                "{}: {}",
                diag.rule, diag.message
            )));
        }
    }
    Ok(())
}
