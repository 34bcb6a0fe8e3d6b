//! Shared types, errors, and result aggregation for the casegrid runner.
//!
//! This crate provides the foundational types used across all other casegrid
//! crates:
//! - `CasegridError` — unified error taxonomy
//! - `Case` — one assignment of variables to choices
//! - `CaseResult` / `RunSummary` — per-case and per-run outcomes
//! - `ValidateMode` — how deep a validation goes

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unified error type for all casegrid subsystems.
#[derive(Debug, thiserror::Error)]
pub enum CasegridError {
    // === Project Errors ===
    #[error("Unknown apiVersion: {0}")]
    UnknownApiVersion(String),

    #[error("Unknown kind: {0}")]
    UnknownKind(String),

    #[error("Project validation failed: {0}")]
    ProjectInvalid(String),

    #[error("Part name '{0}' is duplicated")]
    DuplicatePart(String),

    #[error("Variable '{variable}', choice '{choice}' refers to unresolved part '{part}'")]
    UnresolvedPart {
        variable: String,
        choice: String,
        part: String,
    },

    // === Case Errors ===
    #[error("Failed to provision working area for case [{case}]: {message}")]
    Provision { case: String, message: String },

    #[error("Step '{step}' failed for case [{case}] with exit code {code}, reports under {dir}")]
    StepFailed {
        step: String,
        case: String,
        code: i32,
        dir: String,
    },

    #[error("Failed to persist failure report for case [{case}]: {message}")]
    ReportPersistence { case: String, message: String },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl CasegridError {
    /// Returns `true` if the error is contained to a single case and must not
    /// abort the run.
    pub fn is_case_scoped(&self) -> bool {
        matches!(
            self,
            CasegridError::Provision { .. }
                | CasegridError::StepFailed { .. }
                | CasegridError::ReportPersistence { .. }
        )
    }

    /// Returns `true` if the error means the project definition itself is
    /// unusable. These surface before any case is generated.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CasegridError::UnknownApiVersion(_)
                | CasegridError::UnknownKind(_)
                | CasegridError::ProjectInvalid(_)
                | CasegridError::DuplicatePart(_)
                | CasegridError::UnresolvedPart { .. }
        )
    }
}

/// A convenience alias for `Result<T, CasegridError>`.
pub type Result<T> = std::result::Result<T, CasegridError>;

// ---------------------------------------------------------------------------
// Names and mappings
// ---------------------------------------------------------------------------

/// Name of a declared variable (an axis of variation).
pub type VariableName = String;
/// Name of one value a variable can take.
pub type ChoiceName = String;
/// Name of an overlay part contributed by a choice.
pub type PartName = String;
/// Name of a requirement or restriction rule.
pub type RuleName = String;

/// A partial assignment of variables to choices, as used by rules.
/// Ordered so that iteration and display are deterministic.
pub type Mapping = BTreeMap<VariableName, ChoiceName>;

/// The choices of one variable, each mapping to the overlay parts it
/// contributes, in application order.
pub type Variable = BTreeMap<ChoiceName, Vec<PartName>>;

// ---------------------------------------------------------------------------
// Case — one assignment of variables to choices
// ---------------------------------------------------------------------------

/// One combination of variable → choice assignments.
///
/// A case is complete when it holds exactly one entry per declared variable;
/// the generator only ever hands out complete cases. [`Case::with`] returns an
/// extended copy and leaves the original untouched, which is what lets the
/// generator fan one partial case out into many candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Case(Mapping);

impl Case {
    /// Create an empty case.
    pub fn new() -> Self {
        Self(Mapping::new())
    }

    /// Return a copy of this case with `name` assigned to `choice`.
    /// Re-assigning the same pair yields an equal case.
    pub fn with(&self, name: impl Into<VariableName>, choice: impl Into<ChoiceName>) -> Case {
        let mut assignments = self.0.clone();
        assignments.insert(name.into(), choice.into());
        Case(assignments)
    }

    /// The choice assigned to `name`, if any.
    pub fn get(&self, name: &str) -> Option<&ChoiceName> {
        self.0.get(name)
    }

    /// `true` iff `name` is assigned and equals `choice`. An unassigned
    /// variable never matches, which makes rule evaluation safe on partial
    /// cases.
    pub fn choice_is(&self, name: &str, choice: &str) -> bool {
        self.0.get(name).map(String::as_str) == Some(choice)
    }

    /// Iterate over (variable, choice) pairs in variable-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&VariableName, &ChoiceName)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Mapping> for Case {
    fn from(assignments: Mapping) -> Self {
        Self(assignments)
    }
}

impl FromIterator<(VariableName, ChoiceName)> for Case {
    fn from_iter<I: IntoIterator<Item = (VariableName, ChoiceName)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, choice) in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}={}", name, choice)?;
            first = false;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ValidateMode — how deep a validation goes
// ---------------------------------------------------------------------------

/// Depth of the per-case validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidateMode {
    /// Pure syntactic check of the chart with the case's values.
    LintOnly,
    /// Lint plus a full render of the chart.
    NoApply,
    /// Lint, render, and a client-side dry-run apply of the rendered output.
    #[default]
    Full,
}

// ---------------------------------------------------------------------------
// CaseResult — outcome of one validated case
// ---------------------------------------------------------------------------

/// Classification of one case after the pool is done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of running (or skipping) a single case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub case: Case,
    pub status: CaseStatus,
    /// Failure detail, present iff `status == Failed`.
    pub detail: Option<String>,
    /// Secondary problem that did not change the classification, e.g. a
    /// failure report that could not be written.
    pub warning: Option<String>,
}

impl CaseResult {
    /// The case validated cleanly.
    pub fn passed(case: Case) -> Self {
        Self {
            case,
            status: CaseStatus::Passed,
            detail: None,
            warning: None,
        }
    }

    /// The case failed validation (or could not be provisioned).
    pub fn failed(case: Case, detail: impl Into<String>) -> Self {
        Self {
            case,
            status: CaseStatus::Failed,
            detail: Some(detail.into()),
            warning: None,
        }
    }

    /// The case was skipped by the pruning heuristic.
    pub fn skipped(case: Case) -> Self {
        Self {
            case,
            status: CaseStatus::Skipped,
            detail: None,
            warning: None,
        }
    }

    /// Attach a secondary warning to this result.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

// ---------------------------------------------------------------------------
// RunSummary — aggregation across one validation run
// ---------------------------------------------------------------------------

/// Aggregated outcome of a whole validation run.
///
/// Owned by the pool's single collector; workers never touch it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub passed: usize,
    pub failed: Vec<Case>,
    pub skipped: Vec<Case>,
    /// For every variable, the choices that appeared in at least one failed
    /// case. Feeds both the pruning heuristic and the final report.
    pub failed_choices: BTreeMap<VariableName, BTreeSet<ChoiceName>>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now(),
            finished_at: None,
            passed: 0,
            failed: Vec::new(),
            skipped: Vec::new(),
            failed_choices: BTreeMap::new(),
        }
    }

    /// Fold one case result into the summary.
    pub fn record(&mut self, result: &CaseResult) {
        match result.status {
            CaseStatus::Passed => self.passed += 1,
            CaseStatus::Failed => {
                for (name, choice) in result.case.iter() {
                    self.failed_choices
                        .entry(name.clone())
                        .or_default()
                        .insert(choice.clone());
                }
                self.failed.push(result.case.clone());
            }
            CaseStatus::Skipped => self.skipped.push(result.case.clone()),
        }
    }

    /// Mark the run as finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(chrono::Utc::now());
    }

    /// Total number of cases accounted for.
    pub fn total(&self) -> usize {
        self.passed + self.failed.len() + self.skipped.len()
    }

    /// `true` iff nothing failed and nothing was skipped.
    pub fn all_passed(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- error display ---

    #[test]
    fn error_display_unknown_api_version() {
        let err = CasegridError::UnknownApiVersion("v9".into());
        assert_eq!(err.to_string(), "Unknown apiVersion: v9");
    }

    #[test]
    fn error_display_unresolved_part() {
        let err = CasegridError::UnresolvedPart {
            variable: "size".into(),
            choice: "large".into(),
            part: "big-values".into(),
        };
        assert_eq!(
            err.to_string(),
            "Variable 'size', choice 'large' refers to unresolved part 'big-values'"
        );
    }

    #[test]
    fn error_display_provision() {
        let err = CasegridError::Provision {
            case: "env=dev".into(),
            message: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to provision working area for case [env=dev]: permission denied"
        );
    }

    #[test]
    fn error_display_step_failed() {
        let err = CasegridError::StepFailed {
            step: "lint".into(),
            case: "env=dev,size=small".into(),
            code: 1,
            dir: "/tmp/casegrid-x/reports/env/dev/size/small".into(),
        };
        assert_eq!(
            err.to_string(),
            "Step 'lint' failed for case [env=dev,size=small] with exit code 1, \
             reports under /tmp/casegrid-x/reports/env/dev/size/small"
        );
    }

    // --- classification helpers ---

    #[test]
    fn case_scoped_errors() {
        let err = CasegridError::Provision {
            case: "a=b".into(),
            message: "x".into(),
        };
        assert!(err.is_case_scoped());
        assert!(!err.is_config());

        let err = CasegridError::ReportPersistence {
            case: "a=b".into(),
            message: "x".into(),
        };
        assert!(err.is_case_scoped());
    }

    #[test]
    fn config_errors_are_not_case_scoped() {
        let err = CasegridError::ProjectInvalid("restriction 'r' is empty".into());
        assert!(err.is_config());
        assert!(!err.is_case_scoped());

        let err = CasegridError::DuplicatePart("common".into());
        assert!(err.is_config());
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CasegridError = io_err.into();
        assert!(matches!(err, CasegridError::Io(_)));
        assert!(!err.is_case_scoped());
        assert!(!err.is_config());
    }

    #[test]
    fn from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("{unclosed").unwrap_err();
        let err: CasegridError = yaml_err.into();
        assert!(matches!(err, CasegridError::Yaml(_)));
    }

    #[test]
    fn result_alias_works() {
        fn example() -> Result<u32> {
            Ok(7)
        }
        assert_eq!(example().unwrap(), 7);
    }

    // --- Case ---

    #[test]
    fn with_extends_without_aliasing() {
        let base = Case::new().with("env", "dev");
        let extended = base.with("size", "large");

        assert_eq!(base.len(), 1);
        assert_eq!(base.get("size"), None);
        assert_eq!(extended.len(), 2);
        assert_eq!(extended.get("size"), Some(&"large".to_string()));
    }

    #[test]
    fn with_is_idempotent() {
        let once = Case::new().with("env", "dev");
        let twice = once.with("env", "dev");
        assert_eq!(once, twice);
    }

    #[test]
    fn with_overwrites_existing_assignment() {
        let case = Case::new().with("env", "dev").with("env", "prod");
        assert_eq!(case.len(), 1);
        assert_eq!(case.get("env"), Some(&"prod".to_string()));
    }

    #[test]
    fn choice_is_false_for_unassigned_variable() {
        let case = Case::new().with("env", "dev");
        assert!(case.choice_is("env", "dev"));
        assert!(!case.choice_is("env", "prod"));
        assert!(!case.choice_is("size", "large"));
    }

    #[test]
    fn display_is_ordered_by_variable_name() {
        let case = Case::new().with("size", "large").with("env", "prod");
        assert_eq!(case.to_string(), "env=prod,size=large");
    }

    #[test]
    fn display_of_empty_case_is_empty() {
        assert_eq!(Case::new().to_string(), "");
    }

    #[test]
    fn case_serde_is_transparent() {
        let case = Case::new().with("env", "dev").with("size", "small");
        let json = serde_json::to_string(&case).unwrap();
        assert_eq!(json, r#"{"env":"dev","size":"small"}"#);
        let back: Case = serde_json::from_str(&json).unwrap();
        assert_eq!(back, case);
    }

    #[test]
    fn case_from_iterator() {
        let case: Case = vec![
            ("env".to_string(), "dev".to_string()),
            ("size".to_string(), "small".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(case.len(), 2);
    }

    // --- CaseStatus / ValidateMode serde ---

    #[test]
    fn case_status_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&CaseStatus::Passed).unwrap(),
            "\"passed\""
        );
        assert_eq!(
            serde_json::to_string(&CaseStatus::Skipped).unwrap(),
            "\"skipped\""
        );
    }

    #[test]
    fn validate_mode_serde_round_trip() {
        assert_eq!(
            serde_json::to_string(&ValidateMode::LintOnly).unwrap(),
            "\"lint_only\""
        );
        let mode: ValidateMode = serde_json::from_str("\"no_apply\"").unwrap();
        assert_eq!(mode, ValidateMode::NoApply);
        assert_eq!(ValidateMode::default(), ValidateMode::Full);
    }

    // --- CaseResult ---

    #[test]
    fn case_result_constructors() {
        let case = Case::new().with("env", "dev");

        let passed = CaseResult::passed(case.clone());
        assert_eq!(passed.status, CaseStatus::Passed);
        assert!(passed.detail.is_none());

        let failed = CaseResult::failed(case.clone(), "lint exploded");
        assert_eq!(failed.status, CaseStatus::Failed);
        assert_eq!(failed.detail.as_deref(), Some("lint exploded"));

        let skipped = CaseResult::skipped(case);
        assert_eq!(skipped.status, CaseStatus::Skipped);
    }

    #[test]
    fn case_result_with_warning_keeps_classification() {
        let case = Case::new().with("env", "dev");
        let result =
            CaseResult::failed(case, "boom").with_warning("could not write failure report");
        assert_eq!(result.status, CaseStatus::Failed);
        assert_eq!(
            result.warning.as_deref(),
            Some("could not write failure report")
        );
    }

    // --- RunSummary ---

    #[test]
    fn summary_conservation() {
        let mut summary = RunSummary::new();
        summary.record(&CaseResult::passed(Case::new().with("env", "dev")));
        summary.record(&CaseResult::failed(
            Case::new().with("env", "prod"),
            "boom",
        ));
        summary.record(&CaseResult::skipped(Case::new().with("env", "stage")));

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.skipped.len(), 1);
        assert!(!summary.all_passed());
    }

    #[test]
    fn summary_indexes_failed_choices_per_variable() {
        let mut summary = RunSummary::new();
        summary.record(&CaseResult::failed(
            Case::new().with("env", "prod").with("size", "large"),
            "boom",
        ));
        summary.record(&CaseResult::failed(
            Case::new().with("env", "prod").with("size", "small"),
            "boom again",
        ));

        let env = summary.failed_choices.get("env").unwrap();
        assert_eq!(env.len(), 1);
        assert!(env.contains("prod"));

        let size = summary.failed_choices.get("size").unwrap();
        assert_eq!(size.len(), 2);
    }

    #[test]
    fn summary_skips_do_not_touch_failed_choices() {
        let mut summary = RunSummary::new();
        summary.record(&CaseResult::skipped(Case::new().with("env", "dev")));
        assert!(summary.failed_choices.is_empty());
        assert!(!summary.all_passed());
    }

    #[test]
    fn summary_all_passed_on_empty_run() {
        let summary = RunSummary::new();
        assert_eq!(summary.total(), 0);
        assert!(summary.all_passed());
    }

    #[test]
    fn summary_finish_stamps_time() {
        let mut summary = RunSummary::new();
        assert!(summary.finished_at.is_none());
        summary.finish();
        assert!(summary.finished_at.is_some());
    }
}
