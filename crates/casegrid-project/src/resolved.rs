//! Resolution of a validated project into a runnable form.
//!
//! Resolution checks the manifest, creates the per-run working root, writes
//! inline parts out as values files, scans the declared parts directories,
//! and fixes the variable ordering used for both case generation and report
//! paths. Everything downstream treats the result as immutable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use casegrid_types::{Case, CasegridError, PartName, Result, VariableName};

use crate::manifest::{Project, API_VERSION, PROJECT_KIND};
use crate::validate::validate_or_raise;

const PARTS_DIR: &str = "parts";
const REPORTS_DIR: &str = "reports";

/// A validated project with its working root and resolved part paths.
#[derive(Debug)]
pub struct ResolvedProject {
    pub project: Project,
    pub chart: String,
    /// Declared traversal order; also the report path key order.
    pub variable_order: Vec<VariableName>,
    /// The declared order reversed, used to wire generator stages so the
    /// first declared variable is assigned first.
    pub reverse_variable_order: Vec<VariableName>,
    parts: BTreeMap<PartName, PathBuf>,
    root: PathBuf,
}

impl ResolvedProject {
    /// Validate and resolve a project, creating its working root.
    ///
    /// The root persists until [`remove_workspace`](Self::remove_workspace)
    /// is called; the caller owns the cleanup decision.
    pub fn resolve(project: Project) -> Result<Self> {
        if project.api_version != API_VERSION {
            return Err(CasegridError::UnknownApiVersion(project.api_version));
        }
        if project.kind != PROJECT_KIND {
            return Err(CasegridError::UnknownKind(project.kind));
        }
        validate_or_raise(&project)?;

        let root = tempfile::Builder::new()
            .prefix("casegrid-")
            .tempdir()?
            .keep();

        match Self::resolve_inner(project, root.clone()) {
            Ok(resolved) => Ok(resolved),
            Err(err) => {
                let _ = std::fs::remove_dir_all(&root);
                Err(err)
            }
        }
    }

    fn resolve_inner(project: Project, root: PathBuf) -> Result<ResolvedProject> {
        let mut parts: BTreeMap<PartName, PathBuf> = BTreeMap::new();

        let inline_dir = root.join(PARTS_DIR);
        std::fs::create_dir_all(&inline_dir)?;
        for (name, value) in &project.parts {
            let path = inline_dir.join(format!("{}.yaml", name));
            std::fs::write(&path, serde_yaml::to_string(value)?)?;
            parts.insert(name.clone(), path);
        }

        for dir in &project.parts_dirs {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let name = match file_name
                    .strip_suffix(".yaml")
                    .or_else(|| file_name.strip_suffix(".yml"))
                {
                    Some(stem) => stem.to_string(),
                    None => continue,
                };
                if parts.contains_key(&name) {
                    return Err(CasegridError::DuplicatePart(name));
                }
                parts.insert(name, entry.path());
            }
        }

        for (variable, choices) in &project.variables {
            for (choice, choice_parts) in choices {
                for part in choice_parts {
                    if !parts.contains_key(part) {
                        return Err(CasegridError::UnresolvedPart {
                            variable: variable.clone(),
                            choice: choice.clone(),
                            part: part.clone(),
                        });
                    }
                }
            }
        }

        let variable_order: Vec<VariableName> = if project.variable_order.is_empty() {
            project.variables.keys().cloned().collect()
        } else {
            project.variable_order.clone()
        };
        let mut reverse_variable_order = variable_order.clone();
        reverse_variable_order.reverse();

        let chart = project.chart_path().to_string();

        tracing::debug!(
            root = %root.display(),
            parts = parts.len(),
            variables = variable_order.len(),
            "Project resolved"
        );

        Ok(ResolvedProject {
            project,
            chart,
            variable_order,
            reverse_variable_order,
            parts,
            root,
        })
    }

    /// `true` iff the case violates no rule.
    pub fn allows(&self, case: &Case) -> bool {
        self.project.allows(case)
    }

    /// The per-run working root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolved path of a part file.
    pub fn part_path(&self, part: &str) -> Option<&Path> {
        self.parts.get(part).map(PathBuf::as_path)
    }

    /// Expand a case into `--values <path>` arguments, variables in declared
    /// order, each choice's parts in their declared sequence.
    pub fn values_args(&self, case: &Case) -> Vec<String> {
        let mut args = Vec::new();
        for variable in &self.variable_order {
            let Some(choice) = case.get(variable) else {
                continue;
            };
            let Some(parts) = self
                .project
                .variables
                .get(variable)
                .and_then(|choices| choices.get(choice))
            else {
                continue;
            };
            for part in parts {
                if let Some(path) = self.parts.get(part) {
                    args.push("--values".to_string());
                    args.push(path.display().to_string());
                }
            }
        }
        args
    }

    /// Report directory of a case, keyed by its assignments in declared
    /// variable order: `<root>/reports/<var>/<choice>/...`.
    pub fn case_dir(&self, case: &Case) -> PathBuf {
        let mut dir = self.root.join(REPORTS_DIR);
        for variable in &self.variable_order {
            if let Some(choice) = case.get(variable) {
                dir.push(variable);
                dir.push(choice);
            }
        }
        dir
    }

    /// Path of a named report file inside a case's report directory.
    pub fn report_path(&self, case: &Case, basename: &str) -> PathBuf {
        self.case_dir(case).join(basename)
    }

    /// Delete the working root and everything under it.
    pub fn remove_workspace(&self) -> Result<()> {
        std::fs::remove_dir_all(&self.root)?;
        Ok(())
    }
}
