//! The validation seam and the Helm-backed implementation.
//!
//! The pool only knows the [`Validator`] trait: provision an isolated
//! working area, run the check, persist a failure detail, discard artifacts.
//! [`HelmValidator`] implements it by shelling out to `helm` and `kubectl`,
//! capturing each step's output into per-case report files.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use casegrid_project::ResolvedProject;
use casegrid_types::{Case, CasegridError, Result, ValidateMode};

/// Per-case isolated working area where reports accumulate.
#[derive(Debug, Clone)]
pub struct WorkArea {
    pub dir: PathBuf,
}

/// External collaborator performing the actual correctness check per case.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Allocate the case's isolated working area.
    async fn provision(&self, case: &Case) -> Result<WorkArea>;

    /// Check the case. `Ok(())` is a pass; any error is a case failure.
    async fn validate(&self, case: &Case, area: &WorkArea, mode: ValidateMode) -> Result<()>;

    /// Persist a failure detail into the working area for later inspection.
    async fn persist_failure(&self, case: &Case, area: &WorkArea, detail: &str) -> Result<()>;

    /// Remove the case's transient artifacts after a success.
    async fn discard(&self, case: &Case, area: &WorkArea) -> Result<()>;
}

/// Validates a case by linting, rendering, and dry-run-applying the chart
/// with the case's values files.
pub struct HelmValidator {
    project: Arc<ResolvedProject>,
}

impl HelmValidator {
    pub fn new(project: Arc<ResolvedProject>) -> Self {
        Self { project }
    }

    /// Run one external step, teeing stdout/stderr into `<step>.out` /
    /// `<step>.err` under the case's working area. Returns captured stdout.
    async fn run_step(
        &self,
        case: &Case,
        area: &WorkArea,
        step: &str,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        tracing::debug!(case = %case, step, program, "Running step");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        if let Some(bytes) = stdin {
            let mut handle = child.stdin.take().ok_or_else(|| {
                CasegridError::Other(format!("stdin handle missing for step '{}'", step))
            })?;
            handle.write_all(bytes).await?;
            // Closing stdin is what lets the child see end-of-input.
            drop(handle);
        }
        let output = child.wait_with_output().await?;

        tokio::fs::write(area.dir.join(format!("{}.out", step)), &output.stdout).await?;
        tokio::fs::write(area.dir.join(format!("{}.err", step)), &output.stderr).await?;

        if !output.status.success() {
            return Err(CasegridError::StepFailed {
                step: step.to_string(),
                case: case.to_string(),
                code: output.status.code().unwrap_or(-1),
                dir: area.dir.display().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn lint(&self, case: &Case, area: &WorkArea) -> Result<()> {
        let mut args = vec!["lint".to_string(), self.project.chart.clone()];
        args.extend(self.project.values_args(case));
        self.run_step(case, area, "lint", "helm", &args, None).await?;
        Ok(())
    }

    async fn template(&self, case: &Case, area: &WorkArea) -> Result<Vec<u8>> {
        let mut args = vec![
            "template".to_string(),
            self.project.chart.clone(),
            "--debug".to_string(),
        ];
        args.extend(self.project.values_args(case));
        self.run_step(case, area, "template", "helm", &args, None)
            .await
    }

    async fn apply_dry_run(&self, case: &Case, area: &WorkArea, manifests: &[u8]) -> Result<()> {
        let args = vec![
            "apply".to_string(),
            "-f".to_string(),
            "-".to_string(),
            "--dry-run=client".to_string(),
        ];
        self.run_step(case, area, "apply", "kubectl", &args, Some(manifests))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Validator for HelmValidator {
    async fn provision(&self, case: &Case) -> Result<WorkArea> {
        let dir = self.project.case_dir(case);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| CasegridError::Provision {
                case: case.to_string(),
                message: err.to_string(),
            })?;
        Ok(WorkArea { dir })
    }

    async fn validate(&self, case: &Case, area: &WorkArea, mode: ValidateMode) -> Result<()> {
        self.lint(case, area).await?;
        if mode == ValidateMode::LintOnly {
            return Ok(());
        }
        let manifests = self.template(case, area).await?;
        if mode == ValidateMode::NoApply {
            return Ok(());
        }
        self.apply_dry_run(case, area, &manifests).await
    }

    async fn persist_failure(&self, case: &Case, area: &WorkArea, detail: &str) -> Result<()> {
        tokio::fs::write(area.dir.join("err"), detail)
            .await
            .map_err(|err| CasegridError::ReportPersistence {
                case: case.to_string(),
                message: err.to_string(),
            })
    }

    async fn discard(&self, case: &Case, area: &WorkArea) -> Result<()> {
        tokio::fs::remove_dir_all(&area.dir).await?;
        tracing::debug!(case = %case, dir = %area.dir.display(), "Removed case artifacts");
        Ok(())
    }
}
