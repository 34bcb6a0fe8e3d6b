//! Bounded concurrent validation of generated cases.
//!
//! A fixed number of workers pull from the shared case stream until it is
//! exhausted. Results flow over a channel into the single collector (the
//! [`run`] future itself), which owns all mutable aggregation state. Workers
//! consult the committed failure index for the pruning heuristic but never
//! write it; because workers race ahead of the collector, a case may start
//! validating before a sibling failure that would have pruned it is
//! recorded. That race is tolerated: pruning is advisory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};

use casegrid_types::{
    Case, CaseResult, CaseStatus, CasegridError, ChoiceName, Result, RunSummary, ValidateMode,
    VariableName,
};

use crate::events::{EventEmitter, RunEvent};
use crate::validator::Validator;

const PROGRESS_EVERY: usize = 10;

/// Options for one validation run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Number of workers. Zero means one per available execution unit.
    pub concurrency: usize,
    pub mode: ValidateMode,
    /// Skip cases sharing a (variable, choice) pair with a recorded failure.
    pub prune_failed_choices: bool,
    /// Remove per-case artifacts immediately after a success.
    pub auto_remove_success: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            mode: ValidateMode::Full,
            prune_failed_choices: false,
            auto_remove_success: false,
        }
    }
}

fn effective_concurrency(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
    }
}

/// Per-variable choices seen in failed cases.
///
/// Written only by the collector after a failure is committed; workers read
/// it for skip decisions.
#[derive(Debug, Default)]
struct FailureIndex {
    choices: RwLock<BTreeMap<VariableName, BTreeSet<ChoiceName>>>,
}

impl FailureIndex {
    async fn record(&self, case: &Case) {
        let mut choices = self.choices.write().await;
        for (name, choice) in case.iter() {
            choices.entry(name.clone()).or_default().insert(choice.clone());
        }
    }

    async fn overlaps(&self, case: &Case) -> bool {
        let choices = self.choices.read().await;
        case.iter().any(|(name, choice)| {
            choices
                .get(name)
                .is_some_and(|failed| failed.contains(choice))
        })
    }
}

/// Consume the case stream and validate every case with bounded parallelism.
///
/// Returns only after every worker has exited; the stream is always drained,
/// so an upstream generator never leaks stages. `passed + failed + skipped`
/// equals the number of cases consumed.
pub async fn run(
    cases: mpsc::Receiver<Case>,
    validator: Arc<dyn Validator>,
    options: RunOptions,
    events: EventEmitter,
) -> Result<RunSummary> {
    let workers = effective_concurrency(options.concurrency);
    let cases = Arc::new(Mutex::new(cases));
    let index = Arc::new(FailureIndex::default());
    let (result_tx, mut result_rx) = mpsc::channel::<CaseResult>(workers);

    tracing::info!(workers, mode = ?options.mode, "Starting validation run");
    events.emit(RunEvent::RunStarted { workers });

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        handles.push(tokio::spawn(worker(
            worker_id,
            cases.clone(),
            validator.clone(),
            options.clone(),
            index.clone(),
            result_tx.clone(),
        )));
    }
    // The collector's receiver closes once the last worker drops its sender.
    drop(result_tx);

    let mut summary = RunSummary::new();
    let mut finished = 0usize;
    while let Some(result) = result_rx.recv().await {
        if result.status == CaseStatus::Failed {
            index.record(&result.case).await;
            tracing::warn!(
                case = %result.case,
                detail = result.detail.as_deref().unwrap_or(""),
                "Case failed"
            );
        }
        if let Some(warning) = &result.warning {
            tracing::warn!(case = %result.case, warning, "Secondary warning");
        }
        summary.record(&result);
        finished += 1;
        events.emit(RunEvent::CaseFinished {
            case: result.case.clone(),
            status: result.status,
            finished,
        });
        if finished % PROGRESS_EVERY == 0 {
            tracing::info!(
                finished,
                failed = summary.failed.len(),
                skipped = summary.skipped.len(),
                "Progress"
            );
        }
    }

    for handle in handles {
        handle
            .await
            .map_err(|err| CasegridError::Other(format!("validation worker panicked: {err}")))?;
    }

    summary.finish();
    events.emit(RunEvent::RunCompleted {
        passed: summary.passed,
        failed: summary.failed.len(),
        skipped: summary.skipped.len(),
    });
    tracing::info!(
        passed = summary.passed,
        failed = summary.failed.len(),
        skipped = summary.skipped.len(),
        "Run complete"
    );
    Ok(summary)
}

async fn worker(
    worker_id: usize,
    cases: Arc<Mutex<mpsc::Receiver<Case>>>,
    validator: Arc<dyn Validator>,
    options: RunOptions,
    index: Arc<FailureIndex>,
    results: mpsc::Sender<CaseResult>,
) {
    loop {
        let case = {
            let mut stream = cases.lock().await;
            match stream.recv().await {
                Some(case) => case,
                None => break,
            }
        };
        tracing::debug!(worker = worker_id, case = %case, "Picked up case");
        let result = process_case(&case, validator.as_ref(), &options, &index).await;
        if results.send(result).await.is_err() {
            break;
        }
    }
    tracing::debug!(worker = worker_id, "Worker done");
}

async fn process_case(
    case: &Case,
    validator: &dyn Validator,
    options: &RunOptions,
    index: &FailureIndex,
) -> CaseResult {
    if options.prune_failed_choices && index.overlaps(case).await {
        return CaseResult::skipped(case.clone());
    }

    let area = match validator.provision(case).await {
        Ok(area) => area,
        Err(err) => return CaseResult::failed(case.clone(), err.to_string()),
    };

    match validator.validate(case, &area, options.mode).await {
        Ok(()) => {
            if options.auto_remove_success {
                if let Err(err) = validator.discard(case, &area).await {
                    return CaseResult::passed(case.clone())
                        .with_warning(format!("could not remove case artifacts: {err}"));
                }
            }
            CaseResult::passed(case.clone())
        }
        Err(err) => {
            let detail = err.to_string();
            let result = CaseResult::failed(case.clone(), detail.clone());
            match validator.persist_failure(case, &area, &detail).await {
                Ok(()) => result,
                Err(persist_err) => result
                    .with_warning(format!("could not persist failure report: {persist_err}")),
            }
        }
    }
}
