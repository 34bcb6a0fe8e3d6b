//! Streaming case generation as a pipeline of filtering stages.
//!
//! One stage per variable, chained by bounded channels and wired in reverse
//! declared order so that the stage assigning the first declared variable
//! sits at the head of the chain. Each stage extends incoming partial cases
//! by every choice of its variable, drops candidates the rules disallow, and
//! forwards the rest. The construction is equivalent to a depth-first
//! cartesian product with pruning at every decision point, but the stages
//! progress independently, so generation overlaps with consumption.

use std::sync::Arc;

use tokio::sync::mpsc;

use casegrid_project::ResolvedProject;
use casegrid_types::{Case, Variable, VariableName};

const STAGE_BUFFER: usize = 64;

/// Start the generation pipeline and return the stream of complete cases.
///
/// The stream is finite and closes once every branch has been explored or
/// pruned. Dropping the receiver tears the pipeline down: each stage exits as
/// soon as its downstream send fails, so an abandoned run leaks no tasks.
pub fn generate(project: Arc<ResolvedProject>) -> mpsc::Receiver<Case> {
    let (final_tx, final_rx) = mpsc::channel(STAGE_BUFFER);

    let mut outgoing = final_tx;
    for name in &project.reverse_variable_order {
        let (tx, rx) = mpsc::channel(STAGE_BUFFER);
        let choices = project
            .project
            .variables
            .get(name)
            .cloned()
            .unwrap_or_default();
        tokio::spawn(stage(project.clone(), name.clone(), choices, rx, outgoing));
        outgoing = tx;
    }

    // Seed the head of the chain with the single empty case. Dropping the
    // sender afterwards is what lets the chain wind down.
    tokio::spawn(async move {
        let _ = outgoing.send(Case::new()).await;
    });

    final_rx
}

/// Drain the pipeline into a vector. Order is deterministic for a fixed
/// variable order.
pub async fn generate_all(project: Arc<ResolvedProject>) -> Vec<Case> {
    let mut stream = generate(project);
    let mut cases = Vec::new();
    while let Some(case) = stream.recv().await {
        cases.push(case);
    }
    cases
}

async fn stage(
    project: Arc<ResolvedProject>,
    name: VariableName,
    choices: Variable,
    mut incoming: mpsc::Receiver<Case>,
    outgoing: mpsc::Sender<Case>,
) {
    while let Some(partial) = incoming.recv().await {
        for choice in choices.keys() {
            let candidate = partial.with(name.clone(), choice.clone());
            if !project.allows(&candidate) {
                tracing::trace!(case = %candidate, "Pruned");
                continue;
            }
            if outgoing.send(candidate).await.is_err() {
                return;
            }
        }
    }
}
