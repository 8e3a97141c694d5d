//! Runs one tool chain to completion.
//!
//! Walks the chain step by step, hands each step's artifact to the next,
//! deletes intermediate files whatever the outcome, and moves the final
//! output into the working directory under the run's conflict policy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::{ExecutionEvent, MediaItemRef, RunSettings, StatusKind, TransientArtifact};
use crate::tools::{ToolError, ToolInvocation, ToolRegistry};

use super::chain::{StepConfig, ToolChain};
use super::conflict::{
    cleanup_artifacts, move_into_place, move_sidecar, remove_artifact, resolve_destination,
    UniqueNames,
};
use super::error::{ChainError, ChainOutcome, ConfigurationError};

/// Receives execution events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExecutionEvent);
}

impl EventSink for mpsc::UnboundedSender<ExecutionEvent> {
    fn emit(&self, event: ExecutionEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.send(event);
    }
}

/// Result of walking the steps, before finalization
enum StepsResult {
    Completed(TransientArtifact),
    Failed(ChainError),
    Canceled,
}

/// Sequential executor for a single chain
pub struct StepExecutor {
    registry: Arc<ToolRegistry>,
    settings: Arc<RunSettings>,
    names: Arc<UniqueNames>,
    events: Arc<dyn EventSink>,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        settings: Arc<RunSettings>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            settings,
            names: Arc::new(UniqueNames::new()),
            events,
        }
    }

    /// Share the run's name ledger with other executors
    pub fn with_unique_names(mut self, names: Arc<UniqueNames>) -> Self {
        self.names = names;
        self
    }

    /// Execute `chain`, stopping at the next checkpoint once `cancel` fires
    #[instrument(skip_all, fields(item = %chain.item().id, steps = chain.len()))]
    pub async fn run(&self, chain: ToolChain, cancel: CancellationToken) -> ChainOutcome {
        let item = chain.item().clone();
        info!(source = %item.path.display(), "Starting chain");

        self.emit(ExecutionEvent::new(
            item.clone(),
            StatusKind::ChainStarted,
            format!("Processing '{}' ({} steps)", item.file_name(), chain.len()),
        ));

        let mut cleanup: Vec<PathBuf> = Vec::new();
        let result = self.run_steps(&chain, &cancel, &mut cleanup).await;

        match result {
            StepsResult::Completed(_) if cancel.is_cancelled() => {
                self.cancelled(&item, &cleanup).await
            }
            StepsResult::Completed(artifact) => {
                cleanup.retain(|path| path != &artifact.path);
                cleanup_artifacts(&cleanup).await;

                match self.finalize(&chain, &artifact).await {
                    Ok(destination) => {
                        info!(destination = %destination.display(), "Chain completed");
                        self.emit(
                            ExecutionEvent::new(
                                item,
                                StatusKind::ChainDone,
                                format!("Saved as '{}'", destination.display()),
                            )
                            .with_destination(destination.clone()),
                        );
                        ChainOutcome::Done { destination }
                    }
                    Err(err) => {
                        if let Err(e) = remove_artifact(&artifact.path).await {
                            warn!(path = %artifact.path.display(), error = %e, "Failed to remove unsaved output");
                        }
                        self.failed(&item, err)
                    }
                }
            }
            StepsResult::Failed(err) => {
                cleanup_artifacts(&cleanup).await;
                self.failed(&item, err)
            }
            StepsResult::Canceled => self.cancelled(&item, &cleanup).await,
        }
    }

    async fn run_steps(
        &self,
        chain: &ToolChain,
        cancel: &CancellationToken,
        cleanup: &mut Vec<PathBuf>,
    ) -> StepsResult {
        let item = chain.item();
        let last = chain.len().saturating_sub(1);
        let mut artifact = TransientArtifact::source(item.path.clone());

        for step in chain.steps() {
            if cancel.is_cancelled() {
                return StepsResult::Canceled;
            }

            let Some(tool) = self.registry.resolve(&step.name, step.group) else {
                warn!(tool = %step.name, group = %step.group, "Tool not found, aborting chain");
                return StepsResult::Failed(
                    ConfigurationError::UnknownTool {
                        name: step.name.clone(),
                        group: step.group,
                    }
                    .into(),
                );
            };

            let mut invocation = ToolInvocation::new(tool, step.index, artifact, cancel.child_token());
            invocation.set_last_in_chain(step.index == last);

            self.emit(
                ExecutionEvent::new(
                    item.clone(),
                    StatusKind::StepStarted,
                    format!("Step '{}' started", step.name),
                )
                .with_step(step.index, &step.name),
            );

            if let Err(e) = invocation.configure(
                &step.parameters,
                &self.settings.codec,
                &self.settings.working_directory,
            ) {
                return self.step_failed(item, step, e.to_string());
            }

            cleanup.push(invocation.prepare_output_location());

            let started = Instant::now();
            let joined = tokio::task::spawn_blocking(move || invocation.execute()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match joined {
                Ok(Ok(next)) => {
                    debug!(tool = %step.name, duration_ms, "Step done");
                    self.emit(
                        ExecutionEvent::new(
                            item.clone(),
                            StatusKind::StepDone,
                            format!("Step '{}' done in {}ms", step.name, duration_ms),
                        )
                        .with_step(step.index, &step.name),
                    );
                    artifact = next;
                }
                Ok(Err(ToolError::Cancelled)) => return StepsResult::Canceled,
                Ok(Err(e)) => return self.step_failed(item, step, e.to_string()),
                Err(join_error) => {
                    return self.step_failed(item, step, format!("step panicked: {}", join_error))
                }
            }
        }

        if cancel.is_cancelled() {
            return StepsResult::Canceled;
        }

        StepsResult::Completed(artifact)
    }

    /// Move the retained output, then its sidecar, to the destination.
    ///
    /// The output rename is the commit point: once it succeeds the chain is
    /// done, and a sidecar that cannot follow is dropped with a warning.
    async fn finalize(
        &self,
        chain: &ToolChain,
        output: &TransientArtifact,
    ) -> Result<PathBuf, ChainError> {
        let with_sidecar = output.sidecar.is_some();
        let destination = resolve_destination(
            &self.settings.working_directory,
            chain.destination_file_name(),
            self.settings.conflict_policy,
            &self.names,
            with_sidecar,
        )
        .await
        .map_err(|e| ChainError::Finalization {
            message: format!(
                "Failed to resolve destination for '{}': {}",
                chain.destination_file_name(),
                e
            ),
        })?;

        if let Err(e) = move_into_place(&output.path, &destination.path).await {
            destination.release().await;
            return Err(ChainError::Finalization {
                message: format!(
                    "Failed to move output to '{}': {}",
                    destination.path.display(),
                    e
                ),
            });
        }

        if with_sidecar {
            if let Err(e) = move_sidecar(&output.path, &destination.path).await {
                warn!(
                    destination = %destination.path.display(),
                    error = %e,
                    "Failed to move sidecar, output saved without it"
                );
                destination.release_sidecar().await;
                if let Err(e) = remove_artifact(&output.path).await {
                    warn!(path = %output.path.display(), error = %e, "Failed to remove unsaved sidecar");
                }
            }
        }

        Ok(destination.path)
    }

    fn step_failed(&self, item: &MediaItemRef, step: &StepConfig, message: String) -> StepsResult {
        warn!(tool = %step.name, index = step.index, error = %message, "Step failed");

        let err = ChainError::StepExecution {
            index: step.index,
            tool: step.name.clone(),
            message,
        };
        self.emit(
            ExecutionEvent::new(item.clone(), StatusKind::StepFailed, err.message())
                .with_step(step.index, &step.name)
                .with_failure(err.kind()),
        );

        StepsResult::Failed(err)
    }

    fn failed(&self, item: &MediaItemRef, err: ChainError) -> ChainOutcome {
        warn!(error = %err, "Chain failed");

        self.emit(
            ExecutionEvent::new(item.clone(), StatusKind::ChainFailed, err.message())
                .with_failure(err.kind()),
        );

        ChainOutcome::Failed(err)
    }

    async fn cancelled(&self, item: &MediaItemRef, cleanup: &[PathBuf]) -> ChainOutcome {
        cleanup_artifacts(cleanup).await;
        info!("Chain canceled");

        self.emit(ExecutionEvent::new(
            item.clone(),
            StatusKind::ChainCanceled,
            "Processing canceled",
        ));

        ChainOutcome::Canceled
    }

    fn emit(&self, event: ExecutionEvent) {
        self.events.emit(event);
    }
}
