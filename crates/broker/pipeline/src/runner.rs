//! Resumable pipeline execution
//!
//! The runner enforces the persistence discipline every pipeline relies on:
//!
//! 1. Resume from the step after the last persisted step name.
//! 2. Run one step, replace the instance's details with its output, record
//!    the step name in the checkpoint and persist, in that order.
//! 3. Only then start the next step.
//!
//! A failed step leaves the persisted instance exactly as the previous step
//! left it, so re-running the pipeline retries the failed step.

use crate::context::StepContext;
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use broker_state::InstanceStore;
use broker_types::{Instance, InstanceStatus, OperationCheckpoint, PipelineKind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Provision or update finished; the instance as persisted
    Completed(Instance),
    /// Deprovision finished and the instance record was removed
    Removed(Instance),
}

impl RunOutcome {
    pub fn instance(&self) -> &Instance {
        match self {
            RunOutcome::Completed(instance) | RunOutcome::Removed(instance) => instance,
        }
    }

    pub fn into_instance(self) -> Instance {
        match self {
            RunOutcome::Completed(instance) | RunOutcome::Removed(instance) => instance,
        }
    }
}

/// Runs pipelines against an [`InstanceStore`]
#[derive(Clone)]
pub struct PipelineRunner {
    store: Arc<dyn InstanceStore>,
}

impl PipelineRunner {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self { store }
    }

    /// Run `pipeline` on `instance` from its resume point to the end
    #[instrument(skip_all, fields(instance = %instance.id, pipeline = %pipeline.kind()))]
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        mut instance: Instance,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let kind = pipeline.kind();
        let last_completed = self.enter(kind, &mut instance).await?;
        let mut next = pipeline.resume_point(last_completed.as_deref())?;

        match &last_completed {
            Some(step) => info!(after = %step, "Resuming pipeline"),
            None => info!("Starting pipeline"),
        }

        let ctx = StepContext::new(
            kind,
            cancel.clone(),
            self.store.clone(),
            instance.parent_id.clone(),
        );

        while let Some(name) = next {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled {
                    pipeline: kind,
                    step: name.to_string(),
                });
            }

            let step = pipeline
                .step(name)
                .ok_or_else(|| PipelineError::UnknownStep {
                    pipeline: kind,
                    step: name.to_string(),
                })?;

            debug!(step = %name, "Executing step");
            let output = step.execute(&ctx, &instance).await.map_err(|source| {
                warn!(step = %name, error = %source, "Step failed");
                PipelineError::StepFailed {
                    pipeline: kind,
                    step: name.to_string(),
                    source,
                }
            })?;

            instance.details = output.details;
            instance.secure_details = output.secure_details;
            instance.checkpoint = Some(OperationCheckpoint {
                pipeline: kind,
                last_completed_step: Some(name.to_string()),
            });
            instance.touch();
            self.store.put_instance(&instance).await?;
            debug!(step = %name, "Step persisted");

            next = pipeline.next_step_name(name)?;
        }

        self.finish(kind, instance).await
    }

    /// Reconcile the instance's checkpoint with `kind`, returning the resume marker
    async fn enter(&self, kind: PipelineKind, instance: &mut Instance) -> Result<Option<String>> {
        match &instance.checkpoint {
            Some(checkpoint) if checkpoint.pipeline == kind => {
                let last = checkpoint.last_completed_step.clone();
                if instance.status != InstanceStatus::in_flight(kind) {
                    instance.status = InstanceStatus::in_flight(kind);
                    instance.status_reason = None;
                    instance.touch();
                    self.store.put_instance(instance).await?;
                }
                Ok(last)
            }
            Some(checkpoint) => Err(PipelineError::CheckpointMismatch {
                instance: instance.id.clone(),
                found: checkpoint.pipeline,
                requested: kind,
            }),
            None => {
                instance.begin(kind);
                self.store.put_instance(instance).await?;
                Ok(None)
            }
        }
    }

    async fn finish(&self, kind: PipelineKind, mut instance: Instance) -> Result<RunOutcome> {
        match kind {
            PipelineKind::Provision | PipelineKind::Update => {
                instance.status = InstanceStatus::Provisioned;
                instance.checkpoint = None;
                instance.touch();
                self.store.put_instance(&instance).await?;
                info!("Pipeline completed");
                Ok(RunOutcome::Completed(instance))
            }
            PipelineKind::Deprovision => {
                self.store.delete_instance(&instance.id).await?;
                info!("Pipeline completed; instance removed");
                Ok(RunOutcome::Removed(instance))
            }
        }
    }
}
