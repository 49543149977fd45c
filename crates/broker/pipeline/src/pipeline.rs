//! Ordered, named step sequences

use crate::context::StepContext;
use crate::error::{PipelineError, Result, StepError};
use crate::step::{FnStep, Step, StepOutput};
use broker_types::{Instance, PipelineKind};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A non-empty sequence of uniquely named steps
#[derive(Clone)]
pub struct Pipeline {
    kind: PipelineKind,
    steps: Vec<Arc<dyn Step>>,
}

impl Pipeline {
    /// Build a pipeline, rejecting empty step lists and duplicate names
    pub fn new(kind: PipelineKind, steps: Vec<Arc<dyn Step>>) -> Result<Self> {
        if steps.is_empty() {
            return Err(PipelineError::Empty(kind));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name()) {
                return Err(PipelineError::DuplicateStep {
                    pipeline: kind,
                    step: step.name().to_string(),
                });
            }
        }

        Ok(Self { kind, steps })
    }

    pub fn builder(kind: PipelineKind) -> PipelineBuilder {
        PipelineBuilder {
            kind,
            steps: Vec::new(),
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; kept for symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name())
    }

    pub fn first_step_name(&self) -> &str {
        // Construction guarantees at least one step
        self.steps.first().map(|s| s.name()).unwrap_or_default()
    }

    pub fn step(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Name of the step after `current`; `None` after the last step
    pub fn next_step_name(&self, current: &str) -> Result<Option<&str>> {
        let position = self
            .steps
            .iter()
            .position(|s| s.name() == current)
            .ok_or_else(|| PipelineError::UnknownStep {
                pipeline: self.kind,
                step: current.to_string(),
            })?;
        Ok(self.steps.get(position + 1).map(|s| s.name()))
    }

    /// Where to start given the last persisted step, `None` if already done
    pub fn resume_point(&self, last_completed: Option<&str>) -> Result<Option<&str>> {
        match last_completed {
            None => Ok(Some(self.first_step_name())),
            Some(name) => self.next_step_name(name),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("kind", &self.kind)
            .field("steps", &self.step_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Incremental [`Pipeline`] construction
pub struct PipelineBuilder {
    kind: PipelineKind,
    steps: Vec<Arc<dyn Step>>,
}

impl PipelineBuilder {
    pub fn step<S: Step + 'static>(mut self, step: S) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Append a step built from an async closure
    pub fn step_fn<F>(self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn(StepContext, Instance) -> BoxFuture<'static, std::result::Result<StepOutput, StepError>>
            + Send
            + Sync
            + 'static,
    {
        self.step(FnStep::new(name, run))
    }

    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.kind, self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn noop(name: &str) -> PipelineBuilder {
        Pipeline::builder(PipelineKind::Provision).step_fn(name, |_, instance| {
            async move { Ok(StepOutput::unchanged(&instance)) }.boxed()
        })
    }

    fn three_steps() -> Pipeline {
        noop("create-server")
            .step_fn("create-database", |_, instance| {
                async move { Ok(StepOutput::unchanged(&instance)) }.boxed()
            })
            .step_fn("ensure-login", |_, instance| {
                async move { Ok(StepOutput::unchanged(&instance)) }.boxed()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookups() {
        let pipeline = three_steps();
        assert_eq!(pipeline.first_step_name(), "create-server");
        assert!(pipeline.step("create-database").is_some());
        assert!(pipeline.step("missing").is_none());
        assert_eq!(
            pipeline.next_step_name("create-server").unwrap(),
            Some("create-database")
        );
        assert_eq!(pipeline.next_step_name("ensure-login").unwrap(), None);
    }

    #[test]
    fn test_resume_after_first_step_continues_at_second() {
        let pipeline = three_steps();
        assert_eq!(
            pipeline.resume_point(Some("create-server")).unwrap(),
            Some("create-database")
        );
        assert_eq!(pipeline.resume_point(None).unwrap(), Some("create-server"));
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        let err = three_steps().next_step_name("drop-everything").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStep { ref step, .. } if step == "drop-everything"));
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let err = Pipeline::builder(PipelineKind::Update).build().unwrap_err();
        assert!(matches!(err, PipelineError::Empty(PipelineKind::Update)));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = noop("deploy")
            .step_fn("deploy", |_, instance| {
                async move { Ok(StepOutput::unchanged(&instance)) }.boxed()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStep { ref step, .. } if step == "deploy"));
    }
}
