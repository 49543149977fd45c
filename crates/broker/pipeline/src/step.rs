//! Steps
//!
//! A step is a named unit of work that receives the full current instance and
//! returns the instance's new details. It must tolerate being invoked again
//! after its remote effect was already applied: the runner only records a step
//! as done once its result is persisted, so a crash in between re-runs it.

use crate::context::StepContext;
use crate::error::StepError;
use async_trait::async_trait;
use broker_types::{DetailsDocument, DetailsError, Instance, TypedDetails};
use futures::future::BoxFuture;

/// What a step leaves behind; replaces the instance's details wholesale
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    pub details: DetailsDocument,
    pub secure_details: DetailsDocument,
}

impl StepOutput {
    pub fn new(details: DetailsDocument, secure_details: DetailsDocument) -> Self {
        Self {
            details,
            secure_details,
        }
    }

    /// Leave the instance's details as they are
    pub fn unchanged(instance: &Instance) -> Self {
        Self::new(instance.details.clone(), instance.secure_details.clone())
    }

    /// Encode typed details
    pub fn typed<D, S>(details: &D, secure_details: &S) -> Result<Self, DetailsError>
    where
        D: TypedDetails,
        S: TypedDetails,
    {
        Ok(Self::new(
            DetailsDocument::encode(details)?,
            DetailsDocument::encode(secure_details)?,
        ))
    }
}

/// A named, resumable unit of work
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable name, unique within its pipeline; persisted for resume
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &StepContext, instance: &Instance)
        -> Result<StepOutput, StepError>;
}

type StepFuture = BoxFuture<'static, Result<StepOutput, StepError>>;

/// A step built from an async closure
pub struct FnStep<F> {
    name: String,
    run: F,
}

impl<F> FnStep<F>
where
    F: Fn(StepContext, Instance) -> StepFuture + Send + Sync,
{
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            run,
        }
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(StepContext, Instance) -> StepFuture + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: &StepContext,
        instance: &Instance,
    ) -> Result<StepOutput, StepError> {
        (self.run)(ctx.clone(), instance.clone()).await
    }
}
