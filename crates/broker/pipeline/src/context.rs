//! Step execution context

use crate::error::StepError;
use broker_state::InstanceStore;
use broker_types::{Instance, InstanceId, PipelineKind};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Context handed to every step invocation
#[derive(Clone)]
pub struct StepContext {
    kind: PipelineKind,
    cancel: CancellationToken,
    store: Arc<dyn InstanceStore>,
    parent_id: Option<InstanceId>,
    parent: Arc<OnceCell<Instance>>,
}

impl StepContext {
    pub fn new(
        kind: PipelineKind,
        cancel: CancellationToken,
        store: Arc<dyn InstanceStore>,
        parent_id: Option<InstanceId>,
    ) -> Self {
        Self {
            kind,
            cancel,
            store,
            parent_id,
            parent: Arc::new(OnceCell::new()),
        }
    }

    /// Pipeline being run
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Token to pass to every blocking call the step makes
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn parent_id(&self) -> Option<&InstanceId> {
        self.parent_id.as_ref()
    }

    /// The parent instance, loaded from the store on first use
    pub async fn parent(&self) -> Result<Option<&Instance>, StepError> {
        let Some(parent_id) = &self.parent_id else {
            return Ok(None);
        };

        let parent = self
            .parent
            .get_or_try_init(|| async {
                self.store
                    .get_instance(parent_id)
                    .await?
                    .ok_or_else(|| StepError::ParentMissing(parent_id.clone()))
            })
            .await?;
        Ok(Some(parent))
    }

    /// The parent instance; an error if there is none
    pub async fn require_parent(&self) -> Result<&Instance, StepError> {
        self.parent().await?.ok_or(StepError::NoParent)
    }
}
