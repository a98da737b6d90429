//! Backend for machines without raytracing support

use super::{BackendCapabilities, BackendError, BackendResult, SceneSubmission, ShadowBackend, SubmissionId};

/// Backend that accepts nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl ShadowBackend for NullBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities { name: "null".to_string(), raytracing: false }
    }

    fn submit(&mut self, _submission: SceneSubmission) -> BackendResult<SubmissionId> {
        Err(BackendError::Unavailable("no raytracing-capable device".to_string()))
    }

    fn is_complete(&self, _id: SubmissionId) -> bool {
        true
    }

    fn wait(&mut self, _id: SubmissionId) -> BackendResult<()> {
        Ok(())
    }
}
