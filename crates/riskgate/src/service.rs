//! Tower front for the pipeline, for mounting under an HTTP loader.

use crate::pipeline::{AssessmentPipeline, AssessmentRequest, PipelineResponse};
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A cloneable `tower::Service` over a shared [`AssessmentPipeline`].
///
/// The pipeline never errors at the service level; degraded outcomes are
/// ordinary responses, so the error type is [`Infallible`].
#[derive(Clone)]
pub struct PipelineService {
    pipeline: Arc<AssessmentPipeline>,
}

impl PipelineService {
    pub fn new(pipeline: Arc<AssessmentPipeline>) -> Self {
        Self { pipeline }
    }
}

impl Service<AssessmentRequest> for PipelineService {
    type Response = PipelineResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<PipelineResponse, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: AssessmentRequest) -> Self::Future {
        let pipeline = Arc::clone(&self.pipeline);
        Box::pin(async move { Ok(pipeline.handle(request).await) })
    }
}
