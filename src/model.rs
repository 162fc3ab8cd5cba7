use std::future::Future;

use crate::{error::InvocationError, normalizer::NormalizedImage, prompt::InstructionPrompt};

/// What a single call to the generation service carries.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// The instruction text, always sent first.
    pub prompt: &'a InstructionPrompt,
    /// The image to attach, if any.
    pub image: Option<&'a NormalizedImage>,
}

/// A non-faulty answer from the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// Generated text.
    Text(String),
    /// The service declined to answer, with the reason it reported.
    Blocked(String),
}

/// Trait for the remote multimodal model answering questions about images.
///
/// Implementations perform exactly one round trip per call and never retry.
/// The [`crate::engine::AnalysisEngine`] owns the model for the process
/// lifetime and only ever borrows it immutably, so implementations must not
/// rely on per-request mutable state.
pub trait VisionModel {
    /// Sends the request and returns the service's answer.
    fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> impl Future<Output = Result<Generation, InvocationError>> + Send;
}
