use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
    error::{AnalyzerBusy, DecodeError, InvocationError, ValidationError},
    model::{Generation, GenerationRequest, VisionModel},
    normalizer::{self, NormalizedImage, UploadedImage},
    prompt::{InstructionPrompt, build_instructions},
};

/// Where the engine currently is in handling a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisState {
    /// The engine is idle and ready to accept a new submission.
    Idle,
    /// The engine is checking that the submission has an image and a question.
    Validating,
    /// The engine is decoding the upload into a normalized image.
    Normalizing,
    /// The engine is waiting for the model to answer.
    Invoking,
    /// The engine is turning the outcome into the caller's view.
    Rendering,
}

impl AnalysisState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "idle",
            AnalysisState::Validating => "validating",
            AnalysisState::Normalizing => "normalizing",
            AnalysisState::Invoking => "invoking",
            AnalysisState::Rendering => "rendering",
        }
    }
}

/// Coarse category of a failed invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The API key is missing or was rejected by the service.
    Credential,
    /// The service could not be reached or the connection failed.
    Network,
    /// The service answered with an error status.
    Service,
    /// The service answered with a body that could not be understood.
    MalformedResponse,
    /// The image could not be encoded for upload.
    Encoding,
}

impl FailureKind {
    /// Returns the kind as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Credential => "credential",
            FailureKind::Network => "network",
            FailureKind::Service => "service",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::Encoding => "encoding",
        }
    }
}

impl From<&InvocationError> for FailureKind {
    fn from(error: &InvocationError) -> Self {
        match error {
            InvocationError::MissingCredential | InvocationError::Credential { .. } => {
                FailureKind::Credential
            }
            InvocationError::Transport(_) => FailureKind::Network,
            InvocationError::Service { .. } => FailureKind::Service,
            InvocationError::MalformedResponse(_) => FailureKind::MalformedResponse,
            InvocationError::Encode(_) => FailureKind::Encoding,
        }
    }
}

/// Result of asking the model, with faults already folded in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InferenceResult {
    /// The model answered with this text.
    Success(String),
    /// The service refused to answer, for the given block reason.
    Blocked(String),
    /// The call failed before an answer came back.
    Failed { kind: FailureKind, message: String },
}

impl fmt::Display for InferenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceResult::Success(text) => f.write_str(text),
            InferenceResult::Blocked(reason) => write!(f, "Response blocked: {reason}"),
            InferenceResult::Failed { message, .. } => {
                write!(f, "Error generating response: {message}")
            }
        }
    }
}

/// Asks the model once. Faults never escape; they come back as
/// [`InferenceResult::Failed`].
pub async fn invoke<M: VisionModel>(
    model: &M,
    prompt: &InstructionPrompt,
    image: Option<&NormalizedImage>,
) -> InferenceResult {
    match model.generate(GenerationRequest { prompt, image }).await {
        Ok(Generation::Text(text)) => InferenceResult::Success(text),
        Ok(Generation::Blocked(reason)) => {
            log::warn!("Response blocked by the service: {reason}");
            InferenceResult::Blocked(reason)
        }
        Err(error) => {
            log::error!("Inference failed: {error}");
            InferenceResult::Failed {
                kind: FailureKind::from(&error),
                message: error.to_string(),
            }
        }
    }
}

/// One user action: an optional upload and the question typed next to it.
#[derive(Clone, Debug, Default)]
pub struct Submission {
    pub image: Option<UploadedImage>,
    pub question: String,
}

impl Submission {
    pub fn new(image: Option<UploadedImage>, question: impl Into<String>) -> Self {
        Self {
            image,
            question: question.into(),
        }
    }

    /// Checks that an image is present and the question is not blank, in
    /// that order.
    pub fn validate(&self) -> Result<(&UploadedImage, &str), ValidationError> {
        let image = self.image.as_ref().ok_or(ValidationError::MissingImage)?;
        if self.question.trim().is_empty() {
            return Err(ValidationError::BlankQuestion);
        }
        Ok((image, &self.question))
    }
}

/// Everything one submission can end in.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Warning(ValidationError),
    DecodeFailed(DecodeError),
    Completed(InferenceResult),
}

/// Runs submissions through validation, normalization and inference, one
/// at a time.
///
/// The engine owns the model for the process lifetime. A submission arriving
/// while another is in flight is rejected with [`AnalyzerBusy`] rather than
/// queued.
pub struct AnalysisEngine<M> {
    model: M,
    state: Mutex<AnalysisState>,
}

impl<M: VisionModel> AnalysisEngine<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            state: Mutex::new(AnalysisState::Idle),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn state(&self) -> AnalysisState {
        *lock(&self.state)
    }

    /// Handles one user action and renders its outcome.
    ///
    /// `render` runs in the [`AnalysisState::Rendering`] state. The engine is
    /// back to idle once this returns, or once the returned future is
    /// dropped.
    pub async fn handle<R, F>(&self, submission: Submission, render: F) -> Result<R, AnalyzerBusy>
    where
        F: FnOnce(&Submission, &AnalysisOutcome) -> R,
    {
        let guard = self.begin()?;

        let outcome = self.run(&guard, &submission).await;

        guard.set(AnalysisState::Rendering);
        Ok(render(&submission, &outcome))
    }

    async fn run(&self, guard: &StateGuard<'_>, submission: &Submission) -> AnalysisOutcome {
        let (upload, question) = match submission.validate() {
            Ok(valid) => valid,
            Err(warning) => {
                log::warn!("Rejected submission: {warning}");
                return AnalysisOutcome::Warning(warning);
            }
        };

        guard.set(AnalysisState::Normalizing);
        let image = match normalizer::normalize(upload) {
            Ok(image) => image,
            Err(error) => {
                log::warn!("Failed to process the uploaded image: {error}");
                return AnalysisOutcome::DecodeFailed(error);
            }
        };

        let prompt = build_instructions(question);

        guard.set(AnalysisState::Invoking);
        log::debug!(
            "Invoking model with a {}x{} {} image",
            image.width(),
            image.height(),
            image.color_mode().as_str()
        );
        let result = invoke(&self.model, &prompt, Some(&image)).await;

        if let InferenceResult::Success(_) = result {
            log::info!("Analysis completed");
        }
        AnalysisOutcome::Completed(result)
    }

    fn begin(&self) -> Result<StateGuard<'_>, AnalyzerBusy> {
        let mut state = lock(&self.state);
        if *state != AnalysisState::Idle {
            log::warn!("Engine is still {}", state.as_str());
            return Err(AnalyzerBusy);
        }
        *state = AnalysisState::Validating;
        Ok(StateGuard(&self.state))
    }
}

/// Puts the engine back to idle when a submission ends, however it ends.
struct StateGuard<'a>(&'a Mutex<AnalysisState>);

impl StateGuard<'_> {
    fn set(&self, state: AnalysisState) {
        *lock(self.0) = state;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *lock(self.0) = AnalysisState::Idle;
    }
}

fn lock(state: &Mutex<AnalysisState>) -> MutexGuard<'_, AnalysisState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
