//! Ask questions about images using a hosted multimodal model.
//!
//! A submission (an uploaded image plus a free-text question) flows through
//! validation, [`normalizer`], [`prompt`] and a single call to a
//! [`VisionModel`], and ends as an [`AnalysisOutcome`] that the caller
//! renders. [`AnalysisEngine`] drives that flow one submission at a time and
//! exposes its [`AnalysisState`].
//!
//! The [`gemini`] module provides the Gemini implementation of
//! [`VisionModel`]; [`server`] and [`render`] put an HTML page and a JSON
//! endpoint in front of the engine.

pub mod config;
pub mod engine;
pub mod error;
pub mod gemini;
pub mod model;
pub mod normalizer;
pub mod prompt;
pub mod render;
pub mod server;

pub use config::Config;
pub use engine::{
    AnalysisEngine, AnalysisOutcome, AnalysisState, FailureKind, InferenceResult, Submission,
    invoke,
};
pub use error::{AnalyzerBusy, DecodeError, InvocationError, ValidationError};
pub use gemini::GeminiClient;
pub use model::{Generation, GenerationRequest, VisionModel};
pub use normalizer::{ColorMode, NormalizedImage, UploadedImage, normalize};
pub use prompt::{InstructionPrompt, build_instructions};
