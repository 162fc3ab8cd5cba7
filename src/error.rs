use thiserror::Error;

/// Rejections raised before any work is done on a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please upload an image first.")]
    MissingImage,
    #[error("Please provide a question about the image.")]
    BlankQuestion,
}

/// The uploaded bytes could not be turned into a [`crate::NormalizedImage`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("the uploaded file is empty")]
    Empty,
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Faults raised while talking to the generation service.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("no API key configured, set GOOGLE_API_KEY")]
    MissingCredential,
    #[error("credential rejected ({status}): {message}")]
    Credential { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Returned when a submission arrives while another one is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("an analysis is already in progress")]
pub struct AnalyzerBusy;
