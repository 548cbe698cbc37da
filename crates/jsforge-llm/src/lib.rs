use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: String,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
        }
    }
}

/// Why a call to the code-generation endpoint produced no usable reply.
///
/// `MissingField` is kept apart from a successful call that returned an empty
/// string: the first is a protocol failure, the second is a model answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed building HTTP client: {0}")]
    Client(String),
    #[error("could not reach code-generation endpoint {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("code-generation endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode code-generation response: {0}")]
    Decode(String),
    #[error("code-generation response has no `{field}` field")]
    MissingField { field: &'static str },
}

pub trait CodeGenerator {
    /// Returns the model's reply trimmed of surrounding whitespace.
    fn generate(&self, req: &GenerateRequest) -> Result<String, GenerationError>;
}

impl<G: CodeGenerator + ?Sized> CodeGenerator for &G {
    fn generate(&self, req: &GenerateRequest) -> Result<String, GenerationError> {
        (**self).generate(req)
    }
}

impl<G: CodeGenerator + ?Sized> CodeGenerator for std::sync::Arc<G> {
    fn generate(&self, req: &GenerateRequest) -> Result<String, GenerationError> {
        (**self).generate(req)
    }
}
