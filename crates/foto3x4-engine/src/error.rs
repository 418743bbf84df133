use thiserror::Error;

/// Failure of the AI background generation step.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{provider} credentials missing: set {hint}")]
    MissingCredentials { provider: String, hint: String },

    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} rejected the credentials ({status}): {message}")]
    Auth {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} refused the request: {message}")]
    Rejected { provider: String, message: String },

    #[error("{provider} service error ({status}): {message}")]
    Service {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} returned an unexpected response: {message}")]
    UnexpectedResponse { provider: String, message: String },
}

impl GenerationError {
    pub fn provider(&self) -> &str {
        match self {
            GenerationError::MissingCredentials { provider, .. }
            | GenerationError::Transport { provider, .. }
            | GenerationError::Auth { provider, .. }
            | GenerationError::Rejected { provider, .. }
            | GenerationError::Service { provider, .. }
            | GenerationError::UnexpectedResponse { provider, .. } => provider,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::MissingCredentials { .. } => "missing_credentials",
            GenerationError::Transport { .. } => "transport",
            GenerationError::Auth { .. } => "auth",
            GenerationError::Rejected { .. } => "rejected",
            GenerationError::Service { .. } => "service",
            GenerationError::UnexpectedResponse { .. } => "unexpected_response",
        }
    }
}

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("no rendering surface available: {0}")]
    Canvas(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl PhotoError {
    pub fn kind(&self) -> &'static str {
        match self {
            PhotoError::Input(_) => "input",
            PhotoError::Decode(_) => "decode",
            PhotoError::Canvas(_) => "canvas",
            PhotoError::Encode(_) => "encode",
            PhotoError::Generation(_) => "generation",
        }
    }

    /// Single status line shown to the user when a run stops on this error.
    pub fn user_message(&self) -> String {
        match self {
            PhotoError::Input(detail) | PhotoError::Decode(detail) => {
                format!("Could not load the image ({detail}). Try another one.")
            }
            PhotoError::Canvas(detail) | PhotoError::Encode(detail) => {
                format!("Could not process the image ({detail}).")
            }
            PhotoError::Generation(GenerationError::MissingCredentials { hint, .. }) => {
                format!("AI processing is not configured: set {hint} and try again.")
            }
            PhotoError::Generation(err) => {
                format!("AI processing failed: {err}. Check your API key or try again.")
            }
        }
    }
}
