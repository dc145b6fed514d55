use thiserror::Error;

/// Nydus load error types
#[derive(Error, Debug)]
pub enum LoadError {
    /// Invalid configuration or source initialization failure
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Source unreachable or its manifest could not be parsed
    #[error("Parse error: {reference} - {message}")]
    ParseError { reference: String, message: String },

    /// Parsed but not a recognized nydus image, or rejected bootstrap set
    #[error("Format error: {0}")]
    FormatError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Registry pull failure
    #[error("Network error: {reference} - {message}")]
    NetworkError { reference: String, message: String },

    /// External merge tool failure
    #[error("External process error: {0}")]
    ExternalProcessError(String),

    /// Archive exhausted without the requested member
    #[error("Not found file {member} in layer archive")]
    MemberNotFound { member: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation aborted by cancellation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Error wrapped with caller context
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<LoadError>,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LoadError {
    /// Wrap this error with a short description of the failing step.
    pub fn context(self, context: impl Into<String>) -> Self {
        LoadError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error beneath any `Context` layers.
    pub fn root(&self) -> &LoadError {
        let mut current = self;
        while let LoadError::Context { source, .. } = current {
            current = source;
        }
        current
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(err: serde_yaml::Error) -> Self {
        LoadError::SerializationError(err.to_string())
    }
}

/// Result type alias for nydus load operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Attach context to the error side of a `Result`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<LoadError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Into::<LoadError>::into(e).context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Into::<LoadError>::into(e).context(f()))
    }
}
