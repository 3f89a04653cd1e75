/// Result alias that carries the custom [`BeanError`] type.
pub type Result<T> = std::result::Result<T, BeanError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BeanError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// A parameter value fell outside the range its descriptor accepts.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidParameter { key: String, reason: String },
    /// The key is not registered in the parameter descriptor table.
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    /// The value kind does not match the descriptor (e.g. a color for a bool).
    #[error("parameter `{key}` expects a {expected} value")]
    TypeMismatch { key: String, expected: &'static str },
    /// The renderer was asked to draw into an unusable target.
    #[error("render error: {0}")]
    Render(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration (de)serialisation failures.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl BeanError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<&str> for BeanError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeanError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
