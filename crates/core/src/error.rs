use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Browser error: {0}")]
    Browser(String),

    /// Launch or page failure. The session has been torn down to `Inactive`.
    #[error("Session error: {0}")]
    Session(String),

    /// Verification code did not match the expected format. State is unchanged.
    #[error("Invalid code format: {0}")]
    AuthFormat(String),

    /// Code was submitted but the site did not confirm the login.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Network failure or non-2xx answer from the language model.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// The model answered, but not with a valid intent document.
    #[error("Malformed intent ({reason}): {raw}")]
    MalformedIntent { raw: String, reason: String },

    /// Reading or clearing the cart failed. Cached cart state is untouched.
    #[error("Cart operation failed: {0}")]
    CartOperation(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors after which the session is guaranteed to be `Inactive`.
    pub fn resets_session(&self) -> bool {
        matches!(self, Error::Session(_) | Error::AuthFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
