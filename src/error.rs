use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("empty content")]
    EmptyContent,

    #[error("malformed chart archive: {0}")]
    MalformedArchive(String),

    /// Non-2xx answer from the backend, with the message extracted from its error body.
    #[error("{code}: {message}")]
    Upstream { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{0}")]
    Aggregate(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    #[must_use]
    pub fn upstream(code: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            code,
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, when it came from the backend.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display() {
        let err = Error::upstream(500, "backend exploded");
        assert_eq!(err.to_string(), "500: backend exploded");
        assert_eq!(err.status_code(), Some(500));
    }

    #[test]
    fn test_decode_from_json() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.status_code(), None);
    }
}
