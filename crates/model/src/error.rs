use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns `true` if sending the same request again later may succeed.
    #[inline]
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::RateLimitExceeded)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Moderated => f.write_str("content moderated"),
            ErrorKind::RateLimitExceeded => f.write_str("rate limit exceeded"),
            ErrorKind::Other => f.write_str("model error"),
        }
    }
}
