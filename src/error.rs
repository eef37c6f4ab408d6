use std::fmt;

use reqwest::StatusCode;

#[doc(hidden)]
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A list specifying categories of listsync errors
///
/// used with the [`Error`] type
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never got a response (connection refused, timeout, etc.)
    Network,
    /// The server answered with a non-success status
    Status,
    /// The body could not be serialized or deserialized into the item type
    Serialization,
    /// The body does not have the shape expected by the configured envelope
    Envelope,
    /// The item has no identifier or self link yet, so it cannot be addressed
    NotPersisted,
    /// No entry exists for the given key
    NotFound,
    /// The login response carried no token
    Unauthenticated,
    /// The owning list was unmounted before the response arrived
    Cancelled,
    /// An internal error happened, this is probably a bug in listsync or one of its dependencies
    Internal,
}

impl ErrorKind {
    pub(crate) fn as_str(&self) -> &'static str {
        use ErrorKind::*;
        match *self {
            Network => "network failure",
            Status => "request failed",
            Serialization => "serialization failed",
            Envelope => "unexpected response shape",
            NotPersisted => "item is not persisted",
            NotFound => "entry not found",
            Unauthenticated => "not authenticated",
            Cancelled => "cancelled",
            Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    /// Shows a human-readable description of the `ErrorKind`.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    status: Option<StatusCode>,
    error: Option<BoxError>,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for Error {
    /// Shows a human-readable description of the `Error`.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.error.as_ref()) {
            (Some(status), Some(source)) => write!(fmt, "{}: {status}: {source}", self.kind),
            (Some(status), None) => write!(fmt, "{}: {status}", self.kind),
            (None, Some(source)) => write!(fmt, "{}: {source}", self.kind),
            (None, None) => write!(fmt, "{}", self.kind),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            status: None,
            error: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::new(ErrorKind::Serialization, e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Error::new(ErrorKind::Serialization, e);
        }
        match e.status() {
            Some(status) => Error::status(status, e),
            None => Error::new(ErrorKind::Network, e),
        }
    }
}

impl Error {
    pub fn new<E: Into<BoxError>>(kind: ErrorKind, error: E) -> Self {
        Self {
            kind,
            status: None,
            error: Some(error.into()),
        }
    }

    /// Create an error for a non-success response
    pub fn status<E: Into<BoxError>>(status: StatusCode, error: E) -> Self {
        Self {
            kind: ErrorKind::Status,
            status: Some(status),
            error: Some(error.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The HTTP status of the failed response, if the server answered
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns true if the server was reached and rejected the request.
    ///
    /// These are the failures reported to the user, as opposed to network
    /// failures which are only logged.
    pub fn is_application(&self) -> bool {
        matches!(self.kind, ErrorKind::Status | ErrorKind::Envelope)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    pub fn envelope<E: Into<BoxError>>(error: E) -> Self {
        Self::new(ErrorKind::Envelope, error)
    }

    pub fn internal<E: Into<BoxError>>(error: E) -> Self {
        Self::new(ErrorKind::Internal, error)
    }
}
