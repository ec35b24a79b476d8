use crate::connection::ConnectionState;
use crate::http::error::Error as HttpError;
use crate::types::BigQueryDbType;

/// Broad category of an [`Error`], for callers that branch on the kind of failure.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// Invalid input: connection string, argument, parameter or index.
    Configuration,
    /// Operation not allowed in the current lifecycle state.
    State,
    /// Capability the BigQuery service does not offer.
    Unsupported,
    /// A typed accessor could not coerce the value it found.
    Conversion,
    /// The caller cancelled the operation.
    Cancelled,
    /// Authentication, query or catalog failure reported by the remote service.
    Remote,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("duplicate parameter name: {0}")]
    DuplicateParameter(String),
    #[error("no such parameter: {0}")]
    NoSuchParameter(String),
    #[error("index {index} is out of range: count={count}")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("{0} has been disposed")]
    Disposed(&'static str),
    #[error("connection is not open: state={0:?}")]
    ConnectionNotOpen(ConnectionState),
    #[error("connection is already open")]
    AlreadyOpen,
    #[error("command has no connection")]
    NoConnection,
    #[error("reader has no current row")]
    NoCurrentRow,
    #[error("reader is not initialized")]
    NotInitialized,
    #[error("synchronous call made from inside an async runtime, use the async variant instead")]
    BlockingInAsyncContext,

    #[error("{0} is not supported by the BigQuery provider")]
    NotSupported(&'static str),

    #[error("cannot convert column {ordinal} ({column_type}) to {target}: {reason}")]
    InvalidCast {
        ordinal: usize,
        column_type: BigQueryDbType,
        target: &'static str,
        reason: String,
    },

    #[error("operation was cancelled")]
    Cancelled,

    #[error("BigQuery request failed: {message}")]
    Remote {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConnectionString(_)
            | Error::InvalidArgument(_)
            | Error::InvalidParameter { .. }
            | Error::DuplicateParameter(_)
            | Error::NoSuchParameter(_)
            | Error::IndexOutOfRange { .. } => ErrorKind::Configuration,
            Error::Disposed(_)
            | Error::ConnectionNotOpen(_)
            | Error::AlreadyOpen
            | Error::NoConnection
            | Error::NoCurrentRow
            | Error::NotInitialized
            | Error::BlockingInAsyncContext => ErrorKind::State,
            Error::NotSupported(_) => ErrorKind::Unsupported,
            Error::InvalidCast { .. } => ErrorKind::Conversion,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Remote { .. } => ErrorKind::Remote,
        }
    }

    /// Remote failure that has no underlying error value, e.g. an incomplete job.
    pub(crate) fn remote(message: impl Into<String>) -> Self {
        Error::Remote {
            message: message.into(),
            source: None,
        }
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Error::Remote {
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

#[cfg(feature = "auth")]
impl From<google_cloud_auth::error::Error> for Error {
    fn from(e: google_cloud_auth::error::Error) -> Self {
        Error::Remote {
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}
