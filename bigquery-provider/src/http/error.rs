use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An error body returned from the BigQuery REST API.
    #[error(transparent)]
    Response(#[from] ErrorResponse),

    /// An error from the HTTP client.
    #[error(transparent)]
    HttpClient(#[from] reqwest::Error),

    /// An error raised by the middleware stack wrapping the HTTP client.
    #[error(transparent)]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// An error from a token source.
    #[error("token source failed: {0}")]
    TokenSource(Box<dyn std::error::Error + Send + Sync>),
}

/// Error detail as carried in `error.errors[]` of an error body, and in `errors` of a query response.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    /// A short error code that summarizes the error.
    pub reason: Option<String>,
    /// Specifies where the error occurred, if present.
    pub location: Option<String>,
    /// A human-readable description of the error.
    pub message: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// An HTTP status value, without the textual description.
    ///
    /// Example values include: `400` (Bad Request), `401` (Unauthorized), and `404` (Not Found).
    pub code: u16,

    /// Description of the error. Same as `errors[0].message`.
    pub message: String,

    /// Canonical status name such as `INVALID_ARGUMENT`.
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

impl ErrorResponse {
    /// The reason of the first error detail, e.g. `notFound` or `invalidQuery`.
    pub fn reason(&self) -> Option<&str> {
        self.errors.first().and_then(|e| e.reason.as_deref())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({}, {})", self.message, self.code, reason),
            None => write!(f, "{} ({})", self.message, self.code),
        }
    }
}

impl std::error::Error for ErrorResponse {}

#[derive(serde::Deserialize)]
pub(crate) struct ErrorWrapper {
    pub(crate) error: ErrorResponse,
}
